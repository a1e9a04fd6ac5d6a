//! Track decryption for Deezer's protected media content.
//!
//! # Encryption Format
//!
//! Deezer uses a striped encryption pattern:
//! * Content is divided into 2KB chunks, counted from 0 in stream order
//! * Every third chunk (0, 3, 6, ...) is encrypted, but only when it is a
//!   full 2KB chunk; a short final chunk is always stored as-is
//! * Encryption uses Blowfish in CBC mode
//! * A fixed IV is used, and the cipher state is reset for every chunk
//!
//! The per-track key is derived from the track ID alone, see
//! [`key_for_track_id`].
//!
//! # Streaming
//!
//! Decryption is a single sequential pass. [`Chunks`] cuts any reader into
//! positional chunks, [`Decrypt`] exposes the decrypted stream as a
//! [`Read`], and [`decrypt`] copies a whole stream into a writer. The
//! stream is never buffered beyond the current chunk.
//!
//! A chunk index can only be known by counting from the start, so a failed
//! decryption cannot be resumed. Once a [`Decrypt`] failed, every further
//! read fails too. Discard partial output instead.
//!
//! # Examples
//!
//! ```rust
//! use deezerdl::decrypt::{self, key_for_track_id};
//!
//! let key = key_for_track_id(track.id());
//! let written = decrypt::decrypt(encrypted, &key, &mut output)?;
//! ```

use std::{
    fmt,
    io::{self, Cursor, Read, Write},
    ops::Deref,
};

use blowfish::{cipher::BlockDecryptMut, cipher::KeyIvInit, Blowfish};
use cbc::cipher::block_padding::NoPadding;
use veil::Redact;

use crate::{
    error::{Error, Result},
    track::TrackId,
    util::md5_hex,
};

/// Length of decryption keys in bytes.
pub const KEY_LENGTH: usize = 16;

/// Size of each chunk in bytes (2KB).
///
/// Must equal the chunk size the service encrypted with. Any other value
/// desynchronizes after the first chunk.
pub const CHUNK_SIZE: usize = 2 * 1024;

/// Number of chunks in a stripe (3).
///
/// The first chunk of every stripe is encrypted.
const STRIPE_COUNT: u64 = 3;

/// Fixed IV for CBC decryption.
const CBC_BF_IV: &[u8; 8] = b"\x00\x01\x02\x03\x04\x05\x06\x07";

/// Application secret mixed into every track key.
const TRACK_KEY_SALT: &RawKey = b"g4el58wc0zvf9na1";

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Track decryption key, as derived by [`key_for_track_id`].
///
/// Redacted in `Debug` output.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Redact)]
pub struct Key(#[redact] RawKey);

impl Deref for Key {
    type Target = RawKey;

    /// Provides read-only access to the raw key bytes.
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Calculates the track-specific decryption key.
///
/// The key is derived from:
/// 1. the lowercase hex MD5 digest of the decimal track ID, as text
/// 2. XOR of the first and second half of that text
/// 3. XOR with the application secret
///
/// The 32 ASCII characters of the hex digest are the working bytes, not
/// the 16 raw digest bytes.
#[must_use]
pub fn key_for_track_id(track_id: TrackId) -> Key {
    let track_hash = md5_hex(track_id.to_string());
    let track_hash = track_hash.as_bytes();

    let mut key = RawKey::default();
    for i in 0..KEY_LENGTH {
        key[i] = track_hash[i] ^ track_hash[i + KEY_LENGTH] ^ TRACK_KEY_SALT[i];
    }
    Key(key)
}

/// Whether the chunk at `index` with `len` bytes is encrypted.
///
/// Only full chunks at the start of a stripe are encrypted. A short chunk
/// is never encrypted, even at index 0.
#[must_use]
pub fn is_encrypted_chunk(index: u64, len: usize) -> bool {
    index % STRIPE_COUNT == 0 && len == CHUNK_SIZE
}

/// A positional chunk of the stream.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Chunk {
    /// Position of the chunk in the stream, starting at 0.
    pub index: u64,

    /// Chunk contents: `CHUNK_SIZE` bytes, or fewer for the final chunk.
    pub data: Vec<u8>,
}

impl Chunk {
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        is_encrypted_chunk(self.index, self.data.len())
    }

    /// Decrypts the chunk in place if it is encrypted.
    ///
    /// # Errors
    ///
    /// Returns `io::ErrorKind::InvalidInput` if the cipher cannot be
    /// initialized, or `io::ErrorKind::InvalidData` if the chunk is not a
    /// whole number of cipher blocks.
    pub fn decrypt(&mut self, key: &Key) -> io::Result<()> {
        if !self.is_encrypted() {
            return Ok(());
        }

        // The state of the cipher is reset on each chunk.
        let cipher = cbc::Decryptor::<Blowfish>::new_from_slices(&**key, CBC_BF_IV)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // The chunk is a multiple of the block size, so no padding is
        // necessary.
        cipher
            .decrypt_padded_mut::<NoPadding>(&mut self.data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(())
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

/// Cuts a reader into positional chunks.
///
/// Fills every chunk completely unless the reader reaches end-of-stream,
/// so chunk boundaries do not depend on how the reader splits its reads.
/// Iteration ends after the first short chunk or the first error. An
/// error is yielded exactly once; callers must not mistake the `None`
/// that follows it for end-of-stream.
pub struct Chunks<R> {
    reader: R,
    index: u64,
    done: bool,
}

impl<R: Read> Chunks<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            index: 0,
            done: false,
        }
    }

    /// Index of the next chunk to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.index
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut data = vec![0; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            match self.reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if filled < CHUNK_SIZE {
            self.done = true;
            if filled == 0 {
                return None;
            }
            data.truncate(filled);
        }

        let chunk = Chunk {
            index: self.index,
            data,
        };
        self.index += 1;

        Some(Ok(chunk))
    }
}

/// Why a [`Decrypt`] stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Failure {
    /// Reading the encrypted source failed while filling this chunk.
    Stream { chunk: u64, kind: io::ErrorKind },

    /// This chunk was read but could not be decrypted.
    Cipher { chunk: u64, kind: io::ErrorKind },
}

impl Failure {
    /// Error returned by every read after the failure.
    fn to_io_error(self) -> io::Error {
        match self {
            Self::Stream { chunk, kind } => {
                io::Error::new(kind, format!("stream failed earlier in chunk {chunk}"))
            }
            Self::Cipher { chunk, kind } => {
                io::Error::new(kind, format!("chunk {chunk} could not be decrypted"))
            }
        }
    }
}

/// Streaming decryptor for protected tracks.
///
/// Wraps the encrypted stream and implements `Read` for the decrypted
/// stream. Holds at most one chunk of decrypted data.
///
/// `Ok(0)` is only returned at the real end of the stream. After a failure
/// every read returns an error of the same kind.
pub struct Decrypt<R> {
    /// Source of encrypted chunks.
    chunks: Chunks<R>,

    /// Track-specific decryption key.
    key: Key,

    /// Decrypted data of the current chunk. Position tracks how much has
    /// been read.
    buffer: Cursor<Vec<u8>>,

    /// Set by the first failed read.
    failure: Option<Failure>,
}

impl<R: Read> Decrypt<R> {
    /// Creates a new decryptor over `reader`.
    ///
    /// The reader must be at the very start of the encrypted stream.
    pub fn new(reader: R, key: &Key) -> Self {
        Self {
            chunks: Chunks::new(reader),
            key: *key,
            buffer: Cursor::new(Vec::new()),
            failure: None,
        }
    }

    /// Calculates number of bytes in the buffer that have not been read yet.
    #[must_use]
    fn bytes_on_buffer(&self) -> u64 {
        let len = self.buffer.get_ref().len() as u64;
        len.saturating_sub(self.buffer.position())
    }

    /// Loads and decrypts the next chunk into the buffer.
    ///
    /// Returns `false` at the end of the stream.
    fn refill(&mut self) -> io::Result<bool> {
        let mut chunk = match self.chunks.next() {
            None => return Ok(false),
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                self.failure = Some(Failure::Stream {
                    chunk: self.chunks.position(),
                    kind: e.kind(),
                });
                return Err(e);
            }
        };

        if let Err(e) = chunk.decrypt(&self.key) {
            self.failure = Some(Failure::Cipher {
                chunk: chunk.index,
                kind: e.kind(),
            });
            return Err(e);
        }

        self.buffer = Cursor::new(chunk.data);
        Ok(true)
    }

    /// Converts a failed read into a crate error, naming the chunk and
    /// the bytes that were already delivered.
    fn read_error(&self, e: io::Error, written: u64) -> Error {
        match self.failure {
            Some(Failure::Stream { chunk, .. }) => Error::data_loss(format!(
                "stream failed in chunk {chunk} after {written} bytes: {e}"
            )),
            Some(Failure::Cipher { chunk, .. }) => Error::internal(format!("chunk {chunk}: {e}")),
            None => e.into(),
        }
    }
}

impl<R: Read> Read for Decrypt<R> {
    /// Reads decrypted data from the stream.
    ///
    /// 1. Fills the buffer with the next chunk when it is exhausted
    /// 2. Decrypts that chunk if it is encrypted
    /// 3. Returns as many bytes as fit in `buf` from the buffer
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(failure) = self.failure {
            return Err(failure.to_io_error());
        }

        if buf.is_empty() {
            return Ok(0);
        }

        if self.bytes_on_buffer() == 0 && !self.refill()? {
            return Ok(0);
        }

        self.buffer.read(buf)
    }
}

/// Decrypts a whole stream from `reader` into `writer`.
///
/// Chunks are processed strictly in stream order. Returns the number of
/// bytes written.
///
/// # Errors
///
/// * `DataLoss` if reading fails in the middle of the stream
/// * `Internal` if the cipher cannot be set up
/// * the mapped kind of the I/O error if writing fails
///
/// On error the writer holds a partial, corrupt output that must be
/// discarded.
pub fn decrypt<R, W>(reader: R, key: &Key, mut writer: W) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let mut decryptor = Decrypt::new(reader, key);
    let mut buf = vec![0; CHUNK_SIZE];
    let mut written = 0;

    loop {
        let n = match decryptor.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(decryptor.read_error(e, written)),
        };

        writer.write_all(&buf[..n])?;
        written += n as u64;
    }

    writer.flush()?;
    trace!(
        "decrypted {} chunks, {written} bytes",
        decryptor.chunks.position()
    );

    Ok(written)
}
