//! Downloading and decrypting tracks to disk.
//!
//! A download streams the CDN response through the chunk decryptor
//! straight into `<name>.part`, and renames that to `<name>` when the
//! stream completed. The file is never held in memory as a whole.
//!
//! Decryption cannot resume in the middle of a stream. Any failure, or a
//! cancelled download, removes the partial file.
//!
//! # Example
//!
//! ```rust
//! use deezerdl::download;
//!
//! let path = download::track(&mut gateway, track_id, Format::FLAC, "music").await?;
//! ```

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures_util::TryStreamExt;
use reqwest::Url;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::{
    decrypt::{self, Key},
    error::{Error, Result},
    gateway::Gateway,
    http::Client as HttpClient,
    protocol::media::Format,
    track::{escape_filename, Track, TrackId},
    url_token,
};

/// Suffix of files that are still being written.
const PART_EXTENSION: &str = "part";

/// Bytes in a mebibyte.
const MIB: u64 = 1024 * 1024;

/// Writer that counts bytes and logs progress every MiB.
///
/// Writes fail once `aborted` is set.
pub struct Progress<W> {
    inner: W,
    label: String,
    written: u64,
    aborted: Arc<AtomicBool>,
}

impl<W: Write> Progress<W> {
    pub fn new(inner: W, label: impl Into<String>, aborted: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            label: label.into(),
            written: 0,
            aborted,
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for Progress<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.aborted.load(Ordering::Relaxed) {
            return Err(io::Error::other("download aborted"));
        }

        let n = self.inner.write(buf)?;

        let before = self.written / MIB;
        self.written += n as u64;
        let after = self.written / MIB;
        if after > before {
            debug!("{}: {after} MiB", self.label);
        }

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Removes the partial file and aborts the writer when dropped, unless
/// the download was committed.
struct PartFile {
    path: PathBuf,
    aborted: Arc<AtomicBool>,
    committed: bool,
}

impl PartFile {
    /// Moves the partial file to `path`.
    async fn commit(mut self, path: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, path).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        self.aborted.store(true, Ordering::Relaxed);
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove {}: {e}", self.path.display()),
        }
    }
}

/// Path of the partial file for `path`: `<path>.part`.
#[must_use]
pub fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(".");
    part.push(PART_EXTENSION);
    PathBuf::from(part)
}

/// Formats a byte count for humans, e.g. `9.3 MiB`.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mib = bytes as f64 / MIB as f64;
    if bytes >= MIB {
        format!("{mib:.1} MiB")
    } else {
        format!("{:.1} KiB", mib * 1024.0)
    }
}

/// Downloads `track` in `format` and writes the decrypted file to `path`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// * `FailedPrecondition` if the track has no content hash
/// * `InvalidArgument` if the content hash is malformed
/// * an error mapped from the HTTP status if the CDN refuses the download
/// * `DataLoss` if the stream breaks off
/// * I/O errors from writing the file
pub async fn download(
    gateway: &Gateway,
    track: &Track,
    format: Format,
    path: &Path,
) -> Result<u64> {
    let url = url_token::download_url(track, format)?;
    let key = decrypt::key_for_track_id(track.id());

    let written = save(gateway.http_client(), url, key, &track.to_string(), path).await?;
    info!("{track}: saved {} to {}", human_size(written), path.display());

    Ok(written)
}

/// Streams `url` through the decryptor into `path`.
///
/// Nothing exists at `path` until the whole stream was decrypted. On any
/// failure, or when the returned future is dropped, the partial file is
/// removed.
async fn save(
    http_client: &HttpClient,
    url: Url,
    key: Key,
    label: &str,
    path: &Path,
) -> Result<u64> {
    let response = http_client.download(url).await?;
    if let Some(len) = response.content_length() {
        debug!("{label}: {} to download", human_size(len));
    }

    let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
    // The bridge must be created within the runtime.
    let reader = SyncIoBridge::new(StreamReader::new(stream));

    let guard = PartFile {
        path: part_path(path),
        aborted: Arc::new(AtomicBool::new(false)),
        committed: false,
    };

    let part = guard.path.clone();
    let aborted = Arc::clone(&guard.aborted);
    let label = label.to_owned();
    let written = tokio::task::spawn_blocking(move || {
        if aborted.load(Ordering::Relaxed) {
            return Err(Error::cancelled(format!("{label}: download aborted")));
        }

        let file = File::create(&part)?;
        let mut writer = Progress::new(BufWriter::new(file), label, aborted);
        decrypt::decrypt(reader, &key, &mut writer)
    })
    .await??;

    guard.commit(path).await?;
    Ok(written)
}

/// Resolves and downloads a single track into `dir`.
///
/// Returns the path of the written file.
///
/// # Errors
///
/// See [`Gateway::track`] and [`download`].
pub async fn track(
    gateway: &mut Gateway,
    track_id: TrackId,
    format: Format,
    dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let track = gateway.track(track_id).await?;
    info!("downloading {track} as {format}");

    let path = dir.as_ref().join(track.file_name(format));
    download(gateway, &track, format, &path).await?;

    Ok(path)
}

/// Downloads all tracks of an album into a directory named after it.
///
/// Tracks are numbered in album order, e.g. `01 - Title.mp3`. Stops at the
/// first track that fails.
///
/// # Errors
///
/// * `NotFound` if there is no album with this ID
/// * `InvalidArgument` if the album has no tracks
/// * any error of [`track`]
pub async fn album(
    gateway: &mut Gateway,
    album_id: u64,
    format: Format,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let album = gateway.album(album_id).await?;
    let track_ids = album.track_ids();
    if track_ids.is_empty() {
        return Err(Error::invalid_argument(format!(
            "album {album_id} has no tracks"
        )));
    }

    let dir = dir.as_ref().join(escape_filename(&album.title));
    tokio::fs::create_dir_all(&dir).await?;
    info!(
        "downloading album \"{}\" ({} tracks) to {}",
        album.title,
        track_ids.len(),
        dir.display()
    );

    let mut paths = Vec::with_capacity(track_ids.len());
    for (i, track_id) in track_ids.into_iter().enumerate() {
        let track = gateway.track(track_id).await?;
        let name = format!("{:02} - {}", i + 1, track.file_name(format));
        let path = dir.join(name);

        download(gateway, &track, format, &path).await?;
        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, Settings},
        error::ErrorKind,
        http::testing::{response, serve, truncated},
    };

    #[test]
    fn part_paths() {
        assert_eq!(
            part_path(Path::new("music/One More Time.flac")),
            PathBuf::from("music/One More Time.flac.part")
        );
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(512), "0.5 KiB");
        assert_eq!(human_size(MIB), "1.0 MiB");
        assert_eq!(human_size(9 * MIB + MIB / 2), "9.5 MiB");
    }

    fn progress<W: Write>(inner: W) -> Progress<W> {
        Progress::new(inner, "test", Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn progress_counts_bytes() {
        let mut progress = progress(Vec::new());
        progress.write_all(&[0; 1000]).unwrap();
        progress.write_all(&vec![1; 2 * MIB as usize]).unwrap();

        assert_eq!(progress.written(), 1000 + 2 * MIB);
        assert_eq!(progress.inner.len(), 1000 + 2 * MIB as usize);
    }

    #[test]
    fn aborted_progress_fails() {
        let aborted = Arc::new(AtomicBool::new(false));
        let mut progress = Progress::new(Vec::new(), "test", Arc::clone(&aborted));
        progress.write_all(b"abc").unwrap();

        aborted.store(true, Ordering::Relaxed);
        assert!(progress.write_all(b"def").is_err());
        assert_eq!(progress.written(), 3);
    }

    #[tokio::test]
    async fn committed_part_file_is_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        let part = part_path(&path);
        std::fs::write(&part, b"data").unwrap();

        let guard = PartFile {
            path: part.clone(),
            aborted: Arc::new(AtomicBool::new(false)),
            committed: false,
        };
        guard.commit(&path).await.unwrap();

        assert!(!part.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn dropped_part_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let part = part_path(&dir.path().join("track.mp3"));
        std::fs::write(&part, b"partial").unwrap();

        let aborted = Arc::new(AtomicBool::new(false));
        drop(PartFile {
            path: part.clone(),
            aborted: Arc::clone(&aborted),
            committed: false,
        });

        assert!(!part.exists());
        assert!(aborted.load(Ordering::Relaxed));
    }

    #[test]
    fn decrypts_into_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = part_path(&dir.path().join("track.flac"));

        let track_id = TrackId::try_from(3_135_553).unwrap();
        let key = decrypt::key_for_track_id(track_id);
        let data = vec![7; decrypt::CHUNK_SIZE + 10];

        let file = File::create(&part).unwrap();
        let mut writer = progress(BufWriter::new(file));
        let written = decrypt::decrypt(data.as_slice(), &key, &mut writer).unwrap();
        drop(writer);

        let output = std::fs::read(&part).unwrap();
        assert_eq!(written, output.len() as u64);
        assert_ne!(output[..decrypt::CHUNK_SIZE], data[..decrypt::CHUNK_SIZE]);
        assert_eq!(output[decrypt::CHUNK_SIZE..], data[decrypt::CHUNK_SIZE..]);
    }

    fn key() -> Key {
        decrypt::key_for_track_id(TrackId::try_from(3_135_553).unwrap())
    }

    fn http_client() -> HttpClient {
        let config = Config::new(Settings::default()).unwrap();
        HttpClient::new(&config, reqwest::cookie::Jar::default()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saves_decrypted_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");

        // Shorter than a chunk, so stored as-is.
        let body = vec![9; 100];
        let url = serve(vec![response("200 OK", &body)]).await;

        let written = save(&http_client(), url, key(), "test", &path).await.unwrap();

        assert_eq!(written, 100);
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!part_path(&path).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_status_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        let url = serve(vec![response("404 Not Found", b"")]).await;

        let err = save(&http_client(), url, key(), "test", &path)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn broken_stream_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.flac");

        // Two full chunks arrive, then the connection drops.
        let body = vec![7; 2 * decrypt::CHUNK_SIZE];
        let url = serve(vec![truncated(10 * decrypt::CHUNK_SIZE, &body)]).await;

        let err = save(&http_client(), url, key(), "test", &path)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::DataLoss);
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
