//! Digest and block cipher helpers shared by key and URL derivation.

use aes::{
    cipher::{block_padding::NoPadding, BlockEncryptMut, KeyInit},
    Aes128,
};
use md5::{Digest, Md5};

use crate::error::{Error, Result};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

type Aes128EcbEnc = ecb::Encryptor<Aes128>;

/// Computes the MD5 digest of `data` as a lowercase hexadecimal string.
///
/// Both key and URL derivation work on the 32 ASCII characters of this
/// string, not on the 16 raw digest bytes.
///
/// # Examples
///
/// ```rust
/// assert_eq!(md5_hex(b"3135553").len(), 32);
/// ```
#[must_use]
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(data))
}

/// Encrypts `data` with AES-128 in ECB mode.
///
/// The input is padded with `0x00` up to the next multiple of the block
/// size. No padding block is added when the input is already aligned, and
/// no length marker is stored, so the padding is not reversible.
///
/// Blocks are encrypted independently: equal plaintext blocks produce
/// equal ciphertext blocks wherever they occur.
///
/// # Errors
///
/// Returns `Error::Internal` if the padded buffer is not block aligned,
/// which cannot happen for buffers padded here.
pub fn encrypt_ecb(key: &[u8; AES_BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    let padded_len = data.len().next_multiple_of(AES_BLOCK_SIZE);
    let mut buffer = Vec::with_capacity(padded_len);
    buffer.extend_from_slice(data);
    buffer.resize(padded_len, 0);

    Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
        .map_err(|_| Error::internal("ecb input is not block aligned"))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn md5_hex_is_lowercase_text() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");

        let digest = md5_hex("3135553");
        assert_eq!(digest.len(), 32);
        assert!(digest
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn ecb_known_vector() {
        let ciphertext = encrypt_ecb(b"aaaaaaaaaaaaaaaa", &[b'A'; 32]).unwrap();
        assert_eq!(
            ciphertext,
            hex!(
                "a2a16884df3b2e37d863dd68ccf08e1c"
                "a2a16884df3b2e37d863dd68ccf08e1c"
            )
        );
    }

    #[test]
    fn ecb_pads_to_next_block_only() {
        let key = b"jo6aey6haid2Teih";
        for (len, expected) in [(0, 0), (1, 16), (15, 16), (16, 16), (17, 32), (63, 64)] {
            let data = vec![0x5a; len];
            assert_eq!(encrypt_ecb(key, &data).unwrap().len(), expected, "len {len}");
        }
    }

    #[test]
    fn ecb_padding_is_zero_bytes() {
        let key = b"jo6aey6haid2Teih";
        let short = encrypt_ecb(key, b"abc").unwrap();
        let explicit = encrypt_ecb(key, b"abc\0\0\0\0\0\0\0\0\0\0\0\0\0").unwrap();
        assert_eq!(short, explicit);
    }

    #[test]
    fn ecb_blocks_are_not_chained() {
        let key = b"jo6aey6haid2Teih";
        let block = *b"0123456789abcdef";

        let mut data = Vec::new();
        data.extend_from_slice(&block);
        data.extend_from_slice(b"something else!!");
        data.extend_from_slice(&block);

        let ciphertext = encrypt_ecb(key, &data).unwrap();
        assert_eq!(ciphertext[0..16], ciphertext[32..48]);
        assert_ne!(ciphertext[0..16], ciphertext[16..32]);
    }
}
