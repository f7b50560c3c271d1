//! `[24-byte nonce][ciphertext + 16-byte tag]` framing shared by key wrapping
//! and item encryption.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Why an envelope would not open. Deliberately coarse: a wrong key and a
/// tampered blob look the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    Truncated,
    Rejected,
}

/// Encrypt under a fresh random nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, chacha20poly1305::Error> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let body = XChaCha20Poly1305::new(key.into()).encrypt(XNonce::from_slice(&nonce), plaintext)?;
    let mut sealed = nonce.to_vec();
    sealed.extend(body);
    Ok(sealed)
}

/// Decrypt an envelope from [`seal`]. The caller owns (and should zeroize)
/// the returned plaintext.
pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>, OpenError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(OpenError::Truncated);
    }
    let (nonce, body) = sealed.split_at(NONCE_SIZE);
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| OpenError::Rejected)
}

/// Bytes an envelope adds on top of its plaintext.
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = [3u8; KEY_SIZE];
        let a = seal(&key, b"same").unwrap();
        let b = seal(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_eq!(a.len(), 4 + OVERHEAD);
        assert_eq!(open(&key, &a).unwrap(), b"same");
    }

    #[test]
    fn test_open_failures() {
        let key = [3u8; KEY_SIZE];
        let mut sealed = seal(&key, b"payload").unwrap();
        assert_eq!(open(&[4u8; KEY_SIZE], &sealed), Err(OpenError::Rejected));
        assert_eq!(open(&key, &sealed[..OVERHEAD - 1]), Err(OpenError::Truncated));

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(open(&key, &sealed), Err(OpenError::Rejected));
    }
}
