//! Item encryption under the master key
//!
//! Plaintext record (before AEAD):
//! ```text
//! [1 byte version][1 byte id len][id][1 byte type len][type][8 byte created_at BE][2 byte data len BE][data]
//! ```
//! Envelope: `[24-byte nonce][ciphertext + 16-byte tag]`, capped at
//! [`MAX_ENCRYPTED_LEN`].

use kv_core::types::{MAX_DATA_LEN, MAX_ENCRYPTED_LEN, MAX_ID_LEN, MAX_TYPE_LEN};
use kv_core::{Item, VaultError, VaultResult};
use zeroize::Zeroize;

use crate::envelope::{self, OVERHEAD};
use crate::keys::MasterKey;

const RECORD_VERSION: u8 = 1;

fn validate(item: &Item) -> VaultResult<()> {
    if item.id.is_empty() {
        return Err(VaultError::InvalidItem("empty id".into()));
    }
    if item.id.len() > MAX_ID_LEN {
        return Err(VaultError::ItemTooLarge(format!(
            "id is {} bytes (max {MAX_ID_LEN})",
            item.id.len()
        )));
    }
    if item.kind.len() > MAX_TYPE_LEN {
        return Err(VaultError::ItemTooLarge(format!(
            "type is {} bytes (max {MAX_TYPE_LEN})",
            item.kind.len()
        )));
    }
    if item.data.len() > MAX_DATA_LEN {
        return Err(VaultError::ItemTooLarge(format!(
            "data is {} bytes (max {MAX_DATA_LEN})",
            item.data.len()
        )));
    }
    Ok(())
}

fn encode(item: &Item) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(1 + 1 + item.id.len() + 1 + item.kind.len() + 8 + 2 + item.data.len());
    out.push(RECORD_VERSION);
    out.push(item.id.len() as u8);
    out.extend_from_slice(item.id.as_bytes());
    out.push(item.kind.len() as u8);
    out.extend_from_slice(item.kind.as_bytes());
    out.extend_from_slice(&item.created_at.to_be_bytes());
    out.extend_from_slice(&(item.data.len() as u16).to_be_bytes());
    out.extend_from_slice(&item.data);
    out
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.buf.len() < n {
            return None;
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn string(&mut self) -> Option<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

fn decode(buf: &[u8]) -> Option<Item> {
    let mut r = Reader { buf };
    if r.u8()? != RECORD_VERSION {
        return None;
    }
    let id = r.string()?;
    let kind = r.string()?;
    let created_at = u64::from_be_bytes(r.take(8)?.try_into().ok()?);
    let len = u16::from_be_bytes(r.take(2)?.try_into().ok()?) as usize;
    let data = r.take(len)?.to_vec();
    if !r.buf.is_empty() {
        return None;
    }
    Some(Item {
        id,
        data,
        kind,
        created_at,
    })
}

/// Encrypt an item under the master key.
///
/// Fails with `ItemTooLarge` when any field exceeds its limit or the
/// envelope would exceed [`MAX_ENCRYPTED_LEN`], and with `InvalidAuth` when
/// there is no master key.
pub fn encrypt_item(item: &Item, mk: Option<&MasterKey>) -> VaultResult<Vec<u8>> {
    let mk = mk.ok_or(VaultError::InvalidAuth)?;
    validate(item)?;

    let mut plaintext = encode(item);
    let envelope_len = plaintext.len() + OVERHEAD;
    if envelope_len > MAX_ENCRYPTED_LEN {
        plaintext.zeroize();
        return Err(VaultError::ItemTooLarge(format!(
            "encrypted item is {envelope_len} bytes (max {MAX_ENCRYPTED_LEN})"
        )));
    }

    let sealed = envelope::seal(mk.as_bytes(), &plaintext);
    plaintext.zeroize();
    sealed.map_err(|e| VaultError::Crypto(format!("item encryption failed: {e}")))
}

/// Decrypt an item envelope produced by [`encrypt_item`].
///
/// Fails with `InvalidAuth` when there is no master key, the envelope is
/// shorter than nonce + tag, or the tag does not verify.
pub fn decrypt_item(bytes: &[u8], mk: Option<&MasterKey>) -> VaultResult<Item> {
    let mk = mk.ok_or(VaultError::InvalidAuth)?;
    let mut plaintext = envelope::open(mk.as_bytes(), bytes).map_err(|_| VaultError::InvalidAuth)?;

    let item = decode(&plaintext);
    plaintext.zeroize();
    item.ok_or_else(|| VaultError::InvalidItem("malformed item record".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_master_key;
    use proptest::prelude::*;

    #[test]
    fn test_roundtrip() {
        let mk = generate_master_key();
        let item = Item::new("github", b"hunter2".to_vec(), "password");
        let enc = encrypt_item(&item, Some(&mk)).unwrap();
        assert_eq!(decrypt_item(&enc, Some(&mk)).unwrap(), item);
    }

    #[test]
    fn test_max_item_fits_cap() {
        let mk = generate_master_key();
        let item = Item::new(
            "i".repeat(MAX_ID_LEN),
            vec![0xAB; MAX_DATA_LEN],
            "t".repeat(MAX_TYPE_LEN),
        );
        let enc = encrypt_item(&item, Some(&mk)).unwrap();
        assert!(enc.len() <= MAX_ENCRYPTED_LEN);
    }

    #[test]
    fn test_size_limits() {
        let mk = generate_master_key();
        let cases = [
            Item::new("i".repeat(MAX_ID_LEN + 1), b"x".to_vec(), ""),
            Item::new("id", b"x".to_vec(), "t".repeat(MAX_TYPE_LEN + 1)),
            Item::new("id", vec![0; MAX_DATA_LEN + 1], ""),
        ];
        for item in &cases {
            let err = encrypt_item(item, Some(&mk)).unwrap_err();
            assert!(matches!(err, VaultError::ItemTooLarge(_)), "{err}");
        }
    }

    #[test]
    fn test_empty_id_invalid() {
        let mk = generate_master_key();
        let err = encrypt_item(&Item::new("", b"x".to_vec(), ""), Some(&mk)).unwrap_err();
        assert!(matches!(err, VaultError::InvalidItem(_)));
    }

    #[test]
    fn test_no_master_key() {
        let item = Item::new("a", b"x".to_vec(), "");
        assert!(matches!(
            encrypt_item(&item, None),
            Err(VaultError::InvalidAuth)
        ));
        assert!(matches!(
            decrypt_item(&[0u8; 64], None),
            Err(VaultError::InvalidAuth)
        ));
    }

    #[test]
    fn test_wrong_key_and_short_input() {
        let mk = generate_master_key();
        let other = generate_master_key();
        let enc = encrypt_item(&Item::new("a", b"x".to_vec(), ""), Some(&mk)).unwrap();
        assert!(matches!(
            decrypt_item(&enc, Some(&other)),
            Err(VaultError::InvalidAuth)
        ));
        assert!(matches!(
            decrypt_item(&enc[..OVERHEAD - 1], Some(&mk)),
            Err(VaultError::InvalidAuth)
        ));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let mk = generate_master_key();
        let mut enc = encrypt_item(&Item::new("a", b"secret".to_vec(), ""), Some(&mk)).unwrap();
        let last = enc.len() - 1;
        enc[last] ^= 0x01;
        assert!(matches!(
            decrypt_item(&enc, Some(&mk)),
            Err(VaultError::InvalidAuth)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip(
            id in "[a-zA-Z0-9/_.-]{1,254}",
            kind in "[a-z-]{0,32}",
            data in proptest::collection::vec(any::<u8>(), 0..=MAX_DATA_LEN),
            created_at in any::<u64>(),
        ) {
            let mk = generate_master_key();
            let item = Item { id, data, kind, created_at };
            let enc = encrypt_item(&item, Some(&mk)).unwrap();
            prop_assert!(enc.len() <= MAX_ENCRYPTED_LEN);
            prop_assert_eq!(decrypt_item(&enc, Some(&mk)).unwrap(), item);
        }
    }
}
