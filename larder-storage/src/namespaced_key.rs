//! Store-scoped key encoding for shared LMDB environments.
//!
//! Several stores can persist into one environment. Every key is prefixed
//! with its store id so one store can never read, overwrite or age another
//! store's entries, and a prefix scan visits exactly one store.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Separator byte between the store id and the encoded key.
///
/// `0xFF` never occurs in UTF-8, so neither the store id nor the JSON key
/// can contain it.
const SEPARATOR: u8 = 0xFF;

/// A persisted key scoped to one store.
///
/// # Binary Format
///
/// - store id as UTF-8
/// - separator (0xFF)
/// - the user key as JSON
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedKey {
    store_id: String,
    key_json: Vec<u8>,
}

impl NamespacedKey {
    /// Scope `key` to `store_id`.
    pub fn from_key<K: Serialize>(store_id: &str, key: &K) -> Result<Self, serde_json::Error> {
        Ok(Self {
            store_id: store_id.to_string(),
            key_json: serde_json::to_vec(key)?,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Decode the user key.
    pub fn key<K: DeserializeOwned>(&self) -> Result<K, serde_json::Error> {
        serde_json::from_slice(&self.key_json)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.store_id.len() + 1 + self.key_json.len());
        bytes.extend_from_slice(self.store_id.as_bytes());
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(&self.key_json);
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if the separator is missing or the store id is not
    /// valid UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == SEPARATOR)?;
        let store_id = std::str::from_utf8(&bytes[..split]).ok()?;
        Some(Self {
            store_id: store_id.to_string(),
            key_json: bytes[split + 1..].to_vec(),
        })
    }

    /// Prefix shared by every key of `store_id`.
    pub fn namespace_prefix(store_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(store_id.len() + 1);
        prefix.extend_from_slice(store_id.as_bytes());
        prefix.push(SEPARATOR);
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let key = NamespacedKey::from_key("rates", &"usd").unwrap();
        let encoded = key.encode();

        assert_eq!(&encoded[..5], b"rates");
        assert_eq!(encoded[5], SEPARATOR);
        assert_eq!(&encoded[6..], br#""usd""#);
    }

    #[test]
    fn test_decode_roundtrip_structured_key() {
        let key = NamespacedKey::from_key("accounts", &(42u32, "savings")).unwrap();
        let decoded = NamespacedKey::decode(&key.encode()).unwrap();

        assert_eq!(decoded, key);
        assert_eq!(decoded.store_id(), "accounts");
        assert_eq!(decoded.key::<(u32, String)>().unwrap(), (42, "savings".to_string()));
    }

    #[test]
    fn test_decode_missing_separator() {
        assert!(NamespacedKey::decode(b"no-separator").is_none());
    }

    #[test]
    fn test_decode_invalid_store_id() {
        assert!(NamespacedKey::decode(&[0xC3, 0x28, SEPARATOR, b'1']).is_none());
    }

    #[test]
    fn test_namespace_prefix_does_not_match_longer_store_id() {
        let key = NamespacedKey::from_key("rates-eu", &1u8).unwrap();
        assert!(!key.encode().starts_with(&NamespacedKey::namespace_prefix("rates")));
    }
}
