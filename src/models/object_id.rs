use chrono::Utc;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ObjectIdError {
    #[error("id must be 24 hexadecimal characters, got {0:?}")]
    InvalidLength(String),
    #[error("id is not valid hexadecimal: {0:?}")]
    InvalidHex(String),
}

/// 12-byte document id rendered as 24 lowercase hex characters.
/// The first four bytes hold the creation time in Unix seconds (big-endian),
/// so byte order is also creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let secs = Utc::now().timestamp() as u32;
        let entropy = Uuid::new_v4().into_bytes();
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&entropy[..8]);
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    pub fn bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn parse_str(s: &str) -> Result<Self, ObjectIdError> {
        if s.len() != 24 {
            return Err(ObjectIdError::InvalidLength(s.to_string()));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ObjectIdError::InvalidHex(s.to_string()))?;
        Ok(ObjectId(bytes))
    }

    /// Accepts arbitrary caller-chosen article ids.
    /// Anything that is not already 24 characters long is hex-encoded byte by byte,
    /// then left-padded with zeros or truncated to 24 characters.
    pub fn from_loose(input: &str) -> Result<Self, ObjectIdError> {
        if input.len() == 24 {
            return Self::parse_str(input);
        }
        let mut encoded = hex::encode(input.as_bytes());
        if encoded.len() < 24 {
            encoded = format!("{}{}", "0".repeat(24 - encoded.len()), encoded);
        }
        encoded.truncate(24);
        Self::parse_str(&encoded)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_hex() {
        let id = ObjectId::new();
        let parsed = ObjectId::parse_str(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(ObjectId::parse_str("abc"), Err(ObjectIdError::InvalidLength(_))));
        assert!(matches!(
            ObjectId::parse_str("zzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(ObjectIdError::InvalidHex(_))
        ));
    }

    #[test]
    fn loose_ids_are_padded_or_truncated() {
        // "ab" -> "6162", padded on the left
        let short = ObjectId::from_loose("ab").unwrap();
        assert_eq!(short.to_hex(), "000000000000000000006162");

        let long = ObjectId::from_loose("this-is-a-long-article-slug").unwrap();
        assert_eq!(long.to_hex().len(), 24);
        assert_eq!(long.to_hex(), &hex::encode("this-is-a-long-article-slug")[..24]);

        let exact = ObjectId::from_loose("0123456789abcdef01234567").unwrap();
        assert_eq!(exact.to_hex(), "0123456789abcdef01234567");
    }

    #[test]
    fn newer_ids_sort_after_older_ones() {
        let older = ObjectId::from_bytes([0, 0, 0, 1, 9, 9, 9, 9, 9, 9, 9, 9]);
        let newer = ObjectId::from_bytes([0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(older < newer);
    }
}
