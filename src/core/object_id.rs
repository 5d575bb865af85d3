use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Length of the hex rendering of an [`ObjectId`].
pub const OBJECT_ID_HEX_LEN: usize = 24;

lazy_static! {
    // 5 random bytes per process, as in the store's own id layout.
    static ref PROCESS_SALT: [u8; 5] = {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
    };
    static ref COUNTER: AtomicU32 = {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        AtomicU32::new(u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]))
    };
}

/// Native primary key of the document store.
///
/// 12 bytes: a 4-byte big-endian unix timestamp, 5 bytes of per-process salt and a
/// 3-byte big-endian counter. Rendered externally as 24 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_SALT);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parse a 24-character hex string.
    pub fn parse_str(s: &str) -> Option<Self> {
        if s.len() != OBJECT_ID_HEX_LEN {
            return None;
        }
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; 12] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn is_valid(s: &str) -> bool {
        Self::parse_str(s).is_some()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Seconds since the epoch encoded in the id.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
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

impl FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| format!("'{s}' is not a valid object id"))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
