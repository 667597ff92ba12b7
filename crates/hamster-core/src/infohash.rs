//! Content identifiers circulating on the DHT.
//!
//! A torrent is named by a v1 (SHA-1, 20 bytes) identifier, a v2
//! (SHA-256, 32 bytes) identifier, or both for hybrid torrents. Equality
//! is component-wise: two pairs match only when each side is either absent
//! on both or present and equal on both.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A peer on the overlay network, keyed by address and port.
pub type Endpoint = SocketAddr;

pub const V1_LEN: usize = 20;
pub const V2_LEN: usize = 32;

/// Identifier pair for one torrent. At least one component is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash {
    v1: Option<[u8; V1_LEN]>,
    v2: Option<[u8; V2_LEN]>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InfoHashError {
    #[error("info hash has neither a v1 nor a v2 component")]
    Empty,
    #[error("invalid hex in info hash: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("info hash must be {V1_LEN} or {V2_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

impl InfoHash {
    pub fn new(
        v1: Option<[u8; V1_LEN]>,
        v2: Option<[u8; V2_LEN]>,
    ) -> Result<Self, InfoHashError> {
        if v1.is_none() && v2.is_none() {
            return Err(InfoHashError::Empty);
        }
        Ok(Self { v1, v2 })
    }

    pub fn from_v1(v1: [u8; V1_LEN]) -> Self {
        Self { v1: Some(v1), v2: None }
    }

    pub fn from_v2(v2: [u8; V2_LEN]) -> Self {
        Self { v1: None, v2: Some(v2) }
    }

    /// Build from optional hex strings, as stored in the database and
    /// carried on the engine wire.
    pub fn from_hex_parts(v1: Option<&str>, v2: Option<&str>) -> Result<Self, InfoHashError> {
        let v1 = v1.map(decode_fixed::<V1_LEN>).transpose()?;
        let v2 = v2.map(decode_fixed::<V2_LEN>).transpose()?;
        Self::new(v1, v2)
    }

    pub fn v1(&self) -> Option<&[u8; V1_LEN]> {
        self.v1.as_ref()
    }

    pub fn v2(&self) -> Option<&[u8; V2_LEN]> {
        self.v2.as_ref()
    }

    pub fn v1_hex(&self) -> Option<String> {
        self.v1.map(hex::encode)
    }

    pub fn v2_hex(&self) -> Option<String> {
        self.v2.map(hex::encode)
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], InfoHashError> {
    let bytes = hex::decode(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| InfoHashError::InvalidLength(bytes.len()))
}

/// Parses a single hex identifier: 40 characters is v1, 64 is v2.
impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        match bytes.len() {
            V1_LEN => Self::from_hex_parts(Some(s.trim()), None),
            V2_LEN => Self::from_hex_parts(None, Some(s.trim())),
            n => Err(InfoHashError::InvalidLength(n)),
        }
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.v1, self.v2) {
            (Some(v1), Some(v2)) => write!(f, "{}/{}", hex::encode(v1), hex::encode(v2)),
            (Some(v1), None) => f.write_str(&hex::encode(v1)),
            (None, Some(v2)) => f.write_str(&hex::encode(v2)),
            (None, None) => f.write_str("-"),
        }
    }
}
