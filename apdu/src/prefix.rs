// Copyright (c) 2022-2023 IOV SAS

//! Bech32 human-readable-part (address prefix) encoding
//!
//! ## Encoding:
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   HRP_LEN     |                                               |
//! +-+-+-+-+-+-+-+-+                                               +
//! /                     HRP (3..=83 ascii bytes)                  /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use core::fmt;
use core::str::FromStr;

use encdec::{DecodeOwned, Encode};

use crate::ApduError;

/// Minimum HRP length
pub const HRP_MIN_LEN: usize = 3;

/// Maximum HRP length (bech32 limit)
pub const HRP_MAX_LEN: usize = 83;

/// Validated bech32 human-readable part
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Hrp(String);

impl Hrp {
    /// Create a new HRP, checking length and character set
    pub fn new(s: &str) -> Result<Self, ApduError> {
        if s.len() < HRP_MIN_LEN || s.len() > HRP_MAX_LEN {
            return Err(ApduError::PrefixLength(s.len()));
        }

        if !s.is_ascii() {
            return Err(ApduError::PrefixNotAscii);
        }

        Ok(Self(s.to_string()))
    }

    /// Fetch prefix string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Hrp {
    type Err = ApduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Hrp {
    type Error = ApduError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Hrp> for String {
    fn from(h: Hrp) -> Self {
        h.0
    }
}

impl AsRef<str> for Hrp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hrp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Encode for Hrp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + self.0.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let d = self.0.as_bytes();

        if buff.len() < d.len() + 1 {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = d.len() as u8;
        buff[1..][..d.len()].copy_from_slice(d);

        Ok(d.len() + 1)
    }
}

impl DecodeOwned for Hrp {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        let n = buff[0] as usize;
        if buff.len() < n + 1 {
            return Err(ApduError::InvalidLength);
        }

        let s = core::str::from_utf8(&buff[1..][..n]).map_err(|_| ApduError::Utf8)?;

        Ok((Self::new(s)?, n + 1))
    }
}
