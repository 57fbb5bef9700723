// Copyright (c) 2022-2023 IOV SAS

//! BIP32 derivation path encoding
//!
//! Paths are `[44', 234', index']`, optionally followed by two zero words
//! for the 5-word dialect.
//!
//! ## Encoding:
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    PURPOSE (44', u32 LE)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   COIN_TYPE (234', u32 LE)                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  ACCOUNT_INDEX (i', u32 LE)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  CHANGE (0, 5-word paths only)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              ADDRESS_INDEX (0, 5-word paths only)             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use core::fmt;
use core::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use encdec::{DecodeOwned, Encode};

use crate::{ApduError, COIN_TYPE, PURPOSE};

/// Hardened derivation offset
pub const HARDENED: u32 = 0x8000_0000;

/// Largest valid account index (`2^31 - 1`)
pub const MAX_ACCOUNT_INDEX: u32 = HARDENED - 1;

/// Harden a derivation index.
///
/// Computed with checked addition so an index already carrying the top bit
/// is rejected instead of silently wrapping.
pub fn harden(index: u32) -> Result<u32, ApduError> {
    HARDENED
        .checked_add(index)
        .ok_or(ApduError::IndexOutOfRange)
}

/// Account index, validated to fit in 31 bits
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct AccountIndex(u32);

impl AccountIndex {
    /// Create a new account index, checking range
    pub fn new(index: u32) -> Result<Self, ApduError> {
        if index > MAX_ACCOUNT_INDEX {
            return Err(ApduError::IndexOutOfRange);
        }
        Ok(Self(index))
    }

    /// Fetch raw (un-hardened) index
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for AccountIndex {
    type Error = ApduError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl TryFrom<i64> for AccountIndex {
    type Error = ApduError;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match u32::try_from(v) {
            Ok(v) => Self::new(v),
            Err(_) => Err(ApduError::IndexOutOfRange),
        }
    }
}

/// Conversion for loosely typed sources (JSON numbers, user input)
impl TryFrom<f64> for AccountIndex {
    type Error = ApduError;

    fn try_from(v: f64) -> Result<Self, Self::Error> {
        if !v.is_finite() || v.fract() != 0.0 {
            return Err(ApduError::IndexNotInteger);
        }

        if v < 0.0 || v > MAX_ACCOUNT_INDEX as f64 {
            return Err(ApduError::IndexOutOfRange);
        }

        Self::new(v as u32)
    }
}

impl From<AccountIndex> for u32 {
    fn from(i: AccountIndex) -> Self {
        i.0
    }
}

impl FromStr for AccountIndex {
    type Err = ApduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(v) = s.parse::<i64>() {
            return Self::try_from(v);
        }

        match s.parse::<f64>() {
            Ok(v) => Self::try_from(v),
            Err(_) => Err(ApduError::IndexNotInteger),
        }
    }
}

impl fmt::Display for AccountIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BIP32 derivation path as sent to the device (3 or 5 words)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bip32Path {
    words: Vec<u32>,
}

impl Bip32Path {
    /// Build a path for the provided account index and path width (3 or 5 words)
    pub fn new(index: AccountIndex, words: usize) -> Result<Self, ApduError> {
        let mut w = vec![harden(PURPOSE)?, harden(COIN_TYPE)?, harden(index.value())?];

        match words {
            3 => (),
            5 => w.extend_from_slice(&[0, 0]),
            _ => return Err(ApduError::InvalidLength),
        }

        Ok(Self { words: w })
    }

    /// Shorthand for 3-word paths
    pub fn short(index: AccountIndex) -> Self {
        Self {
            words: vec![
                HARDENED + PURPOSE,
                HARDENED + COIN_TYPE,
                HARDENED + index.value(),
            ],
        }
    }

    /// Path words (hardened where applicable)
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Account index component of the path
    pub fn account_index(&self) -> AccountIndex {
        AccountIndex(self.words[2] - HARDENED)
    }

    /// Encode path into a new buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; self.words.len() * 4];
        LittleEndian::write_u32_into(&self.words, &mut b);
        b
    }
}

impl Encode for Bip32Path {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.words.len() * 4)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.words.len() * 4;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        LittleEndian::write_u32_into(&self.words, &mut buff[..n]);

        Ok(n)
    }
}

/// Decode a 3 or 5 word path, consuming the whole buffer
impl DecodeOwned for Bip32Path {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let n = match buff.len() {
            12 | 20 => buff.len(),
            _ => return Err(ApduError::InvalidLength),
        };

        let mut words = vec![0u32; n / 4];
        LittleEndian::read_u32_into(buff, &mut words);

        // Purpose and coin type are fixed, account must be hardened
        if words[0] != HARDENED + PURPOSE
            || words[1] != HARDENED + COIN_TYPE
            || words[2] < HARDENED
        {
            return Err(ApduError::InvalidEncoding);
        }

        Ok((Self { words }, n))
    }
}
