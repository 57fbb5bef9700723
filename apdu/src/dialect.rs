// Copyright (c) 2022-2023 IOV SAS

//! Protocol dialects for the supported device applications
//!
//! | Dialect             | CLA    | Path    | Prefix | Chunk tagging     | Signature |
//! |---------------------|--------|---------|--------|-------------------|-----------|
//! | `Ed25519Simple`     | `0x22` | 3 words | -      | P1=index, P2=count| raw       |
//! | `Ed25519ChainAware` | `0x22` | 3 words | `iov`  | INIT / ADD / LAST | raw       |
//! | `Secp256k1Bech32`   | `0x55` | 5 words | `star` | INIT / ADD / LAST | DER       |

use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::{
    status::{SW_BAD_KEY_HANDLE, SW_DATA_INVALID, SW_OK},
    AccountIndex, ApduError, Bip32Path, Hrp, Instruction, CHUNK_SIZE, COSMOS_APDU_CLA,
    IOV_APDU_CLA,
};

/// Signing curve used by an app
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Curve {
    Ed25519,
    Secp256k1,
}

impl Curve {
    /// Public key length returned by the device
    pub const fn pubkey_len(&self) -> usize {
        match self {
            Curve::Ed25519 => 32,
            Curve::Secp256k1 => 33,
        }
    }
}

/// Device application dialect
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumVariantNames, EnumIter,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "kebab-case")]
pub enum Dialect {
    /// Original IOV ed25519 app, 3-word path, no on-device prefix
    Ed25519Simple,
    /// Chain-aware IOV ed25519 app, address prefix supplied by the host
    Ed25519ChainAware,
    /// Cosmos-style secp256k1 app with bech32 addresses
    Secp256k1Bech32,
}

const SIMPLE_SIGN_ACCEPTS: &[u16] = &[SW_OK, SW_BAD_KEY_HANDLE];
const TAGGED_SIGN_ACCEPTS: &[u16] = &[SW_OK, SW_DATA_INVALID, SW_BAD_KEY_HANDLE];

impl Dialect {
    /// APDU class byte
    pub const fn cla(&self) -> u8 {
        match self {
            Dialect::Ed25519Simple | Dialect::Ed25519ChainAware => IOV_APDU_CLA,
            Dialect::Secp256k1Bech32 => COSMOS_APDU_CLA,
        }
    }

    /// Signing curve
    pub const fn curve(&self) -> Curve {
        match self {
            Dialect::Ed25519Simple | Dialect::Ed25519ChainAware => Curve::Ed25519,
            Dialect::Secp256k1Bech32 => Curve::Secp256k1,
        }
    }

    /// Number of words in the derivation path
    pub const fn path_words(&self) -> usize {
        match self {
            Dialect::Secp256k1Bech32 => 5,
            _ => 3,
        }
    }

    /// Instruction for address requests
    pub const fn get_address_ins(&self) -> Instruction {
        match self {
            Dialect::Secp256k1Bech32 => Instruction::GetAddrSecp256k1,
            _ => Instruction::GetAddrEd25519,
        }
    }

    /// Instruction for signing
    pub const fn sign_ins(&self) -> Instruction {
        Instruction::Sign
    }

    /// Whether the app expects a bech32 prefix after the path
    pub const fn has_prefix(&self) -> bool {
        !matches!(self, Dialect::Ed25519Simple)
    }

    /// Default bech32 prefix, where the app takes one
    pub fn default_prefix(&self) -> Option<Hrp> {
        let p = match self {
            Dialect::Ed25519Simple => return None,
            Dialect::Ed25519ChainAware => "iov",
            Dialect::Secp256k1Bech32 => "star",
        };
        Hrp::new(p).ok()
    }

    /// Whether sign chunks carry an explicit INIT / ADD / LAST tag in P1
    pub const fn tags_chunks(&self) -> bool {
        !matches!(self, Dialect::Ed25519Simple)
    }

    /// Status codes for which sign responses are decoded
    pub const fn sign_accepts(&self) -> &'static [u16] {
        match self {
            Dialect::Ed25519Simple => SIMPLE_SIGN_ACCEPTS,
            _ => TAGGED_SIGN_ACCEPTS,
        }
    }

    /// Whether a sign status carries an ascii diagnostic payload
    pub const fn is_validation_failure(&self, status: u16) -> bool {
        match self {
            Dialect::Ed25519Simple => status == SW_BAD_KEY_HANDLE,
            _ => status == SW_BAD_KEY_HANDLE || status == SW_DATA_INVALID,
        }
    }

    /// Whether the app returns DER encoded signatures
    pub const fn der_signatures(&self) -> bool {
        matches!(self, Dialect::Secp256k1Bech32)
    }
}

/// App descriptor, fixing the dialect, prefix and chunk size for a session
#[derive(Clone, Debug, PartialEq)]
pub struct App {
    dialect: Dialect,
    prefix: Option<Hrp>,
    chunk_size: usize,
}

impl App {
    /// Create an app descriptor using the dialect's default prefix
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            prefix: dialect.default_prefix(),
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the address prefix (ignored for dialects without prefixes)
    pub fn with_prefix(mut self, prefix: Hrp) -> Self {
        if self.dialect.has_prefix() {
            self.prefix = Some(prefix);
        }
        self
    }

    /// Override the address prefix, failing for dialects without prefixes
    pub fn try_with_prefix(self, prefix: Hrp) -> Result<Self, ApduError> {
        match self.dialect.has_prefix() {
            true => Ok(self.with_prefix(prefix)),
            false => Err(ApduError::PrefixUnsupported),
        }
    }

    /// Override the chunk size, bounded by [CHUNK_SIZE]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self, ApduError> {
        if chunk_size == 0 || chunk_size > CHUNK_SIZE {
            return Err(ApduError::InvalidLength);
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// App dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Address prefix sent to the app, if any
    pub fn prefix(&self) -> Option<&Hrp> {
        self.prefix.as_ref()
    }

    /// Maximum chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Build the derivation path for an account index
    pub fn path(&self, index: AccountIndex) -> Result<Bip32Path, ApduError> {
        Bip32Path::new(index, self.dialect.path_words())
    }
}

impl From<Dialect> for App {
    fn from(d: Dialect) -> Self {
        Self::new(d)
    }
}
