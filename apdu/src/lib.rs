// Copyright (c) 2022-2023 IOV SAS

//! Protocol / APDU definitions for IOV and Starname ledger app communication
//!
//! This module provides the encoders, decoders and status catalog shared by the
//! host library and the software device. Three app dialects are supported, see
//! [Dialect] for the differences between them.
//!
//! Requests implement [ApduReq] (header + [encdec::Encode]), responses are parsed
//! from raw answers via [Response] and decoded into a [Reply], which is either the
//! typed success value or an [ErrorState] carrying the device status.
//!
//! All multi-byte path fields are little-endian, status words and target ids are
//! big-endian, matching the device applications.

use ledger_apdu::APDUCommand;
use num_enum::TryFromPrimitive;

pub mod address;
pub mod app_info;
pub mod dialect;
pub mod path;
pub mod prefix;
pub mod prelude;
pub mod response;
pub mod sign;
pub mod status;
pub mod version;

mod helpers;

pub use dialect::{App, Curve, Dialect};
pub use path::{harden, AccountIndex, Bip32Path};
pub use prefix::Hrp;
pub use response::Response;
pub use sign::Signature;
pub use status::{ErrorState, Reply, StatusCode, StatusKind};

/// APDU class for the IOV ed25519 applications
pub const IOV_APDU_CLA: u8 = 0x22;

/// APDU class for the cosmos-style secp256k1 application
pub const COSMOS_APDU_CLA: u8 = 0x55;

/// APDU class for the generic app-info instruction, available on all ledger apps
pub const APP_INFO_CLA: u8 = 0xb0;

/// BIP44 purpose
pub const PURPOSE: u32 = 44;

/// Registered coin type for IOV / Starname
pub const COIN_TYPE: u32 = 234;

/// Maximum chunk size for signing payloads
pub const CHUNK_SIZE: usize = 250;

/// Maximum APDU payload length (single length byte)
pub const MAX_APDU_DATA: usize = 255;

/// App-info instruction (on [APP_INFO_CLA])
pub const APP_INFO_INS: u8 = 0x01;

/// APDU instruction codes for the IOV / cosmos applications
#[derive(Copy, Clone, Debug, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Fetch application version
    GetVersion = 0x00,

    /// Fetch ed25519 public key and address
    GetAddrEd25519 = 0x01,

    /// Sign (all dialects)
    Sign = 0x02,

    /// Fetch secp256k1 public key and bech32 address
    GetAddrSecp256k1 = 0x04,
}

/// Protocol errors, returned for caller mistakes and malformed device responses.
///
/// Device-reported failures are never errors, see [ErrorState].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApduError {
    /// Message needs more sign chunks than the dialect can address
    #[error("Message too long ({0} chunks, at most 255)")]
    MessageTooLong(usize),

    /// Account index supplied was not an integer
    #[error("Input must be an integer")]
    IndexNotInteger,

    /// Account index outside of `[0, 2^31 - 1]`
    #[error("Index is out of range")]
    IndexOutOfRange,

    /// Address prefix outside of `[3, 83]` bytes
    #[error("Prefix length {0} is out of range (3..=83)")]
    PrefixLength(usize),

    /// Address prefix supplied for a dialect without prefixes
    #[error("Dialect does not support an address prefix")]
    PrefixUnsupported,

    /// Address prefix contained non-ascii characters
    #[error("Prefix must be ascii")]
    PrefixNotAscii,

    /// Response (or encode buffer) too short
    #[error("Response too short (expected at least {expected} bytes, got {actual})")]
    TooShort { expected: usize, actual: usize },

    /// Invalid buffer length
    #[error("Invalid length")]
    InvalidLength,

    /// Invalid encoding
    #[error("Invalid encoding")]
    InvalidEncoding,

    /// Invalid utf8 in response string
    #[error("Invalid utf8")]
    Utf8,

    /// Malformed DER signature
    #[error("Invalid DER signature")]
    InvalidSignature,

    /// Success status without signature bytes
    #[error("Device returned an empty signature")]
    EmptySignature,
}

impl ApduError {
    /// Check whether this error was caused by the caller (as opposed to the device)
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ApduError::IndexNotInteger
                | ApduError::IndexOutOfRange
                | ApduError::PrefixLength(_)
                | ApduError::PrefixNotAscii
                | ApduError::PrefixUnsupported
                | ApduError::MessageTooLong(_)
        )
    }
}

impl From<core::convert::Infallible> for ApduError {
    fn from(e: core::convert::Infallible) -> Self {
        match e {}
    }
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            _ => ApduError::InvalidEncoding,
        }
    }
}

/// APDU command header
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ApduHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}

/// Status accepted for generic requests
pub const ACCEPT_OK: &[u16] = &[status::SW_OK];

/// Request APDU, a header plus an [encdec::Encode] body, paired with
/// a decoder for the matching response
pub trait ApduReq: encdec::Encode<Error = ApduError> {
    /// Decoded response type
    type Output;

    /// Build the command header for this request
    fn header(&self) -> ApduHeader;

    /// Status codes for which the response payload should be decoded,
    /// any other status is reported as an [ErrorState] from the catalog
    fn accepts(&self) -> &'static [u16] {
        ACCEPT_OK
    }

    /// Decode the payload of an accepted response
    fn decode_payload(&self, resp: &Response) -> Result<Reply<Self::Output>, ApduError>;

    /// Decode a response, filtering by accepted status
    fn decode(&self, resp: &Response) -> Result<Reply<Self::Output>, ApduError> {
        if let Err(e) = resp.check(self.accepts()) {
            log::debug!("status {} not accepted for {:?}", resp.status, self.header());
            return Ok(Err(e));
        }

        self.decode_payload(resp)
    }

    /// Encode request into an [APDUCommand] for transport use
    fn to_command(&self) -> Result<APDUCommand<Vec<u8>>, ApduError> {
        let n = self.encode_len()?;
        if n > MAX_APDU_DATA {
            return Err(ApduError::InvalidLength);
        }

        let mut data = vec![0u8; n];
        let n = self.encode(&mut data)?;
        data.truncate(n);

        let h = self.header();

        Ok(APDUCommand {
            cla: h.cla,
            ins: h.ins,
            p1: h.p1,
            p2: h.p2,
            data,
        })
    }
}
