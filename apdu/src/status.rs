// Copyright (c) 2022-2023 IOV SAS

//! Device status codes and the status catalog
//!
//! Every response ends with a big-endian two byte status word. Known codes map to
//! a description and a [StatusKind], unknown codes render a fallback description
//! so the catalog is never the reason a response fails to parse.

use core::fmt;

use strum::Display;

/// No errors
pub const SW_OK: u16 = 0x9000;
/// Device is busy (also used for unrecognised app-info formats)
pub const SW_BUSY: u16 = 0x9001;
/// Error deriving keys
pub const SW_DERIVE_FAILED: u16 = 0x6802;
/// Execution error
pub const SW_EXECUTION_ERROR: u16 = 0x6400;
/// Wrong length
pub const SW_WRONG_LENGTH: u16 = 0x6700;
/// Empty buffer
pub const SW_EMPTY_BUFFER: u16 = 0x6982;
/// Output buffer too small
pub const SW_OUTPUT_BUFFER_TOO_SMALL: u16 = 0x6983;
/// Data is invalid
pub const SW_DATA_INVALID: u16 = 0x6984;
/// Conditions not satisfied
pub const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
/// Transaction rejected by the user
pub const SW_TX_REJECTED: u16 = 0x6986;
/// Bad key handle (signature validation failure)
pub const SW_BAD_KEY_HANDLE: u16 = 0x6a80;
/// Invalid P1 / P2
pub const SW_INVALID_P1_P2: u16 = 0x6b00;
/// Instruction not supported
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6d00;
/// Class not supported, app not open
pub const SW_APP_NOT_OPEN: u16 = 0x6e00;
/// Unknown error
pub const SW_UNKNOWN: u16 = 0x6f00;
/// Sign / verify error
pub const SW_SIGN_VERIFY_ERROR: u16 = 0x6f01;

/// Classification of status codes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum StatusKind {
    /// Command succeeded
    Success,
    /// Device busy, retry is a caller decision
    Busy,
    /// U2F transport level failure
    Transport,
    /// Malformed command (length / parameters)
    InvalidRequest,
    /// Command data rejected by the app
    InvalidData,
    /// Rejected by the user or by app policy
    Rejected,
    /// Instruction not supported by the app
    Unsupported,
    /// App not open on the device
    AppNotOpen,
    /// Internal device / app failure
    Device,
    /// Code not present in the catalog
    Unknown,
}

/// Catalog of known codes
const CATALOG: &[(u16, &str, StatusKind)] = &[
    (1, "U2F: Unknown", StatusKind::Transport),
    (2, "U2F: Bad request", StatusKind::Transport),
    (3, "U2F: Configuration unsupported", StatusKind::Transport),
    (4, "U2F: Device Ineligible", StatusKind::Transport),
    (5, "U2F: Timeout", StatusKind::Transport),
    (14, "Timeout", StatusKind::Transport),
    (SW_OK, "No errors", StatusKind::Success),
    (SW_BUSY, "Device is busy", StatusKind::Busy),
    (SW_DERIVE_FAILED, "Error deriving keys", StatusKind::Device),
    (SW_EXECUTION_ERROR, "Execution Error", StatusKind::Device),
    (SW_WRONG_LENGTH, "Wrong Length", StatusKind::InvalidRequest),
    (SW_EMPTY_BUFFER, "Empty Buffer", StatusKind::InvalidRequest),
    (
        SW_OUTPUT_BUFFER_TOO_SMALL,
        "Output buffer too small",
        StatusKind::InvalidRequest,
    ),
    (SW_DATA_INVALID, "Data is invalid", StatusKind::InvalidData),
    (
        SW_CONDITIONS_NOT_SATISFIED,
        "Conditions not satisfied",
        StatusKind::Rejected,
    ),
    (SW_TX_REJECTED, "Transaction rejected", StatusKind::Rejected),
    (SW_BAD_KEY_HANDLE, "Bad key handle", StatusKind::InvalidData),
    (SW_INVALID_P1_P2, "Invalid P1/P2", StatusKind::InvalidRequest),
    (
        SW_INS_NOT_SUPPORTED,
        "Instruction not supported",
        StatusKind::Unsupported,
    ),
    (
        SW_APP_NOT_OPEN,
        "Ledger app does not seem to be open",
        StatusKind::AppNotOpen,
    ),
    (SW_UNKNOWN, "Unknown error", StatusKind::Device),
    (SW_SIGN_VERIFY_ERROR, "Sign/verify error", StatusKind::Device),
];

/// Two-byte device status word
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Success status
    pub const OK: StatusCode = StatusCode(SW_OK);

    /// Parse status from the trailing two bytes of a response
    pub fn from_bytes(b: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(b))
    }

    /// Raw status value
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Check for success, only `0x9000` qualifies
    pub fn is_success(&self) -> bool {
        self.0 == SW_OK
    }

    /// Catalog description, if known
    pub fn description(&self) -> Option<&'static str> {
        CATALOG
            .iter()
            .find(|(c, _, _)| *c == self.0)
            .map(|(_, d, _)| *d)
    }

    /// Describe this status, unknown codes never fail
    pub fn describe(&self) -> String {
        match self.description() {
            Some(d) => d.to_string(),
            None => format!("Unknown Status Code: {}", self.0),
        }
    }

    /// Classify this status
    pub fn kind(&self) -> StatusKind {
        CATALOG
            .iter()
            .find(|(c, _, _)| *c == self.0)
            .map(|(_, _, k)| *k)
            .unwrap_or(StatusKind::Unknown)
    }
}

impl From<u16> for StatusCode {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x} ({})", self.0, self.describe())
    }
}

/// Describe a raw status code
pub fn describe(code: u16) -> String {
    StatusCode(code).describe()
}

/// Device-reported failure, returned as data rather than an error
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorState {
    /// Status returned by the device
    pub return_code: StatusCode,
    /// Human readable error message
    pub error_message: String,
}

impl ErrorState {
    /// Build an error state from the status catalog
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            return_code: status,
            error_message: status.describe(),
        }
    }

    /// Build an error state with a custom message
    pub fn with_message(status: StatusCode, error_message: impl Into<String>) -> Self {
        Self {
            return_code: status,
            error_message: error_message.into(),
        }
    }

    /// Status classification
    pub fn kind(&self) -> StatusKind {
        self.return_code.kind()
    }
}

impl fmt::Display for ErrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.error_message, self.return_code.0)
    }
}

/// Result of a device operation, either the decoded value
/// or the [ErrorState] reported by the device
pub type Reply<T> = Result<T, ErrorState>;
