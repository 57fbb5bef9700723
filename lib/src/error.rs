// Copyright (c) 2022-2023 IOV SAS

use core::fmt::Debug;
use std::fmt::Display;

use ledger_iov_apdu::ApduError;
use tokio::time::error::Elapsed;

/// Ledger IOV API Error Type
///
/// Device-reported failures are not errors, these are returned as
/// [ErrorState](ledger_iov_apdu::ErrorState) within a [Reply](ledger_iov_apdu::Reply).
#[derive(Debug, thiserror::Error)]
pub enum Error<E: Display + Debug> {
    /// HID Init Error
    #[error("could not create HidApi instance")]
    HidInit,

    /// Transport error
    #[error("Transport error {0}")]
    Transport(E),

    /// Invalid caller-supplied argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(ApduError),

    /// Malformed APDU response
    #[error("Malformed response: {0}")]
    MalformedResponse(ApduError),

    /// Request timeout
    #[error("Timeout waiting for device response")]
    RequestTimeout,

    /// Session unusable after a timeout, reconnect to the device
    #[error("Session poisoned by a previous timeout, reconnect required")]
    SessionPoisoned,
}

impl<E: Display + Debug> Error<E> {
    /// Check whether this error was caused by invalid caller input
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl<E: Display + Debug> From<ApduError> for Error<E> {
    fn from(e: ApduError) -> Self {
        match e.is_invalid_argument() {
            true => Error::InvalidArgument(e),
            false => Error::MalformedResponse(e),
        }
    }
}

impl<E: Display + Debug> From<Elapsed> for Error<E> {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}

#[cfg(feature = "transport_hid")]
impl From<hidapi::HidError> for Error<crate::transport::TransportError> {
    fn from(e: hidapi::HidError) -> Self {
        log::error!("HID init failed: {:?}", e);
        Error::HidInit
    }
}
