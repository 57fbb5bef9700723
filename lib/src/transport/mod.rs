// Copyright (c) 2022-2023 IOV SAS

//! Generic transport abstraction for hiding underlying transport types
//!

use std::ops::Deref;

use async_trait::async_trait;
use ledger_apdu::{APDUAnswer, APDUCommand};
use ledger_transport::Exchange;

#[cfg(feature = "transport_hid")]
pub use ledger_transport_hid::{LedgerHIDError, TransportNativeHID};

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::{encode_frame, TcpError, TcpOptions, TransportTcp, DEFAULT_APDU_PORT};

use strum::Display;

/// Generic ledger device (abstract over transport types)
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_hid")]
    Hid(TransportNativeHID),
    #[cfg(feature = "transport_tcp")]
    Tcp(TransportTcp),
}

/// Generic transport error, wrapping the errors of supported transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[cfg(feature = "transport_hid")]
    #[error("HID: {0}")]
    Hid(#[from] LedgerHIDError),

    #[cfg(feature = "transport_tcp")]
    #[error("TCP: {0}")]
    Tcp(#[from] TcpError),

    #[error("Transport unavailable")]
    Unavailable,
}

/// Convert a HID transport into a generic transport
#[cfg(feature = "transport_hid")]
impl From<TransportNativeHID> for GenericTransport {
    fn from(t: TransportNativeHID) -> Self {
        Self::Hid(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TransportTcp> for GenericTransport {
    fn from(t: TransportTcp) -> Self {
        Self::Tcp(t)
    }
}

/// Implementation of [Exchange] for [GenericTransport], hiding transport error types
#[async_trait]
impl Exchange for GenericTransport {
    type Error = TransportError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        let r = match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.exchange(command).await?,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.exchange(command).await?,
            #[allow(unreachable_patterns)]
            _ => return Err(TransportError::Unavailable),
        };

        Ok(r)
    }
}
