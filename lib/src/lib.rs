// Copyright (c) 2022-2023 IOV SAS

//! Ledger IOV / Starname API Library (and CLI)
//!
//! [DeviceHandle] provides version, app info, address and signing operations
//! for the supported app [Dialect]s over any [Exchange] transport.
//! Device-reported failures are returned as data ([Reply]), [Error] is reserved
//! for invalid arguments, malformed responses, transport failures and timeouts.

use std::fmt::{Debug, Display, Formatter};

pub use ledger_transport::Exchange;

use async_trait::async_trait;
use log::debug;

/// Re-export transports for consumer use
pub mod transport;
use transport::{GenericTransport, TransportError};

#[cfg(feature = "transport_tcp")]
use transport::{TcpOptions, TransportTcp};

/// Re-export `ledger-iov-apdu` for consumers
pub use ledger_iov_apdu::{self as apdu, App, Dialect, ErrorState, Reply};

mod handle;
pub use handle::{DeviceHandle, REQUEST_TIMEOUT_S, USER_TIMEOUT_S};

mod sign;

mod error;
pub use error::Error;

/// Device discovery filter
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// Devices on any supported transport
    Any,
    /// USB HID devices
    Hid,
    /// Speculos (or software device) on the default TCP port
    Tcp,
}

impl Filter {
    /// Whether HID devices pass this filter
    pub fn hid(&self) -> bool {
        matches!(self, Filter::Any | Filter::Hid)
    }

    /// Whether TCP devices pass this filter
    pub fn tcp(&self) -> bool {
        matches!(self, Filter::Any | Filter::Tcp)
    }
}

/// Discovered device, used by [Connect]
#[derive(Debug)]
pub enum LedgerInfo {
    #[cfg(feature = "transport_hid")]
    Hid(hidapi::DeviceInfo),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpOptions),
}

impl Display for LedgerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(i) => write!(
                f,
                "usb {} {:04x}:{:04x} ({})",
                i.product_string().unwrap_or("unknown"),
                i.vendor_id(),
                i.product_id(),
                i.serial_number().unwrap_or("no serial"),
            ),
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(o) => write!(f, "tcp {}", o.socket_addr()),
            #[allow(unreachable_patterns)]
            _ => write!(f, "unavailable"),
        }
    }
}

/// Ledger provider, discovers devices and opens connections.
///
/// Only one provider should exist at a time, HID contexts are global on
/// some platforms.
pub struct LedgerProvider {
    #[cfg(feature = "transport_hid")]
    hid_api: hidapi::HidApi,
}

impl LedgerProvider {
    /// Create a new ledger provider
    pub fn new() -> Result<Self, Error<TransportError>> {
        Ok(Self {
            #[cfg(feature = "transport_hid")]
            hid_api: hidapi::HidApi::new()?,
        })
    }

    /// List devices passing the provided filter
    pub async fn list_devices(&self, filter: Filter) -> Vec<LedgerInfo> {
        #[allow(unused_mut)]
        let mut devices = vec![];

        #[cfg(feature = "transport_hid")]
        if filter.hid() {
            devices.extend(self.hid_devices());
        }

        #[cfg(feature = "transport_tcp")]
        if filter.tcp() {
            devices.extend(find_tcp(TcpOptions::default()).await);
        }

        debug!("Found {} devices ({}): {:?}", devices.len(), filter, devices);

        devices
    }

    #[cfg(feature = "transport_hid")]
    fn hid_devices(&self) -> Vec<LedgerInfo> {
        transport::TransportNativeHID::list_ledgers(&self.hid_api)
            .cloned()
            .map(LedgerInfo::Hid)
            .collect()
    }

    /// Open a transport to a discovered device
    async fn open(&self, info: &LedgerInfo) -> Result<GenericTransport, TransportError> {
        match info {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(i) => {
                let t = transport::TransportNativeHID::open_device(&self.hid_api, i)?;
                Ok(GenericTransport::Hid(t))
            }
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(o) => {
                let t = TransportTcp::new(o.clone()).await?;
                Ok(GenericTransport::Tcp(t))
            }
            #[allow(unreachable_patterns)]
            _ => Err(TransportError::Unavailable),
        }
    }
}

/// Check for a listening APDU socket
#[cfg(feature = "transport_tcp")]
async fn find_tcp(o: TcpOptions) -> Option<LedgerInfo> {
    match tokio::net::TcpStream::connect(o.socket_addr()).await {
        Ok(_) => Some(LedgerInfo::Tcp(o)),
        Err(e) => {
            debug!("No APDU socket at {}: {}", o.socket_addr(), e);
            None
        }
    }
}

/// Connect trait for supported transports
#[async_trait]
pub trait Connect<T: Exchange> {
    type Options: Debug;

    /// Connect to the specified device using the provided app descriptor
    async fn connect(
        &self,
        opts: &Self::Options,
        app: App,
    ) -> Result<DeviceHandle<T>, Error<TransportError>>;
}

#[async_trait]
impl Connect<GenericTransport> for LedgerProvider {
    type Options = LedgerInfo;

    async fn connect(
        &self,
        opts: &Self::Options,
        app: App,
    ) -> Result<DeviceHandle<GenericTransport>, Error<TransportError>> {
        let t = self.open(opts).await.map_err(Error::Transport)?;

        debug!("Connected to {} ({})", opts, app.dialect());

        Ok(DeviceHandle::new(t, app))
    }
}
