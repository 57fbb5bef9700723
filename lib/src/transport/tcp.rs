// Copyright (c) 2022-2023 IOV SAS

//! TCP APDU transport, compatible with the speculos APDU socket
//!
//! Requests are framed as a big-endian `u32` length followed by the APDU
//! (`CLA INS P1 P2 LC DATA`). Responses carry a big-endian `u32` payload length,
//! the payload, then the two byte status word.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::Deref;

use async_trait::async_trait;
use ledger_apdu::{APDUAnswer, APDUCommand};
use ledger_transport::Exchange;
use log::trace;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
};

/// Default speculos APDU port
pub const DEFAULT_APDU_PORT: u16 = 9999;

/// TCP transport options
#[derive(Clone, Debug, PartialEq, clap::Parser)]
pub struct TcpOptions {
    /// Address for TCP APDU connection
    #[clap(long = "tcp-addr", default_value = "127.0.0.1")]
    pub addr: IpAddr,

    /// Port for TCP APDU connection
    #[clap(long = "tcp-port", default_value_t = DEFAULT_APDU_PORT)]
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_APDU_PORT,
        }
    }
}

impl TcpOptions {
    /// Socket address for these options
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// TCP transport errors
#[derive(Debug, thiserror::Error)]
pub enum TcpError {
    /// Socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Command too long to frame
    #[error("Invalid command length")]
    InvalidLength,

    /// Answer missing status word
    #[error("Invalid answer")]
    InvalidAnswer,
}

/// TCP APDU transport
pub struct TransportTcp {
    s: Mutex<TcpStream>,
    opts: TcpOptions,
}

impl TransportTcp {
    /// Connect to a TCP APDU socket
    pub async fn new(opts: TcpOptions) -> Result<Self, TcpError> {
        let s = TcpStream::connect(opts.socket_addr()).await?;

        Ok(Self {
            s: Mutex::new(s),
            opts,
        })
    }

    /// Options used for this connection
    pub fn options(&self) -> &TcpOptions {
        &self.opts
    }
}

/// Encode a command into a framed TCP request
pub fn encode_frame<I: Deref<Target = [u8]>>(cmd: &APDUCommand<I>) -> Result<Vec<u8>, TcpError> {
    let data = cmd.data.deref();
    if data.len() > u8::MAX as usize {
        return Err(TcpError::InvalidLength);
    }

    let n = 5 + data.len();
    let mut b = Vec::with_capacity(4 + n);

    b.extend_from_slice(&(n as u32).to_be_bytes());
    b.extend_from_slice(&[cmd.cla, cmd.ins, cmd.p1, cmd.p2, data.len() as u8]);
    b.extend_from_slice(data);

    Ok(b)
}

#[async_trait]
impl Exchange for TransportTcp {
    type Error = TcpError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        let req = encode_frame(command)?;

        let mut s = self.s.lock().await;

        trace!("TCP tx: {:02x?}", req);
        s.write_all(&req).await?;

        // Read payload length, payload, and status word
        let mut h = [0u8; 4];
        s.read_exact(&mut h).await?;
        let n = u32::from_be_bytes(h) as usize;

        let mut resp = vec![0u8; n + 2];
        s.read_exact(&mut resp).await?;

        trace!("TCP rx: {:02x?}", resp);

        APDUAnswer::from_answer(resp).map_err(|_| TcpError::InvalidAnswer)
    }
}
