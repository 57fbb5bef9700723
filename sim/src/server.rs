// Copyright (c) 2022-2023 IOV SAS

//! Speculos-compatible APDU socket server for [SimDevice]
//!
//! Requests are a big-endian `u32` length followed by `CLA INS P1 P2 LC DATA`,
//! responses a big-endian `u32` payload length, the payload, then the two byte
//! status word.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use ledger_iov_apdu::{status::SW_WRONG_LENGTH, ApduHeader, Response};

use crate::SimDevice;

/// Serve APDU connections until the listener fails
pub async fn serve(l: TcpListener, d: Arc<SimDevice>) -> std::io::Result<()> {
    info!("Listening on: {}", l.local_addr()?);

    loop {
        let (s, addr) = l.accept().await?;
        debug!("Accepted connection from: {}", addr);

        let d = d.clone();
        tokio::spawn(async move {
            if let Err(e) = connection(s, d).await {
                warn!("Connection {} closed: {}", addr, e);
            }
        });
    }
}

/// Handle framed APDUs on a single connection
async fn connection(mut s: TcpStream, d: Arc<SimDevice>) -> std::io::Result<()> {
    loop {
        let mut h = [0u8; 4];
        match s.read_exact(&mut h).await {
            Ok(_) => (),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let n = u32::from_be_bytes(h) as usize;
        let mut req = vec![0u8; n];
        s.read_exact(&mut req).await?;

        let resp = match decode_frame(&req) {
            Some((h, data)) => d.handle(h, data).await,
            None => {
                warn!("Invalid frame: {:02x?}", req);
                Response::new(&[], SW_WRONG_LENGTH).to_vec()
            }
        };

        let payload_len = resp.len().saturating_sub(2) as u32;

        s.write_all(&payload_len.to_be_bytes()).await?;
        s.write_all(&resp).await?;
    }
}

/// Split a request frame into header and data
fn decode_frame(b: &[u8]) -> Option<(ApduHeader, &[u8])> {
    if b.len() < 5 {
        return None;
    }

    let lc = b[4] as usize;
    let data = b.get(5..5 + lc)?;

    let h = ApduHeader {
        cla: b[0],
        ins: b[1],
        p1: b[2],
        p2: b[3],
    };

    Some((h, data))
}
