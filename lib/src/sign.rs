// Copyright (c) 2022-2023 IOV SAS

//! Chunked signing driver
//!
//! Chunks are exchanged strictly in order, the next chunk is only sent once the
//! previous response has been received. The first response with a non-success
//! status ends the exchange and is decoded as the result, otherwise the result
//! is decoded from the final chunk response. Failed operations are not resumable.

use std::{
    fmt::{Debug, Display},
    time::Duration,
};

use ledger_transport::Exchange;
use log::{debug, trace};

use ledger_iov_apdu::{sign::SignChunkReq, ApduError, ApduReq, Reply, Response, Signature};

use crate::Error;

/// Exchange sign chunks with the device, returning the decoded signature
/// or the [ErrorState](ledger_iov_apdu::ErrorState) reported by the device
pub(crate) async fn sign_chunks<T>(
    t: &T,
    reqs: Vec<SignChunkReq>,
    request_timeout: Duration,
    user_timeout: Duration,
) -> Result<Reply<Signature>, Error<T::Error>>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug,
{
    for req in reqs {
        let cmd = req.to_command()?;

        debug!(
            "Sending sign chunk {}/{} ({} bytes)",
            req.index() + 1,
            req.count(),
            cmd.data.len()
        );

        // Final chunk awaits user approval
        let timeout = match req.is_last() {
            true => user_timeout,
            false => request_timeout,
        };

        let a = tokio::time::timeout(timeout, t.exchange(&cmd))
            .await?
            .map_err(Error::Transport)?;

        let resp = Response::new(a.data(), a.retcode());

        trace!("Sign response {}: {:02x?}", resp.status, resp.data);

        if !req.is_last() && resp.status.is_success() {
            continue;
        }

        if !resp.status.is_success() {
            debug!(
                "Sign aborted at chunk {}/{}: {}",
                req.index() + 1,
                req.count(),
                resp.status
            );
        }

        return Ok(req.decode(&resp)?);
    }

    // Chunking always yields at least the path chunk
    Err(Error::MalformedResponse(ApduError::InvalidLength))
}
