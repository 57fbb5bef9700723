// Copyright (c) 2022-2023 IOV SAS

//! Chunked signing APDUs
//!
//! Signing payloads are split into a sequence of chunks, the first carrying the
//! derivation path (and prefix for prefixed dialects), followed by the message in
//! slices of at most [App::chunk_size] bytes. Chunks must be sent in order, each
//! only after the previous response has been received.
//!
//! Chunk-tagging dialects mark each chunk in P1 with a [ChunkPosition], the simple
//! ed25519 dialect sends the 1-based chunk index in P1 and the chunk count in P2.

use core::fmt;

use encdec::Encode;
use k256::ecdsa::Signature as EcdsaSignature;
use num_enum::TryFromPrimitive;

use crate::{
    helpers::put, AccountIndex, ApduError, ApduHeader, ApduReq, App, Dialect, ErrorState, Reply,
    Response,
};

/// Chunk position tag, sent in P1 for chunk-tagging dialects
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ChunkPosition {
    /// First chunk (path / prefix)
    Init = 0,
    /// Intermediate message chunk
    Add = 1,
    /// Final message chunk
    Last = 2,
}

impl ChunkPosition {
    /// Compute the position for a chunk, `Init` wins where there is only one chunk
    pub fn new(index: usize, count: usize) -> Self {
        if index == 0 {
            ChunkPosition::Init
        } else if index + 1 >= count {
            ChunkPosition::Last
        } else {
            ChunkPosition::Add
        }
    }
}

/// Split a signing request into chunks
pub fn sign_chunks(
    app: &App,
    index: AccountIndex,
    message: &[u8],
) -> Result<Vec<Vec<u8>>, ApduError> {
    let path = app.path(index)?;

    let mut first = path.to_bytes();
    if let Some(p) = app.prefix() {
        let mut b = vec![0u8; p.encode_len()?];
        p.encode(&mut b)?;
        first.extend_from_slice(&b);
    }

    let mut chunks = vec![first];
    chunks.extend(message.chunks(app.chunk_size()).map(|c| c.to_vec()));

    Ok(chunks)
}

/// Build the ordered chunk requests for a signing operation
pub fn sign_requests(
    app: &App,
    index: AccountIndex,
    message: &[u8],
) -> Result<Vec<SignChunkReq>, ApduError> {
    let chunks = sign_chunks(app, index, message)?;
    let count = chunks.len();

    // Simple dialect carries the chunk count in P2
    if !app.dialect().tags_chunks() && count > u8::MAX as usize {
        return Err(ApduError::MessageTooLong(count));
    }

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, data)| SignChunkReq::new(app.dialect(), i, count, data))
        .collect())
}

/// Sign chunk request APDU
#[derive(Clone, PartialEq, Debug)]
pub struct SignChunkReq {
    dialect: Dialect,
    index: usize,
    count: usize,
    data: Vec<u8>,
}

impl SignChunkReq {
    /// Create a sign chunk request (`index` is zero-based)
    pub fn new(dialect: Dialect, index: usize, count: usize, data: Vec<u8>) -> Self {
        Self {
            dialect,
            index,
            count,
            data,
        }
    }

    /// Zero-based chunk index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total number of chunks in this operation
    pub fn count(&self) -> usize {
        self.count
    }

    /// Check whether this is the final chunk
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }

    /// Chunk payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Encode for SignChunkReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        put(&self.data, buff)
    }
}

impl ApduReq for SignChunkReq {
    type Output = Signature;

    fn header(&self) -> ApduHeader {
        let (p1, p2) = match self.dialect.tags_chunks() {
            true => (ChunkPosition::new(self.index, self.count) as u8, 0),
            false => ((self.index + 1) as u8, self.count as u8),
        };

        ApduHeader {
            cla: self.dialect.cla(),
            ins: self.dialect.sign_ins() as u8,
            p1,
            p2,
        }
    }

    fn accepts(&self) -> &'static [u16] {
        self.dialect.sign_accepts()
    }

    fn decode_payload(&self, resp: &Response) -> Result<Reply<Signature>, ApduError> {
        Signature::decode(self.dialect, resp)
    }
}

/// Signature returned by the device.
///
/// Raw 64 byte ed25519 signatures, or 64 byte compact (`r || s`, low-S)
/// secp256k1 signatures
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Signature {
    #[cfg_attr(feature = "serde", serde(with = "hex"))]
    pub bytes: Vec<u8>,
}

impl Signature {
    /// Decode a sign response for the provided dialect.
    ///
    /// Validation failures carry an ascii diagnostic appended to the status
    /// description, other non-success statuses are reported from the catalog.
    pub fn decode(dialect: Dialect, resp: &Response) -> Result<Reply<Self>, ApduError> {
        let status = resp.status;

        if dialect.is_validation_failure(status.code()) {
            let message = match resp.data.is_empty() {
                true => status.describe(),
                false => format!(
                    "{} : {}",
                    status.describe(),
                    String::from_utf8_lossy(resp.data)
                ),
            };
            return Ok(Err(ErrorState::with_message(status, message)));
        }

        if !status.is_success() {
            return Ok(Err(ErrorState::from_status(status)));
        }

        if resp.data.is_empty() {
            return Err(ApduError::EmptySignature);
        }

        let bytes = match dialect.der_signatures() {
            true => normalize_der(resp.data)?.to_vec(),
            false => resp.data.to_vec(),
        };

        Ok(Ok(Self { bytes }))
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.bytes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.bytes))
    }
}

/// Convert a DER encoded secp256k1 signature to compact low-S form
pub fn normalize_der(der: &[u8]) -> Result<[u8; 64], ApduError> {
    let sig = EcdsaSignature::from_der(der).map_err(|e| {
        log::debug!("DER decode failed: {:?}", e);
        ApduError::InvalidSignature
    })?;

    let sig = sig.normalize_s().unwrap_or(sig);

    let mut b = [0u8; 64];
    b.copy_from_slice(&sig.to_bytes());

    Ok(b)
}
