// Copyright (c) 2022-2023 IOV SAS

//! Raw response framing, payload followed by a two byte status word

use crate::{ApduError, ErrorState, StatusCode};

/// Response APDU split into payload and status
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Response<'a> {
    /// Payload preceding the status word
    pub data: &'a [u8],
    /// Trailing status word
    pub status: StatusCode,
}

impl<'a> Response<'a> {
    /// Build a response from an already split payload and status
    pub fn new(data: &'a [u8], status: impl Into<StatusCode>) -> Self {
        Self {
            data,
            status: status.into(),
        }
    }

    /// Parse a raw response buffer, failing where there is no status word
    pub fn parse(raw: &'a [u8]) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::TooShort {
                expected: 2,
                actual: raw.len(),
            });
        }

        let (data, sw) = raw.split_at(raw.len() - 2);

        Ok(Self {
            data,
            status: StatusCode::from_bytes([sw[0], sw[1]]),
        })
    }

    /// Check the response status against the accepted set, returning
    /// an [ErrorState] from the catalog where the status is not accepted
    pub fn check(&self, accepts: &[u16]) -> Result<(), ErrorState> {
        match accepts.contains(&self.status.code()) {
            true => Ok(()),
            false => Err(ErrorState::from_status(self.status)),
        }
    }

    /// Build a raw response buffer (used by devices and tests)
    pub fn to_vec(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.data.len() + 2);
        v.extend_from_slice(self.data);
        v.extend_from_slice(&self.status.code().to_be_bytes());
        v
    }
}
