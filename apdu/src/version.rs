// Copyright (c) 2022-2023 IOV SAS

//! Application version APDUs

use encdec::Encode;

use crate::{
    helpers::put, ApduError, ApduHeader, ApduReq, Dialect, Instruction, Reply, Response,
};

/// Minimum raw response length (payload and status) for version responses
pub const VERSION_MIN_LEN: usize = 6;

/// Fetch application version APDU, no body
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct VersionReq {
    dialect: Dialect,
}

impl VersionReq {
    /// Create a new version request for the provided dialect
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

impl Encode for VersionReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl ApduReq for VersionReq {
    type Output = VersionInfo;

    fn header(&self) -> ApduHeader {
        ApduHeader {
            cla: self.dialect.cla(),
            ins: Instruction::GetVersion as u8,
            p1: 0,
            p2: 0,
        }
    }

    fn decode_payload(&self, resp: &Response) -> Result<Reply<VersionInfo>, ApduError> {
        VersionInfo::decode(resp.data).map(Ok)
    }
}

/// Application version response
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   TEST_MODE   |     MAJOR     |     MINOR     |     PATCH     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    LOCKED     |          TARGET_ID (optional, u32 BE)         |
/// +-+-+-+-+-+-+-+-+                               +-+-+-+-+-+-+-+-+
/// |                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionInfo {
    /// App built for testnet use
    pub test_mode: bool,
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch version
    pub patch: u8,
    /// Device is locked
    pub device_locked: bool,
    /// Target id (lowercase hex), where reported
    pub target_id: Option<String>,
}

impl VersionInfo {
    /// Render version as `major.minor.patch`
    pub fn version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Decode a version response payload
    pub fn decode(d: &[u8]) -> Result<Self, ApduError> {
        // Raw response (with status) must be at least six bytes
        if d.len() + 2 < VERSION_MIN_LEN {
            return Err(ApduError::TooShort {
                expected: VERSION_MIN_LEN,
                actual: d.len() + 2,
            });
        }

        let target_id = d
            .get(5..9)
            .map(|t| format!("{:x}", u32::from_be_bytes([t[0], t[1], t[2], t[3]])));

        Ok(Self {
            test_mode: d[0] != 0,
            major: d[1],
            minor: d[2],
            patch: d[3],
            device_locked: d.get(4) == Some(&1),
            target_id,
        })
    }

    fn target_bytes(&self) -> Result<Option<[u8; 4]>, ApduError> {
        match &self.target_id {
            Some(t) => u32::from_str_radix(t, 16)
                .map(|v| Some(v.to_be_bytes()))
                .map_err(|_| ApduError::InvalidEncoding),
            None => Ok(None),
        }
    }
}

/// Encode a version response payload (for device implementations)
impl Encode for VersionInfo {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        match self.target_id.is_some() {
            true => Ok(9),
            false => Ok(5),
        }
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = put(
            &[
                self.test_mode as u8,
                self.major,
                self.minor,
                self.patch,
                self.device_locked as u8,
            ],
            buff,
        )?;

        if let Some(t) = self.target_bytes()? {
            n += put(&t, &mut buff[n..])?;
        }

        Ok(n)
    }
}
