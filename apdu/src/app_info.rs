// Copyright (c) 2022-2023 IOV SAS

//! Application Information APDUs
//!
//! App info is served by the device dashboard / SDK rather than the app
//! itself, so uses a fixed class and instruction for every dialect.

use encdec::Encode;

use crate::{
    helpers::{put, put_lv, take, take_lv, utf8},
    status::SW_BUSY,
    ApduError, ApduHeader, ApduReq, ErrorState, Reply, Response, StatusCode, APP_INFO_CLA,
    APP_INFO_INS,
};

/// Only defined app-info response format
pub const APP_INFO_FORMAT_ID: u8 = 1;

/// Fetch application info APDU
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct AppInfoReq {}

impl Encode for AppInfoReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl ApduReq for AppInfoReq {
    type Output = AppInfo;

    /// Application Info command APDU is class `0xb0` instruction `0x01`
    fn header(&self) -> ApduHeader {
        ApduHeader {
            cla: APP_INFO_CLA,
            ins: APP_INFO_INS,
            p1: 0,
            p2: 0,
        }
    }

    fn decode_payload(&self, resp: &Response) -> Result<Reply<AppInfo>, ApduError> {
        AppInfo::decode(resp.data)
    }
}

bitflags::bitflags! {
    /// Application info flags
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AppFlags: u8 {
        /// Device in recovery mode
        const RECOVERY = 1 << 0;

        /// MCU code signed
        const SIGNED_MCU_CODE = 1 << 1;

        /// Device onboarded
        const ONBOARDED = 1 << 2;

        /// User PIN validated
        const PIN_VALIDATED = 1 << 7;
    }
}

/// Application information response APDU
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   FORMAT_ID   |   NAME_LEN    |          NAME...              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  VERSION_LEN  |                  VERSION...                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   FLAGS_LEN   |    FLAGS...                                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppInfo {
    /// Application name
    pub name: String,

    /// Application version
    pub version: String,

    /// Length of the flags field as reported by the device
    pub flags_len: u8,

    /// Application flags (first flags byte)
    pub flags: AppFlags,
}

impl AppInfo {
    /// Create a new app info object
    pub fn new(name: &str, version: &str, flags: AppFlags) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            flags_len: 1,
            flags,
        }
    }

    /// Decode an app info payload.
    ///
    /// Unknown format ids are reported as an [ErrorState] (`0x9001`)
    pub fn decode(buff: &[u8]) -> Result<Reply<Self>, ApduError> {
        let (format, buff) = take(buff, 1)?;
        if format[0] != APP_INFO_FORMAT_ID {
            log::warn!("unrecognised app info format: {}", format[0]);
            return Ok(Err(ErrorState::with_message(
                StatusCode(SW_BUSY),
                "response format ID not recognized",
            )));
        }

        let (name, buff) = take_lv(buff)?;
        let (version, buff) = take_lv(buff)?;
        let (flags, _) = take_lv(buff)?;

        let flag_bits = flags.first().copied().unwrap_or(0);

        Ok(Ok(Self {
            name: utf8(name)?,
            version: utf8(version)?,
            flags_len: flags.len() as u8,
            flags: AppFlags::from_bits_truncate(flag_bits),
        }))
    }
}

/// Encode an app info payload (for device implementations)
impl Encode for AppInfo {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(1 + 1 + self.name.len() + 1 + self.version.len() + 2)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        let mut index = put(&[APP_INFO_FORMAT_ID], buff)?;

        index += put_lv(self.name.as_bytes(), &mut buff[index..])?;
        index += put_lv(self.version.as_bytes(), &mut buff[index..])?;
        index += put_lv(&[self.flags.bits()], &mut buff[index..])?;

        Ok(index)
    }
}
