// Copyright (c) 2022-2023 IOV SAS

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    address::{AddressInfo, AddressReq, PublicKey},
    app_info::{AppFlags, AppInfo, AppInfoReq},
    sign::{sign_chunks, sign_requests, ChunkPosition, SignChunkReq, Signature},
    version::{VersionInfo, VersionReq},
    AccountIndex, ApduError, ApduReq, App, Curve, Dialect, ErrorState, Hrp, Reply, Response,
    StatusCode, StatusKind,
};
