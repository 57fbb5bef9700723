// Copyright (c) 2022-2023 IOV SAS

//! Tests for IOV / Starname wallet integration.
//!
//! Generic over [Exchange](ledger_iov::Exchange) for reuse against the software
//! device, speculos, or physical devices. Expected keys and addresses are
//! derived in software from the shared mnemonic.
//!

pub mod version;

pub mod address;

pub mod sign;

/// Unwrap a device reply, converting device failures to errors
pub fn check<T>(r: ledger_iov::Reply<T>) -> anyhow::Result<T> {
    r.map_err(|e| anyhow::anyhow!("Device error: {}", e))
}
