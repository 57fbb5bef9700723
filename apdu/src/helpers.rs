// Copyright (c) 2022-2023 IOV SAS

//! Buffer helpers shared by response decoders

use crate::ApduError;

/// Split `n` bytes from the front of a buffer
pub(crate) fn take(buff: &[u8], n: usize) -> Result<(&[u8], &[u8]), ApduError> {
    if buff.len() < n {
        return Err(ApduError::TooShort {
            expected: n,
            actual: buff.len(),
        });
    }

    Ok(buff.split_at(n))
}

/// Read a single-byte length prefixed field
pub(crate) fn take_lv(buff: &[u8]) -> Result<(&[u8], &[u8]), ApduError> {
    let (l, rest) = take(buff, 1)?;
    take(rest, l[0] as usize)
}

/// Write a single-byte length prefixed field, returning bytes written
pub(crate) fn put_lv(d: &[u8], buff: &mut [u8]) -> Result<usize, ApduError> {
    if d.len() > u8::MAX as usize || buff.len() < d.len() + 1 {
        return Err(ApduError::InvalidLength);
    }

    buff[0] = d.len() as u8;
    buff[1..][..d.len()].copy_from_slice(d);

    Ok(d.len() + 1)
}

/// Write raw bytes, returning bytes written
pub(crate) fn put(d: &[u8], buff: &mut [u8]) -> Result<usize, ApduError> {
    if buff.len() < d.len() {
        return Err(ApduError::InvalidLength);
    }

    buff[..d.len()].copy_from_slice(d);

    Ok(d.len())
}

/// Parse a utf8 string field
pub(crate) fn utf8(d: &[u8]) -> Result<String, ApduError> {
    core::str::from_utf8(d)
        .map(|s| s.to_string())
        .map_err(|_| ApduError::Utf8)
}
