// Copyright (c) 2022-2023 IOV SAS

//! Public key / address APDUs

use core::fmt;

use encdec::Encode;

use crate::{
    helpers::{put, take},
    AccountIndex, ApduError, ApduHeader, ApduReq, App, Bip32Path, Curve, Reply, Response,
};

/// Fetch public key and address APDU
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                  BIP32_PATH (12 or 20 bytes)                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   HRP_LEN     |         HRP (prefixed dialects only)          /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// P1 requests on-device confirmation of the address.
#[derive(Clone, PartialEq, Debug)]
pub struct AddressReq {
    app: App,
    path: Bip32Path,
    confirm: bool,
}

impl AddressReq {
    /// Create a new address request for the provided app and account
    pub fn new(app: &App, index: AccountIndex, confirm: bool) -> Result<Self, ApduError> {
        Ok(Self {
            app: app.clone(),
            path: app.path(index)?,
            confirm,
        })
    }

    /// Derivation path for this request
    pub fn path(&self) -> &Bip32Path {
        &self.path
    }
}

impl Encode for AddressReq {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        let mut n = self.path.encode_len()?;
        if let Some(p) = self.app.prefix() {
            n += p.encode_len()?;
        }
        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = self.path.encode(buff)?;
        if let Some(p) = self.app.prefix() {
            n += p.encode(&mut buff[n..])?;
        }
        Ok(n)
    }
}

impl ApduReq for AddressReq {
    type Output = AddressInfo;

    fn header(&self) -> ApduHeader {
        let d = self.app.dialect();
        ApduHeader {
            cla: d.cla(),
            ins: d.get_address_ins() as u8,
            p1: self.confirm as u8,
            p2: 0,
        }
    }

    fn decode_payload(&self, resp: &Response) -> Result<Reply<AddressInfo>, ApduError> {
        AddressInfo::decode(self.app.dialect().curve(), resp.data).map(Ok)
    }
}

/// Public key as returned by the device
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum PublicKey {
    /// Ed25519 public key
    Ed25519([u8; 32]),
    /// Compressed secp256k1 public key
    Secp256k1([u8; 33]),
}

impl PublicKey {
    /// Parse a public key for the provided curve
    pub fn from_slice(curve: Curve, d: &[u8]) -> Result<Self, ApduError> {
        match curve {
            Curve::Ed25519 => d
                .try_into()
                .map(PublicKey::Ed25519)
                .map_err(|_| ApduError::InvalidLength),
            Curve::Secp256k1 => d
                .try_into()
                .map(PublicKey::Secp256k1)
                .map_err(|_| ApduError::InvalidLength),
        }
    }

    /// Curve for this key
    pub fn curve(&self) -> Curve {
        match self {
            PublicKey::Ed25519(_) => Curve::Ed25519,
            PublicKey::Secp256k1(_) => Curve::Secp256k1,
        }
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(k) => &k[..],
            PublicKey::Secp256k1(k) => &k[..],
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.curve(), hex::encode(self))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(self))
    }
}

/// Public key and address response APDU
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /        PUBLIC_KEY (32 byte ed25519 / 33 byte secp256k1)       /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                   ADDRESS (ascii, remainder)                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AddressInfo {
    /// Public key
    pub pubkey: PublicKey,
    /// Encoded address
    pub address: String,
}

impl AddressInfo {
    /// Decode an address payload for the provided curve
    pub fn decode(curve: Curve, buff: &[u8]) -> Result<Self, ApduError> {
        let (k, a) = take(buff, curve.pubkey_len())?;

        if !a.is_ascii() {
            return Err(ApduError::Utf8);
        }

        Ok(Self {
            pubkey: PublicKey::from_slice(curve, k)?,
            address: String::from_utf8_lossy(a).to_string(),
        })
    }
}

/// Encode an address payload (for device implementations)
impl Encode for AddressInfo {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.pubkey.as_ref().len() + self.address.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = put(self.pubkey.as_ref(), buff)?;
        Ok(n + put(self.address.as_bytes(), &mut buff[n..])?)
    }
}
