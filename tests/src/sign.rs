// Copyright (c) 2022-2023 IOV SAS

//! Signing tests

use std::fmt::{Debug, Display};

use ed25519_dalek::Verifier as _;
use log::info;
use sha2::{Digest, Sha512};

use ledger_iov::{
    apdu::{address::PublicKey, AccountIndex, Signature},
    DeviceHandle, Exchange,
};

use crate::check;

/// Sign a message with the provided account, verifying the signature
/// against the public key reported by the device
pub async fn test<T>(h: &DeviceHandle<T>, account: u32, msg: &[u8]) -> anyhow::Result<Signature>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug + Send + Sync + 'static,
{
    let index = AccountIndex::new(account)?;

    let a = check(h.address(index, false).await?)?;
    info!("signing {} bytes with account {} ({})", msg.len(), account, a.pubkey);

    let s = check(h.sign(index, msg).await?)?;
    info!("signature: {}", s);

    verify(&a.pubkey, msg, &s)?;

    Ok(s)
}

/// Verify a device signature.
///
/// Ed25519 apps sign the SHA-512 prehash of the message, secp256k1 apps sign
/// with SHA-256 and signatures must be normalised to low-S.
pub fn verify(pubkey: &PublicKey, msg: &[u8], sig: &Signature) -> anyhow::Result<()> {
    match pubkey {
        PublicKey::Ed25519(k) => {
            let k = ed25519_dalek::VerifyingKey::from_bytes(k)?;
            let s = ed25519_dalek::Signature::from_slice(sig.as_ref())?;

            k.verify(&Sha512::digest(msg), &s)?;
        }
        PublicKey::Secp256k1(k) => {
            let k = k256::ecdsa::VerifyingKey::from_sec1_bytes(k)?;
            let s = k256::ecdsa::Signature::from_slice(sig.as_ref())?;

            anyhow::ensure!(s.normalize_s().is_none(), "signature is not low-S");

            k.verify(msg, &s)?;
        }
    }

    Ok(())
}
