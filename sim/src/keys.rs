// Copyright (c) 2022-2023 IOV SAS

//! Software key derivation and address encoding
//!
//! Ed25519 keys are derived with SLIP-0010 at `m/44'/234'/i'`, secp256k1 keys
//! with BIP32 at `m/44'/234'/i'/0/0`, both from the BIP39 seed (empty password).

use bech32::{ToBase32, Variant};
use bip39::{Language, Mnemonic, Seed};
use ed25519_dalek::Signer as _;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

use ledger_iov_apdu::{
    address::PublicKey, AccountIndex, Curve, COIN_TYPE, PURPOSE,
};

use crate::SimError;

/// Domain prefix for IOV ed25519 address hashing
const ED25519_ADDRESS_DOMAIN: &[u8] = b"sigs/ed25519/";

/// IOV addresses use the first 20 bytes of the condition hash
const ADDRESS_LEN: usize = 20;

/// Seeded key source
#[derive(Clone)]
pub struct Keys {
    seed: Vec<u8>,
}

impl Keys {
    /// Load keys from a BIP39 (english) mnemonic phrase
    pub fn from_phrase(phrase: &str) -> Result<Self, SimError> {
        let m = Mnemonic::from_phrase(phrase, Language::English)
            .map_err(|e| SimError::Mnemonic(e.to_string()))?;
        let seed = Seed::new(&m, "");

        Ok(Self {
            seed: seed.as_bytes().to_vec(),
        })
    }

    /// Derive the ed25519 signing key for an account
    pub fn ed25519(&self, index: AccountIndex) -> ed25519_dalek::SigningKey {
        let k = slip10_ed25519::derive_ed25519_private_key(
            &self.seed,
            &[PURPOSE, COIN_TYPE, index.value()],
        );
        ed25519_dalek::SigningKey::from_bytes(&k)
    }

    /// Derive the secp256k1 signing key for an account
    pub fn secp256k1(&self, index: AccountIndex) -> Result<k256::ecdsa::SigningKey, SimError> {
        let path = format!("m/{PURPOSE}'/{COIN_TYPE}'/{index}'/0/0").parse()?;
        let k = bip32::XPrv::derive_from_path(&self.seed, &path)?;

        Ok(k.private_key().clone())
    }

    /// Fetch the public key for an account on the provided curve
    pub fn public_key(&self, curve: Curve, index: AccountIndex) -> Result<PublicKey, SimError> {
        let k = match curve {
            Curve::Ed25519 => PublicKey::Ed25519(self.ed25519(index).verifying_key().to_bytes()),
            Curve::Secp256k1 => {
                let k = self.secp256k1(index)?;
                let p = k.verifying_key().to_encoded_point(true);

                PublicKey::from_slice(Curve::Secp256k1, p.as_bytes())?
            }
        };

        Ok(k)
    }

    /// Sign a message for an account.
    ///
    /// Ed25519 signs the SHA-512 prehash of the message (64 byte signature),
    /// secp256k1 signs with SHA-256 and returns a DER encoded signature.
    pub fn sign(&self, curve: Curve, index: AccountIndex, msg: &[u8]) -> Result<Vec<u8>, SimError> {
        match curve {
            Curve::Ed25519 => {
                let h = Sha512::digest(msg);
                let s = self.ed25519(index).sign(&h);
                Ok(s.to_bytes().to_vec())
            }
            Curve::Secp256k1 => {
                let s: k256::ecdsa::Signature = self.secp256k1(index)?.sign(msg);
                Ok(s.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// Encode the bech32 address for a public key
pub fn address(hrp: &str, pubkey: &PublicKey) -> Result<String, SimError> {
    let h = match pubkey {
        PublicKey::Ed25519(k) => {
            let mut d = Sha256::new();
            d.update(ED25519_ADDRESS_DOMAIN);
            d.update(k);
            d.finalize()[..ADDRESS_LEN].to_vec()
        }
        PublicKey::Secp256k1(k) => Ripemd160::digest(Sha256::digest(k)).to_vec(),
    };

    let a = bech32::encode(hrp, h.to_base32(), Variant::Bech32)?;

    Ok(a)
}
