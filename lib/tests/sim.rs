// Copyright (c) 2022-2023 IOV SAS

//! Protocol engine tests against the in-process software device

use strum::IntoEnumIterator;

use ledger_iov::{
    apdu::{status::*, StatusCode},
    App, Dialect, ErrorState,
};
use ledger_iov_sim::{Fault, SimOptions, DEFAULT_MNEMONIC};
use ledger_iov_tests::{address, sign, version};

mod helpers;
use helpers::{setup_sim, STARNAME_SIGN_DOC, TESTNET_TX};

/// Message spanning multiple sign chunks
fn long_message() -> Vec<u8> {
    let mut m = b"{\"chain_id\":\"iov-mainnet\",\"memo\":\"".to_vec();
    m.extend(std::iter::repeat(b'x').take(600));
    m.extend_from_slice(b"\"}");
    m
}

#[tokio::test]
async fn version_all_dialects() -> anyhow::Result<()> {
    for d in Dialect::iter() {
        let h = setup_sim(SimOptions::new(d), d);

        let v = version::test(&h).await?;
        assert_eq!(v.version(), "2.1.0");
        assert!(!v.device_locked);
    }

    Ok(())
}

#[tokio::test]
async fn address_all_dialects() -> anyhow::Result<()> {
    for d in Dialect::iter() {
        let h = setup_sim(SimOptions::new(d), d);

        address::test(&h, DEFAULT_MNEMONIC, 0..4).await?;
    }

    Ok(())
}

#[tokio::test]
async fn address_vectors() -> anyhow::Result<()> {
    let h = setup_sim(
        SimOptions::new(Dialect::Secp256k1Bech32),
        Dialect::Secp256k1Bech32,
    );

    let a = h.address(0u32, false).await?.unwrap();
    assert_eq!(
        a.pubkey.to_string(),
        "02de309420851a7ac52501ee7187d066138cd63c8722439f1293301fc3272d6873"
    );
    assert_eq!(a.address, "star1akddshykr55rynsdjukw6rd7qjtc6vgy8pt3aj");

    let h = setup_sim(
        SimOptions::new(Dialect::Ed25519ChainAware),
        Dialect::Ed25519ChainAware,
    );

    let a = h.address(1u32, false).await?.unwrap();
    assert_eq!(
        a.pubkey.to_string(),
        "554fad2f6caba103828f758864029e91e7b197585b333a2e278e698ae3026fac"
    );
    assert_eq!(a.address, "iov1k8m6vts583v8geppvzkn06tyn9eex2y93ehh9g");

    Ok(())
}

#[tokio::test]
async fn address_testnet_prefixes() -> anyhow::Result<()> {
    // Simple app selects the prefix from its build mode
    let mut o = SimOptions::new(Dialect::Ed25519Simple);
    o.test_mode = true;

    let h = setup_sim(o, Dialect::Ed25519Simple);
    let a = h.address(0u32, false).await?.unwrap();
    assert_eq!(a.address, "tiov1k0vm2nh5cr0np0acepcfemqdjg2kvfy2h7vge5");

    // Prefixed apps use the host supplied prefix
    let app = App::new(Dialect::Ed25519ChainAware).with_prefix("tiov".parse()?);
    let h = setup_sim(SimOptions::new(Dialect::Ed25519ChainAware), app);
    let a = h.address(0u32, false).await?.unwrap();
    assert_eq!(a.address, "tiov1k0vm2nh5cr0np0acepcfemqdjg2kvfy2h7vge5");

    Ok(())
}

#[tokio::test]
async fn address_confirm_rejected() -> anyhow::Result<()> {
    let mut o = SimOptions::new(Dialect::Secp256k1Bech32);
    o.reject = true;

    let h = setup_sim(o, Dialect::Secp256k1Bech32);

    // Rejection only applies to confirmations
    assert!(h.address(0u32, false).await?.is_ok());

    let e = h.address(0u32, true).await?.unwrap_err();
    assert_eq!(e.return_code, StatusCode(SW_TX_REJECTED));
    assert_eq!(e.error_message, "Transaction rejected");

    Ok(())
}

#[tokio::test]
async fn address_invalid_index() {
    let h = setup_sim(SimOptions::new(Dialect::Ed25519Simple), Dialect::Ed25519Simple);

    for i in [-1i64, 1 << 31] {
        let e = h.address(i, false).await.unwrap_err();
        assert!(e.is_invalid_argument());
    }

    let e = h.address(0.5f64, false).await.unwrap_err();
    assert!(e.is_invalid_argument());

    // Largest valid index
    assert!(h.address(0x7fff_ffffu32, false).await.unwrap().is_ok());
}

#[tokio::test]
async fn sign_all_dialects() -> anyhow::Result<()> {
    let msgs = [b"{}".to_vec(), long_message()];

    for d in Dialect::iter() {
        let h = setup_sim(SimOptions::new(d), d);

        for m in &msgs {
            let s = sign::test(&h, 2, m).await?;
            assert_eq!(s.bytes.len(), 64);
        }
    }

    Ok(())
}

#[tokio::test]
async fn sign_testnet_transaction() -> anyhow::Result<()> {
    let mut o = SimOptions::new(Dialect::Ed25519Simple);
    o.test_mode = true;

    let h = setup_sim(o, Dialect::Ed25519Simple);

    // Verified against the SHA-512 prehash of the transaction
    let tx = hex::decode(TESTNET_TX)?;
    sign::test(&h, 0, &tx).await?;

    Ok(())
}

#[tokio::test]
async fn sign_starname_document() -> anyhow::Result<()> {
    let h = setup_sim(
        SimOptions::new(Dialect::Secp256k1Bech32),
        Dialect::Secp256k1Bech32,
    );

    let s = sign::test(&h, 5, STARNAME_SIGN_DOC.as_bytes()).await?;
    assert_eq!(s.bytes.len(), 64);

    Ok(())
}

#[tokio::test]
async fn sign_message_too_long() {
    let h = setup_sim(SimOptions::new(Dialect::Ed25519Simple), Dialect::Ed25519Simple);

    let e = h.sign(0u32, &vec![0u8; 250 * 255]).await.unwrap_err();
    assert!(e.is_invalid_argument());

    // Tagged dialects have no chunk count limit
    let h = setup_sim(
        SimOptions::new(Dialect::Ed25519ChainAware),
        Dialect::Ed25519ChainAware,
    );
    assert!(h.sign(0u32, &vec![0u8; 250 * 255]).await.unwrap().is_ok());
}

#[tokio::test]
async fn sign_user_rejected() -> anyhow::Result<()> {
    for d in Dialect::iter() {
        let mut o = SimOptions::new(d);
        o.reject = true;

        let h = setup_sim(o, d);

        let e = h.sign(0u32, &long_message()).await?.unwrap_err();
        assert_eq!(
            e,
            ErrorState::with_message(StatusCode(SW_TX_REJECTED), "Transaction rejected")
        );
    }

    Ok(())
}

#[tokio::test]
async fn sign_validation_failures() -> anyhow::Result<()> {
    // Tagged dialects carry diagnostics for 0x6984 and 0x6a80
    for d in [Dialect::Ed25519ChainAware, Dialect::Secp256k1Bech32] {
        for (status, description) in [
            (SW_DATA_INVALID, "Data is invalid"),
            (SW_BAD_KEY_HANDLE, "Bad key handle"),
        ] {
            let mut o = SimOptions::new(d);
            o.fault = Some(Fault {
                chunk: 1,
                status,
                payload: b"Unexpected chain_id".to_vec(),
            });

            let h = setup_sim(o, d);

            let e = h.sign(0u32, &long_message()).await?.unwrap_err();
            assert_eq!(e.return_code, StatusCode(status));
            assert_eq!(
                e.error_message,
                format!("{description} : Unexpected chain_id")
            );
        }
    }

    // The simple dialect only for 0x6a80
    let mut o = SimOptions::new(Dialect::Ed25519Simple);
    o.fault = Some(Fault {
        chunk: 2,
        status: SW_BAD_KEY_HANDLE,
        payload: b"bad path".to_vec(),
    });

    let h = setup_sim(o, Dialect::Ed25519Simple);
    let e = h.sign(0u32, &long_message()).await?.unwrap_err();
    assert_eq!(e.error_message, "Bad key handle : bad path");

    let mut o = SimOptions::new(Dialect::Ed25519Simple);
    o.fault = Some(Fault {
        chunk: 1,
        status: SW_DATA_INVALID,
        payload: b"ignored".to_vec(),
    });

    let h = setup_sim(o, Dialect::Ed25519Simple);
    let e = h.sign(0u32, &long_message()).await?.unwrap_err();
    assert_eq!(e.error_message, "Data is invalid");

    Ok(())
}

#[tokio::test]
async fn sign_empty_diagnostic() -> anyhow::Result<()> {
    let mut o = SimOptions::new(Dialect::Secp256k1Bech32);
    o.fault = Some(Fault {
        chunk: 1,
        status: SW_DATA_INVALID,
        payload: vec![],
    });

    let h = setup_sim(o, Dialect::Secp256k1Bech32);
    let e = h.sign(0u32, b"{}").await?.unwrap_err();
    assert_eq!(e.error_message, "Data is invalid");

    Ok(())
}

#[tokio::test]
async fn locked_device() -> anyhow::Result<()> {
    let mut o = SimOptions::new(Dialect::Ed25519ChainAware);
    o.locked = true;

    let h = setup_sim(o, Dialect::Ed25519ChainAware);

    let v = h.version().await?.unwrap();
    assert!(v.device_locked);

    let e = h.address(0u32, false).await?.unwrap_err();
    assert_eq!(e.return_code, StatusCode(SW_CONDITIONS_NOT_SATISFIED));

    let e = h.sign(0u32, b"{}").await?.unwrap_err();
    assert_eq!(e.return_code, StatusCode(SW_CONDITIONS_NOT_SATISFIED));

    Ok(())
}

#[tokio::test]
async fn app_not_open() -> anyhow::Result<()> {
    // Host configured for a different app to the device
    let h = setup_sim(
        SimOptions::new(Dialect::Secp256k1Bech32),
        Dialect::Ed25519ChainAware,
    );

    let e = h.version().await?.unwrap_err();
    assert_eq!(
        e,
        ErrorState::with_message(
            StatusCode(SW_APP_NOT_OPEN),
            "Ledger app does not seem to be open"
        )
    );

    // App info is served on the generic class
    let i = h.app_info().await?.unwrap();
    assert_eq!(i.name, "Starname");

    Ok(())
}

#[tokio::test]
async fn concurrent_operations_serialize() -> anyhow::Result<()> {
    let h = setup_sim(
        SimOptions::new(Dialect::Secp256k1Bech32),
        Dialect::Secp256k1Bech32,
    );

    // Interleaved chunks would corrupt device state
    let tasks: Vec<_> = (0..4u32)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move { sign::test(&h, i, &long_message()).await })
        })
        .collect();

    for t in tasks {
        t.await??;
    }

    Ok(())
}
