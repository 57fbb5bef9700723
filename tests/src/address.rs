// Copyright (c) 2022-2023 IOV SAS

//! Public key and address derivation tests

use std::fmt::{Debug, Display};

use log::info;

use ledger_iov::{apdu::AccountIndex, DeviceHandle, Exchange};
use ledger_iov_sim::keys::{address, Keys};

use crate::check;

/// Fetch public keys and addresses for the provided accounts,
/// checking these match software derivation from the mnemonic
pub async fn test<T>(
    h: &DeviceHandle<T>,
    mnemonic: &str,
    accounts: impl IntoIterator<Item = u32>,
) -> anyhow::Result<()>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug + Send + Sync + 'static,
{
    let keys = Keys::from_phrase(mnemonic)?;
    let curve = h.app().dialect().curve();

    // The simple app selects its prefix from the build mode
    let hrp = match h.app().prefix() {
        Some(p) => p.to_string(),
        None => match check(h.version().await?)?.test_mode {
            true => "tiov".to_string(),
            false => "iov".to_string(),
        },
    };

    for i in accounts {
        let index = AccountIndex::new(i)?;

        let expected_key = keys.public_key(curve, index)?;
        let expected_address = address(&hrp, &expected_key)?;

        let a = check(h.address(index, false).await?)?;

        info!("account {}: {} ({})", i, a.address, a.pubkey);

        anyhow::ensure!(
            a.pubkey == expected_key,
            "public key mismatch for account {}: {} (expected {})",
            i,
            a.pubkey,
            expected_key
        );
        anyhow::ensure!(
            a.address == expected_address,
            "address mismatch for account {}: {} (expected {})",
            i,
            a.address,
            expected_address
        );
    }

    Ok(())
}
