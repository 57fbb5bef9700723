// Copyright (c) 2022-2023 IOV SAS

//! Version / app info tests

use std::fmt::{Debug, Display};

use log::info;

use ledger_iov::{apdu::version::VersionInfo, DeviceHandle, Exchange};

use crate::check;

/// Fetch version and app info, checking the reported versions agree
pub async fn test<T>(h: &DeviceHandle<T>) -> anyhow::Result<VersionInfo>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug + Send + Sync + 'static,
{
    let v = check(h.version().await?)?;

    info!(
        "version: {} (test mode: {}, locked: {}, target: {:?})",
        v.version(),
        v.test_mode,
        v.device_locked,
        v.target_id
    );

    let i = check(h.app_info().await?)?;

    info!("app: {} {} (flags: {:?})", i.name, i.version, i.flags);

    anyhow::ensure!(
        i.version == v.version(),
        "app info version {} does not match version {}",
        i.version,
        v.version()
    );

    Ok(v)
}
