// Copyright (c) 2022-2023 IOV SAS

//! Command line utility for interacting with the IOV / Starname ledger apps

use std::{
    fmt::{Debug, Display},
    path::PathBuf,
};

use anyhow::anyhow;
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use serde::Serialize;

use ledger_iov::{
    apdu::{AccountIndex, Hrp},
    transport::{GenericTransport, TcpOptions},
    App, Connect, DeviceHandle, Dialect, Exchange, Filter, LedgerInfo, LedgerProvider, Reply,
    REQUEST_TIMEOUT_S, USER_TIMEOUT_S,
};

mod helpers;
use helpers::*;

/// Ledger command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Supported transports for ledger discovery
    #[clap(long, value_enum, default_value = "any")]
    target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0")]
    device_index: usize,

    /// App dialect
    #[clap(long, default_value = "secp256k1-bech32")]
    dialect: Dialect,

    /// Address prefix override (prefixed dialects only)
    #[clap(long)]
    prefix: Option<Hrp>,

    /// TCP connection options (used with `--target tcp`)
    #[clap(flatten)]
    tcp: TcpOptions,

    /// APDU request timeout (seconds)
    #[clap(long, default_value_t = REQUEST_TIMEOUT_S)]
    request_timeout: usize,

    /// User interaction timeout (seconds)
    #[clap(long, default_value_t = USER_TIMEOUT_S)]
    user_timeout: usize,

    /// Write JSON encoded results to file
    #[clap(long)]
    output: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available devices
    List,

    /// Fetch application version
    Version,

    /// Fetch application info
    AppInfo,

    /// Fetch public key and address
    Address {
        /// BIP44 account index
        #[clap(long, default_value = "0")]
        account: AccountIndex,

        /// Display and confirm the address on the device
        #[clap(long)]
        confirm: bool,
    },

    /// Sign a message
    Sign {
        /// BIP44 account index
        #[clap(long, default_value = "0")]
        account: AccountIndex,

        /// Hex encoded message
        #[clap(long, group = "message")]
        hex: Option<HexData>,

        /// Base64 encoded message
        #[clap(long, group = "message")]
        base64: Option<B64Data>,

        /// File containing the message
        #[clap(long, group = "message")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    // Setup app descriptor
    let mut app = App::new(args.dialect);
    if let Some(p) = &args.prefix {
        app = app.try_with_prefix(p.clone())?;
    }

    // Connect to ledger device
    let p = LedgerProvider::new()?;

    debug!("Using transport: {:?}", args.target);

    // List available devices, using explicit options for TCP
    let devices = match args.target {
        Filter::Tcp => vec![LedgerInfo::Tcp(args.tcp.clone())],
        _ => p.list_devices(args.target).await,
    };
    if devices.is_empty() {
        return Err(anyhow!("No devices found"));
    }

    // Handle list command
    if args.cmd == Actions::List {
        info!("Devices:");
        for (i, d) in devices.iter().enumerate() {
            info!("  {}: {}", i, d);
        }

        return Ok(());
    }

    // Select device by index
    if args.device_index >= devices.len() {
        return Err(anyhow!(
            "Invalid device index: {} (max: {})",
            args.device_index,
            devices.len() - 1
        ));
    }

    debug!(
        "Using device {}: {}",
        args.device_index, devices[args.device_index]
    );

    // Connect to device
    let t = match Connect::<GenericTransport>::connect(&p, &devices[args.device_index], app).await
    {
        Ok(v) => v,
        Err(e) => {
            error!(
                "Failed to connect to device: {}",
                devices[args.device_index]
            );
            return Err(e.into());
        }
    };

    let t = t.with_timeouts(args.request_timeout, args.user_timeout);

    // Execute command
    execute(t, args.cmd, args.output).await?;

    Ok(())
}

/// Execute a command with the provided transport
async fn execute<T>(t: DeviceHandle<T>, cmd: Actions, output: Option<PathBuf>) -> anyhow::Result<()>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug + Send + Sync + 'static,
{
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Version => {
            let v = check(t.version().await?)?;

            info!(
                "version: {} (test mode: {}, locked: {}, target: {})",
                v.version(),
                v.test_mode,
                v.device_locked,
                v.target_id.as_deref().unwrap_or("unknown")
            );

            write(&output, &v)?;
        }
        Actions::AppInfo => {
            let i = check(t.app_info().await?)?;

            info!("app info: {:#?}", i);

            write(&output, &i)?;
        }
        Actions::Address { account, confirm } => {
            info!("requesting address for account: {}", account);

            let a = check(t.address(account, confirm).await?)?;

            info!("public key: {}", a.pubkey);
            info!("address: {}", a.address);

            write(&output, &a)?;
        }
        Actions::Sign {
            account,
            hex,
            base64,
            file,
        } => {
            let m = match (hex, base64, file) {
                (Some(h), _, _) => h.0,
                (_, Some(b), _) => b.0,
                (_, _, Some(f)) => std::fs::read(f)?,
                _ => return Err(anyhow!("--hex, --base64 or --file message required")),
            };

            info!("signing {} byte message with account: {}", m.len(), account);

            let s = check(t.sign(account, &m).await?)?;

            info!("signature: {}", s);

            write(&output, &s)?;
        }
        Actions::List => (),
    }

    Ok(())
}

/// Convert device-reported failures to errors
fn check<T>(r: Reply<T>) -> anyhow::Result<T> {
    r.map_err(|e| anyhow!("Device error: {}", e))
}

/// Write output where requested
fn write<T: Serialize>(output: &Option<PathBuf>, value: &T) -> anyhow::Result<()> {
    match output {
        Some(p) => write_output(p, value),
        None => Ok(()),
    }
}
