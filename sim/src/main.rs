// Copyright (c) 2022-2023 IOV SAS

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use log::{debug, info, LevelFilter};
use tokio::net::TcpListener;

use ledger_iov_apdu::Dialect;
use ledger_iov_sim::{server::serve, Fault, SimDevice, SimOptions, DEFAULT_MNEMONIC};

/// IOV / Starname software ledger
///
/// Emulates the selected ledger app, serving APDUs over the
/// speculos TCP protocol for use with `ledger-iov-cli --target tcp`.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// App dialect to emulate
    #[clap(long, default_value = "secp256k1-bech32")]
    dialect: Dialect,

    /// bip39 mnemonic for key derivation
    #[clap(long, env, default_value = DEFAULT_MNEMONIC)]
    mnemonic: String,

    /// Listen address for APDU connections
    #[clap(long, default_value = "127.0.0.1:9999")]
    listen: SocketAddr,

    /// Report a testnet build
    #[clap(long)]
    test_mode: bool,

    /// Emulate a locked device
    #[clap(long)]
    locked: bool,

    /// Reject all user confirmations
    #[clap(long)]
    reject: bool,

    /// Inject a status word at the provided sign chunk index
    #[clap(long, requires = "fault_status")]
    fault_chunk: Option<usize>,

    /// Status word for injected faults (hex)
    #[clap(long, value_parser = parse_status)]
    fault_status: Option<u16>,

    /// Diagnostic message returned with injected faults
    #[clap(long, default_value = "")]
    fault_message: String,

    /// Delay before answering each request (milliseconds)
    #[clap(long)]
    delay_ms: Option<u64>,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn parse_status(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    // Setup device
    let fault = match (args.fault_chunk, args.fault_status) {
        (Some(chunk), Some(status)) => Some(Fault {
            chunk,
            status,
            payload: args.fault_message.into_bytes(),
        }),
        _ => None,
    };

    let opts = SimOptions {
        test_mode: args.test_mode,
        locked: args.locked,
        reject: args.reject,
        fault,
        delay: args.delay_ms.map(Duration::from_millis),
        ..SimOptions::new(args.dialect)
    };

    info!("Emulating {} app ({})", args.dialect, opts.app_name());

    let d = Arc::new(SimDevice::new(&args.mnemonic, opts)?);

    let l = TcpListener::bind(args.listen).await?;

    // Serve until exit signal
    tokio::select!(
        r = serve(l, d) => {
            r?;
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}
