// Copyright (c) 2022-2023 IOV SAS

use std::fmt::{Debug, Display};

use clap::Parser;
use log::{debug, info, LevelFilter};
use strum::Display as StrumDisplay;

use ledger_iov::{
    apdu::Hrp,
    transport::{GenericTransport, TcpOptions},
    App, Connect, DeviceHandle, Dialect, Exchange, Filter, LedgerInfo, LedgerProvider,
};
use ledger_iov_sim::DEFAULT_MNEMONIC;

/// Test CLI arguments
#[derive(Clone, Debug, Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub test: Tests,

    /// Target for test execution
    #[clap(long, value_enum, default_value = "tcp", env)]
    pub target: Filter,

    /// App dialect
    #[clap(long, default_value = "secp256k1-bech32", env)]
    pub dialect: Dialect,

    /// Address prefix override (prefixed dialects only)
    #[clap(long, env)]
    pub prefix: Option<Hrp>,

    /// TCP connection options
    #[clap(flatten)]
    pub tcp: TcpOptions,

    /// bip39 Mnemonic (must be shared between test util and target)
    #[clap(long, env, default_value = DEFAULT_MNEMONIC)]
    pub mnemonic: String,

    /// Log level
    #[clap(long, default_value = "debug", env)]
    pub log_level: LevelFilter,

    /// Enable logging for transports
    #[clap(long)]
    pub log_transports: bool,
}

/// Test modes
#[derive(Clone, PartialEq, Debug, Parser, StrumDisplay)]
pub enum Tests {
    /// Test version and app info
    Version,
    /// Test public key and address derivation
    Address {
        /// Number of accounts to derive
        #[clap(long, default_value = "4")]
        n: u32,
    },
    /// Test signing
    Sign {
        /// Account index
        #[clap(long, default_value = "0")]
        account: u32,

        /// Message to sign
        #[clap(long, default_value = "{\"chain_id\":\"iov-lovenet\"}")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load command line options
    let opts = Opts::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    if !opts.log_transports {
        c.add_filter_ignore_str("ledger_iov::transport");
    }

    let _ = simplelog::SimpleLogger::init(opts.log_level, c.build());

    debug!("options: {:?}", opts);

    info!("Running test '{}' via {}", opts.test, opts.target);

    let mut app = App::new(opts.dialect);
    if let Some(p) = &opts.prefix {
        app = app.try_with_prefix(p.clone())?;
    }

    // Connect to target and execute test
    let p = LedgerProvider::new()?;

    let devices = match opts.target {
        Filter::Tcp => vec![LedgerInfo::Tcp(opts.tcp.clone())],
        f => p.list_devices(f).await,
    };

    let d = match devices.first() {
        Some(d) => d,
        None => return Err(anyhow::anyhow!("No devices found")),
    };

    info!("Using device: {}", d);

    let h = Connect::<GenericTransport>::connect(&p, d, app).await?;

    execute(h, opts).await?;

    log::info!("Test OK!");

    Ok(())
}

/// Execute a test with the provided handle
async fn execute<T>(h: DeviceHandle<T>, opts: Opts) -> anyhow::Result<()>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug + Send + Sync + 'static,
{
    use ledger_iov_tests::*;

    match opts.test {
        Tests::Version => {
            version::test(&h).await?;
        }
        Tests::Address { n } => address::test(&h, &opts.mnemonic, 0..n).await?,
        Tests::Sign { account, message } => {
            sign::test(&h, account, message.as_bytes()).await?;
        }
    }

    Ok(())
}
