// Copyright (c) 2022-2023 IOV SAS

use std::{str::FromStr, sync::Arc};

use log::{debug, LevelFilter};
use portpicker::pick_unused_port;
use simplelog::SimpleLogger;
use tokio::net::TcpListener;

use ledger_iov::{
    transport::{TcpOptions, TransportTcp},
    App, DeviceHandle,
};
use ledger_iov_sim::{server::serve, SimDevice, SimOptions, DEFAULT_MNEMONIC};

/// Setup logging from the `LOG_LEVEL` environment variable
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Info,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Setup an in-process software device with a handle for the provided app
#[allow(unused)]
pub fn setup_sim(opts: SimOptions, app: impl Into<App>) -> DeviceHandle<SimDevice> {
    setup_logging();

    let d = SimDevice::new(DEFAULT_MNEMONIC, opts).expect("Failed to create sim device");

    DeviceHandle::new(d, app)
}

/// Serve a software device over TCP, returning the connection options
#[allow(unused)]
pub async fn spawn_tcp(opts: SimOptions) -> TcpOptions {
    setup_logging();

    let d = SimDevice::new(DEFAULT_MNEMONIC, opts).expect("Failed to create sim device");

    // Find open port and start server
    let port = pick_unused_port().expect("No free ports");
    let tcp = TcpOptions {
        port,
        ..Default::default()
    };

    let l = TcpListener::bind(tcp.socket_addr())
        .await
        .expect("Failed to bind sim listener");

    debug!("Sim listening on port {}", port);

    tokio::spawn(serve(l, Arc::new(d)));

    tcp
}

/// Connect a handle to a served software device
#[allow(unused)]
pub async fn connect_tcp(tcp: TcpOptions, app: impl Into<App>) -> DeviceHandle<TransportTcp> {
    let t = TransportTcp::new(tcp).await.expect("APDU connection failed");

    DeviceHandle::new(t, app)
}

/// Setup a software device served over TCP, returning a connected handle
#[allow(unused)]
pub async fn setup_tcp(opts: SimOptions, app: impl Into<App>) -> DeviceHandle<TransportTcp> {
    let tcp = spawn_tcp(opts).await;

    connect_tcp(tcp, app).await
}

/// IOV testnet (`iov-lovenet`) send transaction
#[allow(unused)]
pub const TESTNET_TX: &str = "00cafe000b696f762d6c6f76656e657400000000000000009a03380a020801121473f16e71d0878f6ad26531e174452aec9161e8d41a14000000000000000000000000000000000000000022061a0443415348";

/// IOV mainnet send transaction
#[allow(unused)]
pub const MAINNET_TX: &str = "00cafe000b696f762d6d61696e6e6574001fffffffffffff0a231214bad055e2cbcffc633e7dc76dc1148d6e9a2debfd1a0b1080c2d72f1a04434153489a03560a0208011214bad055e2cbcffc633e7dc76dc1148d6e9a2debfd1a14020daec62066ec82a5a1b40378d87457ed88e4fc220d0807108088debe011a03494f562a1574657874207769746820656d6f6a693a20f09f908e";

/// Starname amino JSON sign document
#[allow(unused)]
pub const STARNAME_SIGN_DOC: &str = r#"{"account_number":"0","chain_id":"iov-mainnet-ibc","fee":{"amount":[{"amount":"1000","denom":"uiov"}],"gas":"200000"},"memo":"ledger test","msgs":[{"type":"cosmos-sdk/MsgSend","value":{"amount":[{"amount":"1000000","denom":"uiov"}],"from_address":"star1mpkcl3y2wh22z5zx2ay0ptfa2gn44luvkhvam2","to_address":"star1akddshykr55rynsdjukw6rd7qjtc6vgy8pt3aj"}}],"sequence":"0"}"#;
