// Copyright (c) 2022-2023 IOV SAS

//! Software device emulating the IOV / Starname ledger applications.
//!
//! Keys are derived from a BIP39 mnemonic (see [keys]), requests are handled
//! per [Dialect] the way the device applications do, including chunk
//! reassembly for signing. The device implements [Exchange] for in-process
//! use and can be served over the speculos APDU socket protocol (see [server]).

use std::{ops::Deref, time::Duration};

use async_trait::async_trait;
use encdec::Encode;
use ledger_apdu::{APDUAnswer, APDUCommand};
use ledger_transport::Exchange;
use log::{debug, trace, warn};
use tokio::sync::Mutex;

use ledger_iov_apdu::{
    app_info::{AppFlags, AppInfo},
    address::AddressInfo,
    sign::ChunkPosition,
    status::*,
    version::VersionInfo,
    AccountIndex, ApduError, ApduHeader, Bip32Path, Dialect, Hrp, Instruction, Response,
    APP_INFO_CLA, APP_INFO_INS,
};

pub mod keys;
use keys::{address, Keys};

pub mod server;

/// Default mnemonic for simulated devices
pub const DEFAULT_MNEMONIC: &str =
    "tell fresh liquid vital machine rhythm uncle tomato grow room vacuum neutral";

/// Simulator errors
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("Key derivation failed: {0}")]
    Derivation(#[from] bip32::Error),

    #[error("Address encoding failed: {0}")]
    Address(#[from] bech32::Error),

    #[error("Protocol error: {0}")]
    Apdu(#[from] ApduError),

    #[error("Invalid answer")]
    InvalidAnswer,
}

/// Status (and optional diagnostic payload) injected at a sign chunk
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    /// Zero-based sign chunk index
    pub chunk: usize,
    /// Status word to return
    pub status: u16,
    /// Payload returned with the status
    pub payload: Vec<u8>,
}

/// Simulated device configuration
#[derive(Clone, Debug, PartialEq)]
pub struct SimOptions {
    /// Application dialect
    pub dialect: Dialect,
    /// Testnet build, selects the `tiov` prefix for the simple app
    pub test_mode: bool,
    /// Application version (major, minor, patch)
    pub version: (u8, u8, u8),
    /// Target id reported with the version (lowercase hex)
    pub target_id: Option<String>,
    /// Device locked, key operations fail with `0x6985`
    pub locked: bool,
    /// User rejects confirmations and signing with `0x6986`
    pub reject: bool,
    /// Fault injected during signing
    pub fault: Option<Fault>,
    /// Delay before answering each request
    pub delay: Option<Duration>,
}

impl SimOptions {
    /// Default options for the provided dialect
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            test_mode: false,
            version: (2, 1, 0),
            target_id: Some("31100004".to_string()),
            locked: false,
            reject: false,
            fault: None,
            delay: None,
        }
    }

    /// Application name reported via app-info
    pub fn app_name(&self) -> &'static str {
        match self.dialect {
            Dialect::Ed25519Simple | Dialect::Ed25519ChainAware => "IOV",
            Dialect::Secp256k1Bech32 => "Starname",
        }
    }
}

/// In-progress sign operation
#[derive(Clone, Debug)]
struct SignState {
    /// Next expected chunk index
    next: usize,
    /// Chunk count (simple dialect only)
    count: usize,
    /// Account from the path chunk
    index: AccountIndex,
    /// Message reassembled from chunks
    message: Vec<u8>,
}

/// Software device
pub struct SimDevice {
    keys: Keys,
    opts: SimOptions,
    sign: Mutex<Option<SignState>>,
    commands: Mutex<Vec<(ApduHeader, Vec<u8>)>>,
}

impl SimDevice {
    /// Create a device from a mnemonic phrase and options
    pub fn new(mnemonic: &str, opts: SimOptions) -> Result<Self, SimError> {
        Ok(Self {
            keys: Keys::from_phrase(mnemonic)?,
            opts,
            sign: Mutex::new(None),
            commands: Mutex::new(vec![]),
        })
    }

    /// Device options
    pub fn options(&self) -> &SimOptions {
        &self.opts
    }

    /// Device keys
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Commands received by the device, in order
    pub async fn commands(&self) -> Vec<(ApduHeader, Vec<u8>)> {
        self.commands.lock().await.clone()
    }

    /// Bech32 prefix used by the simple app
    fn simple_prefix(&self) -> &'static str {
        match self.opts.test_mode {
            true => "tiov",
            false => "iov",
        }
    }

    /// Handle a command, returning the raw answer (payload + status word)
    pub async fn handle(&self, h: ApduHeader, data: &[u8]) -> Vec<u8> {
        trace!(
            "sim rx {:02x} {:02x} {:02x} {:02x}: {:02x?}",
            h.cla,
            h.ins,
            h.p1,
            h.p2,
            data
        );

        self.commands.lock().await.push((h, data.to_vec()));

        if let Some(d) = self.opts.delay {
            tokio::time::sleep(d).await;
        }

        let (payload, status) = match self.dispatch(h, data).await {
            Ok(v) => (v, SW_OK),
            Err((status, payload)) => {
                debug!("sim returning status 0x{:04x}", status);
                (payload, status)
            }
        };

        Response::new(&payload, status).to_vec()
    }

    async fn dispatch(&self, h: ApduHeader, data: &[u8]) -> Result<Vec<u8>, (u16, Vec<u8>)> {
        let d = self.opts.dialect;

        // Generic app info, available regardless of app class
        if h.cla == APP_INFO_CLA {
            return match h.ins {
                APP_INFO_INS => self.app_info(),
                _ => Err((SW_INS_NOT_SUPPORTED, vec![])),
            };
        }

        if h.cla != d.cla() {
            return Err((SW_APP_NOT_OPEN, vec![]));
        }

        match Instruction::try_from(h.ins) {
            Ok(Instruction::GetVersion) => self.version(),
            Ok(i) if i == d.get_address_ins() => self.address(h, data),
            Ok(Instruction::Sign) => self.sign(h, data).await,
            _ => Err((SW_INS_NOT_SUPPORTED, vec![])),
        }
    }

    fn version(&self) -> Result<Vec<u8>, (u16, Vec<u8>)> {
        let (major, minor, patch) = self.opts.version;

        encode(&VersionInfo {
            test_mode: self.opts.test_mode,
            major,
            minor,
            patch,
            device_locked: self.opts.locked,
            target_id: self.opts.target_id.clone(),
        })
    }

    fn app_info(&self) -> Result<Vec<u8>, (u16, Vec<u8>)> {
        let (major, minor, patch) = self.opts.version;

        let mut flags = AppFlags::SIGNED_MCU_CODE | AppFlags::ONBOARDED;
        if !self.opts.locked {
            flags |= AppFlags::PIN_VALIDATED;
        }

        encode(&AppInfo::new(
            self.opts.app_name(),
            &format!("{major}.{minor}.{patch}"),
            flags,
        ))
    }

    fn address(&self, h: ApduHeader, data: &[u8]) -> Result<Vec<u8>, (u16, Vec<u8>)> {
        if self.opts.locked {
            return Err((SW_CONDITIONS_NOT_SATISFIED, vec![]));
        }

        let confirm = match h.p1 {
            0 => false,
            1 => true,
            _ => return Err((SW_INVALID_P1_P2, vec![])),
        };

        let (index, hrp) = self
            .parse_path(data)
            .map_err(|_| (SW_DATA_INVALID, vec![]))?;

        let curve = self.opts.dialect.curve();
        let pubkey = self.keys.public_key(curve, index).map_err(derive_failed)?;
        let address = address(&hrp, &pubkey).map_err(derive_failed)?;

        if confirm {
            debug!("sim confirm address: {}", address);

            if self.opts.reject {
                return Err((SW_TX_REJECTED, vec![]));
            }
        }

        encode(&AddressInfo { pubkey, address })
    }

    /// Parse a path chunk, with trailing prefix where the dialect has one
    fn parse_path(&self, data: &[u8]) -> Result<(AccountIndex, String), ApduError> {
        let d = self.opts.dialect;
        let n = d.path_words() * 4;

        if data.len() < n {
            return Err(ApduError::InvalidLength);
        }

        let (path, rest) = data.split_at(n);
        let (path, _) = <Bip32Path as encdec::DecodeOwned>::decode_owned(path)?;

        let hrp = match d.has_prefix() {
            true => {
                let (hrp, m) = <Hrp as encdec::DecodeOwned>::decode_owned(rest)?;
                if m != rest.len() {
                    return Err(ApduError::InvalidLength);
                }
                hrp.to_string()
            }
            false if rest.is_empty() => self.simple_prefix().to_string(),
            false => return Err(ApduError::InvalidLength),
        };

        Ok((path.account_index(), hrp))
    }

    async fn sign(&self, h: ApduHeader, data: &[u8]) -> Result<Vec<u8>, (u16, Vec<u8>)> {
        let d = self.opts.dialect;
        let mut state = self.sign.lock().await;

        // Chunk index and whether this is the final chunk
        let (index, last) = match d.tags_chunks() {
            true => match (ChunkPosition::try_from(h.p1), state.as_ref()) {
                (Ok(ChunkPosition::Init), _) => (0, false),
                (Ok(ChunkPosition::Add), Some(s)) => (s.next, false),
                (Ok(ChunkPosition::Last), Some(s)) => (s.next, true),
                _ => return Err((SW_INVALID_P1_P2, vec![])),
            },
            false => {
                if h.p1 == 0 || h.p1 > h.p2 {
                    return Err((SW_INVALID_P1_P2, vec![]));
                }
                (h.p1 as usize - 1, h.p1 == h.p2)
            }
        };

        if let Some(f) = self.opts.fault.as_ref().filter(|f| f.chunk == index) {
            warn!("sim injecting fault 0x{:04x} at chunk {}", f.status, index);
            *state = None;
            return Err((f.status, f.payload.clone()));
        }

        if index == 0 {
            if self.opts.locked {
                return Err((SW_CONDITIONS_NOT_SATISFIED, vec![]));
            }

            let (account, _hrp) = self
                .parse_path(data)
                .map_err(|e| (SW_BAD_KEY_HANDLE, e.to_string().into_bytes()))?;

            *state = Some(SignState {
                next: 1,
                count: h.p2 as usize,
                index: account,
                message: vec![],
            });
        } else {
            let s = match state.as_mut() {
                Some(s) if s.next == index && (d.tags_chunks() || s.count == h.p2 as usize) => s,
                _ => {
                    *state = None;
                    return Err((SW_INVALID_P1_P2, vec![]));
                }
            };

            s.message.extend_from_slice(data);
            s.next += 1;
        }

        // Only the final chunk produces a signature
        if !last {
            return Ok(vec![]);
        }

        let s = match state.take() {
            Some(s) => s,
            None => return Err((SW_INVALID_P1_P2, vec![])),
        };

        debug!(
            "sim signing {} byte message for account {}",
            s.message.len(),
            s.index
        );

        if self.opts.reject {
            return Err((SW_TX_REJECTED, vec![]));
        }

        self.keys
            .sign(d.curve(), s.index, &s.message)
            .map_err(derive_failed)
    }
}

/// Map key derivation / encoding failures to a device status
fn derive_failed(e: SimError) -> (u16, Vec<u8>) {
    warn!("sim key operation failed: {}", e);
    (SW_DERIVE_FAILED, vec![])
}

/// Encode a response payload
fn encode<E: Encode<Error = ApduError>>(v: &E) -> Result<Vec<u8>, (u16, Vec<u8>)> {
    let mut buff = vec![0u8; 256];

    match v.encode(&mut buff) {
        Ok(n) => {
            buff.truncate(n);
            Ok(buff)
        }
        Err(e) => {
            warn!("sim encode failed: {}", e);
            Err((SW_EXECUTION_ERROR, vec![]))
        }
    }
}

#[async_trait]
impl Exchange for SimDevice {
    type Error = SimError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        let h = ApduHeader {
            cla: command.cla,
            ins: command.ins,
            p1: command.p1,
            p2: command.p2,
        };

        let a = self.handle(h, &command.data).await;

        APDUAnswer::from_answer(a).map_err(|_| SimError::InvalidAnswer)
    }
}
