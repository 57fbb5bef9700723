// Copyright (c) 2022-2023 IOV SAS

//! Handle for connected ledger devices
//!
//! This provides methods for interacting with the IOV / Starname apps
//! and is generic over [Exchange] transports.

use std::{fmt::Debug, fmt::Display, sync::Arc, time::Duration};

use ledger_transport::Exchange;
use log::{debug, trace, warn};
use tokio::sync::{Mutex, MutexGuard};

use ledger_iov_apdu::prelude::*;

use crate::{sign::sign_chunks, Error};

/// Default timeout for APDU requests
pub const REQUEST_TIMEOUT_S: usize = 2;

/// Default timeout for requests requiring user interaction
pub const USER_TIMEOUT_S: usize = 30;

/// IOV handle for a connected ledger device.
///
/// This is generic over [Exchange] types to support different
/// underlying transports. Clones share the transport, with each
/// operation holding the transport lock for its full exchange sequence.
///
/// A timed out exchange leaves the device reply in flight, so after any
/// [Error::RequestTimeout] the session is poisoned and all further
/// operations (on every clone) fail with [Error::SessionPoisoned] until
/// a new handle is connected.
///
/// Answers shorter than a status word are rejected by the transport when
/// building the [APDUAnswer](ledger_apdu::APDUAnswer) and so surface as
/// [Error::Transport].
pub struct DeviceHandle<T: Exchange> {
    /// Transport session for communication
    t: Arc<Mutex<Session<T>>>,
    /// App descriptor (dialect, prefix, chunking)
    app: App,
    /// Timeout for user acknowledgements
    user_timeout_s: usize,
    /// Timeout for APDU requests
    request_timeout_s: usize,
}

/// Transport with session state
pub(crate) struct Session<T> {
    pub(crate) t: T,
    /// Set once an exchange has timed out
    poisoned: bool,
}

impl<T> Session<T> {
    /// Poison the session if the operation timed out
    fn check<R, E>(&mut self, r: Result<R, Error<E>>) -> Result<R, Error<E>>
    where
        E: Display + Debug,
    {
        if let Err(Error::RequestTimeout) = &r {
            warn!("Request timed out, session poisoned");
            self.poisoned = true;
        }
        r
    }
}

impl<T: Exchange> Clone for DeviceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            t: self.t.clone(),
            app: self.app.clone(),
            user_timeout_s: self.user_timeout_s,
            request_timeout_s: self.request_timeout_s,
        }
    }
}

impl<T> DeviceHandle<T>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug,
{
    /// Create a new handle for the provided transport and app
    pub fn new(t: T, app: impl Into<App>) -> Self {
        Self {
            t: Arc::new(Mutex::new(Session { t, poisoned: false })),
            app: app.into(),
            user_timeout_s: USER_TIMEOUT_S,
            request_timeout_s: REQUEST_TIMEOUT_S,
        }
    }

    /// Set request and user interaction timeouts (in seconds)
    pub fn with_timeouts(mut self, request_timeout_s: usize, user_timeout_s: usize) -> Self {
        self.request_timeout_s = request_timeout_s;
        self.user_timeout_s = user_timeout_s;
        self
    }

    /// Fetch the app descriptor for this handle
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Helper to fetch user interaction timeout
    fn user_timeout(&self) -> Duration {
        Duration::from_secs(self.user_timeout_s as u64)
    }

    /// Helper to fetch APDU request timeout
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s as u64)
    }

    /// Check whether a previous timeout has poisoned this session
    pub async fn is_poisoned(&self) -> bool {
        self.t.lock().await.poisoned
    }

    /// Acquire the transport session, failing if it is poisoned
    async fn session(&self) -> Result<MutexGuard<'_, Session<T>>, Error<T::Error>> {
        let s = self.t.lock().await;
        match s.poisoned {
            true => Err(Error::SessionPoisoned),
            false => Ok(s),
        }
    }

    /// Fetch ledger application version
    pub async fn version(&self) -> Result<Reply<VersionInfo>, Error<T::Error>> {
        debug!("Requesting version ({})", self.app.dialect());

        let req = VersionReq::new(self.app.dialect());

        let mut s = self.session().await?;
        let r = request(&s.t, &req, self.request_timeout()).await;
        s.check(r)
    }

    /// Fetch ledger application info
    pub async fn app_info(&self) -> Result<Reply<AppInfo>, Error<T::Error>> {
        debug!("Requesting app info");

        let mut s = self.session().await?;
        let r = request(&s.t, &AppInfoReq {}, self.request_timeout()).await;
        s.check(r)
    }

    /// Fetch public key and address for the provided account index,
    /// optionally requiring on-device confirmation
    pub async fn address<I>(
        &self,
        index: I,
        confirm: bool,
    ) -> Result<Reply<AddressInfo>, Error<T::Error>>
    where
        I: TryInto<AccountIndex>,
        I::Error: Into<ApduError>,
    {
        let index = account_index(index)?;

        debug!("Requesting address for account: {} (confirm: {})", index, confirm);

        let req = AddressReq::new(&self.app, index, confirm)?;
        let timeout = match confirm {
            true => self.user_timeout(),
            false => self.request_timeout(),
        };

        let mut s = self.session().await?;
        let r = request(&s.t, &req, timeout).await;
        s.check(r)
    }

    /// Sign a message with the key for the provided account index
    pub async fn sign<I>(
        &self,
        index: I,
        message: &[u8],
    ) -> Result<Reply<Signature>, Error<T::Error>>
    where
        I: TryInto<AccountIndex>,
        I::Error: Into<ApduError>,
    {
        let index = account_index(index)?;

        debug!(
            "Signing {} byte message with account: {}",
            message.len(),
            index
        );

        let reqs = sign_requests(&self.app, index, message)?;

        let mut s = self.session().await?;
        let r = sign_chunks(&s.t, reqs, self.request_timeout(), self.user_timeout()).await;
        s.check(r)
    }
}

/// Convert a loosely typed account index
fn account_index<I>(index: I) -> Result<AccountIndex, ApduError>
where
    I: TryInto<AccountIndex>,
    I::Error: Into<ApduError>,
{
    index.try_into().map_err(|e| e.into())
}

/// Issue a single request and decode the response
pub(crate) async fn request<T, R>(
    t: &T,
    req: &R,
    timeout: Duration,
) -> Result<Reply<R::Output>, Error<T::Error>>
where
    T: Exchange + Send + Sync,
    T::Error: Display + Debug,
    R: ApduReq,
{
    let cmd = req.to_command()?;

    trace!(
        "Request {:02x} {:02x} {:02x} {:02x}: {:02x?}",
        cmd.cla,
        cmd.ins,
        cmd.p1,
        cmd.p2,
        cmd.data
    );

    let a = tokio::time::timeout(timeout, t.exchange(&cmd))
        .await?
        .map_err(Error::Transport)?;

    let resp = Response::new(a.data(), a.retcode());

    trace!("Response {}: {:02x?}", resp.status, resp.data);

    Ok(req.decode(&resp)?)
}

#[cfg(test)]
pub(crate) mod test {
    use std::{collections::VecDeque, ops::Deref, sync::Mutex as StdMutex};

    use async_trait::async_trait;
    use ledger_apdu::{APDUAnswer, APDUCommand};

    use ledger_iov_apdu::{Dialect, ErrorState, StatusCode};

    use super::*;

    /// Scripted transport, returning queued answers and recording commands
    #[derive(Default)]
    pub(crate) struct Scripted {
        pub answers: StdMutex<VecDeque<Vec<u8>>>,
        pub commands: StdMutex<Vec<APDUCommand<Vec<u8>>>>,
        pub delay: Option<Duration>,
    }

    impl Scripted {
        pub fn new(answers: &[&[u8]]) -> Self {
            Self {
                answers: StdMutex::new(answers.iter().map(|a| a.to_vec()).collect()),
                commands: StdMutex::new(vec![]),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Exchange for Scripted {
        type Error = String;
        type AnswerType = Vec<u8>;

        async fn exchange<I>(
            &self,
            command: &APDUCommand<I>,
        ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
        where
            I: Deref<Target = [u8]> + Send + Sync,
        {
            self.commands.lock().unwrap().push(APDUCommand {
                cla: command.cla,
                ins: command.ins,
                p1: command.p1,
                p2: command.p2,
                data: command.data.to_vec(),
            });

            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }

            let a = self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| "no answer".to_string())?;

            APDUAnswer::from_answer(a).map_err(|e| format!("{e:?}"))
        }
    }

    #[tokio::test]
    async fn version_request() {
        let h = DeviceHandle::new(
            Scripted::new(&[&[0x00, 0x01, 0x02, 0x03, 0x00, 0x90, 0x00]]),
            Dialect::Ed25519Simple,
        );

        let v = h.version().await.unwrap().unwrap();
        assert_eq!(v.version(), "1.2.3");
    }

    #[tokio::test]
    async fn address_invalid_index() {
        let h = DeviceHandle::new(Scripted::default(), Dialect::Ed25519Simple);

        let e = h.address(-1i64, false).await.unwrap_err();
        assert!(e.is_invalid_argument());

        let e = h.address(1.5f64, false).await.unwrap_err();
        assert!(matches!(
            e,
            Error::InvalidArgument(ApduError::IndexNotInteger)
        ));

        // Nothing sent to the device
        let s = h.t.lock().await;
        assert!(s.t.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn address_confirm() {
        let mut a = vec![0x01; 32];
        a.extend_from_slice(b"iov1xyz");
        a.extend_from_slice(&[0x90, 0x00]);

        let h = DeviceHandle::new(Scripted::new(&[&a]), Dialect::Ed25519ChainAware);

        let r = h.address(3u32, true).await.unwrap().unwrap();
        assert_eq!(r.address, "iov1xyz");

        let s = h.t.lock().await;
        let c = &s.t.commands.lock().unwrap()[0];
        assert_eq!((c.cla, c.ins, c.p1, c.p2), (0x22, 0x01, 1, 0));
        assert_eq!(
            hex::encode(&c.data),
            "2c000080ea00008003000080".to_string() + "03" + &hex::encode("iov")
        );
    }

    #[tokio::test]
    async fn unaccepted_status() {
        let h = DeviceHandle::new(Scripted::new(&[&[0x6e, 0x00]]), Dialect::Secp256k1Bech32);

        let e = h.address(0u32, false).await.unwrap().unwrap_err();
        assert_eq!(
            e,
            ErrorState::with_message(StatusCode(0x6e00), "Ledger app does not seem to be open")
        );
    }

    #[tokio::test]
    async fn transport_failure() {
        let h = DeviceHandle::new(Scripted::default(), Dialect::Secp256k1Bech32);

        assert!(matches!(
            h.app_info().await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn malformed_response() {
        let h = DeviceHandle::new(
            Scripted::new(&[&[0x00, 0x01, 0x90, 0x00]]),
            Dialect::Ed25519Simple,
        );

        assert!(matches!(
            h.version().await,
            Err(Error::MalformedResponse(ApduError::TooShort { .. }))
        ));
    }

    #[tokio::test]
    async fn short_answer() {
        let h = DeviceHandle::new(Scripted::new(&[&[0x90]]), Dialect::Ed25519Simple);

        assert!(matches!(h.version().await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn timeout_poisons_session() {
        let mut t = Scripted::new(&[
            &[0x00, 0x01, 0x02, 0x03, 0x00, 0x90, 0x00],
            &[0x6e, 0x00],
        ]);
        t.delay = Some(Duration::from_millis(1500));

        let h = DeviceHandle::new(t, Dialect::Ed25519Simple).with_timeouts(1, 1);
        let h2 = h.clone();

        assert!(matches!(h.version().await, Err(Error::RequestTimeout)));
        assert!(h.is_poisoned().await);

        // Later operations fail on every clone without reaching the device
        assert!(matches!(
            h.address(0u32, false).await,
            Err(Error::SessionPoisoned)
        ));
        assert!(matches!(
            h2.sign(0u32, b"{}").await,
            Err(Error::SessionPoisoned)
        ));

        let s = h.t.lock().await;
        assert_eq!(s.t.commands.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sign_message_too_long() {
        let h = DeviceHandle::new(Scripted::default(), Dialect::Ed25519Simple);

        let e = h.sign(0u32, &vec![0u8; 250 * 255]).await.unwrap_err();
        assert!(e.is_invalid_argument());
        assert!(matches!(
            e,
            Error::InvalidArgument(ApduError::MessageTooLong(256))
        ));

        let s = h.t.lock().await;
        assert!(s.t.commands.lock().unwrap().is_empty());
    }
}
