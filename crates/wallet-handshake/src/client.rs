//! Handshake controller
//!
//! Owns the state machine, the persisted records and the link opener. Each
//! connect attempt gets a fresh key pair and an attempt id that travels in
//! the redirect link, so a late redirect from an older attempt cannot
//! complete against a newer key pair.

use crypto_session::{CryptoError, Envelope, KeyPair, SharedSecret, decode_public_key, encode_base58};
use deeplink_protocol::{
    ATTEMPT_PARAM, AttemptId, Cluster, ConnectRequest, ConnectResponse, DeepLinkBuilder,
    EncryptedRequest, HandshakeState, MessageDisplay, ProtocolError, RedirectOutcome,
    RedirectParams, SendOptions, SessionPayload, SignAndSendPayload, SignAndSendResponse,
    SignMessagePayload, SignMessageResponse, WalletSession,
};
use serde::{Serialize, de::DeserializeOwned};
use session_store::{HandshakeStore, KeyValueStore};
use tracing::{error, info, warn};
use url::Url;

use crate::{Capability, HandshakeConfig, HandshakeError, HandshakeResult, LinkOpener, routes};

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeStatus {
    pub state: HandshakeState,
    pub cluster: Cluster,
    pub wallet_address: Option<String>,
    pub connected_at_ms: Option<u64>,
    pub expires_at_ms: Option<u64>,
}

/// Everything needed to talk to the wallet inside an established session
struct ActiveSession {
    session: WalletSession,
    keypair: KeyPair,
    secret: SharedSecret,
}

/// Phantom deep-link handshake client
pub struct HandshakeClient<S: KeyValueStore, O: LinkOpener> {
    config: HandshakeConfig,
    links: DeepLinkBuilder,
    store: HandshakeStore<S>,
    opener: O,
    state: HandshakeState,
    /// Attempt whose disconnect redirect has not arrived yet
    disconnect_attempt: Option<AttemptId>,
}

impl<S: KeyValueStore, O: LinkOpener> HandshakeClient<S, O> {
    /// Create a client, resuming whatever the store already holds
    pub fn new(mut config: HandshakeConfig, store: HandshakeStore<S>, opener: O) -> HandshakeResult<Self> {
        config.normalize();
        let links = DeepLinkBuilder::with_base(&config.wallet_base)?;
        let store = store.with_expiry(config.session_expiry);

        let mut client = Self {
            config,
            links,
            store,
            opener,
            state: HandshakeState::Idle,
            disconnect_attempt: None,
        };
        client.state = client.resume_state()?;
        Ok(client)
    }

    fn resume_state(&self) -> HandshakeResult<HandshakeState> {
        if self.store.retrieve_session()?.is_some() {
            return Ok(HandshakeState::SessionEstablished);
        }
        if self.store.retrieve_keypair()?.is_some() {
            return Ok(HandshakeState::ConnectUrlSent);
        }
        Ok(HandshakeState::Idle)
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn store(&self) -> &HandshakeStore<S> {
        &self.store
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Attempt a connect, sign or message redirect must carry right now
    pub fn current_attempt(&self) -> HandshakeResult<Option<AttemptId>> {
        Ok(self.store.retrieve_keypair()?.map(|stored| stored.attempt_id))
    }

    /// Attempt a disconnect redirect must carry right now
    pub fn disconnect_attempt(&self) -> Option<AttemptId> {
        self.disconnect_attempt
    }

    /// Start a new attempt and hand the connect link to the opener
    ///
    /// Any previous key pair or session is discarded first.
    pub fn connect(&mut self) -> HandshakeResult<Url> {
        self.state.transition(HandshakeState::Idle)?;
        self.store.clear_session()?;

        let keypair = KeyPair::generate()?;
        let attempt_id = AttemptId::new();
        self.store.store_keypair(attempt_id, &keypair)?;
        self.state.transition(HandshakeState::KeypairGenerated)?;
        info!(%attempt_id, cluster = %self.config.cluster, "Starting wallet handshake");
        if self.opener.capability() == Capability::Unavailable {
            warn!("No link opener available; the connect link must be opened manually");
        }

        let result = self
            .redirect_link(routes::CONNECTED, attempt_id)
            .and_then(|redirect_link| {
                let url = self.links.connect_url(&ConnectRequest {
                    dapp_public_key: keypair.public_key_bytes(),
                    app_url: self.config.app_url.clone(),
                    redirect_link,
                    cluster: self.config.cluster,
                })?;
                self.opener.open(&url)?;
                Ok(url)
            });

        match result {
            Ok(url) => {
                self.state.transition(HandshakeState::ConnectUrlSent)?;
                Ok(url)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Complete the pending attempt from the wallet's redirect
    ///
    /// A redirect for another attempt, or one without a wallet response
    /// (reload, prefetch), is rejected without touching the pending attempt.
    /// Any other failure ends the attempt and wipes its key pair; a new
    /// attempt must start from [`connect`](Self::connect).
    pub fn complete_connect(&mut self, params: &RedirectParams) -> HandshakeResult<WalletSession> {
        let pending = self
            .store
            .retrieve_keypair()?
            .ok_or(HandshakeError::NoPendingAttempt)?;

        if params.attempt_id() != Some(pending.attempt_id) {
            warn!(
                expected = %pending.attempt_id,
                received = ?params.attempt,
                "Ignoring redirect from another attempt"
            );
            return Err(HandshakeError::StaleAttempt {
                expected: pending.attempt_id,
                received: params.attempt.clone(),
            });
        }

        if !params.is_response() {
            warn!(attempt = %pending.attempt_id, "Ignoring redirect without a wallet response");
            return Err(HandshakeError::NoResponse);
        }

        self.state.transition(HandshakeState::ResponseReceived)?;

        match self.establish(params, &pending.keypair, pending.attempt_id) {
            Ok(session) => {
                self.state.transition(HandshakeState::SessionEstablished)?;
                info!(wallet = %session.wallet_address, "Wallet connected");
                Ok(session)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn establish(
        &self,
        params: &RedirectParams,
        keypair: &KeyPair,
        attempt_id: AttemptId,
    ) -> HandshakeResult<WalletSession> {
        let (peer_public_key, nonce, data) = match params.outcome()? {
            RedirectOutcome::Rejected { code, message } => {
                return Err(HandshakeError::WalletRejected {
                    code,
                    message: message.unwrap_or_default(),
                });
            }
            RedirectOutcome::Encrypted {
                peer_public_key,
                nonce,
                data,
            } => (
                peer_public_key.ok_or(ProtocolError::MissingField("phantom_encryption_public_key"))?,
                nonce,
                data,
            ),
        };

        let secret = SharedSecret::derive(&peer_public_key, keypair)?;
        let response: ConnectResponse = Envelope::from_base58(&data, &nonce)?.open(&secret)?;

        decode_public_key(&response.public_key).map_err(|_| {
            CryptoError::MalformedResponse("wallet address is not a 32-byte base58 key".into())
        })?;

        let session = WalletSession {
            attempt_id,
            session: response.session,
            wallet_address: response.public_key,
            peer_public_key,
            created_at_ms: self.store.now_ms(),
        };
        self.store.store_session(&session)?;
        Ok(session)
    }

    fn fail(&mut self, err: HandshakeError) -> HandshakeError {
        warn!("Wallet handshake failed: {}", err);
        if self.state.can_transition_to(HandshakeState::HandshakeFailed) {
            self.state = HandshakeState::HandshakeFailed;
        }
        if let Err(clear_err) = self.store.clear_session() {
            error!("Failed to clear handshake storage: {}", clear_err);
        }
        err
    }

    /// Current session; an expired one reads as `None`
    pub fn session(&mut self) -> HandshakeResult<Option<WalletSession>> {
        let session = self.store.retrieve_session()?;
        if session.is_none() && self.state == HandshakeState::SessionEstablished {
            info!("Wallet session no longer valid");
            self.state = HandshakeState::Idle;
        }
        Ok(session)
    }

    pub fn is_connected(&mut self) -> HandshakeResult<bool> {
        Ok(self.session()?.is_some())
    }

    pub fn status(&mut self) -> HandshakeResult<HandshakeStatus> {
        let session = self.session()?;
        let expiry = self.store.expiry();
        Ok(HandshakeStatus {
            state: self.state,
            cluster: self.config.cluster,
            wallet_address: session.as_ref().map(|s| s.wallet_address.clone()),
            connected_at_ms: session.as_ref().map(|s| s.created_at_ms),
            expires_at_ms: session
                .as_ref()
                .zip(expiry)
                .map(|(s, window)| s.created_at_ms.saturating_add(window.as_millis() as u64)),
        })
    }

    fn active(&mut self) -> HandshakeResult<ActiveSession> {
        let session = self.session()?.ok_or(HandshakeError::NotConnected)?;
        let stored = self
            .store
            .retrieve_keypair()?
            .filter(|stored| stored.attempt_id == session.attempt_id)
            .ok_or(HandshakeError::NotConnected)?;
        let secret = SharedSecret::derive(&session.peer_public_key, &stored.keypair)?;

        Ok(ActiveSession {
            session,
            keypair: stored.keypair,
            secret,
        })
    }

    fn encrypted_request<T: Serialize>(
        &self,
        active: &ActiveSession,
        payload: &T,
        route: &str,
    ) -> HandshakeResult<EncryptedRequest> {
        Ok(EncryptedRequest {
            dapp_public_key: active.keypair.public_key_bytes(),
            envelope: Envelope::seal(payload, &active.secret)?,
            redirect_link: self.redirect_link(route, active.session.attempt_id)?,
        })
    }

    /// Ask the wallet to sign and submit a serialized transaction
    pub fn sign_and_send(
        &mut self,
        transaction: &[u8],
        send_options: Option<SendOptions>,
    ) -> HandshakeResult<Url> {
        let active = self.active()?;
        let payload = SignAndSendPayload {
            transaction: encode_base58(transaction),
            session: active.session.session.clone(),
            send_options,
        };
        let request = self.encrypted_request(&active, &payload, routes::SIGNED)?;
        let url = self.links.sign_and_send_url(&request)?;

        self.opener.open(&url)?;
        info!(tx_len = transaction.len(), "Sent sign-and-send request");
        Ok(url)
    }

    /// Ask the wallet to sign an arbitrary message
    pub fn sign_message(&mut self, message: &[u8], display: MessageDisplay) -> HandshakeResult<Url> {
        let active = self.active()?;
        let payload = SignMessagePayload {
            message: encode_base58(message),
            session: active.session.session.clone(),
            display,
        };
        let request = self.encrypted_request(&active, &payload, routes::MESSAGE_SIGNED)?;
        let url = self.links.sign_message_url(&request)?;

        self.opener.open(&url)?;
        info!(message_len = message.len(), "Sent sign-message request");
        Ok(url)
    }

    /// Decrypt the wallet's answer to [`sign_and_send`](Self::sign_and_send)
    pub fn complete_sign_and_send(&mut self, params: &RedirectParams) -> HandshakeResult<SignAndSendResponse> {
        let response: SignAndSendResponse = self.open_response(params)?;
        info!(signature = %response.signature, "Transaction submitted by wallet");
        Ok(response)
    }

    /// Decrypt the wallet's answer to [`sign_message`](Self::sign_message)
    pub fn complete_sign_message(&mut self, params: &RedirectParams) -> HandshakeResult<SignMessageResponse> {
        self.open_response(params)
    }

    fn open_response<T: DeserializeOwned>(&mut self, params: &RedirectParams) -> HandshakeResult<T> {
        let active = self.active()?;

        if params.attempt_id() != Some(active.session.attempt_id) {
            return Err(HandshakeError::StaleAttempt {
                expected: active.session.attempt_id,
                received: params.attempt.clone(),
            });
        }

        if !params.is_response() {
            return Err(HandshakeError::NoResponse);
        }

        match params.outcome()? {
            RedirectOutcome::Rejected { code, message } => Err(HandshakeError::WalletRejected {
                code,
                message: message.unwrap_or_default(),
            }),
            RedirectOutcome::Encrypted { nonce, data, .. } => {
                Ok(Envelope::from_base58(&data, &nonce)?.open(&active.secret)?)
            }
        }
    }

    /// Tell the wallet to end the session, then drop all local state
    ///
    /// Returns the disconnect link when there was a session to end. Local
    /// state is cleared even if opening the link fails.
    pub fn disconnect(&mut self) -> HandshakeResult<Option<Url>> {
        let outcome = match self.active() {
            Ok(active) => {
                let payload = SessionPayload {
                    session: active.session.session.clone(),
                };
                let issued = self
                    .encrypted_request(&active, &payload, routes::DISCONNECTED)
                    .and_then(|request| Ok(self.links.disconnect_url(&request)?))
                    .and_then(|url| {
                        self.opener.open(&url)?;
                        Ok(Some(url))
                    });
                if issued.is_ok() {
                    self.disconnect_attempt = Some(active.session.attempt_id);
                }
                issued
            }
            Err(HandshakeError::NotConnected) => Ok(None),
            Err(e) => Err(e),
        };

        self.store.clear_session()?;
        self.state.transition(HandshakeState::Idle)?;
        info!("Wallet disconnected");
        outcome
    }

    /// Check the redirect that follows a disconnect request
    ///
    /// Only the attempt of the last disconnect link issued is accepted, once.
    pub fn complete_disconnect(&mut self, params: &RedirectParams) -> HandshakeResult<()> {
        let expected = self
            .disconnect_attempt
            .ok_or(HandshakeError::NoPendingAttempt)?;
        if params.attempt_id() != Some(expected) {
            return Err(HandshakeError::StaleAttempt {
                expected,
                received: params.attempt.clone(),
            });
        }
        self.disconnect_attempt = None;

        match params.outcome() {
            Ok(RedirectOutcome::Rejected { code, message }) => Err(HandshakeError::WalletRejected {
                code,
                message: message.unwrap_or_default(),
            }),
            // Phantom redirects without data on success
            _ => Ok(()),
        }
    }

    fn redirect_link(&self, route: &str, attempt_id: AttemptId) -> HandshakeResult<Url> {
        let mut url = self
            .config
            .redirect_base
            .join(route)
            .map_err(ProtocolError::from)?;
        url.query_pairs_mut()
            .append_pair(ATTEMPT_PARAM, &attempt_id.to_string());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;
    use session_store::{ManualClock, MemoryStore};

    use super::*;
    use crate::RecordingOpener;

    type TestClient = HandshakeClient<Arc<MemoryStore>, Arc<RecordingOpener>>;

    struct Harness {
        kv: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        opener: Arc<RecordingOpener>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                kv: Arc::new(MemoryStore::new()),
                clock: Arc::new(ManualClock::new(1_700_000_000_000)),
                opener: Arc::new(RecordingOpener::new()),
            }
        }

        fn client(&self) -> TestClient {
            let store = HandshakeStore::new(self.kv.clone()).with_clock(self.clock.clone());
            HandshakeClient::new(HandshakeConfig::default(), store, self.opener.clone()).unwrap()
        }
    }

    /// Plays the wallet's side of the protocol
    struct MockWallet {
        keypair: KeyPair,
        address: String,
        session: String,
    }

    impl MockWallet {
        fn new() -> Self {
            Self {
                keypair: KeyPair::generate().unwrap(),
                address: KeyPair::generate().unwrap().public_key_base58(),
                session: "phantom-session-7f3a".into(),
            }
        }

        fn query(url: &Url) -> HashMap<String, String> {
            url.query_pairs().into_owned().collect()
        }

        fn redirect(request: &Url, extra: &[(&str, String)]) -> RedirectParams {
            let mut redirect = Url::parse(&Self::query(request)["redirect_link"]).unwrap();
            {
                let mut pairs = redirect.query_pairs_mut();
                for (key, value) in extra {
                    pairs.append_pair(key, value);
                }
            }
            RedirectParams::from_url(&redirect)
        }

        fn secret_for(&self, request: &Url) -> SharedSecret {
            SharedSecret::derive(&Self::query(request)["dapp_encryption_public_key"], &self.keypair)
                .unwrap()
        }

        fn respond<T: Serialize>(&self, request: &Url, body: &T) -> RedirectParams {
            let envelope = Envelope::seal(body, &self.secret_for(request)).unwrap();
            Self::redirect(
                request,
                &[
                    ("phantom_encryption_public_key", self.keypair.public_key_base58()),
                    ("nonce", envelope.nonce_base58()),
                    ("data", envelope.encrypted_payload_base58()),
                ],
            )
        }

        fn approve_connect(&self, connect_url: &Url) -> RedirectParams {
            self.respond(
                connect_url,
                &ConnectResponse {
                    public_key: self.address.clone(),
                    session: self.session.clone(),
                },
            )
        }

        fn reject(&self, request: &Url) -> RedirectParams {
            Self::redirect(
                request,
                &[
                    ("errorCode", "4001".into()),
                    ("errorMessage", "User rejected the request.".into()),
                ],
            )
        }

        fn read_payload<T: DeserializeOwned>(&self, request: &Url) -> T {
            let q = Self::query(request);
            Envelope::from_base58(&q["payload"], &q["nonce"])
                .unwrap()
                .open(&self.secret_for(request))
                .unwrap()
        }
    }

    fn connected() -> (Harness, TestClient, MockWallet) {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();

        let url = client.connect().unwrap();
        client.complete_connect(&wallet.approve_connect(&url)).unwrap();
        (harness, client, wallet)
    }

    #[test]
    fn test_connect_handshake() {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();
        assert_eq!(client.state(), HandshakeState::Idle);

        let url = client.connect().unwrap();
        assert_eq!(client.state(), HandshakeState::ConnectUrlSent);
        assert_eq!(harness.opener.last(), Some(url.clone()));
        assert_eq!(url.path(), "/ul/v1/connect");

        let q = MockWallet::query(&url);
        assert_eq!(q["cluster"], "mainnet-beta");
        assert!(q["redirect_link"].starts_with("http://127.0.0.1:8787/phantom/connected?attempt="));

        let session = client.complete_connect(&wallet.approve_connect(&url)).unwrap();
        assert_eq!(client.state(), HandshakeState::SessionEstablished);
        assert_eq!(session.wallet_address, wallet.address);
        assert_eq!(session.session, wallet.session);
        assert_eq!(session.peer_public_key, wallet.keypair.public_key_base58());
        assert_eq!(session.created_at_ms, 1_700_000_000_000);

        assert_eq!(client.session().unwrap(), Some(session));
    }

    #[test]
    fn test_secret_key_never_in_links() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let secret = harness
            .kv
            .get(session_store::keys::DAPP_SECRET_KEY)
            .unwrap()
            .unwrap();
        assert!(!url.as_str().contains(&secret));
    }

    #[test]
    fn test_wallet_rejection_fails_attempt() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let err = client.complete_connect(&MockWallet::new().reject(&url)).unwrap_err();
        match err {
            HandshakeError::WalletRejected { code, message } => {
                assert_eq!(code, "4001");
                assert_eq!(message, "User rejected the request.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(client.state(), HandshakeState::HandshakeFailed);
        assert!(harness.kv.is_empty());
    }

    #[test]
    fn test_tampered_response_is_authentication_failure() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let mut params = MockWallet::new().approve_connect(&url);
        let mut data = crypto_session::decode_base58(params.data.as_ref().unwrap()).unwrap();
        data[0] ^= 0x01;
        params.data = Some(encode_base58(&data));

        let err = client.complete_connect(&params).unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(client.state(), HandshakeState::HandshakeFailed);
        assert!(client.store().retrieve_keypair().unwrap().is_none());

        // The attempt is over; the same redirect cannot be retried
        assert!(matches!(
            client.complete_connect(&params),
            Err(HandshakeError::NoPendingAttempt)
        ));
    }

    #[test]
    fn test_malformed_response_is_distinct() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let params = MockWallet::new().respond(&url, &json!({"hello": "world"}));
        let err = client.complete_connect(&params).unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::Crypto(CryptoError::MalformedResponse(_))
        ));
        assert!(!err.is_authentication_failure());
        assert_eq!(client.state(), HandshakeState::HandshakeFailed);
    }

    #[test]
    fn test_invalid_wallet_address_rejected() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let params = MockWallet::new().respond(
            &url,
            &ConnectResponse {
                public_key: "short".into(),
                session: "s".into(),
            },
        );
        assert!(matches!(
            client.complete_connect(&params),
            Err(HandshakeError::Crypto(CryptoError::MalformedResponse(_)))
        ));
    }

    #[test]
    fn test_missing_peer_key_fails() {
        let harness = Harness::new();
        let mut client = harness.client();
        let url = client.connect().unwrap();

        let mut params = MockWallet::new().approve_connect(&url);
        params.phantom_encryption_public_key = None;
        assert!(matches!(
            client.complete_connect(&params),
            Err(HandshakeError::Protocol(ProtocolError::MissingField(_)))
        ));
    }

    #[test]
    fn test_stale_attempt_rejected() {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();

        let first = client.connect().unwrap();
        let second = client.connect().unwrap();

        let err = client.complete_connect(&wallet.approve_connect(&first)).unwrap_err();
        assert!(matches!(err, HandshakeError::StaleAttempt { .. }));
        assert_eq!(client.state(), HandshakeState::ConnectUrlSent);

        client.complete_connect(&wallet.approve_connect(&second)).unwrap();
        assert_eq!(client.state(), HandshakeState::SessionEstablished);
    }

    #[test]
    fn test_replayed_redirect_does_not_disturb_session() {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();

        let url = client.connect().unwrap();
        let params = wallet.approve_connect(&url);
        let session = client.complete_connect(&params).unwrap();

        assert!(matches!(
            client.complete_connect(&params),
            Err(HandshakeError::Protocol(ProtocolError::InvalidStateTransition { .. }))
        ));
        assert_eq!(client.session().unwrap(), Some(session));
    }

    #[test]
    fn test_completion_in_another_process() {
        let harness = Harness::new();
        let wallet = MockWallet::new();

        let url = harness.client().connect().unwrap();

        let mut resumed = harness.client();
        assert_eq!(resumed.state(), HandshakeState::ConnectUrlSent);
        resumed.complete_connect(&wallet.approve_connect(&url)).unwrap();

        assert_eq!(harness.client().state(), HandshakeState::SessionEstablished);
    }

    #[test]
    fn test_complete_without_attempt() {
        let harness = Harness::new();
        let mut client = harness.client();
        assert!(matches!(
            client.complete_connect(&RedirectParams::default()),
            Err(HandshakeError::NoPendingAttempt)
        ));
    }

    #[test]
    fn test_session_expiry() {
        let (harness, mut client, _) = connected();

        harness.clock.advance(300_001);
        assert_eq!(client.session().unwrap(), None);
        assert_eq!(client.state(), HandshakeState::Idle);
        assert!(harness.kv.is_empty());
        assert!(matches!(
            client.sign_and_send(b"tx", None),
            Err(HandshakeError::NotConnected)
        ));
    }

    #[test]
    fn test_status_snapshot() {
        let (_, mut client, wallet) = connected();
        let status = client.status().unwrap();

        assert_eq!(status.state, HandshakeState::SessionEstablished);
        assert_eq!(status.wallet_address, Some(wallet.address));
        assert_eq!(status.connected_at_ms, Some(1_700_000_000_000));
        assert_eq!(status.expires_at_ms, Some(1_700_000_300_000));
    }

    #[test]
    fn test_sign_and_send_round_trip() {
        let (harness, mut client, wallet) = connected();
        let transaction = vec![1u8, 0, 2, 3, 5, 8, 13, 21];

        let url = client
            .sign_and_send(
                &transaction,
                Some(SendOptions {
                    skip_preflight: Some(false),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(harness.opener.last(), Some(url.clone()));
        assert_eq!(url.path(), "/ul/v1/signAndSendTransaction");

        let payload: SignAndSendPayload = wallet.read_payload(&url);
        assert_eq!(payload.transaction, encode_base58(&transaction));
        assert_eq!(payload.session, wallet.session);
        assert_eq!(payload.send_options.unwrap().skip_preflight, Some(false));

        let response = wallet.respond(&url, &json!({"signature": "5VERv8NMvzbJMEkV8xnrLkEaWRtSz9CosKDYjCJjBRnbJLgp8uirBgmQpjKhoR4tjF3ZpRzrFmBV6UjKdiSZkQUW"}));
        let signed = client.complete_sign_and_send(&response).unwrap();
        assert!(signed.signature.starts_with("5VERv8"));
    }

    #[test]
    fn test_sign_message_round_trip() {
        let (_, mut client, wallet) = connected();

        let url = client
            .sign_message(b"CCOIN airdrop claim", MessageDisplay::Utf8)
            .unwrap();
        let payload: SignMessagePayload = wallet.read_payload(&url);
        assert_eq!(payload.message, encode_base58(b"CCOIN airdrop claim"));
        assert_eq!(payload.display, MessageDisplay::Utf8);

        let response = wallet.respond(&url, &json!({"signature": "sig", "publicKey": wallet.address}));
        let signed = client.complete_sign_message(&response).unwrap();
        assert_eq!(signed.public_key, wallet.address);
    }

    #[test]
    fn test_sign_rejection_keeps_session() {
        let (_, mut client, wallet) = connected();
        let url = client.sign_and_send(b"tx", None).unwrap();

        assert!(matches!(
            client.complete_sign_and_send(&wallet.reject(&url)),
            Err(HandshakeError::WalletRejected { .. })
        ));
        assert!(client.is_connected().unwrap());
    }

    #[test]
    fn test_sign_response_for_other_attempt() {
        let (_, mut client, wallet) = connected();
        let url = client.sign_and_send(b"tx", None).unwrap();

        let mut response = wallet.respond(&url, &json!({"signature": "sig"}));
        response.attempt = Some(AttemptId::new().to_string());
        assert!(matches!(
            client.complete_sign_and_send(&response),
            Err(HandshakeError::StaleAttempt { .. })
        ));
    }

    #[test]
    fn test_requests_require_session() {
        let harness = Harness::new();
        let mut client = harness.client();
        assert!(matches!(
            client.sign_message(b"m", MessageDisplay::Hex),
            Err(HandshakeError::NotConnected)
        ));
        assert!(harness.opener.opened().is_empty());
    }

    #[test]
    fn test_disconnect() {
        let (harness, mut client, wallet) = connected();
        let attempt = client.session().unwrap().unwrap().attempt_id;

        let url = client.disconnect().unwrap().unwrap();
        assert_eq!(url.path(), "/ul/v1/disconnect");
        let payload: SessionPayload = wallet.read_payload(&url);
        assert_eq!(payload.session, wallet.session);

        assert_eq!(client.state(), HandshakeState::Idle);
        assert!(harness.kv.is_empty());
        assert!(client.session().unwrap().is_none());
        assert!(client.store().retrieve_keypair().unwrap().is_none());

        assert_eq!(client.disconnect().unwrap(), None);
        assert_eq!(client.disconnect_attempt(), Some(attempt));
    }

    #[test]
    fn test_disconnect_redirect_checks_attempt() {
        let (_, mut client, _) = connected();
        let attempt = client.session().unwrap().unwrap().attempt_id;
        let url = client.disconnect().unwrap().unwrap();

        let forged = RedirectParams::from_query(&format!("attempt={}", AttemptId::new()));
        assert!(matches!(
            client.complete_disconnect(&forged),
            Err(HandshakeError::StaleAttempt { .. })
        ));

        let ack = MockWallet::redirect(&url, &[]);
        assert_eq!(ack.attempt_id(), Some(attempt));
        client.complete_disconnect(&ack).unwrap();

        // Acknowledged once only
        assert!(matches!(
            client.complete_disconnect(&ack),
            Err(HandshakeError::NoPendingAttempt)
        ));
    }

    #[test]
    fn test_disconnect_redirect_without_request() {
        let harness = Harness::new();
        let mut client = harness.client();
        assert!(matches!(
            client.complete_disconnect(&RedirectParams::from_query("attempt=junk")),
            Err(HandshakeError::NoPendingAttempt)
        ));
    }

    #[test]
    fn test_redirect_without_response_keeps_attempt() {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();
        let url = client.connect().unwrap();

        // Reloading the bare redirect link carries only the attempt id
        let bare = MockWallet::redirect(&url, &[]);
        assert!(matches!(
            client.complete_connect(&bare),
            Err(HandshakeError::NoResponse)
        ));
        assert_eq!(client.state(), HandshakeState::ConnectUrlSent);
        assert!(client.store().retrieve_keypair().unwrap().is_some());

        client.complete_connect(&wallet.approve_connect(&url)).unwrap();
        assert_eq!(client.state(), HandshakeState::SessionEstablished);
    }

    #[test]
    fn test_sign_redirect_without_response() {
        let (_, mut client, _) = connected();
        let url = client.sign_and_send(b"tx", None).unwrap();

        assert!(matches!(
            client.complete_sign_and_send(&MockWallet::redirect(&url, &[])),
            Err(HandshakeError::NoResponse)
        ));
        assert!(client.is_connected().unwrap());
    }

    #[test]
    fn test_status_expiry_saturates() {
        let harness = Harness::new();
        harness.clock.set(u64::MAX - 10);
        let mut client = harness.client();
        let wallet = MockWallet::new();

        let url = client.connect().unwrap();
        client.complete_connect(&wallet.approve_connect(&url)).unwrap();
        assert_eq!(client.status().unwrap().expires_at_ms, Some(u64::MAX));
    }

    #[test]
    fn test_reconnect_after_failure() {
        let harness = Harness::new();
        let mut client = harness.client();
        let wallet = MockWallet::new();

        let url = client.connect().unwrap();
        client.complete_connect(&wallet.reject(&url)).unwrap_err();

        let retry = client.connect().unwrap();
        assert_ne!(
            MockWallet::query(&retry)["dapp_encryption_public_key"],
            MockWallet::query(&url)["dapp_encryption_public_key"]
        );
        client.complete_connect(&wallet.approve_connect(&retry)).unwrap();
    }
}
