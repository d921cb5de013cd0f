//! Connection orchestration.
//!
//! Drives one provisioning attempt end to end: obtain or reuse a device
//! token, open a negotiation session, stabilize and enrich the local offer,
//! exchange it for the router's answer, wait for connectivity, extract the
//! negotiated endpoint and assemble the tunnel configuration. The session is
//! closed on every exit path.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, TeleportConfig};
use crate::credentials::{CredentialError, CredentialStore};
use crate::negotiation::{
    NegotiationEngine, NegotiationError, NegotiationSession, WebRtcEngine,
};
use crate::sdp::{self, SdpError};
use crate::signaling::{SignalClient, SignalError};
use crate::wg::{InterfaceConfig, KeyPair, PeerConfig};

/// Routing policy for provisioned tunnels: everything through the tunnel.
const ALLOW_ALL_TRAFFIC: &str = "0.0.0.0/0, ::/0";

/// Result type for connection attempts.
pub type ConnectOutcome<T> = Result<T, ConnectError>;

/// Terminal errors for a connection attempt, annotated with the phase that
/// failed so callers can decide between retrying plainly and re-pairing with
/// a fresh PIN.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Reconnect was requested without a PIN but no token is saved.
    #[error("no saved device token for profile {0:?}; supply a PIN to pair first")]
    NoSavedToken(String),

    /// Credential store failure.
    #[error("credential store: {0}")]
    Credentials(#[from] CredentialError),

    /// PIN authentication failed.
    #[error("authentication: {0}")]
    Authentication(#[source] SignalError),

    /// Signaling exchange failed after authentication.
    #[error("signaling: {0}")]
    Signaling(#[source] SignalError),

    /// The router's answer was missing mandatory tunnel attributes.
    #[error("parsing answer: {0}")]
    Answer(#[from] SdpError),

    /// Local negotiation, connectivity checking or endpoint extraction
    /// failed.
    #[error("negotiation: {0}")]
    Negotiation(#[from] NegotiationError),

    /// The supplied configuration was unusable.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Output of a successful connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectResult {
    /// Profile the attempt was made for.
    pub profile: String,
    /// Assembled tunnel configuration.
    pub config: InterfaceConfig,
}

impl ConnectResult {
    /// Renders the configuration to `.conf` text.
    pub fn render(&self) -> String {
        self.config.render()
    }
}

/// Orchestrates connection attempts against one router deployment.
pub struct Connector {
    config: TeleportConfig,
    signaling: SignalClient,
    credentials: CredentialStore,
    engine: Arc<dyn NegotiationEngine>,
}

impl Connector {
    /// Creates a connector with the production WebRTC engine.
    pub fn new(config: TeleportConfig) -> ConnectOutcome<Self> {
        Self::with_engine(config, Arc::new(WebRtcEngine::new()))
    }

    /// Creates a connector with a caller-supplied negotiation engine.
    pub fn with_engine(
        config: TeleportConfig,
        engine: Arc<dyn NegotiationEngine>,
    ) -> ConnectOutcome<Self> {
        config.validate()?;
        let signaling = SignalClient::new(config.api_base.clone(), config.http_timeout())
            .map_err(ConnectError::Signaling)?;
        let credentials = CredentialStore::new(config.credential_dir.clone());
        Ok(Connector {
            config,
            signaling,
            credentials,
            engine,
        })
    }

    /// Performs one full connection attempt for `profile`.
    ///
    /// With a PIN, authenticates first and saves the resulting device token
    /// for future reconnects; without one, reuses the saved token. Exactly
    /// one terminal error is produced per failed attempt, and the
    /// negotiation session is released whichever way the attempt ends.
    pub async fn connect(&self, profile: &str, pin: Option<&str>) -> ConnectOutcome<ConnectResult> {
        let token = self.obtain_token(profile, pin).await?;

        // Fresh key pair per attempt, never reused or persisted here
        let keys = KeyPair::generate();

        let session = self.engine.open_session(&self.config.bootstrap_server).await?;
        let outcome = self.negotiate(session.as_ref(), &token, &keys).await;
        if let Err(err) = session.close().await {
            warn!(profile, error = %err, "failed to close negotiation session");
        }
        let mut config = outcome?;
        config.name = profile.to_string();

        info!(profile, endpoint = %config.peers[0].endpoint, "tunnel configuration assembled");
        Ok(ConnectResult {
            profile: profile.to_string(),
            config,
        })
    }

    async fn obtain_token(&self, profile: &str, pin: Option<&str>) -> ConnectOutcome<String> {
        match pin {
            Some(pin) => {
                let identity = self.credentials.load_or_create_identity(profile)?;
                let token = self
                    .signaling
                    .request_device_token(&identity, pin)
                    .await
                    .map_err(ConnectError::Authentication)?;
                self.credentials.save_token(profile, &token)?;
                info!(profile, "device token obtained and saved");
                Ok(token)
            }
            None => match self.credentials.load_token(profile) {
                Ok(token) => {
                    debug!(profile, "reusing saved device token");
                    Ok(token)
                }
                Err(CredentialError::TokenNotFound(_)) => {
                    Err(ConnectError::NoSavedToken(profile.to_string()))
                }
                Err(err) => Err(ConnectError::Credentials(err)),
            },
        }
    }

    async fn negotiate(
        &self,
        session: &dyn NegotiationSession,
        token: &str,
        keys: &KeyPair,
    ) -> ConnectOutcome<InterfaceConfig> {
        let offer = session.create_local_offer().await?;
        debug!(bytes = offer.len(), "local offer stable after candidate gathering");

        let offer = sdp::inject_tunnel_info(
            &offer,
            &local_hostname(),
            &self.config.platform,
            &keys.public_key().to_base64(),
        );

        let servers = self
            .signaling
            .ice_config(token)
            .await
            .map_err(ConnectError::Signaling)?;
        let answer = self
            .signaling
            .exchange_offer(&offer, &servers, token)
            .await
            .map_err(ConnectError::Signaling)?;

        // Parse the vendor attributes before touching any session state, so
        // a malformed answer aborts with the engine still pristine
        let attrs = sdp::parse_tunnel_attributes(&answer)?;

        // Observer first: the state could transition before a later
        // registration and the completion would fire unobserved
        let watch = session.watch_connectivity().await;
        session.apply_remote_answer(answer).await?;
        watch.wait(self.config.connectivity_timeout()).await?;

        let endpoint = session.stats_snapshot().await.nominated_endpoint()?;
        info!(
            remote = %format!("{}:{}", endpoint.remote_addr, endpoint.remote_port),
            local_port = endpoint.local_port,
            "connectivity established"
        );

        Ok(InterfaceConfig {
            name: String::new(),
            private_key: keys.private_key().to_base64(),
            address: format!("{}/32", attrs.interface_addr),
            listen_port: endpoint.local_port,
            dns: attrs.dns_addr,
            mtu: 0,
            peers: vec![PeerConfig {
                public_key: attrs.remote_public_key,
                preshared_key: String::new(),
                allowed_ips: ALLOW_ALL_TRAFFIC.to_string(),
                endpoint: format!("{}:{}", endpoint.remote_addr, endpoint.remote_port),
                persistent_keepalive: 0,
            }],
        })
    }
}

/// Best-effort local hostname for the friendly-name attribute; the router
/// only displays it.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}
