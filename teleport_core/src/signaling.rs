//! JSON-over-HTTPS signaling client.
//!
//! Three exchanges against a fixed API surface: PIN-for-token
//! authentication, connectivity-server configuration, and offer/answer
//! exchange. All share one request cycle: encode the JSON body, set the
//! credential header, POST, decode, and check the response's `success` flag
//! before trusting any other field.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = "AmpliFiTeleport/7 CFNetwork/1220.1 Darwin/20.3.0";

/// Credential header carried by every call; holds the PIN during
/// authentication and the device token afterwards.
const CREDENTIAL_HEADER: &str = "x-devicetoken";

const ACCESS_PATH: &str = "/api/deviceToken/mlRequestClientAccess";
const ICE_CONFIG_PATH: &str = "/api/deviceToken/mlIceConfig";
const CONNECT_PATH: &str = "/api/deviceToken/mlClientConnect";

/// Result type for signaling operations.
pub type SignalResult<T> = Result<T, SignalError>;

/// Errors from the signaling exchanges.
///
/// Transport failures are kept distinct from protocol rejections so callers
/// can tell a retryable network problem from a terminal `success:false`.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Request construction, network I/O or response-read failure.
    #[error("{operation}: transport failure: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Well-formed HTTP exchange whose body was not the expected JSON shape.
    #[error("{operation}: malformed response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The server answered with `success:false`; the reason is surfaced
    /// unmodified.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The underlying HTTP client could not be constructed.
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    success: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct IceConfigResponse {
    success: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    servers: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    success: bool,
    #[serde(default)]
    error: String,
    #[serde(default)]
    answer: String,
}

/// Stateless client for the router's signaling API.
#[derive(Debug, Clone)]
pub struct SignalClient {
    base_url: String,
    http: reqwest::Client,
}

impl SignalClient {
    /// Creates a client against `base_url` with a per-request `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SignalResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(SignalError::Client)?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(SignalClient { base_url, http })
    }

    /// Exchanges a one-time PIN for a persistent device token.
    pub async fn request_device_token(&self, client_hint: &str, pin: &str) -> SignalResult<String> {
        const OP: &str = "device token request";
        let body = serde_json::json!({ "client_hint": client_hint });
        let data = self.post(OP, ACCESS_PATH, pin, Some(body)).await?;

        let resp: AccessResponse = decode(OP, &data)?;
        if !resp.success {
            return Err(SignalError::Rejected {
                operation: OP,
                reason: resp.error,
            });
        }
        Ok(resp.client_id)
    }

    /// Fetches the connectivity-server descriptors for this negotiation.
    /// The list is opaque to this client; it is fed back verbatim into the
    /// offer/answer exchange.
    pub async fn ice_config(&self, token: &str) -> SignalResult<Value> {
        const OP: &str = "ICE config request";
        let data = self.post(OP, ICE_CONFIG_PATH, token, None).await?;

        let resp: IceConfigResponse = decode(OP, &data)?;
        if !resp.success {
            return Err(SignalError::Rejected {
                operation: OP,
                reason: resp.error,
            });
        }
        Ok(resp.servers)
    }

    /// Sends the enriched local offer and returns the remote answer text.
    pub async fn exchange_offer(
        &self,
        offer: &str,
        ice_servers: &Value,
        token: &str,
    ) -> SignalResult<String> {
        const OP: &str = "signaling connect";
        let body = serde_json::json!({
            "iceServers": ice_servers,
            "offer": offer,
        });
        let data = self.post(OP, CONNECT_PATH, token, Some(body)).await?;

        let resp: ConnectResponse = decode(OP, &data)?;
        if !resp.success {
            return Err(SignalError::Rejected {
                operation: OP,
                reason: resp.error,
            });
        }
        Ok(resp.answer)
    }

    async fn post(
        &self,
        operation: &'static str,
        path: &str,
        credential: &str,
        body: Option<Value>,
    ) -> SignalResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, operation, "signaling request");

        let request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(CREDENTIAL_HEADER, credential);
        let request = match body {
            Some(body) => request.json(&body),
            None => request.body(Vec::new()),
        };

        let response = request.send().await.map_err(|source| SignalError::Transport {
            operation,
            source,
        })?;
        let data = response.bytes().await.map_err(|source| SignalError::Transport {
            operation,
            source,
        })?;
        Ok(data.to_vec())
    }
}

fn decode<'a, T: Deserialize<'a>>(operation: &'static str, data: &'a [u8]) -> SignalResult<T> {
    serde_json::from_slice(data).map_err(|source| SignalError::Decode { operation, source })
}
