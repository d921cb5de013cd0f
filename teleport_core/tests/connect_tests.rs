//! End-to-end orchestration tests with a mocked signaling server and a
//! mocked negotiation engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teleport_core::config::TeleportConfig;
use teleport_core::connect::{ConnectError, Connector};
use teleport_core::negotiation::{
    watch_channel, ConnectivitySignal, ConnectivityWatch, NegotiationEngine, NegotiationError,
    NegotiationResult, NegotiationSession, StatsRecord, StatsSnapshot,
};

const ACCESS_PATH: &str = "/api/deviceToken/mlRequestClientAccess";
const ICE_CONFIG_PATH: &str = "/api/deviceToken/mlIceConfig";
const CONNECT_PATH: &str = "/api/deviceToken/mlClientConnect";

/// How the mocked engine resolves connectivity after the answer is applied.
#[derive(Clone, Copy)]
enum Connectivity {
    Completes,
    Fails,
    NeverResolves,
}

struct MockEngine {
    connectivity: Connectivity,
    snapshot: StatsSnapshot,
    closes: Arc<AtomicUsize>,
}

impl MockEngine {
    fn new(connectivity: Connectivity, snapshot: StatsSnapshot) -> (Arc<Self>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(MockEngine {
            connectivity,
            snapshot,
            closes: closes.clone(),
        });
        (engine, closes)
    }
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn open_session(
        &self,
        _bootstrap_server: &str,
    ) -> NegotiationResult<Box<dyn NegotiationSession>> {
        Ok(Box::new(MockSession {
            connectivity: self.connectivity,
            snapshot: self.snapshot.clone(),
            signal: Mutex::new(None),
            closes: self.closes.clone(),
        }))
    }
}

struct MockSession {
    connectivity: Connectivity,
    snapshot: StatsSnapshot,
    signal: Mutex<Option<ConnectivitySignal>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl NegotiationSession for MockSession {
    async fn create_local_offer(&self) -> NegotiationResult<String> {
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n"
            .to_string())
    }

    async fn watch_connectivity(&self) -> ConnectivityWatch {
        let (signal, watch) = watch_channel();
        *self.signal.lock().unwrap() = Some(signal);
        watch
    }

    async fn apply_remote_answer(&self, _sdp: String) -> NegotiationResult<()> {
        let signal = self
            .signal
            .lock()
            .unwrap()
            .clone()
            .expect("remote answer applied before the observer was registered");

        match self.connectivity {
            Connectivity::Completes => {
                signal.notify(Ok(()));
                // Engines keep emitting state changes; extras must be dropped
                signal.notify(Ok(()));
            }
            Connectivity::Fails => signal.notify(Err(NegotiationError::ConnectivityFailed)),
            Connectivity::NeverResolves => {}
        }
        Ok(())
    }

    async fn stats_snapshot(&self) -> StatsSnapshot {
        self.snapshot.clone()
    }

    async fn close(&self) -> NegotiationResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn nominated_snapshot() -> StatsSnapshot {
    let mut snapshot = StatsSnapshot::default();
    snapshot.insert(
        "pair-1",
        StatsRecord::Pair {
            local_id: "local-1".to_string(),
            remote_id: "remote-1".to_string(),
            nominated: true,
        },
    );
    snapshot.insert(
        "local-1",
        StatsRecord::Candidate {
            address: "192.168.1.50".to_string(),
            port: 51820,
        },
    );
    snapshot.insert(
        "remote-1",
        StatsRecord::Candidate {
            address: "203.0.113.9".to_string(),
            port: 12345,
        },
    );
    snapshot
}

fn test_config(server: &MockServer, credential_dir: &TempDir) -> TeleportConfig {
    TeleportConfig {
        api_base: server.uri(),
        credential_dir: credential_dir.path().to_path_buf(),
        connectivity_timeout_secs: 1,
        ..TeleportConfig::default()
    }
}

async fn mount_signaling(server: &MockServer) {
    mount_access(server).await;
    mount_negotiation_endpoints(server).await;
}

async fn mount_access(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(ACCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "client_id": "device-token-123",
        })))
        .mount(server)
        .await;
}

async fn mount_negotiation_endpoints(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(ICE_CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "servers": [{ "urls": "stun:stun.example.com:3478" }],
        })))
        .mount(server)
        .await;

    let answer = "v=0\r\ns=-\r\n\
                  a=uca_acf5_amplifi_ipv4_addr:10.64.0.5\r\n\
                  a=uca_acf5_amplifi_ipv4_dns_addr0:192.168.1.1\r\n\
                  a=uca_acf5_amplifi_tunnel_pub_key:routerPubKey123\r\n\
                  m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";
    Mock::given(method("POST"))
        .and(path(CONNECT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "answer": answer,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn pin_pairing_drives_attempt_to_assembled_config() {
    let server = MockServer::start().await;
    mount_signaling(&server).await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::Completes, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    let result = connector.connect("myrouter", Some("AB123")).await.unwrap();

    let config = &result.config;
    assert_eq!(config.address, "10.64.0.5/32");
    assert_eq!(config.dns, "192.168.1.1");
    assert_eq!(config.listen_port, 51820);
    assert_eq!(config.peers.len(), 1);
    assert_eq!(config.peers[0].public_key, "routerPubKey123");
    assert_eq!(config.peers[0].endpoint, "203.0.113.9:12345");
    assert_eq!(config.peers[0].allowed_ips, "0.0.0.0/0, ::/0");

    let expected = format!(
        "[Interface]\n\
         PrivateKey = {}\n\
         Address = 10.64.0.5/32\n\
         ListenPort = 51820\n\
         DNS = 192.168.1.1\n\
         \n\
         [Peer]\n\
         PublicKey = routerPubKey123\n\
         AllowedIPs = 0.0.0.0/0, ::/0\n\
         Endpoint = 203.0.113.9:12345\n",
        config.private_key
    );
    assert_eq!(result.render(), expected);

    // Token and identity persisted for later reconnects
    let token = std::fs::read_to_string(credential_dir.path().join("myrouter_token")).unwrap();
    assert_eq!(token, "device-token-123");
    let identity = std::fs::read_to_string(credential_dir.path().join("myrouter_uuid")).unwrap();
    assert_eq!(identity.trim().len(), 36);

    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn saved_token_reconnects_without_authentication() {
    let server = MockServer::start().await;
    mount_negotiation_endpoints(&server).await;

    // Any call to the pairing endpoint would fail the expect(0) below
    Mock::given(method("POST"))
        .and(path(ACCESS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let credential_dir = TempDir::new().unwrap();
    std::fs::write(credential_dir.path().join("myrouter_token"), "saved-token").unwrap();

    let (engine, closes) = MockEngine::new(Connectivity::Completes, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    let result = connector.connect("myrouter", None).await.unwrap();
    assert_eq!(result.config.peers[0].endpoint, "203.0.113.9:12345");
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnect_without_saved_token_asks_for_pin() {
    let server = MockServer::start().await;
    let credential_dir = TempDir::new().unwrap();

    let (engine, closes) = MockEngine::new(Connectivity::Completes, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    match connector.connect("myrouter", None).await {
        Err(ConnectError::NoSavedToken(profile)) => assert_eq!(profile, "myrouter"),
        other => panic!("expected NoSavedToken, got {other:?}"),
    }
    // Failed before any session was opened
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connectivity_failure_is_terminal_and_closes_session() {
    let server = MockServer::start().await;
    mount_signaling(&server).await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::Fails, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    match connector.connect("myrouter", Some("AB123")).await {
        Err(ConnectError::Negotiation(NegotiationError::ConnectivityFailed)) => {}
        other => panic!("expected ConnectivityFailed, got {other:?}"),
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connectivity_that_never_arrives_times_out() {
    let server = MockServer::start().await;
    mount_signaling(&server).await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::NeverResolves, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    match connector.connect("myrouter", Some("AB123")).await {
        Err(ConnectError::Negotiation(NegotiationError::ConnectivityTimeout(_))) => {}
        other => panic!("expected ConnectivityTimeout, got {other:?}"),
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_pin_surfaces_server_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ACCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "invalid pin",
        })))
        .mount(&server)
        .await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::Completes, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    let err = connector.connect("myrouter", Some("BAD")).await.unwrap_err();
    assert!(matches!(err, ConnectError::Authentication(_)));
    assert!(err.to_string().contains("invalid pin"));
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn answer_without_attributes_aborts_before_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ACCESS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "client_id": "device-token-123",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ICE_CONFIG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "servers": [],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CONNECT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "answer": "v=0\r\ns=-\r\n",
        })))
        .mount(&server)
        .await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::Completes, nominated_snapshot());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    let err = connector.connect("myrouter", Some("AB123")).await.unwrap_err();
    assert!(matches!(err, ConnectError::Answer(_)));
    // The session still gets released exactly once
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_nomination_after_success_is_an_extraction_error() {
    let server = MockServer::start().await;
    mount_signaling(&server).await;

    let credential_dir = TempDir::new().unwrap();
    let (engine, closes) = MockEngine::new(Connectivity::Completes, StatsSnapshot::default());
    let connector = Connector::with_engine(test_config(&server, &credential_dir), engine).unwrap();

    match connector.connect("myrouter", Some("AB123")).await {
        Err(ConnectError::Negotiation(NegotiationError::NoNominatedPair)) => {}
        other => panic!("expected NoNominatedPair, got {other:?}"),
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
