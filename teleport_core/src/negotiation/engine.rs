//! WebRTC-backed negotiation engine.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

use super::{
    watch_channel, ConnectivityWatch, NegotiationEngine, NegotiationError, NegotiationResult,
    NegotiationSession, StatsRecord, StatsSnapshot,
};

/// Label of the data channel created to force a non-empty offer. The channel
/// never carries data and is not exposed to callers.
const OFFER_CHANNEL_LABEL: &str = "chat";

/// Production engine backed by the `webrtc` crate.
#[derive(Debug, Default)]
pub struct WebRtcEngine;

impl WebRtcEngine {
    pub fn new() -> Self {
        WebRtcEngine
    }
}

#[async_trait]
impl NegotiationEngine for WebRtcEngine {
    async fn open_session(
        &self,
        bootstrap_server: &str,
    ) -> NegotiationResult<Box<dyn NegotiationSession>> {
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![bootstrap_server.to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let api = APIBuilder::new().build();
        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(|e| NegotiationError::Engine(format!("creating peer connection: {e}")))?;

        Ok(Box::new(WebRtcSession { pc: Arc::new(pc) }))
    }
}

struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl NegotiationSession for WebRtcSession {
    async fn create_local_offer(&self) -> NegotiationResult<String> {
        self.pc
            .create_data_channel(OFFER_CHANNEL_LABEL, None)
            .await
            .map_err(|e| NegotiationError::Engine(format!("creating data channel: {e}")))?;

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| NegotiationError::Engine(format!("creating offer: {e}")))?;

        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| NegotiationError::Engine(format!("applying local description: {e}")))?;

        // The offer text is only stable once candidate gathering finishes;
        // no timeout of its own, the outer deadline bounds the attempt.
        let _ = gathered.recv().await;
        debug!("local candidate gathering complete");

        let desc = self.pc.local_description().await.ok_or_else(|| {
            NegotiationError::Engine("no local description after candidate gathering".to_string())
        })?;
        Ok(desc.sdp)
    }

    async fn watch_connectivity(&self) -> ConnectivityWatch {
        let (signal, watch) = watch_channel();

        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                match state {
                    RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                        signal.notify(Ok(()));
                    }
                    RTCIceConnectionState::Failed => {
                        signal.notify(Err(NegotiationError::ConnectivityFailed));
                    }
                    _ => {}
                }
                Box::pin(async {})
            }));

        watch
    }

    async fn apply_remote_answer(&self, sdp: String) -> NegotiationResult<()> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| NegotiationError::Engine(format!("building remote description: {e}")))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| NegotiationError::Engine(format!("applying remote description: {e}")))
    }

    async fn stats_snapshot(&self) -> StatsSnapshot {
        let report = self.pc.get_stats().await;

        let mut snapshot = StatsSnapshot::default();
        for (id, entry) in report.reports {
            match entry {
                StatsReportType::CandidatePair(pair) => snapshot.insert(
                    id,
                    StatsRecord::Pair {
                        local_id: pair.local_candidate_id,
                        remote_id: pair.remote_candidate_id,
                        nominated: pair.nominated,
                    },
                ),
                StatsReportType::LocalCandidate(candidate)
                | StatsReportType::RemoteCandidate(candidate) => snapshot.insert(
                    id,
                    StatsRecord::Candidate {
                        address: candidate.ip,
                        port: candidate.port,
                    },
                ),
                _ => {}
            }
        }
        snapshot
    }

    async fn close(&self) -> NegotiationResult<()> {
        self.pc
            .close()
            .await
            .map_err(|e| NegotiationError::Engine(format!("closing peer connection: {e}")))
    }
}
