//! Connectivity statistics snapshot and endpoint extraction.

use std::collections::HashMap;

use super::{NegotiationError, NegotiationResult};

/// The negotiated network path: local listen port plus remote IP and port,
/// taken from the nominated candidate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPair {
    pub local_port: u16,
    pub remote_addr: String,
    pub remote_port: u16,
}

/// One entry in a statistics snapshot.
#[derive(Debug, Clone)]
pub enum StatsRecord {
    /// A candidate pair tested by the engine, referencing its candidates by
    /// identifier.
    Pair {
        local_id: String,
        remote_id: String,
        nominated: bool,
    },
    /// A local or remote candidate.
    Candidate { address: String, port: u16 },
}

/// Immutable mapping from statistics identifier to record, taken from the
/// engine after connectivity completes.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    records: HashMap<String, StatsRecord>,
}

impl StatsSnapshot {
    pub fn insert(&mut self, id: impl Into<String>, record: StatsRecord) {
        self.records.insert(id.into(), record);
    }

    fn candidate(&self, id: &str) -> Option<(&str, u16)> {
        match self.records.get(id) {
            Some(StatsRecord::Candidate { address, port }) => Some((address.as_str(), *port)),
            _ => None,
        }
    }

    /// Resolves the negotiated endpoint by a two-pass lookup: find the
    /// nominated pair, then resolve its local and remote candidate records
    /// by identifier. If the engine nominated more than one pair, the first
    /// in iteration order wins.
    pub fn nominated_endpoint(&self) -> NegotiationResult<EndpointPair> {
        let (local_id, remote_id) = self
            .records
            .values()
            .find_map(|record| match record {
                StatsRecord::Pair {
                    local_id,
                    remote_id,
                    nominated: true,
                } => Some((local_id, remote_id)),
                _ => None,
            })
            .ok_or(NegotiationError::NoNominatedPair)?;

        let local_port = self.candidate(local_id).map_or(0, |(_, port)| port);
        let (remote_addr, remote_port) = self
            .candidate(remote_id)
            .map_or_else(Default::default, |(addr, port)| (addr.to_string(), port));

        // Connectivity can report success while the pair is unusable
        if remote_addr.is_empty() || remote_port == 0 {
            return Err(NegotiationError::UnusableEndpoint {
                address: remote_addr,
                port: remote_port,
            });
        }

        Ok(EndpointPair {
            local_port,
            remote_addr,
            remote_port,
        })
    }
}
