//! Core library for Teleport tunnel provisioning.
//!
//! This crate establishes an encrypted tunnel configuration with a remote
//! router: it exchanges authentication and session-description data over
//! HTTPS, negotiates a peer-to-peer path through a connectivity engine, and
//! translates the negotiated path plus the router's session attributes into
//! a WireGuard configuration record.

pub mod config;
pub mod connect;
pub mod credentials;
pub mod logging;
pub mod negotiation;
pub mod sdp;
pub mod signaling;
pub mod wg;

// Re-export the entry points most callers need
pub use config::TeleportConfig;
pub use connect::{ConnectError, ConnectResult, Connector};
