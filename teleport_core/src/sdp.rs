//! Vendor attribute codec for session-description text.
//!
//! The router embeds tunnel metadata as non-standard `a=` lines in the SDP
//! answer, and expects a matching block in the offer. This module splices the
//! outbound block in after the session-name marker and extracts the inbound
//! attributes by a plain line scan.

use thiserror::Error;

/// Session-name marker line the attribute block is inserted after.
const SESSION_NAME_MARKER: &str = "s=-";

/// Inbound attribute key carrying the tunnel interface IPv4 address.
const ATTR_IPV4_ADDR: &str = "uca_acf5_amplifi_ipv4_addr";

/// Inbound attribute key carrying the tunnel DNS IPv4 address.
const ATTR_IPV4_DNS_ADDR: &str = "uca_acf5_amplifi_ipv4_dns_addr0";

/// Attribute key carrying a tunnel public key, in both directions.
const ATTR_TUNNEL_PUB_KEY: &str = "uca_acf5_amplifi_tunnel_pub_key";

/// Errors from attribute extraction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SdpError {
    /// One or more of the mandatory tunnel attributes is absent.
    #[error("missing required tunnel attributes in SDP answer")]
    MissingAttributes,
}

/// Tunnel metadata extracted from an SDP answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelAttributes {
    /// IPv4 address assigned to the local tunnel interface.
    pub interface_addr: String,
    /// DNS server address to use inside the tunnel.
    pub dns_addr: String,
    /// The router's tunnel public key.
    pub remote_public_key: String,
}

/// Inserts the outbound tunnel attribute block into `sdp`.
///
/// The block lands immediately after the first `s=-` occurrence, joined with
/// CRLF to match session-description conventions; the rest of the input is
/// preserved byte for byte. Input without the marker is returned unchanged.
pub fn inject_tunnel_info(sdp: &str, friendly_name: &str, platform: &str, public_key: &str) -> String {
    let Some(pos) = sdp.find(SESSION_NAME_MARKER) else {
        return sdp.to_string();
    };
    let (head, tail) = sdp.split_at(pos + SESSION_NAME_MARKER.len());

    let attrs = [
        "a=tool:ubnt_webrtc version ".to_string(),
        format!("a=uca_acf5_amplifi_friendly_name:{friendly_name}"),
        "a=uca_acf5_amplifi_nomination_mode:slave".to_string(),
        format!("a=uca_acf5_amplifi_platform:{platform}"),
        format!("a={ATTR_TUNNEL_PUB_KEY}:{public_key}"),
    ]
    .join("\r\n");

    format!("{head}\r\n{attrs}{tail}")
}

/// Extracts the tunnel attributes from an SDP answer.
///
/// Scans every line for `a=key:value` pairs (split on the first colon),
/// tolerating both CRLF and bare-LF terminators. Unrecognized and malformed
/// attribute lines are skipped. Fails only if one of the three mandatory
/// fields is still empty after the scan.
pub fn parse_tunnel_attributes(sdp: &str) -> Result<TunnelAttributes, SdpError> {
    let mut attrs = TunnelAttributes::default();

    for line in sdp.split('\n') {
        let line = line.trim_end_matches('\r');
        let Some(kv) = line.strip_prefix("a=") else {
            continue;
        };
        let Some((key, value)) = kv.split_once(':') else {
            continue;
        };

        match key {
            ATTR_IPV4_ADDR => attrs.interface_addr = value.to_string(),
            ATTR_IPV4_DNS_ADDR => attrs.dns_addr = value.to_string(),
            ATTR_TUNNEL_PUB_KEY => attrs.remote_public_key = value.to_string(),
            _ => {}
        }
    }

    if attrs.interface_addr.is_empty() || attrs.dns_addr.is_empty() || attrs.remote_public_key.is_empty() {
        return Err(SdpError::MissingAttributes);
    }

    Ok(attrs)
}
