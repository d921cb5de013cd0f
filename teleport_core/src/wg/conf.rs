//! INI-style WireGuard configuration records.
//!
//! Render and parse of the `[Interface]`/`[Peer]` file format, plus
//! directory-scoped save and load of `<name>.conf` files.

use std::fs;
use std::io;
use std::path::Path;

use super::{WgError, WgResult};

/// A WireGuard interface configuration with its peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceConfig {
    /// Profile name; used as the config file stem, not rendered.
    pub name: String,
    /// Private key, base64.
    pub private_key: String,
    /// Interface address in CIDR notation.
    pub address: String,
    /// Local listen port, omitted from output when zero.
    pub listen_port: u16,
    /// DNS server, omitted when empty.
    pub dns: String,
    /// MTU, omitted when zero.
    pub mtu: u16,
    /// Configured peers.
    pub peers: Vec<PeerConfig>,
}

/// A single peer section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConfig {
    /// Peer public key, base64.
    pub public_key: String,
    /// Preshared key, omitted when empty.
    pub preshared_key: String,
    /// Allowed IP ranges, comma separated.
    pub allowed_ips: String,
    /// Remote endpoint `host:port`, omitted when empty.
    pub endpoint: String,
    /// Keepalive interval in seconds, omitted when zero.
    pub persistent_keepalive: u16,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

impl InterfaceConfig {
    /// Renders the configuration to `.conf` text. Optional fields with
    /// zero or empty values are omitted; peer sections are preceded by a
    /// blank line. Output is deterministic for a given record.
    pub fn render(&self) -> String {
        let mut out = String::from("[Interface]\n");
        out.push_str(&format!("PrivateKey = {}\n", self.private_key));
        out.push_str(&format!("Address = {}\n", self.address));
        if self.listen_port != 0 {
            out.push_str(&format!("ListenPort = {}\n", self.listen_port));
        }
        if !self.dns.is_empty() {
            out.push_str(&format!("DNS = {}\n", self.dns));
        }
        if self.mtu != 0 {
            out.push_str(&format!("MTU = {}\n", self.mtu));
        }

        for peer in &self.peers {
            out.push_str("\n[Peer]\n");
            out.push_str(&format!("PublicKey = {}\n", peer.public_key));
            if !peer.preshared_key.is_empty() {
                out.push_str(&format!("PresharedKey = {}\n", peer.preshared_key));
            }
            out.push_str(&format!("AllowedIPs = {}\n", peer.allowed_ips));
            if !peer.endpoint.is_empty() {
                out.push_str(&format!("Endpoint = {}\n", peer.endpoint));
            }
            if peer.persistent_keepalive != 0 {
                out.push_str(&format!("PersistentKeepalive = {}\n", peer.persistent_keepalive));
            }
        }

        out
    }

    /// Parses `.conf` text into a configuration record.
    ///
    /// Comments (`#`) and blank lines are skipped; unknown keys are ignored
    /// for forward compatibility; structural errors carry the line number.
    pub fn parse(text: &str) -> WgResult<Self> {
        let mut iface = InterfaceConfig::default();
        let mut section = Section::None;

        for (idx, raw) in text.lines().enumerate() {
            let line_num = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == "[Interface]" {
                section = Section::Interface;
                continue;
            }
            if line == "[Peer]" {
                section = Section::Peer;
                iface.peers.push(PeerConfig::default());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(WgError::Parse {
                    line: line_num,
                    message: format!("expected Key = Value, got {line:?}"),
                });
            };
            let key = key.trim();
            let value = value.trim();

            match section {
                Section::Interface => set_interface_field(&mut iface, key, value, line_num)?,
                Section::Peer => {
                    let Some(peer) = iface.peers.last_mut() else {
                        return Err(WgError::Parse {
                            line: line_num,
                            message: format!("key {key:?} outside of [Peer] section"),
                        });
                    };
                    set_peer_field(peer, key, value, line_num)?;
                }
                Section::None => {
                    return Err(WgError::Parse {
                        line: line_num,
                        message: format!("key {key:?} outside of any section"),
                    });
                }
            }
        }

        Ok(iface)
    }
}

fn parse_number(key: &str, value: &str, line: usize) -> WgResult<u16> {
    value.parse().map_err(|_| WgError::Parse {
        line,
        message: format!("invalid {key} {value:?}"),
    })
}

fn set_interface_field(iface: &mut InterfaceConfig, key: &str, value: &str, line: usize) -> WgResult<()> {
    match key {
        "PrivateKey" => iface.private_key = value.to_string(),
        "Address" => iface.address = value.to_string(),
        "ListenPort" => iface.listen_port = parse_number(key, value, line)?,
        "DNS" => iface.dns = value.to_string(),
        "MTU" => iface.mtu = parse_number(key, value, line)?,
        _ => {}
    }
    Ok(())
}

fn set_peer_field(peer: &mut PeerConfig, key: &str, value: &str, line: usize) -> WgResult<()> {
    match key {
        "PublicKey" => peer.public_key = value.to_string(),
        "PresharedKey" => peer.preshared_key = value.to_string(),
        "AllowedIPs" => peer.allowed_ips = value.to_string(),
        "Endpoint" => peer.endpoint = value.to_string(),
        "PersistentKeepalive" => peer.persistent_keepalive = parse_number(key, value, line)?,
        _ => {}
    }
    Ok(())
}

/// Writes `dir/<name>.conf` with owner-only permissions.
pub fn save_config(dir: &Path, iface: &InterfaceConfig) -> WgResult<()> {
    let path = dir.join(format!("{}.conf", iface.name));
    let io_err = |source: io::Error| WgError::Io {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_err)?;
    fs::write(&path, iface.render()).map_err(io_err)?;
    restrict_file_permissions(&path).map_err(io_err)?;
    Ok(())
}

/// Reads and parses `dir/<name>.conf`; the record's name is set from `name`.
pub fn load_config(dir: &Path, name: &str) -> WgResult<InterfaceConfig> {
    let path = dir.join(format!("{name}.conf"));
    let text = fs::read_to_string(&path).map_err(|source| WgError::Io {
        path: path.clone(),
        source,
    })?;
    let mut iface = InterfaceConfig::parse(&text)?;
    iface.name = name.to_string();
    Ok(iface)
}

#[cfg(unix)]
fn restrict_file_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> InterfaceConfig {
        InterfaceConfig {
            name: "myrouter".to_string(),
            private_key: "cFJpdmF0ZUtleVByaXZhdGVLZXlQcml2YXRlS2V5cHE=".to_string(),
            address: "10.64.0.5/32".to_string(),
            listen_port: 51820,
            dns: "192.168.1.1".to_string(),
            mtu: 0,
            peers: vec![PeerConfig {
                public_key: "cHVibGljS2V5cHVibGljS2V5cHVibGljS2V5cHVibGk=".to_string(),
                preshared_key: String::new(),
                allowed_ips: "0.0.0.0/0, ::/0".to_string(),
                endpoint: "203.0.113.9:12345".to_string(),
                persistent_keepalive: 0,
            }],
        }
    }

    #[test]
    fn render_produces_exact_text() {
        let expected = "\
[Interface]
PrivateKey = cFJpdmF0ZUtleVByaXZhdGVLZXlQcml2YXRlS2V5cHE=
Address = 10.64.0.5/32
ListenPort = 51820
DNS = 192.168.1.1

[Peer]
PublicKey = cHVibGljS2V5cHVibGljS2V5cHVibGljS2V5cHVibGk=
AllowedIPs = 0.0.0.0/0, ::/0
Endpoint = 203.0.113.9:12345
";
        assert_eq!(sample().render(), expected);
    }

    #[test]
    fn parse_reads_back_rendered_config() {
        let mut parsed = InterfaceConfig::parse(&sample().render()).unwrap();
        parsed.name = "myrouter".to_string();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn parse_skips_comments_and_unknown_keys() {
        let text = "\
# managed config
[Interface]
PrivateKey = abc
Address = 10.0.0.1/32
Table = off

[Peer]
PublicKey = def
AllowedIPs = 0.0.0.0/0
";
        let iface = InterfaceConfig::parse(text).unwrap();
        assert_eq!(iface.private_key, "abc");
        assert_eq!(iface.peers.len(), 1);
    }

    #[test]
    fn parse_errors_carry_line_numbers() {
        let text = "[Interface]\nPrivateKey = abc\nListenPort = nope\n";
        match InterfaceConfig::parse(text) {
            Err(WgError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }

        let stray = "PrivateKey = abc\n";
        assert!(matches!(
            InterfaceConfig::parse(stray),
            Err(WgError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        save_config(dir.path(), &sample()).unwrap();

        let loaded = load_config(dir.path(), "myrouter").unwrap();
        assert_eq!(loaded, sample());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join("myrouter.conf"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
