//! WireGuard type definitions.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use super::key::Key;
use crate::netlink::error::{Error, Result};

/// Implementation backing a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceType {
    LinuxKernel,
    OpenBsdKernel,
    WindowsKernel,
    Userspace,
    #[default]
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LinuxKernel => "Linux kernel",
            Self::OpenBsdKernel => "OpenBSD kernel",
            Self::WindowsKernel => "Windows kernel",
            Self::Userspace => "userspace",
            Self::Unknown => "unknown",
        })
    }
}

/// WireGuard device information.
///
/// Zero keys, port and mark mean the kernel reported nothing for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Device {
    /// Interface name.
    pub name: String,
    /// Interface index.
    pub index: u32,
    pub device_type: DeviceType,
    /// Private key; only reported to privileged callers.
    pub private_key: Key,
    /// Public key (derived from private key).
    pub public_key: Key,
    /// UDP listen port.
    pub listen_port: u16,
    /// Firewall mark for outgoing packets.
    pub firewall_mark: u32,
    /// Configured peers, one entry per public key.
    pub peers: Vec<Peer>,
}

impl Device {
    /// Find a peer by public key.
    pub fn peer(&self, public_key: &Key) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}

/// WireGuard peer information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Peer {
    /// Peer's public key (identifies the peer).
    pub public_key: Key,
    /// Preshared key; zero if none is set.
    pub preshared_key: Key,
    /// Peer's endpoint (IP:port).
    pub endpoint: Option<SocketAddr>,
    /// Persistent keepalive interval (zero = disabled).
    pub persistent_keepalive: Duration,
    /// Last successful handshake time.
    pub last_handshake: Option<SystemTime>,
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes sent to this peer.
    pub tx_bytes: u64,
    /// Allowed IP ranges for this peer.
    pub allowed_ips: Vec<AllowedIp>,
    /// Protocol version (typically 1).
    pub protocol_version: u32,
}

impl Peer {
    /// Get the duration since last handshake.
    pub fn time_since_handshake(&self) -> Option<Duration> {
        self.last_handshake
            .and_then(|t| SystemTime::now().duration_since(t).ok())
    }
}

/// An allowed IP range for a WireGuard peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AllowedIp {
    /// IP address (network portion).
    pub addr: IpAddr,
    /// CIDR prefix length.
    pub cidr: u8,
}

impl AllowedIp {
    /// Create a range, rejecting a prefix longer than the address.
    pub fn new(addr: IpAddr, cidr: u8) -> Result<Self> {
        let ip = Self { addr, cidr };
        ip.validate()?;
        Ok(ip)
    }

    /// Create an IPv4 allowed IP range.
    pub fn v4(addr: Ipv4Addr, cidr: u8) -> Self {
        Self {
            addr: IpAddr::V4(addr),
            cidr: cidr.min(32),
        }
    }

    /// Create an IPv6 allowed IP range.
    pub fn v6(addr: Ipv6Addr, cidr: u8) -> Self {
        Self {
            addr: IpAddr::V6(addr),
            cidr: cidr.min(128),
        }
    }

    /// Get the address family (AF_INET or AF_INET6).
    pub fn family(&self) -> u16 {
        match self.addr {
            IpAddr::V4(_) => libc::AF_INET as u16,
            IpAddr::V6(_) => libc::AF_INET6 as u16,
        }
    }

    /// Longest valid prefix for this address family.
    pub fn max_prefix(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Get the address bytes.
    pub fn addr_bytes(&self) -> Vec<u8> {
        match self.addr {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.cidr > self.max_prefix() {
            return Err(Error::InvalidInput(format!(
                "prefix length {} exceeds maximum {} for {}",
                self.cidr,
                self.max_prefix(),
                self.addr
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.cidr)
    }
}

impl FromStr for AllowedIp {
    type Err = Error;

    /// Parse CIDR notation, e.g. `10.0.0.0/24`.
    fn from_str(s: &str) -> Result<Self> {
        let (addr_str, prefix_str) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("invalid CIDR notation: {s}")))?;

        let addr: IpAddr = addr_str.parse().map_err(|e| {
            Error::InvalidInput(format!("invalid IP address '{addr_str}': {e}"))
        })?;
        let cidr: u8 = prefix_str.parse().map_err(|e| {
            Error::InvalidInput(format!("invalid prefix length '{prefix_str}': {e}"))
        })?;

        Self::new(addr, cidr)
    }
}

/// Changes to apply to a device.
///
/// Unset fields are left untouched by the kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    pub private_key: Option<Key>,
    pub listen_port: Option<u16>,
    pub firewall_mark: Option<u32>,
    /// Remove every peer not listed in `peers`.
    pub replace_peers: bool,
    pub peers: Vec<PeerConfig>,
}

impl DeviceConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the private key.
    pub fn private_key(mut self, key: Key) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Set the listen port.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Set the firewall mark. Zero clears it.
    pub fn firewall_mark(mut self, mark: u32) -> Self {
        self.firewall_mark = Some(mark);
        self
    }

    /// Replace all existing peers (instead of merging).
    pub fn replace_peers(mut self) -> Self {
        self.replace_peers = true;
        self
    }

    /// Add a peer to configure.
    pub fn peer(mut self, peer: PeerConfig) -> Self {
        self.peers.push(peer);
        self
    }

    /// Total allowed IPs across all peers.
    pub fn allowed_ip_count(&self) -> usize {
        self.peers.iter().map(|p| p.allowed_ips.len()).sum()
    }
}

/// Changes to apply to one peer, identified by its public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConfig {
    pub public_key: Key,
    /// Remove the peer instead of updating it.
    pub remove: bool,
    /// Only update an existing peer; never create one.
    pub update_only: bool,
    /// Set the preshared key. A zero key clears it.
    pub preshared_key: Option<Key>,
    pub endpoint: Option<SocketAddr>,
    /// Whole seconds are sent; zero disables keepalives.
    pub persistent_keepalive: Option<Duration>,
    /// Replace the peer's allowed IPs instead of adding to them.
    pub replace_allowed_ips: bool,
    pub allowed_ips: Vec<AllowedIp>,
}

impl PeerConfig {
    /// Create a new peer configuration for the given public key.
    pub fn new(public_key: Key) -> Self {
        Self {
            public_key,
            ..Default::default()
        }
    }

    /// Set the preshared key.
    pub fn preshared_key(mut self, key: Key) -> Self {
        self.preshared_key = Some(key);
        self
    }

    /// Set the endpoint address.
    pub fn endpoint(mut self, addr: SocketAddr) -> Self {
        self.endpoint = Some(addr);
        self
    }

    /// Set the persistent keepalive interval in seconds.
    pub fn persistent_keepalive(mut self, interval: u16) -> Self {
        self.persistent_keepalive = Some(Duration::from_secs(interval.into()));
        self
    }

    /// Add an allowed IP range.
    pub fn allowed_ip(mut self, ip: AllowedIp) -> Self {
        self.allowed_ips.push(ip);
        self
    }

    /// Add multiple allowed IP ranges.
    pub fn allowed_ips(mut self, ips: impl IntoIterator<Item = AllowedIp>) -> Self {
        self.allowed_ips.extend(ips);
        self
    }

    /// Replace all existing allowed IPs instead of adding.
    pub fn replace_allowed_ips(mut self) -> Self {
        self.replace_allowed_ips = true;
        self
    }

    /// Only update the peer if it already exists.
    pub fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }

    /// Mark this peer for removal.
    pub fn remove(mut self) -> Self {
        self.remove = true;
        self
    }
}
