//! WireGuard configuration via Generic Netlink.
//!
//! WireGuard link creation uses standard RTNetlink, but all configuration
//! (keys, peers, allowed IPs) goes through the "wireguard" GENL family.
//!
//! Large configurations are split into several `SET_DEVICE` messages and
//! large devices arrive as several `GET_DEVICE` replies; both directions are
//! handled here so callers only ever see one [`Device`] / [`DeviceConfig`].
//!
//! # Example
//!
//! ```rust,no_run
//! use nlwg::netlink::genl::wireguard::WireguardConnection;
//!
//! # async fn example() -> nlwg::Result<()> {
//! let wg = WireguardConnection::new().await?;
//!
//! // Get device information
//! let device = wg.device("wg0").await?;
//! println!("Public key: {}", device.public_key);
//! println!("Listen port: {}", device.listen_port);
//!
//! // List peers
//! for peer in &device.peers {
//!     println!("Peer: {}", peer.public_key);
//!     println!("  Endpoint: {:?}", peer.endpoint);
//!     println!("  Allowed IPs: {:?}", peer.allowed_ips);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Setting Configuration
//!
//! ```rust,no_run
//! use nlwg::netlink::genl::wireguard::{
//!     AllowedIp, DeviceConfig, Key, PeerConfig, WireguardConnection,
//! };
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! # async fn example() -> nlwg::Result<()> {
//! let wg = WireguardConnection::new().await?;
//!
//! let private_key = Key::generate_private_key();
//! let peer_key: Key = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=".parse()?;
//!
//! let config = DeviceConfig::new()
//!     .private_key(private_key)
//!     .listen_port(51820)
//!     .peer(
//!         PeerConfig::new(peer_key)
//!             .endpoint(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 51820).into())
//!             .persistent_keepalive(25)
//!             .allowed_ip(AllowedIp::v4(Ipv4Addr::new(10, 0, 0, 0), 24)),
//!     );
//! wg.configure_device("wg0", &config).await?;
//! # Ok(())
//! # }
//! ```

mod configure;
mod connection;
mod key;
mod parse;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use configure::{IP_BATCH_CHUNK, PEER_BATCH_CHUNK, build_batches, should_batch};
pub use connection::WireguardConnection;
pub use key::{KEY_LEN, Key};
pub use parse::parse_device;
pub use types::{AllowedIp, Device, DeviceConfig, DeviceType, Peer, PeerConfig};

/// WireGuard Generic Netlink family name.
pub const WG_GENL_NAME: &str = "wireguard";

/// WireGuard Generic Netlink version.
pub const WG_GENL_VERSION: u8 = 1;

/// Link kind reported by rtnetlink for WireGuard interfaces.
pub const WG_LINK_KIND: &str = "wireguard";

/// WireGuard GENL commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgCmd {
    GetDevice = 0,
    SetDevice = 1,
}

/// WireGuard device attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgDeviceAttr {
    Unspec = 0,
    Ifindex = 1,
    Ifname = 2,
    PrivateKey = 3,
    PublicKey = 4,
    Flags = 5,
    ListenPort = 6,
    Fwmark = 7,
    Peers = 8,
}

/// WireGuard peer attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgPeerAttr {
    Unspec = 0,
    PublicKey = 1,
    PresharedKey = 2,
    Flags = 3,
    Endpoint = 4,
    PersistentKeepalive = 5,
    LastHandshake = 6,
    RxBytes = 7,
    TxBytes = 8,
    AllowedIps = 9,
    ProtocolVersion = 10,
}

/// WireGuard allowed IP attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgAllowedIpAttr {
    Unspec = 0,
    Family = 1,
    IpAddr = 2,
    CidrMask = 3,
}

/// WireGuard device flags.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgDeviceFlag {
    /// Replace all peers instead of adding
    ReplacePeers = 1 << 0,
}

/// Peer flags for SET_DEVICE operations.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgPeerFlag {
    /// Remove this peer.
    RemoveMe = 1 << 0,
    /// Replace all allowed IPs (instead of adding).
    ReplaceAllowedIps = 1 << 1,
    /// Only update an existing peer; never create one.
    UpdateOnly = 1 << 2,
}
