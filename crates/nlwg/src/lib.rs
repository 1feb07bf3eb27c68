//! Async netlink transport and WireGuard device configuration for Linux.
//!
//! The crate speaks the kernel's netlink wire protocol directly: message
//! framing, nested TLV attributes, request/reply correlation, multi-part
//! reassembly and extended acknowledgements. On top of that it resolves
//! generic netlink families and implements the WireGuard `get-device` /
//! `set-device` protocol, including batching of large configurations.
//!
//! # Features
//!
//! - `serde` - `Serialize` for devices, peers, keys and families
//!
//! # Example
//!
//! ```ignore
//! use nlwg::Client;
//!
//! #[tokio::main]
//! async fn main() -> nlwg::Result<()> {
//!     let client = Client::new().await?;
//!
//!     for device in client.devices().await? {
//!         println!("{}: {}", device.name, device.public_key);
//!         for peer in &device.peers {
//!             println!("  peer {} ({} allowed ips)", peer.public_key, peer.allowed_ips.len());
//!         }
//!     }
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod netlink;

// Re-export common types at crate root for convenience
pub use client::Client;
pub use netlink::genl::wireguard::{
    AllowedIp, Device, DeviceConfig, DeviceType, Key, Peer, PeerConfig, WireguardConnection,
};
pub use netlink::{Config, Connection, Error, Protocol, Result};
