//! Encoding of SET_DEVICE requests and batching of large configurations.
//!
//! The kernel caps the size of one netlink message, so a configuration with
//! many peers or allowed IPs is split into several messages. Every message
//! carries at most one peer, and a peer's allowed IPs are sliced into chunks
//! of [`IP_BATCH_CHUNK`]:
//!
//! ```text
//! config: replace_peers, peers [A (600 ips), B (1 ip)]
//!
//! msg 0: replace_peers  A{psk, endpoint, replace_ips, ips[0..256]}
//! msg 1:                A{ips[256..512]}
//! msg 2:                A{ips[512..600]}
//! msg 3:                B{psk, endpoint, ips[0..1]}
//! ```
//!
//! Device scalars (private key, port, mark) are repeated in every message.

use std::collections::HashSet;
use std::net::SocketAddr;

use super::key::Key;
use super::types::{DeviceConfig, PeerConfig};
use super::{WgAllowedIpAttr, WgDeviceAttr, WgDeviceFlag, WgPeerAttr, WgPeerFlag};
use crate::netlink::builder::AttrBuilder;
use crate::netlink::error::{Error, Result};

/// Most peers sent before a configuration is split.
pub const PEER_BATCH_CHUNK: usize = 32;

/// Most allowed IPs sent in one message, and the slice size for a peer.
pub const IP_BATCH_CHUNK: usize = 256;

/// Check if a configuration must be split into several messages.
pub fn should_batch(cfg: &DeviceConfig) -> bool {
    cfg.peers.len() > PEER_BATCH_CHUNK || cfg.allowed_ip_count() > IP_BATCH_CHUNK
}

/// Split a configuration into the sequence of messages to send.
///
/// Only the first message may carry `replace_peers`. Only the first chunk of
/// a peer carries its preshared key, endpoint, keepalive and
/// `replace_allowed_ips`, so later chunks add to what the first one set.
pub fn build_batches(cfg: &DeviceConfig) -> Vec<DeviceConfig> {
    if !should_batch(cfg) {
        return vec![cfg.clone()];
    }

    let base = DeviceConfig {
        peers: Vec::new(),
        ..cfg.clone()
    };

    let mut known: HashSet<Key> = HashSet::new();
    let mut batches = Vec::new();

    for peer in &cfg.peers {
        let mut chunks = peer.allowed_ips.chunks(IP_BATCH_CHUNK).peekable();
        // A peer without allowed IPs still needs one message.
        let empty = chunks.peek().is_none();
        let chunks = chunks.chain(empty.then_some(&[][..]));

        for ips in chunks {
            let mut chunk = PeerConfig {
                public_key: peer.public_key,
                remove: peer.remove,
                update_only: peer.update_only,
                allowed_ips: ips.to_vec(),
                ..Default::default()
            };

            if known.insert(peer.public_key) {
                chunk.preshared_key = peer.preshared_key;
                chunk.endpoint = peer.endpoint;
                chunk.persistent_keepalive = peer.persistent_keepalive;
                chunk.replace_allowed_ips = peer.replace_allowed_ips;
            }

            let first = batches.is_empty();
            batches.push(DeviceConfig {
                replace_peers: first && cfg.replace_peers,
                peers: vec![chunk],
                ..base.clone()
            });
        }
    }

    batches
}

/// Encode the attributes of one SET_DEVICE message.
pub(crate) fn config_attrs(name: &str, cfg: &DeviceConfig) -> Result<Vec<u8>> {
    let mut builder = AttrBuilder::new();
    builder.append_attr_str(WgDeviceAttr::Ifname as u16, name);

    if let Some(key) = &cfg.private_key {
        builder.append_attr(WgDeviceAttr::PrivateKey as u16, key.as_bytes());
    }
    if let Some(port) = cfg.listen_port {
        builder.append_attr_u16(WgDeviceAttr::ListenPort as u16, port);
    }
    if let Some(mark) = cfg.firewall_mark {
        builder.append_attr_u32(WgDeviceAttr::Fwmark as u16, mark);
    }
    if cfg.replace_peers {
        builder.append_attr_u32(
            WgDeviceAttr::Flags as u16,
            WgDeviceFlag::ReplacePeers as u32,
        );
    }

    if !cfg.peers.is_empty() {
        let peers = builder.nest_start(WgDeviceAttr::Peers as u16);
        for (idx, peer) in cfg.peers.iter().enumerate() {
            let idx = u16::try_from(idx)
                .map_err(|_| Error::InvalidInput(format!("too many peers: {}", cfg.peers.len())))?;
            append_peer(&mut builder, idx, peer)?;
        }
        builder.nest_end(peers);
    }

    builder.finish()
}

fn append_peer(builder: &mut AttrBuilder, idx: u16, peer: &PeerConfig) -> Result<()> {
    let token = builder.nest_start(idx);

    builder.append_attr(WgPeerAttr::PublicKey as u16, peer.public_key.as_bytes());

    let mut flags = 0;
    if peer.remove {
        flags |= WgPeerFlag::RemoveMe as u32;
    }
    if peer.replace_allowed_ips {
        flags |= WgPeerFlag::ReplaceAllowedIps as u32;
    }
    if peer.update_only {
        flags |= WgPeerFlag::UpdateOnly as u32;
    }
    if flags != 0 {
        builder.append_attr_u32(WgPeerAttr::Flags as u16, flags);
    }

    if let Some(psk) = &peer.preshared_key {
        builder.append_attr(WgPeerAttr::PresharedKey as u16, psk.as_bytes());
    }

    if let Some(endpoint) = &peer.endpoint {
        builder.append_attr(WgPeerAttr::Endpoint as u16, &sockaddr_to_bytes(endpoint));
    }

    if let Some(interval) = peer.persistent_keepalive {
        let secs = u16::try_from(interval.as_secs()).map_err(|_| {
            Error::InvalidInput(format!(
                "persistent keepalive of {}s exceeds {}s",
                interval.as_secs(),
                u16::MAX
            ))
        })?;
        builder.append_attr_u16(WgPeerAttr::PersistentKeepalive as u16, secs);
    }

    if !peer.allowed_ips.is_empty() {
        let ips = builder.nest_start(WgPeerAttr::AllowedIps as u16);
        for (ip_idx, allowed_ip) in peer.allowed_ips.iter().enumerate() {
            allowed_ip.validate()?;
            let ip_idx = u16::try_from(ip_idx).map_err(|_| {
                Error::InvalidInput(format!(
                    "too many allowed IPs in one message: {}",
                    peer.allowed_ips.len()
                ))
            })?;

            let ip = builder.nest_start(ip_idx);
            builder
                .append_attr_u16(WgAllowedIpAttr::Family as u16, allowed_ip.family())
                .append_attr(WgAllowedIpAttr::IpAddr as u16, &allowed_ip.addr_bytes())
                .append_attr_u8(WgAllowedIpAttr::CidrMask as u16, allowed_ip.cidr);
            builder.nest_end(ip);
        }
        builder.nest_end(ips);
    }

    builder.nest_end(token);
    Ok(())
}

/// Convert a SocketAddr to kernel sockaddr bytes.
pub(crate) fn sockaddr_to_bytes(addr: &SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => {
            // struct sockaddr_in: family (2), port (2), addr (4), zero (8)
            let mut buf = vec![0u8; 16];
            buf[0..2].copy_from_slice(&(libc::AF_INET as u16).to_ne_bytes());
            buf[2..4].copy_from_slice(&v4.port().to_be_bytes());
            buf[4..8].copy_from_slice(&v4.ip().octets());
            buf
        }
        SocketAddr::V6(v6) => {
            // struct sockaddr_in6: family (2), port (2), flowinfo (4), addr (16), scope_id (4)
            let mut buf = vec![0u8; 28];
            buf[0..2].copy_from_slice(&(libc::AF_INET6 as u16).to_ne_bytes());
            buf[2..4].copy_from_slice(&v6.port().to_be_bytes());
            buf[4..8].copy_from_slice(&v6.flowinfo().to_be_bytes());
            buf[8..24].copy_from_slice(&v6.ip().octets());
            buf[24..28].copy_from_slice(&v6.scope_id().to_ne_bytes());
            buf
        }
    }
}
