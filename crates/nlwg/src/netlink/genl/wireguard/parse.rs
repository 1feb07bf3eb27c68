//! Decoding of GET_DEVICE replies.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::key::Key;
use super::types::{AllowedIp, Device, DeviceType, Peer};
use super::{WgAllowedIpAttr, WgDeviceAttr, WgPeerAttr};
use crate::netlink::attr::{Attr, AttrIter};
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::GenlMessage;

const SOCKADDR_IN_LEN: usize = 16;
const SOCKADDR_IN6_LEN: usize = 28;

/// Build one device from every reply to a GET_DEVICE dump.
///
/// The kernel spreads a large device over several messages and may repeat a
/// peer to continue its allowed IPs. The first occurrence of a public key
/// supplies the peer's scalar fields; allowed IPs from every occurrence are
/// appended in order.
pub fn parse_device(msgs: &[GenlMessage]) -> Result<Device> {
    let mut device: Option<Device> = None;
    let mut index: HashMap<Key, usize> = HashMap::new();

    for msg in msgs {
        let mut next = parse_device_attrs(&msg.data)?;
        let peers = std::mem::take(&mut next.peers);
        let device = device.get_or_insert(next);

        for peer in peers {
            match index.get(&peer.public_key) {
                Some(&i) => device.peers[i].allowed_ips.extend(peer.allowed_ips),
                None => {
                    index.insert(peer.public_key, device.peers.len());
                    device.peers.push(peer);
                }
            }
        }
    }

    device.ok_or_else(|| Error::not_found("wireguard device"))
}

fn parse_device_attrs(data: &[u8]) -> Result<Device> {
    let mut device = Device {
        device_type: DeviceType::LinuxKernel,
        ..Default::default()
    };

    for attr in AttrIter::new(data) {
        let attr = attr?;
        match attr.kind() {
            k if k == WgDeviceAttr::Ifindex as u16 => device.index = attr.u32()?,
            k if k == WgDeviceAttr::Ifname as u16 => device.name = attr.string()?.to_string(),
            k if k == WgDeviceAttr::PrivateKey as u16 => {
                device.private_key = Key::try_from(attr.payload())?
            }
            k if k == WgDeviceAttr::PublicKey as u16 => {
                device.public_key = Key::try_from(attr.payload())?
            }
            k if k == WgDeviceAttr::ListenPort as u16 => device.listen_port = attr.u16()?,
            k if k == WgDeviceAttr::Fwmark as u16 => device.firewall_mark = attr.u32()?,
            k if k == WgDeviceAttr::Peers as u16 => {
                for peer in attr.nested() {
                    device.peers.push(parse_peer(peer?)?);
                }
            }
            _ => {}
        }
    }

    Ok(device)
}

fn parse_peer(nest: Attr<'_>) -> Result<Peer> {
    let mut peer = Peer::default();

    for attr in nest.nested() {
        let attr = attr?;
        match attr.kind() {
            k if k == WgPeerAttr::PublicKey as u16 => {
                peer.public_key = Key::try_from(attr.payload())?
            }
            k if k == WgPeerAttr::PresharedKey as u16 => {
                peer.preshared_key = Key::try_from(attr.payload())?
            }
            k if k == WgPeerAttr::Endpoint as u16 => {
                peer.endpoint = Some(parse_sockaddr(attr.payload())?)
            }
            k if k == WgPeerAttr::PersistentKeepalive as u16 => {
                peer.persistent_keepalive = Duration::from_secs(attr.u16()?.into())
            }
            k if k == WgPeerAttr::LastHandshake as u16 => {
                peer.last_handshake = parse_timespec(attr.payload())?
            }
            k if k == WgPeerAttr::RxBytes as u16 => peer.rx_bytes = attr.u64()?,
            k if k == WgPeerAttr::TxBytes as u16 => peer.tx_bytes = attr.u64()?,
            k if k == WgPeerAttr::AllowedIps as u16 => {
                for ip in attr.nested() {
                    peer.allowed_ips.push(parse_allowed_ip(ip?)?);
                }
            }
            k if k == WgPeerAttr::ProtocolVersion as u16 => peer.protocol_version = attr.u32()?,
            _ => {}
        }
    }

    Ok(peer)
}

fn parse_allowed_ip(nest: Attr<'_>) -> Result<AllowedIp> {
    let mut family = None;
    let mut addr = None;
    let mut cidr = None;

    for attr in nest.nested() {
        let attr = attr?;
        match attr.kind() {
            k if k == WgAllowedIpAttr::Family as u16 => family = Some(attr.u16()?),
            k if k == WgAllowedIpAttr::IpAddr as u16 => {
                addr = Some(match attr.payload().len() {
                    4 => IpAddr::V4(Ipv4Addr::from(attr.array::<4>()?)),
                    16 => IpAddr::V6(Ipv6Addr::from(attr.array::<16>()?)),
                    n => {
                        return Err(Error::MalformedAttribute(format!(
                            "allowed IP address must be 4 or 16 bytes, got {n}"
                        )));
                    }
                })
            }
            k if k == WgAllowedIpAttr::CidrMask as u16 => cidr = Some(attr.u8()?),
            _ => {}
        }
    }

    let addr =
        addr.ok_or_else(|| Error::MalformedAttribute("allowed IP without address".into()))?;
    let ip = AllowedIp {
        addr,
        cidr: cidr.unwrap_or(0),
    };

    if let Some(family) = family
        && family != ip.family()
    {
        return Err(Error::MalformedAttribute(format!(
            "allowed IP family {family} does not match address {addr}"
        )));
    }
    if ip.cidr > ip.max_prefix() {
        return Err(Error::MalformedAttribute(format!(
            "allowed IP prefix {} exceeds {} for {addr}",
            ip.cidr,
            ip.max_prefix()
        )));
    }

    Ok(ip)
}

/// Decode a kernel `sockaddr_in` or `sockaddr_in6`.
pub(crate) fn parse_sockaddr(data: &[u8]) -> Result<SocketAddr> {
    let family = match data.get(0..2) {
        Some(b) => u16::from_ne_bytes([b[0], b[1]]),
        None => {
            return Err(Error::MalformedAttribute(format!(
                "endpoint of {} bytes",
                data.len()
            )));
        }
    };

    match data.len() {
        SOCKADDR_IN_LEN if family == libc::AF_INET as u16 => {
            let port = u16::from_be_bytes([data[2], data[3]]);
            let ip = Ipv4Addr::new(data[4], data[5], data[6], data[7]);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        SOCKADDR_IN6_LEN if family == libc::AF_INET6 as u16 => {
            let port = u16::from_be_bytes([data[2], data[3]]);
            let flowinfo = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[8..24]);
            let scope_id = u32::from_ne_bytes([data[24], data[25], data[26], data[27]]);
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                flowinfo,
                scope_id,
            )))
        }
        len => Err(Error::MalformedAttribute(format!(
            "endpoint of {len} bytes with family {family}"
        ))),
    }
}

/// Decode a `timespec`, either the 32-bit or 64-bit layout.
///
/// A zero time means no handshake has happened.
pub(crate) fn parse_timespec(data: &[u8]) -> Result<Option<SystemTime>> {
    let (sec, nsec) = match data.len() {
        8 => {
            let sec = i32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
            let nsec = i32::from_ne_bytes([data[4], data[5], data[6], data[7]]);
            (i64::from(sec), i64::from(nsec))
        }
        16 => {
            let mut sec = [0u8; 8];
            let mut nsec = [0u8; 8];
            sec.copy_from_slice(&data[0..8]);
            nsec.copy_from_slice(&data[8..16]);
            (i64::from_ne_bytes(sec), i64::from_ne_bytes(nsec))
        }
        len => {
            return Err(Error::MalformedAttribute(format!(
                "timespec must be 8 or 16 bytes, got {len}"
            )));
        }
    };

    if sec == 0 && nsec == 0 {
        return Ok(None);
    }

    let (Ok(sec), Ok(nsec)) = (u64::try_from(sec), u32::try_from(nsec)) else {
        return Err(Error::MalformedAttribute(format!(
            "timespec {sec}.{nsec} is negative"
        )));
    };
    if nsec >= 1_000_000_000 {
        return Err(Error::MalformedAttribute(format!(
            "timespec nanoseconds {nsec} out of range"
        )));
    }

    Ok(Some(UNIX_EPOCH + Duration::new(sec, nsec)))
}
