//! Reply builders and request decoders for WireGuard tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::configure::sockaddr_to_bytes;
use super::key::Key;
use super::parse::parse_sockaddr;
use super::types::{AllowedIp, DeviceConfig, PeerConfig};
use super::{
    WG_GENL_NAME, WgAllowedIpAttr, WgCmd, WgDeviceAttr, WgDeviceFlag, WgPeerAttr, WgPeerFlag,
};
use crate::netlink::attr::AttrIter;
use crate::netlink::builder::AttrBuilder;
use crate::netlink::config::Config;
use crate::netlink::connection::Connection;
use crate::netlink::fixtures::{self, MockSocket};
use crate::netlink::genl::{
    CTRL_VERSION, CtrlAttr, CtrlCmd, GENL_ID_CTRL, GenlConnection, GenlMessage,
};
use crate::netlink::message::Message;

/// Family ID the mock controller assigns to WireGuard.
pub(crate) const WG_FAMILY_ID: u16 = 0x19;

/// A distinct, non-zero key per `n`.
pub(crate) fn peer_key(n: u8) -> Key {
    let mut key = [0xaa; 32];
    key[0] = n;
    Key::new(key)
}

/// `count` distinct /32 ranges under 10.n.0.0/16.
pub(crate) fn ips(n: u8, count: usize) -> Vec<AllowedIp> {
    (0..count)
        .map(|i| AllowedIp::v4(Ipv4Addr::new(10, n, (i >> 8) as u8, i as u8), 32))
        .collect()
}

/// A peer as the kernel reports it.
#[derive(Debug, Clone)]
pub(crate) struct ReplyPeer {
    pub public_key: Key,
    pub preshared_key: Key,
    pub endpoint: Option<SocketAddr>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub allowed_ips: Vec<AllowedIp>,
}

impl ReplyPeer {
    pub(crate) fn new(public_key: Key, allowed_ips: Vec<AllowedIp>) -> Self {
        Self {
            public_key,
            preshared_key: Key::new([0xee; 32]),
            endpoint: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 51820)),
            rx_bytes: 100,
            tx_bytes: 200,
            allowed_ips,
        }
    }
}

/// Attributes of one GET_DEVICE reply.
pub(crate) fn device_reply(name: &str, index: u32, peers: &[ReplyPeer]) -> Vec<u8> {
    let private = Key::new([0x11; 32]);
    let mut b = AttrBuilder::new();
    b.append_attr_u32(WgDeviceAttr::Ifindex as u16, index)
        .append_attr_str(WgDeviceAttr::Ifname as u16, name)
        .append_attr(WgDeviceAttr::PrivateKey as u16, private.as_bytes())
        .append_attr(WgDeviceAttr::PublicKey as u16, private.public_key().as_bytes())
        .append_attr_u16(WgDeviceAttr::ListenPort as u16, 51820)
        .append_attr_u32(WgDeviceAttr::Fwmark as u16, 0);

    if !peers.is_empty() {
        let list = b.nest_start(WgDeviceAttr::Peers as u16);
        for (i, peer) in peers.iter().enumerate() {
            let nest = b.nest_start(i as u16);
            b.append_attr(WgPeerAttr::PublicKey as u16, peer.public_key.as_bytes())
                .append_attr(WgPeerAttr::PresharedKey as u16, peer.preshared_key.as_bytes());
            if let Some(endpoint) = &peer.endpoint {
                b.append_attr(WgPeerAttr::Endpoint as u16, &sockaddr_to_bytes(endpoint));
            }
            let mut handshake = 1_700_000_000i64.to_ne_bytes().to_vec();
            handshake.extend_from_slice(&500i64.to_ne_bytes());
            b.append_attr_u16(WgPeerAttr::PersistentKeepalive as u16, 25)
                .append_attr(WgPeerAttr::LastHandshake as u16, &handshake)
                .append_attr_u64(WgPeerAttr::RxBytes as u16, peer.rx_bytes)
                .append_attr_u64(WgPeerAttr::TxBytes as u16, peer.tx_bytes)
                .append_attr_u32(WgPeerAttr::ProtocolVersion as u16, 1);

            let list = b.nest_start(WgPeerAttr::AllowedIps as u16);
            for (j, ip) in peer.allowed_ips.iter().enumerate() {
                let nest = b.nest_start(j as u16);
                b.append_attr_u16(WgAllowedIpAttr::Family as u16, ip.family())
                    .append_attr(WgAllowedIpAttr::IpAddr as u16, &ip.addr_bytes())
                    .append_attr_u8(WgAllowedIpAttr::CidrMask as u16, ip.cidr);
                b.nest_end(nest);
            }
            b.nest_end(list);
            b.nest_end(nest);
        }
        b.nest_end(list);
    }

    b.finish().unwrap()
}

/// A decoded SET_DEVICE request.
#[derive(Debug)]
pub(crate) struct SetDevice {
    pub name: String,
    pub config: DeviceConfig,
}

/// Decode SET_DEVICE attributes back into a configuration.
pub(crate) fn decode_set_device(data: &[u8]) -> SetDevice {
    let mut set = SetDevice {
        name: String::new(),
        config: DeviceConfig::default(),
    };

    for attr in AttrIter::new(data) {
        let attr = attr.unwrap();
        match attr.kind() {
            k if k == WgDeviceAttr::Ifname as u16 => set.name = attr.string().unwrap().into(),
            k if k == WgDeviceAttr::PrivateKey as u16 => {
                set.config.private_key = Some(Key::try_from(attr.payload()).unwrap())
            }
            k if k == WgDeviceAttr::ListenPort as u16 => {
                set.config.listen_port = Some(attr.u16().unwrap())
            }
            k if k == WgDeviceAttr::Fwmark as u16 => {
                set.config.firewall_mark = Some(attr.u32().unwrap())
            }
            k if k == WgDeviceAttr::Flags as u16 => {
                set.config.replace_peers =
                    attr.u32().unwrap() & WgDeviceFlag::ReplacePeers as u32 != 0
            }
            k if k == WgDeviceAttr::Peers as u16 => {
                for peer in attr.nested() {
                    set.config.peers.push(decode_peer(peer.unwrap().payload()));
                }
            }
            other => panic!("unexpected device attribute {other}"),
        }
    }

    set
}

fn decode_peer(data: &[u8]) -> PeerConfig {
    let mut peer = PeerConfig::default();
    for attr in AttrIter::new(data) {
        let attr = attr.unwrap();
        match attr.kind() {
            k if k == WgPeerAttr::PublicKey as u16 => {
                peer.public_key = Key::try_from(attr.payload()).unwrap()
            }
            k if k == WgPeerAttr::Flags as u16 => {
                let flags = attr.u32().unwrap();
                peer.remove = flags & WgPeerFlag::RemoveMe as u32 != 0;
                peer.replace_allowed_ips = flags & WgPeerFlag::ReplaceAllowedIps as u32 != 0;
                peer.update_only = flags & WgPeerFlag::UpdateOnly as u32 != 0;
            }
            k if k == WgPeerAttr::PresharedKey as u16 => {
                peer.preshared_key = Some(Key::try_from(attr.payload()).unwrap())
            }
            k if k == WgPeerAttr::Endpoint as u16 => {
                peer.endpoint = Some(parse_sockaddr(attr.payload()).unwrap())
            }
            k if k == WgPeerAttr::PersistentKeepalive as u16 => {
                peer.persistent_keepalive =
                    Some(Duration::from_secs(attr.u16().unwrap().into()))
            }
            k if k == WgPeerAttr::AllowedIps as u16 => {
                for ip in attr.nested() {
                    let mut addr = None;
                    let mut cidr = 0;
                    for field in ip.unwrap().nested() {
                        let field = field.unwrap();
                        match field.kind() {
                            k if k == WgAllowedIpAttr::IpAddr as u16 => {
                                addr = Some(match field.payload().len() {
                                    4 => IpAddr::from(field.array::<4>().unwrap()),
                                    _ => IpAddr::from(field.array::<16>().unwrap()),
                                })
                            }
                            k if k == WgAllowedIpAttr::CidrMask as u16 => {
                                cidr = field.u8().unwrap()
                            }
                            _ => {}
                        }
                    }
                    peer.allowed_ips.push(AllowedIp {
                        addr: addr.unwrap(),
                        cidr,
                    });
                }
            }
            other => panic!("unexpected peer attribute {other}"),
        }
    }
    peer
}

/// A mock socket that resolves the WireGuard family and hands every other
/// request to `handler`.
pub(crate) fn wg_socket(
    handler: impl Fn(&Message, &GenlMessage) -> Vec<Vec<u8>> + Send + Sync + 'static,
) -> MockSocket {
    MockSocket::with_responder(7, move |req| {
        let genl = GenlMessage::unmarshal(&req.data).unwrap();
        if req.header.nlmsg_type == GENL_ID_CTRL {
            return vec![fixtures::datagram(&[family_reply(req)])];
        }
        assert_eq!(req.header.nlmsg_type, WG_FAMILY_ID);
        handler(req, &genl)
    })
}

fn family_reply(req: &Message) -> Message {
    let mut attrs = AttrBuilder::new();
    attrs
        .append_attr_u16(CtrlAttr::FamilyId as u16, WG_FAMILY_ID)
        .append_attr_str(CtrlAttr::FamilyName as u16, WG_GENL_NAME)
        .append_attr_u32(CtrlAttr::Version as u16, 1);
    let genl = GenlMessage::new(CtrlCmd::NewFamily as u8, CTRL_VERSION, attrs.finish().unwrap());
    fixtures::reply(req, GENL_ID_CTRL, 0, genl.marshal())
}

/// A reply message of the WireGuard family.
pub(crate) fn wg_reply(req: &Message, flags: u16, attrs: Vec<u8>) -> Message {
    let genl = GenlMessage::new(WgCmd::GetDevice as u8, 1, attrs);
    fixtures::reply(req, WG_FAMILY_ID, flags, genl.marshal())
}

pub(crate) fn genl_over(socket: MockSocket) -> GenlConnection<MockSocket> {
    fixtures::init_tracing();
    GenlConnection::from_connection(Connection::from_socket(socket, Config::default()))
}
