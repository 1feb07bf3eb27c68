//! Link enumeration over route netlink.
//!
//! Only what device discovery needs: an `RTM_GETLINK` dump and the interface
//! name and kind of every link.

use super::attr::AttrIter;
use super::connection::Connection;
use super::error::{Error, Result};
use super::message::{Message, NLM_F_DUMP, NLM_F_REQUEST, NlMsgType};
use super::socket::Socket;

/// Attribute IDs for IFLA_* constants.
mod attr_ids {
    pub const IFLA_IFNAME: u16 = 3;
    pub const IFLA_LINKINFO: u16 = 18;
}

/// Nested IFLA_INFO_* attribute IDs.
mod info_ids {
    pub const IFLA_INFO_KIND: u16 = 1;
}

/// Size of `struct ifinfomsg`.
pub const IFINFOMSG_LEN: usize = 16;

/// Interface info message header (`struct ifinfomsg`).
///
/// ```text
/// ┌────────┬──────┬──────────┬─────────┬──────────┬──────────┐
/// │ family │ pad  │ type u16 │ index   │ flags    │ change   │
/// │ u8     │ u8   │          │ i32     │ u32      │ u32      │
/// └────────┴──────┴──────────┴─────────┴──────────┴──────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfInfoMsg {
    pub family: u8,
    pub link_type: u16,
    pub index: i32,
    pub flags: u32,
    pub change: u32,
}

impl IfInfoMsg {
    pub fn to_bytes(&self) -> [u8; IFINFOMSG_LEN] {
        let mut buf = [0u8; IFINFOMSG_LEN];
        buf[0] = self.family;
        buf[2..4].copy_from_slice(&self.link_type.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.index.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.flags.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.change.to_ne_bytes());
        buf
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < IFINFOMSG_LEN {
            return Err(Error::MalformedMessage(format!(
                "link message of {} bytes is shorter than ifinfomsg",
                data.len()
            )));
        }
        let u32_at =
            |i: usize| u32::from_ne_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            family: data[0],
            link_type: u16::from_ne_bytes([data[2], data[3]]),
            index: u32_at(4) as i32,
            flags: u32_at(8),
            change: u32_at(12),
        })
    }
}

/// A network interface as reported by `RTM_NEWLINK`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Link {
    /// Interface index.
    pub index: i32,
    /// Interface name (IFLA_IFNAME).
    pub name: Option<String>,
    /// Link kind from IFLA_LINKINFO, e.g. "wireguard".
    pub kind: Option<String>,
}

impl Link {
    /// Decode the payload of an `RTM_NEWLINK` message.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let header = IfInfoMsg::parse(payload)?;
        let mut link = Link {
            index: header.index,
            ..Default::default()
        };

        for attr in AttrIter::new(&payload[IFINFOMSG_LEN..]) {
            let attr = attr?;
            match attr.kind() {
                attr_ids::IFLA_IFNAME => link.name = Some(attr.string()?.to_string()),
                attr_ids::IFLA_LINKINFO => {
                    for info in attr.nested() {
                        let info = info?;
                        if info.kind() == info_ids::IFLA_INFO_KIND {
                            link.kind = Some(info.string()?.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(link)
    }
}

impl<S: Socket> Connection<S> {
    /// Dump every link. Requires a [`Protocol::Route`](super::Protocol::Route)
    /// connection.
    pub async fn links(&self) -> Result<Vec<Link>> {
        let request = Message::new(
            NlMsgType::RTM_GETLINK,
            NLM_F_REQUEST | NLM_F_DUMP,
            IfInfoMsg::default().to_bytes().to_vec(),
        );

        self.execute(request)
            .await?
            .iter()
            .filter(|msg| msg.header.nlmsg_type == NlMsgType::RTM_NEWLINK)
            .map(|msg| Link::parse(&msg.data))
            .collect()
    }

    /// Names of every link whose kind is `kind`, in dump order.
    pub async fn link_names_of_kind(&self, kind: &str) -> Result<Vec<String>> {
        let names = self
            .links()
            .await?
            .into_iter()
            .filter(|link| link.kind.as_deref() == Some(kind))
            .filter_map(|link| link.name)
            .collect::<Vec<_>>();
        tracing::debug!(kind, count = names.len(), "listed links");
        Ok(names)
    }
}

/// Test helper: an `RTM_NEWLINK` payload with a name and optional kind.
#[cfg(test)]
pub(crate) fn link_payload(index: i32, name: &str, kind: Option<&str>) -> Vec<u8> {
    use super::builder::AttrBuilder;

    let mut payload = IfInfoMsg {
        index,
        ..Default::default()
    }
    .to_bytes()
    .to_vec();

    let mut attrs = AttrBuilder::new();
    attrs.append_attr_str(attr_ids::IFLA_IFNAME, name);
    if let Some(kind) = kind {
        let info = attrs.nest_start(attr_ids::IFLA_LINKINFO);
        attrs.append_attr_str(info_ids::IFLA_INFO_KIND, kind);
        attrs.nest_end(info);
    }
    payload.extend_from_slice(&attrs.finish().unwrap());
    payload
}
