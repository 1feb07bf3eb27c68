//! Generic Netlink connection with family resolution.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::header::GenlMessage;
use super::{CTRL_VERSION, CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::AttrIter;
use crate::netlink::builder::AttrBuilder;
use crate::netlink::config::Config;
use crate::netlink::connection::Connection;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{Message, NLM_F_DUMP, NLM_F_REQUEST};
use crate::netlink::socket::{NetlinkSocket, Protocol, Socket};

/// First message type available to families; lower values are control types.
const NLMSG_MIN_TYPE: u16 = 0x10;

/// A multicast group exposed by a family.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MulticastGroup {
    /// Group ID, passed to [`Connection::join_group`].
    pub id: u32,
    pub name: String,
}

/// Information about a Generic Netlink family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Family {
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    pub name: String,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups in kernel order.
    pub groups: Vec<MulticastGroup>,
}

impl Family {
    /// Decode the attributes of a `CTRL_CMD_NEWFAMILY` reply.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut id: Option<u16> = None;
        let mut family = Family::default();

        for attr in AttrIter::new(data) {
            let attr = attr?;
            match attr.kind() {
                t if t == CtrlAttr::FamilyId as u16 => {
                    id = Some(attr.u16()?);
                }
                t if t == CtrlAttr::FamilyName as u16 => {
                    family.name = attr.string()?.to_string();
                }
                t if t == CtrlAttr::Version as u16 => {
                    let version = attr.u32()?;
                    family.version = u8::try_from(version).map_err(|_| {
                        Error::MalformedAttribute(format!("family version {version} out of range"))
                    })?;
                }
                t if t == CtrlAttr::HdrSize as u16 => {
                    family.hdr_size = attr.u32()?;
                }
                t if t == CtrlAttr::MaxAttr as u16 => {
                    family.max_attr = attr.u32()?;
                }
                t if t == CtrlAttr::McastGroups as u16 => {
                    family.groups = parse_mcast_groups(attr.nested())?;
                }
                _ => {}
            }
        }

        family.id = id.ok_or_else(|| Error::MalformedMessage("missing family ID".into()))?;
        Ok(family)
    }

    /// Look up a multicast group ID by name.
    pub fn group(&self, name: &str) -> Option<u32> {
        self.groups.iter().find(|g| g.name == name).map(|g| g.id)
    }
}

/// Parse CTRL_ATTR_MCAST_GROUPS, an array of nested groups.
fn parse_mcast_groups(groups: AttrIter<'_>) -> Result<Vec<MulticastGroup>> {
    let mut out = Vec::new();

    for group in groups {
        let group = group?;
        let mut name: Option<String> = None;
        let mut grp_id: Option<u32> = None;

        for attr in group.nested() {
            let attr = attr?;
            match attr.kind() {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(attr.string()?.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    grp_id = Some(attr.u32()?);
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, grp_id) {
            out.push(MulticastGroup { id, name });
        }
    }

    Ok(out)
}

/// Generic Netlink connection.
///
/// Provides family ID resolution and high-level GENL operations.
/// Family IDs are cached to avoid repeated kernel queries.
///
/// # Example
///
/// ```rust,no_run
/// use nlwg::netlink::genl::GenlConnection;
///
/// # async fn example() -> nlwg::Result<()> {
/// let conn = GenlConnection::new()?;
///
/// // Get family info (cached after first call)
/// let wg_family = conn.get_family("wireguard").await?;
/// println!("WireGuard family ID: {}", wg_family.id);
///
/// for family in conn.list_families().await? {
///     println!("{} (id {}, {} groups)", family.name, family.id, family.groups.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct GenlConnection<S: Socket = NetlinkSocket> {
    conn: Connection<S>,
    cache: RwLock<HashMap<String, Family>>,
}

impl GenlConnection<NetlinkSocket> {
    /// Create a new Generic Netlink connection.
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    /// Create a connection with explicit options.
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self::from_connection(Connection::with_config(
            Protocol::Generic,
            config,
        )?))
    }
}

impl<S: Socket> GenlConnection<S> {
    /// Wrap an existing `Protocol::Generic` connection.
    pub fn from_connection(conn: Connection<S>) -> Self {
        Self {
            conn,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get the underlying netlink connection.
    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    /// Send a GENL message to `family` without waiting for a reply.
    pub async fn send(&self, msg: &GenlMessage, family: u16, flags: u16) -> Result<Message> {
        self.conn
            .send(Message::new(family, flags, msg.marshal()))
            .await
    }

    /// Receive one transmission and decode its family messages.
    ///
    /// ACKs and other control messages are checked by the transport and
    /// left out.
    pub async fn receive(&self) -> Result<Vec<GenlMessage>> {
        unpack(self.conn.receive().await?)
    }

    /// Send a GENL request and decode its validated replies.
    pub async fn execute(
        &self,
        msg: &GenlMessage,
        family: u16,
        flags: u16,
    ) -> Result<Vec<GenlMessage>> {
        let replies = self
            .conn
            .execute(Message::new(family, flags, msg.marshal()))
            .await?;
        unpack(replies)
    }

    /// Get information about a Generic Netlink family.
    ///
    /// The result is cached, so subsequent calls for the same family
    /// do not require kernel communication.
    pub async fn get_family(&self, name: &str) -> Result<Family> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(family) = cached {
            return Ok(family);
        }

        let family = self.query_family(name).await?;
        tracing::debug!(name, id = family.id, version = family.version, "resolved genl family");

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), family.clone());
        Ok(family)
    }

    /// Get the family ID for a given family name.
    pub async fn get_family_id(&self, name: &str) -> Result<u16> {
        Ok(self.get_family(name).await?.id)
    }

    /// Dump every registered family. An empty list is not an error.
    pub async fn list_families(&self) -> Result<Vec<Family>> {
        let request = GenlMessage::new(CtrlCmd::GetFamily as u8, CTRL_VERSION, Vec::new());
        let replies = self
            .execute(&request, GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_DUMP)
            .await?;

        let families = replies
            .iter()
            .map(|reply| Family::parse(&reply.data))
            .collect::<Result<Vec<_>>>()?;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for family in &families {
            cache.insert(family.name.clone(), family.clone());
        }
        Ok(families)
    }

    /// Clear the family cache.
    ///
    /// Useful if families are loaded or unloaded at runtime.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Close the underlying connection.
    pub fn close(&self) {
        self.conn.close();
    }

    /// Query the kernel for family information.
    async fn query_family(&self, name: &str) -> Result<Family> {
        let mut attrs = AttrBuilder::new();
        attrs.append_attr_str(CtrlAttr::FamilyName as u16, name);
        let request = GenlMessage::new(CtrlCmd::GetFamily as u8, CTRL_VERSION, attrs.finish()?);

        let replies = match self.execute(&request, GENL_ID_CTRL, NLM_F_REQUEST).await {
            Ok(replies) => replies,
            Err(e) if e.errno() == Some(libc::ENOENT) => {
                tracing::debug!(name, "genl family not registered");
                return Err(Error::not_found(format!("generic netlink family {name:?}")));
            }
            Err(e) => return Err(e),
        };

        match replies.as_slice() {
            [] => Err(Error::not_found(format!("generic netlink family {name:?}"))),
            [reply] => Family::parse(&reply.data),
            many => Err(Error::MalformedMessage(format!(
                "expected one family reply for {name:?}, got {}",
                many.len()
            ))),
        }
    }
}

fn unpack(msgs: Vec<Message>) -> Result<Vec<GenlMessage>> {
    msgs.iter()
        .filter(|msg| msg.header.nlmsg_type >= NLMSG_MIN_TYPE)
        .map(|msg| GenlMessage::unmarshal(&msg.data))
        .collect()
}
