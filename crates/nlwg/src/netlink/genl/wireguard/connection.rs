//! WireGuard connection for device configuration.

use super::configure::{build_batches, config_attrs};
use super::key::Key;
use super::parse::parse_device;
use super::types::{Device, DeviceConfig, PeerConfig};
use super::{WG_GENL_NAME, WG_GENL_VERSION, WG_LINK_KIND, WgCmd, WgDeviceAttr};
use crate::netlink::builder::AttrBuilder;
use crate::netlink::config::Config;
use crate::netlink::connection::Connection;
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::{Family, GenlConnection, GenlMessage};
use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST};
use crate::netlink::socket::{NetlinkSocket, Socket};

/// Connection for configuring WireGuard interfaces.
///
/// Wraps a Generic Netlink connection with the resolved "wireguard" family.
/// Construction fails with [`Error::NotFound`] if the kernel module is not
/// loaded.
pub struct WireguardConnection<S: Socket = NetlinkSocket> {
    genl: GenlConnection<S>,
    family: Family,
}

impl WireguardConnection<NetlinkSocket> {
    /// Open a Generic Netlink socket and resolve the WireGuard family.
    pub async fn new() -> Result<Self> {
        Self::from_genl(GenlConnection::new()?).await
    }

    /// Like [`new`](Self::new) with explicit transport options.
    pub async fn with_config(config: Config) -> Result<Self> {
        Self::from_genl(GenlConnection::with_config(config)?).await
    }
}

impl<S: Socket> WireguardConnection<S> {
    /// Create a WireGuard connection from an existing GENL connection.
    pub async fn from_genl(genl: GenlConnection<S>) -> Result<Self> {
        let family = genl.get_family(WG_GENL_NAME).await?;
        Ok(Self { genl, family })
    }

    /// Get the underlying GENL connection.
    pub fn genl(&self) -> &GenlConnection<S> {
        &self.genl
    }

    /// The resolved WireGuard family.
    pub fn family(&self) -> &Family {
        &self.family
    }

    /// Get device information.
    ///
    /// A device spread over several replies is merged into one, see
    /// [`parse_device`].
    pub async fn device(&self, name: &str) -> Result<Device> {
        if name.is_empty() {
            return Err(device_not_found(name));
        }

        let mut attrs = AttrBuilder::new();
        attrs.append_attr_str(WgDeviceAttr::Ifname as u16, name);
        let request = GenlMessage::new(WgCmd::GetDevice as u8, WG_GENL_VERSION, attrs.finish()?);

        let replies = self
            .genl
            .execute(&request, self.family.id, NLM_F_REQUEST | NLM_F_DUMP)
            .await
            .map_err(|e| map_device_error(name, e))?;

        if replies.is_empty() {
            return Err(device_not_found(name));
        }

        let device = parse_device(&replies)?;
        tracing::debug!(
            name,
            messages = replies.len(),
            peers = device.peers.len(),
            "fetched wireguard device"
        );
        Ok(device)
    }

    /// Apply a configuration to a device.
    ///
    /// Large configurations are sent as several acknowledged messages, see
    /// [`build_batches`]. If a message after the first fails, the earlier
    /// ones stay applied and [`Error::BatchPartialFailure`] reports how many.
    pub async fn configure_device(&self, name: &str, cfg: &DeviceConfig) -> Result<()> {
        if name.is_empty() {
            return Err(device_not_found(name));
        }

        // Encode everything first so invalid input sends nothing.
        let requests = build_batches(cfg)
            .iter()
            .map(|batch| {
                config_attrs(name, batch)
                    .map(|attrs| GenlMessage::new(WgCmd::SetDevice as u8, WG_GENL_VERSION, attrs))
            })
            .collect::<Result<Vec<_>>>()?;

        let total = requests.len();
        tracing::debug!(
            name,
            peers = cfg.peers.len(),
            allowed_ips = cfg.allowed_ip_count(),
            messages = total,
            "configuring wireguard device"
        );

        for (applied, request) in requests.iter().enumerate() {
            let result = self
                .genl
                .execute(request, self.family.id, NLM_F_REQUEST | NLM_F_ACK)
                .await;

            if let Err(e) = result {
                if applied == 0 {
                    return Err(map_device_error(name, e));
                }
                tracing::warn!(
                    name,
                    applied,
                    total,
                    error = %e,
                    "wireguard configuration partially applied"
                );
                return Err(Error::BatchPartialFailure {
                    applied,
                    total,
                    source: Box::new(e),
                });
            }
        }

        Ok(())
    }

    /// Add or update a single peer.
    pub async fn set_peer(&self, name: &str, peer: PeerConfig) -> Result<()> {
        self.configure_device(name, &DeviceConfig::new().peer(peer))
            .await
    }

    /// Remove a peer by public key.
    pub async fn remove_peer(&self, name: &str, public_key: Key) -> Result<()> {
        self.set_peer(name, PeerConfig::new(public_key).remove())
            .await
    }

    /// Every WireGuard device, found through a route netlink link dump.
    ///
    /// A device deleted between the dump and its query is skipped.
    pub async fn devices_with<R: Socket>(&self, rtnl: &Connection<R>) -> Result<Vec<Device>> {
        let names = rtnl.link_names_of_kind(WG_LINK_KIND).await?;

        let mut devices = Vec::with_capacity(names.len());
        for name in names {
            match self.device(&name).await {
                Ok(device) => devices.push(device),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(name, "wireguard device vanished during listing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    /// Close the underlying connection.
    pub fn close(&self) {
        self.genl.close();
    }
}

fn device_not_found(name: &str) -> Error {
    Error::not_found(format!("wireguard device {name:?}"))
}

/// The kernel reports a missing or non-WireGuard interface as ENODEV or
/// EOPNOTSUPP.
fn map_device_error(name: &str, e: Error) -> Error {
    match e.errno() {
        Some(libc::ENODEV | libc::EOPNOTSUPP) => device_not_found(name),
        _ => e,
    }
}
