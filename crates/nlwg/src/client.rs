//! Backend-independent WireGuard client.
//!
//! A [`Client`] picks the first available backend when it is created. Only
//! the Linux kernel backend exists today; it drives the "wireguard" generic
//! netlink family and finds devices through a route netlink link dump.

use crate::netlink::genl::GenlConnection;
use crate::netlink::genl::wireguard::{Device, DeviceConfig, WireguardConnection};
use crate::netlink::{Config, Connection, Error, Protocol, Result};
use crate::netlink::{NetlinkSocket, Socket};

/// A WireGuard client bound to one backend.
#[non_exhaustive]
pub enum Client<S: Socket = NetlinkSocket> {
    /// The in-kernel implementation, configured over netlink.
    Kernel {
        wg: WireguardConnection<S>,
        rtnl: Connection<S>,
    },
}

impl Client<NetlinkSocket> {
    /// Probe for an available backend.
    ///
    /// Fails with [`Error::Unsupported`] if no backend is available.
    pub async fn new() -> Result<Self> {
        Self::with_config(Config::default()).await
    }

    /// Like [`new`](Self::new) with explicit transport options.
    pub async fn with_config(config: Config) -> Result<Self> {
        let genl = GenlConnection::with_config(config.clone())?;
        let rtnl = Connection::with_config(Protocol::Route, config)?;
        Self::kernel(genl, rtnl).await
    }
}

impl<S: Socket> Client<S> {
    /// Use the kernel backend over existing connections.
    ///
    /// `rtnl` must be a route netlink connection.
    pub async fn kernel(genl: GenlConnection<S>, rtnl: Connection<S>) -> Result<Self> {
        match WireguardConnection::from_genl(genl).await {
            Ok(wg) => {
                tracing::debug!(family_id = wg.family().id, "using kernel wireguard backend");
                Ok(Self::Kernel { wg, rtnl })
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("wireguard generic netlink family not registered");
                Err(Error::unsupported("wireguard kernel backend"))
            }
            Err(e) => Err(e),
        }
    }

    /// Every WireGuard device visible to this backend.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        match self {
            Self::Kernel { wg, rtnl } => wg.devices_with(rtnl).await,
        }
    }

    /// Get one device by interface name.
    pub async fn device(&self, name: &str) -> Result<Device> {
        match self {
            Self::Kernel { wg, .. } => wg.device(name).await,
        }
    }

    /// Apply a configuration to a device.
    pub async fn configure_device(&self, name: &str, cfg: &DeviceConfig) -> Result<()> {
        match self {
            Self::Kernel { wg, .. } => wg.configure_device(name, cfg).await,
        }
    }

    /// Close every connection held by the backend.
    pub fn close(&self) {
        match self {
            Self::Kernel { wg, rtnl } => {
                wg.close();
                rtnl.close();
            }
        }
    }
}
