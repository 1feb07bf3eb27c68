//! Low-level async netlink socket operations.

use std::future::Future;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use netlink_sys::{Socket as SysSocket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::config::Config;
use super::error::{Error, Result};

const SOL_NETLINK: libc::c_int = 270;
const NETLINK_ADD_MEMBERSHIP: libc::c_int = 1;
const NETLINK_DROP_MEMBERSHIP: libc::c_int = 2;
const NETLINK_PKTINFO: libc::c_int = 3;
const NETLINK_BROADCAST_ERROR: libc::c_int = 4;
const NETLINK_NO_ENOBUFS: libc::c_int = 5;
const NETLINK_LISTEN_ALL_NSID: libc::c_int = 8;
const NETLINK_CAP_ACK: libc::c_int = 10;
const NETLINK_EXT_ACK: libc::c_int = 11;
const NETLINK_GET_STRICT_CHK: libc::c_int = 12;

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Routing/device hook (link listing)
    Route,
    /// Generic netlink
    Generic,
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Generic => protocols::NETLINK_GENERIC,
        }
    }
}

/// Boolean socket options understood by netlink sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    PacketInfo,
    BroadcastError,
    NoEnobufs,
    ListenAllNsid,
    CapAcknowledge,
    ExtendedAcknowledge,
    GetStrictCheck,
}

impl SocketOption {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::PacketInfo => NETLINK_PKTINFO,
            Self::BroadcastError => NETLINK_BROADCAST_ERROR,
            Self::NoEnobufs => NETLINK_NO_ENOBUFS,
            Self::ListenAllNsid => NETLINK_LISTEN_ALL_NSID,
            Self::CapAcknowledge => NETLINK_CAP_ACK,
            Self::ExtendedAcknowledge => NETLINK_EXT_ACK,
            Self::GetStrictCheck => NETLINK_GET_STRICT_CHK,
        }
    }
}

/// The OS-level socket a [`Connection`](super::Connection) drives.
///
/// Only `pid`, `send` and `recv` are required. The remaining capabilities
/// default to [`Error::Unsupported`].
pub trait Socket: Send + Sync {
    /// Port ID assigned at bind time.
    fn pid(&self) -> u32;

    /// Transmit one datagram.
    fn send(&self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read one datagram into `buf`, returning its full length.
    ///
    /// With `peek` set the datagram stays queued. A returned length larger
    /// than `buf` means the datagram was truncated.
    fn recv(&self, buf: &mut [u8], peek: bool) -> impl Future<Output = Result<usize>> + Send;

    /// Join a multicast group.
    fn join_group(&self, _group: u32) -> Result<()> {
        Err(Error::unsupported("join-group"))
    }

    /// Leave a multicast group.
    fn leave_group(&self, _group: u32) -> Result<()> {
        Err(Error::unsupported("leave-group"))
    }

    /// Enable or disable a socket option.
    fn set_option(&self, _option: SocketOption, _enable: bool) -> Result<()> {
        Err(Error::unsupported("set-option"))
    }

    /// Set the kernel receive buffer size.
    fn set_read_buffer(&self, _bytes: usize) -> Result<()> {
        Err(Error::unsupported("set-read-buffer"))
    }

    /// Set the kernel send buffer size.
    fn set_write_buffer(&self, _bytes: usize) -> Result<()> {
        Err(Error::unsupported("set-write-buffer"))
    }
}

/// Async netlink socket.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<SysSocket>,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Protocol this socket uses.
    protocol: Protocol,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::with_config(protocol, &Config::default())
    }

    /// Create a socket bound to `config.groups` with the configured options.
    pub fn with_config(protocol: Protocol, config: &Config) -> Result<Self> {
        let mut socket = SysSocket::new(protocol.as_isize())?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, config.groups);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        let fd = AsyncFd::new(socket)?;
        let this = Self { fd, pid, protocol };

        if config.extended_ack {
            // Older kernels lack extended ACK; errors are still reported
            this.set_option(SocketOption::ExtendedAcknowledge, true).ok();
        }
        if config.strict_check {
            this.set_option(SocketOption::GetStrictCheck, true)?;
        }

        tracing::trace!(?protocol, pid, groups = config.groups, "opened netlink socket");
        Ok(this)
    }

    /// Get the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn setsockopt(&self, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> Result<()> {
        // SAFETY: the fd is owned by self and stays open for the call; value
        // points to a live c_int whose size is passed alongside it.
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                &value as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

impl Socket for NetlinkSocket {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn send(&self, buf: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(buf, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv(&self, buf: &mut [u8], peek: bool) -> Result<usize> {
        // MSG_TRUNC makes the kernel report the full datagram length.
        let flags = if peek {
            libc::MSG_PEEK | libc::MSG_TRUNC
        } else {
            libc::MSG_TRUNC
        };

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| {
                let mut window = &mut buf[..];
                inner.get_ref().recv(&mut window, flags)
            }) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    fn join_group(&self, group: u32) -> Result<()> {
        self.setsockopt(SOL_NETLINK, NETLINK_ADD_MEMBERSHIP, group as libc::c_int)
    }

    fn leave_group(&self, group: u32) -> Result<()> {
        self.setsockopt(SOL_NETLINK, NETLINK_DROP_MEMBERSHIP, group as libc::c_int)
    }

    fn set_option(&self, option: SocketOption, enable: bool) -> Result<()> {
        self.setsockopt(SOL_NETLINK, option.as_raw(), enable as libc::c_int)
    }

    fn set_read_buffer(&self, bytes: usize) -> Result<()> {
        let bytes = libc::c_int::try_from(bytes)
            .map_err(|_| Error::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_RCVBUF, bytes)
    }

    fn set_write_buffer(&self, bytes: usize) -> Result<()> {
        let bytes = libc::c_int::try_from(bytes)
            .map_err(|_| Error::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_SNDBUF, bytes)
    }
}
