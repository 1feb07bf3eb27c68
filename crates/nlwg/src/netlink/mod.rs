//! Async netlink protocol implementation for Linux.
//!
//! Layers, leaves first:
//!
//! - [`attr`] / [`AttrBuilder`]: TLV attribute encoding and decoding.
//! - [`message`]: the 16-byte netlink header and datagram splitting.
//! - [`ack`]: error, ACK and extended-ack decoding.
//! - [`Connection`]: sequence and pid assignment, multi-part reassembly and
//!   reply validation over any [`Socket`].
//! - [`genl`]: generic netlink family resolution and the WireGuard family.
//!
//! # Quick Start
//!
//! ```ignore
//! use nlwg::netlink::{Connection, Message, Protocol};
//!
//! let conn = Connection::new(Protocol::Route)?;
//!
//! // Dump links
//! for link in conn.links().await? {
//!     println!("{}: {:?}", link.index, link.name);
//! }
//! ```

pub mod ack;
pub mod attr;
mod builder;
mod config;
pub mod connection;
mod error;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod genl;
pub mod message;
pub mod rtnl;
mod socket;

pub use ack::{ExtAck, check_message};
pub use attr::{Attr, AttrIter, Attribute, ByteOrder, decode, encode};
pub use builder::{AttrBuilder, NestToken};
pub use config::{Config, DEFAULT_MAX_RECEIVE_SIZE};
pub use connection::Connection;
pub use error::{Error, Result};
pub use message::{Message, MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, parse_messages};
pub use rtnl::Link;
pub use socket::{NetlinkSocket, Protocol, Socket, SocketOption};
