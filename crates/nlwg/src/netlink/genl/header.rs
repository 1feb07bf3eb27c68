//! Generic Netlink message header.
//!
//! GENL messages have an additional header after the standard netlink header:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! │   nlmsg_len, nlmsg_type (family_id),    │
//! │   nlmsg_flags, nlmsg_seq, nlmsg_pid     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```

use crate::netlink::error::{Error, Result};

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = 4;

/// Generic Netlink message header.
///
/// This header immediately follows the standard netlink header in GENL messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
}

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self { cmd, version }
    }

    /// Encode the header; the reserved bytes are always zero.
    pub fn to_bytes(&self) -> [u8; GENL_HDRLEN] {
        [self.cmd, self.version, 0, 0]
    }

    /// Decode a header from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [cmd, version, _, _, ..] => Ok(Self::new(*cmd, *version)),
            _ => Err(Error::MalformedMessage(format!(
                "generic netlink payload of {} bytes is shorter than its header",
                data.len()
            ))),
        }
    }
}

/// A generic netlink payload: header plus family-scoped attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenlMessage {
    pub header: GenlMsgHdr,
    /// Encoded attributes following the header.
    pub data: Vec<u8>,
}

impl GenlMessage {
    pub fn new(cmd: u8, version: u8, data: Vec<u8>) -> Self {
        Self {
            header: GenlMsgHdr::new(cmd, version),
            data,
        }
    }

    /// Encode header and attributes as a netlink payload.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(GENL_HDRLEN + self.data.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a netlink payload.
    pub fn unmarshal(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            header: GenlMsgHdr::parse(payload)?,
            data: payload[GENL_HDRLEN..].to_vec(),
        })
    }
}
