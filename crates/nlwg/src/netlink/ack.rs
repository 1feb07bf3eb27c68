//! Error and acknowledgement decoding.
//!
//! An `NLMSG_ERROR` payload is a signed errno (0 for an ACK) followed by the
//! request header that caused it and, when `NLM_F_ACK_TLVS` is set, extended
//! acknowledgement attributes:
//!
//! ```text
//! ┌───────────┬────────────────────────────────┬──────────────────┐
//! │ error: i32│ original nlmsghdr (+ payload   │ ext-ack TLVs     │
//! │           │ unless NLM_F_CAPPED)           │                  │
//! └───────────┴────────────────────────────────┴──────────────────┘
//! ```
//!
//! A `NLMSG_DONE` with `NLM_F_MULTI` may also carry an errno, directly
//! followed by ext-ack TLVs.

use super::attr::AttrIter;
use super::error::{Error, Result};
use super::message::{Message, NLM_F_ACK_TLVS, NLM_F_CAPPED, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};

/// Extended ack attribute: human readable message.
pub const NLMSGERR_ATTR_MSG: u16 = 1;
/// Extended ack attribute: offset of the offending attribute in the request.
pub const NLMSGERR_ATTR_OFFS: u16 = 2;
/// Extended ack attribute: opaque cookie.
pub const NLMSGERR_ATTR_COOKIE: u16 = 3;

const ERRNO_LEN: usize = 4;

/// Diagnostic detail attached to an error or ACK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtAck {
    pub message: Option<String>,
    pub offset: Option<u32>,
}

impl ExtAck {
    /// Parse ext-ack TLVs, keeping whatever was decoded before a malformed one.
    pub fn parse(data: &[u8]) -> Self {
        let mut ext = Self::default();
        for attr in AttrIter::new(data) {
            let Ok(attr) = attr else { break };
            match attr.kind() {
                NLMSGERR_ATTR_MSG => {
                    if let Ok(msg) = attr.string() {
                        ext.message = Some(msg.to_string());
                    }
                }
                NLMSGERR_ATTR_OFFS => {
                    if let Ok(off) = attr.u32() {
                        ext.offset = Some(off);
                    }
                }
                _ => {}
            }
        }
        ext
    }
}

/// Check a reply for a kernel-reported failure.
///
/// Returns `Ok` for ordinary messages, ACKs (errno 0) and empty
/// `NLMSG_DONE | NLM_F_MULTI` terminators.
pub fn check_message(msg: &Message) -> Result<()> {
    let header = &msg.header;
    let is_error = header.nlmsg_type == NlMsgType::ERROR;

    if !is_error {
        if !(header.is_done() && header.is_multi()) {
            return Ok(());
        }
        // A terminator without an errno carries no error.
        if msg.data.is_empty() {
            return Ok(());
        }
    }

    let data = &msg.data;
    if data.len() < ERRNO_LEN {
        return Err(Error::MalformedMessage(format!(
            "error message of {} bytes is too short",
            data.len()
        )));
    }

    let code = i32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
    let has_tlvs = header.nlmsg_flags & NLM_F_ACK_TLVS != 0;

    if code == 0 {
        if has_tlvs
            && let Some(off) = tlv_offset(msg)
            && let Some(warning) = ExtAck::parse(&data[off..]).message
        {
            tracing::debug!(%warning, "netlink ack carried a kernel warning");
        }
        return Ok(());
    }

    let mut message = None;
    let mut offset = None;
    if has_tlvs && let Some(off) = tlv_offset(msg) {
        let ext = ExtAck::parse(&data[off..]);
        message = ext.message;
        offset = ext.offset;
    }

    Err(Error::Protocol {
        errno: code.wrapping_neg(),
        message,
        offset,
    })
}

/// Offset of the ext-ack TLVs within `msg.data`, if it lies in bounds.
fn tlv_offset(msg: &Message) -> Option<usize> {
    if msg.header.nlmsg_type != NlMsgType::ERROR {
        return Some(ERRNO_LEN);
    }

    let original = NlMsgHdr::parse(&msg.data[ERRNO_LEN..]).ok()?;
    let off = if msg.header.nlmsg_flags & NLM_F_CAPPED != 0 {
        ERRNO_LEN + NLMSG_HDRLEN
    } else {
        ERRNO_LEN + original.nlmsg_len as usize
    };

    (off <= msg.data.len()).then_some(off)
}
