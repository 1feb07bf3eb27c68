//! Netlink message header and framing.
//!
//! ```text
//! ┌────────────┬───────────┬────────────┬───────────┬───────────┬─────────┐
//! │ len: u32   │ type: u16 │ flags: u16 │ seq: u32  │ pid: u32  │ payload │
//! └────────────┴───────────┴────────────┴───────────┴───────────┴─────────┘
//! ```
//!
//! All header fields are host byte order. Messages are padded to 4 bytes.

use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = 16;

/// Netlink message header (mirrors struct nlmsghdr).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending process port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new message header. Length, sequence and pid are left zero.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Self::default()
        }
    }

    /// Check if this is an error message.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    /// Check if this is a done message.
    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    /// Check if this message has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Encode the header into its 16-byte wire form.
    pub fn to_bytes(&self) -> [u8; NLMSG_HDRLEN] {
        let mut out = [0u8; NLMSG_HDRLEN];
        out[0..4].copy_from_slice(&self.nlmsg_len.to_ne_bytes());
        out[4..6].copy_from_slice(&self.nlmsg_type.to_ne_bytes());
        out[6..8].copy_from_slice(&self.nlmsg_flags.to_ne_bytes());
        out[8..12].copy_from_slice(&self.nlmsg_seq.to_ne_bytes());
        out[12..16].copy_from_slice(&self.nlmsg_pid.to_ne_bytes());
        out
    }

    /// Decode a header from the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < NLMSG_HDRLEN {
            return Err(Error::MalformedMessage(format!(
                "{} bytes is shorter than the {NLMSG_HDRLEN} byte header",
                data.len()
            )));
        }
        let u32_at =
            |i: usize| u32::from_ne_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let u16_at = |i: usize| u16::from_ne_bytes([data[i], data[i + 1]]);
        Ok(Self {
            nlmsg_len: u32_at(0),
            nlmsg_type: u16_at(4),
            nlmsg_flags: u16_at(6),
            nlmsg_seq: u32_at(8),
            nlmsg_pid: u32_at(12),
        })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, message must be discarded.
    pub const NOOP: u16 = 1;
    /// Error message or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart message.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;

    // Link messages (rtnetlink)
    pub const RTM_NEWLINK: u16 = 16;
    pub const RTM_GETLINK: u16 = 18;
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;
pub const NLM_F_DUMP_INTR: u16 = 0x10;
pub const NLM_F_DUMP_FILTERED: u16 = 0x20;

// Modifiers to GET request
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_ATOMIC: u16 = 0x400;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Modifiers to NEW request
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;

// Flags for ACK message
pub const NLM_F_CAPPED: u16 = 0x100;
pub const NLM_F_ACK_TLVS: u16 = 0x200;

/// A netlink message: header plus payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: NlMsgHdr,
    pub data: Vec<u8>,
}

impl Message {
    /// Create a message with zero length, sequence and pid.
    ///
    /// Those fields are filled in by the connection when sent.
    pub fn new(msg_type: u16, flags: u16, data: Vec<u8>) -> Self {
        Self {
            header: NlMsgHdr::new(msg_type, flags),
            data,
        }
    }

    /// Encoded size of this message, header included and padded.
    pub fn encoded_len(&self) -> usize {
        nlmsg_align(NLMSG_HDRLEN + self.data.len())
    }

    /// Encode the message.
    ///
    /// `header.nlmsg_len` must already be set, 4-byte aligned and large enough
    /// for the header and payload.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let len = self.header.nlmsg_len as usize;
        if len < NLMSG_HDRLEN {
            return Err(Error::MalformedMessage(format!(
                "length {len} is shorter than the header"
            )));
        }
        if len != nlmsg_align(len) {
            return Err(Error::MalformedMessage(format!(
                "length {len} is not {NLMSG_ALIGNTO}-byte aligned"
            )));
        }
        if NLMSG_HDRLEN + self.data.len() > len {
            return Err(Error::MalformedMessage(format!(
                "length {len} cannot hold {} payload bytes",
                self.data.len()
            )));
        }

        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(len, 0);
        Ok(buf)
    }

    /// Decode a single message occupying exactly `data`.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let header = NlMsgHdr::parse(data)?;
        if data.len() != nlmsg_align(data.len()) {
            return Err(Error::MalformedMessage(format!(
                "buffer of {} bytes is not {NLMSG_ALIGNTO}-byte aligned",
                data.len()
            )));
        }
        if header.nlmsg_len as usize != data.len() {
            return Err(Error::MalformedMessage(format!(
                "declared length {} does not match buffer of {} bytes",
                header.nlmsg_len,
                data.len()
            )));
        }
        Ok(Self {
            header,
            data: data[NLMSG_HDRLEN..].to_vec(),
        })
    }
}

/// Iterator over the netlink messages packed in one datagram.
///
/// Each message's payload is cut at its declared length; the next message
/// starts at the aligned offset.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let header = match NlMsgHdr::parse(self.data) {
            Ok(h) => h,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > self.data.len() {
            let available = self.data.len();
            self.data = &[];
            return Some(Err(Error::MalformedMessage(format!(
                "invalid message length {msg_len} with {available} bytes available"
            ))));
        }

        let payload = &self.data[NLMSG_HDRLEN..msg_len];
        let aligned_len = nlmsg_align(msg_len);

        // Move to next message
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok((header, payload)))
    }
}

/// Split a received datagram into owned messages.
pub fn parse_messages(data: &[u8]) -> Result<Vec<Message>> {
    MessageIter::new(data)
        .map(|res| {
            res.map(|(header, payload)| Message {
                header,
                data: payload.to_vec(),
            })
        })
        .collect()
}
