//! Netlink attribute (nlattr) handling.
//!
//! Attributes are type-length-value records packed back to back, each padded
//! to a 4-byte boundary:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────┬─────────┐
//! │ nla_len: u16 │ nla_type: u16│ payload (len - 4)    │ padding │
//! └──────────────┴──────────────┴──────────────────────┴─────────┘
//! ```
//!
//! The top two bits of `nla_type` are flags ([`NLA_F_NESTED`],
//! [`NLA_F_NET_BYTEORDER`]); the low 14 bits are the attribute kind. Arrays
//! reuse the kind as a zero-based index.

use super::builder::AttrBuilder;
use super::error::{Error, Result};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Attribute type flags.
pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Byte order used for integer payloads.
///
/// Attribute headers are always host order; this only affects payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Host byte order (the netlink default).
    #[default]
    Native,
    /// Big endian.
    Network,
}

impl ByteOrder {
    pub(crate) fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Self::Native => value.to_ne_bytes(),
            Self::Network => value.to_be_bytes(),
        }
    }

    pub(crate) fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Native => value.to_ne_bytes(),
            Self::Network => value.to_be_bytes(),
        }
    }

    pub(crate) fn u64_bytes(self, value: u64) -> [u8; 8] {
        match self {
            Self::Native => value.to_ne_bytes(),
            Self::Network => value.to_be_bytes(),
        }
    }
}

/// An owned attribute: raw type (flags included) and unpadded payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    /// Type including the nested/byte-order flag bits.
    pub attr_type: u16,
    /// Payload without header or padding.
    pub data: Vec<u8>,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(attr_type: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            attr_type,
            data: data.into(),
        }
    }

    /// Create a nested attribute whose payload is the encoded `children`.
    pub fn nested(attr_type: u16, children: &[Attribute]) -> Result<Self> {
        Ok(Self {
            attr_type: attr_type | NLA_F_NESTED,
            data: encode(children)?,
        })
    }

    /// Attribute kind without flag bits.
    pub fn kind(&self) -> u16 {
        self.attr_type & NLA_TYPE_MASK
    }

    /// Check if the nested flag is set.
    pub fn is_nested(&self) -> bool {
        self.attr_type & NLA_F_NESTED != 0
    }

    /// Decode the payload as a list of child attributes.
    pub fn children(&self) -> Result<Vec<Attribute>> {
        decode(&self.data)
    }
}

/// Encode an ordered list of attributes.
pub fn encode(attrs: &[Attribute]) -> Result<Vec<u8>> {
    let mut builder = AttrBuilder::new();
    for attr in attrs {
        builder.append_attr(attr.attr_type, &attr.data);
    }
    builder.finish()
}

/// Decode a buffer into an ordered list of attributes.
///
/// Nested payloads are left encoded; see [`Attribute::children`].
pub fn decode(data: &[u8]) -> Result<Vec<Attribute>> {
    AttrIter::new(data)
        .map(|attr| attr.map(|a| Attribute::new(a.attr_type(), a.payload())))
        .collect()
}

/// A borrowed attribute produced by [`AttrIter`].
#[derive(Debug, Clone, Copy)]
pub struct Attr<'a> {
    attr_type: u16,
    payload: &'a [u8],
    order: ByteOrder,
}

impl<'a> Attr<'a> {
    /// Raw type including flag bits.
    pub fn attr_type(&self) -> u16 {
        self.attr_type
    }

    /// Attribute kind without flag bits.
    pub fn kind(&self) -> u16 {
        self.attr_type & NLA_TYPE_MASK
    }

    /// Check if the nested flag is set.
    pub fn is_nested(&self) -> bool {
        self.attr_type & NLA_F_NESTED != 0
    }

    /// Check if the sender flagged the payload as network byte order.
    pub fn is_net_byteorder(&self) -> bool {
        self.attr_type & NLA_F_NET_BYTEORDER != 0
    }

    /// The unpadded payload.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn u8(&self) -> Result<u8> {
        get::u8(self.payload)
    }

    pub fn u16(&self) -> Result<u16> {
        match self.order {
            ByteOrder::Native => get::u16_ne(self.payload),
            ByteOrder::Network => get::u16_be(self.payload),
        }
    }

    pub fn u32(&self) -> Result<u32> {
        match self.order {
            ByteOrder::Native => get::u32_ne(self.payload),
            ByteOrder::Network => get::u32_be(self.payload),
        }
    }

    pub fn u64(&self) -> Result<u64> {
        match self.order {
            ByteOrder::Native => get::u64_ne(self.payload),
            ByteOrder::Network => get::u64_be(self.payload),
        }
    }

    pub fn i32(&self) -> Result<i32> {
        self.u32().map(|v| v as i32)
    }

    /// Payload as a NUL-terminated UTF-8 string.
    pub fn string(&self) -> Result<&'a str> {
        get::string(self.payload)
    }

    /// Payload as a fixed-size array; the length must match exactly.
    pub fn array<const N: usize>(&self) -> Result<[u8; N]> {
        get::array(self.payload)
    }

    /// Flag attributes carry no payload; their presence is the value.
    pub fn flag(&self) -> Result<bool> {
        if self.payload.is_empty() {
            Ok(true)
        } else {
            Err(Error::MalformedAttribute(format!(
                "flag attribute {} has {} byte payload",
                self.kind(),
                self.payload.len()
            )))
        }
    }

    /// Iterate the payload as nested attributes, keeping this byte order.
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::with_byte_order(self.payload, self.order)
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Yields an error and stops if a declared length is shorter than the header
/// or runs past the buffer.
#[derive(Debug, Clone)]
pub struct AttrIter<'a> {
    data: &'a [u8],
    order: ByteOrder,
    failed: bool,
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator using host byte order.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_byte_order(data, ByteOrder::Native)
    }

    /// Create a new attribute iterator with an explicit payload byte order.
    pub fn with_byte_order(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            order,
            failed: false,
        }
    }

    /// Byte order applied to integer accessors.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.failed
    }

    fn fail(&mut self, msg: String) -> Option<Result<Attr<'a>>> {
        self.failed = true;
        self.data = &[];
        Some(Err(Error::MalformedAttribute(msg)))
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Result<Attr<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        if self.data.len() < NLA_HDRLEN {
            let remaining = self.data.len();
            return self.fail(format!("{remaining} trailing bytes, shorter than header"));
        }

        let len = u16::from_ne_bytes([self.data[0], self.data[1]]) as usize;
        let attr_type = u16::from_ne_bytes([self.data[2], self.data[3]]);

        if len < NLA_HDRLEN {
            return self.fail(format!("attribute length {len} shorter than header"));
        }
        if len > self.data.len() {
            let remaining = self.data.len();
            return self.fail(format!(
                "attribute length {len} runs past buffer of {remaining} bytes"
            ));
        }

        let payload = &self.data[NLA_HDRLEN..len];
        // The final attribute may arrive without its padding.
        let advance = nla_align(len).min(self.data.len());
        self.data = &self.data[advance..];

        Some(Ok(Attr {
            attr_type,
            payload,
            order: self.order,
        }))
    }
}

/// Helper functions for extracting typed values from attribute payloads.
///
/// Every integer accessor requires the exact width.
pub mod get {
    use super::*;

    fn exact<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        data.try_into().map_err(|_| {
            Error::MalformedAttribute(format!(
                "{what} attribute must be {N} bytes, got {}",
                data.len()
            ))
        })
    }

    /// Extract a u8 value.
    pub fn u8(data: &[u8]) -> Result<u8> {
        exact::<1>(data, "u8").map(|b| b[0])
    }

    /// Extract a u16 value (native endian).
    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        exact(data, "u16").map(u16::from_ne_bytes)
    }

    /// Extract a u32 value (native endian).
    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        exact(data, "u32").map(u32::from_ne_bytes)
    }

    /// Extract a u64 value (native endian).
    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        exact(data, "u64").map(u64::from_ne_bytes)
    }

    /// Extract a u16 value (big endian / network order).
    pub fn u16_be(data: &[u8]) -> Result<u16> {
        exact(data, "u16").map(u16::from_be_bytes)
    }

    /// Extract a u32 value (big endian / network order).
    pub fn u32_be(data: &[u8]) -> Result<u32> {
        exact(data, "u32").map(u32::from_be_bytes)
    }

    /// Extract a u64 value (big endian / network order).
    pub fn u64_be(data: &[u8]) -> Result<u64> {
        exact(data, "u64").map(u64::from_be_bytes)
    }

    /// Extract an i32 value (native endian).
    pub fn i32_ne(data: &[u8]) -> Result<i32> {
        exact(data, "i32").map(i32::from_ne_bytes)
    }

    /// Extract a fixed-size byte array.
    pub fn array<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
        exact(data, "fixed-size")
    }

    /// Extract a null-terminated string.
    pub fn string(data: &[u8]) -> Result<&str> {
        // Find null terminator or use whole buffer
        let len = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..len])
            .map_err(|e| Error::MalformedAttribute(format!("invalid UTF-8: {}", e)))
    }
}
