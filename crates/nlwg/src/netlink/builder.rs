//! Streaming attribute encoder.

use super::attr::{ByteOrder, NLA_F_NESTED, NLA_HDRLEN, nla_align};
use super::error::{Error, Result};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
#[must_use = "pass the token to nest_end"]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for attribute payloads.
///
/// Integer payloads use the builder's [`ByteOrder`]. An attribute that does
/// not fit the 16-bit length field poisons the builder and is reported by
/// [`finish`](Self::finish).
#[derive(Debug, Clone, Default)]
pub struct AttrBuilder {
    buf: Vec<u8>,
    order: ByteOrder,
    oversized: Option<usize>,
}

impl AttrBuilder {
    /// Create a builder using host byte order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with an explicit payload byte order.
    pub fn with_byte_order(order: ByteOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Get the current encoded length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn write_header(&mut self, attr_type: u16, len: usize) {
        let len = match u16::try_from(len) {
            Ok(len) => len,
            Err(_) => {
                self.oversized.get_or_insert(len);
                u16::MAX
            }
        };
        self.buf.extend_from_slice(&len.to_ne_bytes());
        self.buf.extend_from_slice(&attr_type.to_ne_bytes());
    }

    fn pad(&mut self) {
        let aligned = nla_align(self.buf.len());
        self.buf.resize(aligned, 0);
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> &mut Self {
        self.write_header(attr_type, NLA_HDRLEN + data.len());
        self.buf.extend_from_slice(data);
        self.pad();
        self
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> &mut Self {
        self.append_attr(attr_type, &[value])
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_empty(&mut self, attr_type: u16) -> &mut Self {
        self.append_attr(attr_type, &[])
    }

    /// Append a u16 attribute.
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) -> &mut Self {
        let bytes = self.order.u16_bytes(value);
        self.append_attr(attr_type, &bytes)
    }

    /// Append a u32 attribute.
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> &mut Self {
        let bytes = self.order.u32_bytes(value);
        self.append_attr(attr_type, &bytes)
    }

    /// Append a u64 attribute.
    pub fn append_attr_u64(&mut self, attr_type: u16, value: u64) -> &mut Self {
        let bytes = self.order.u64_bytes(value);
        self.append_attr(attr_type, &bytes)
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> &mut Self {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.append_attr(attr_type, &data)
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> NestToken {
        let offset = self.buf.len();
        // Placeholder header, length patched by nest_end
        self.write_header(attr_type | NLA_F_NESTED, NLA_HDRLEN);
        NestToken { offset }
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) -> &mut Self {
        let len = self.buf.len() - token.offset;
        let len = match u16::try_from(len) {
            Ok(len) => len,
            Err(_) => {
                self.oversized.get_or_insert(len);
                u16::MAX
            }
        };
        self.buf[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes());
        self.pad();
        self
    }

    /// Finalize and return the encoded attributes.
    pub fn finish(self) -> Result<Vec<u8>> {
        match self.oversized {
            Some(len) => Err(Error::MalformedAttribute(format!(
                "attribute length {len} exceeds {}",
                u16::MAX
            ))),
            None => Ok(self.buf),
        }
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{AttrIter, Attribute, decode};

    #[test]
    fn test_attribute() {
        let mut builder = AttrBuilder::new();
        builder.append_attr_u32(1, 0x12345678);
        let buf = builder.finish().unwrap();

        assert_eq!(buf.len(), NLA_HDRLEN + 4);
        let attr = AttrIter::new(&buf).next().unwrap().unwrap();
        assert_eq!(attr.kind(), 1);
        assert_eq!(attr.u32().unwrap(), 0x12345678);
    }

    #[test]
    fn test_nested_attribute() {
        let mut builder = AttrBuilder::new();
        let nest = builder.nest_start(8);
        builder.append_attr_u16(6, 51820).append_attr_str(2, "wg0");
        builder.nest_end(nest);
        let buf = builder.finish().unwrap();

        let expected = Attribute::nested(
            8,
            &[
                Attribute::new(6, 51820u16.to_ne_bytes()),
                Attribute::new(2, "wg0\0"),
            ],
        )
        .unwrap();
        assert_eq!(decode(&buf).unwrap(), vec![expected]);
    }

    #[test]
    fn test_empty_nest() {
        let mut builder = AttrBuilder::new();
        let nest = builder.nest_start(1);
        builder.nest_end(nest);
        let buf = builder.finish().unwrap();

        let mut expected = 4u16.to_ne_bytes().to_vec();
        expected.extend_from_slice(&(1u16 | NLA_F_NESTED).to_ne_bytes());
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_network_order() {
        let mut builder = AttrBuilder::with_byte_order(ByteOrder::Network);
        builder.append_attr_u16(1, 0x0102);
        let buf = builder.finish().unwrap();
        assert_eq!(&buf[4..6], &[0x01, 0x02]);
    }

    #[test]
    fn test_oversized_attribute() {
        let mut builder = AttrBuilder::new();
        builder.append_attr(1, &vec![0u8; 70_000]);
        assert!(matches!(
            builder.finish(),
            Err(Error::MalformedAttribute(_))
        ));
    }

    #[test]
    fn test_oversized_nest() {
        let mut builder = AttrBuilder::new();
        let nest = builder.nest_start(1);
        for i in 0..3 {
            builder.append_attr(i, &vec![0u8; 30_000]);
        }
        builder.nest_end(nest);
        assert!(builder.finish().is_err());
    }
}
