use std::{error, fmt};

use bitflags::bitflags;

/// Size of the attribute header: two native-endian `u16`s, length then type.
pub const NLA_HDR_SIZE: usize = 4;

/// Attribute payloads are aligned to 4-byte boundaries.
pub const NLA_ALIGN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Truncated { offset: usize, available: usize },
    BadLength { offset: usize, length: u16 },
    Overrun { offset: usize, length: u16, available: usize },
    TooLong(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset, available } => write!(
                f,
                "truncated attribute header at offset {offset}: {available} byte(s) left"
            ),
            Self::BadLength { offset, length } => write!(
                f,
                "attribute at offset {offset} declares length {length}, minimum is {NLA_HDR_SIZE}"
            ),
            Self::Overrun { offset, length, available } => write!(
                f,
                "attribute at offset {offset} declares length {length} but only {available} byte(s) remain"
            ),
            Self::TooLong(len) => write!(
                f,
                "attribute payload of {len} bytes does not fit the 16-bit length field"
            ),
        }
    }
}

impl error::Error for Error {}

bitflags! {
    /// Flag bits the kernel may set in the high bits of the attribute type
    /// field. The low 14 bits are the type id proper.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u16 {
        const NET_BYTEORDER = 1 << 14;
        const NESTED = 1 << 15;
    }
}

impl TypeFlags {
    /// Mask selecting the type id bits of the type field.
    pub const TYPE_MASK: u16 = !(TypeFlags::NET_BYTEORDER.bits() | TypeFlags::NESTED.bits());
}

/// Round `n` up to the next 4-byte boundary.
#[must_use]
pub const fn align4(n: usize) -> usize {
    (n + NLA_ALIGN - 1) & !(NLA_ALIGN - 1)
}

/// Zero-fill `buf` up to the next 4-byte boundary.
pub fn pad_to_align(buf: &mut Vec<u8>) {
    buf.resize(align4(buf.len()), 0);
}

/// Append one attribute: header, payload, padding.
///
/// The length field covers the header and the unaligned payload; the
/// padding that follows is not counted.
pub fn put_attr(buf: &mut Vec<u8>, type_id: u16, payload: &[u8]) -> Result<(), Error> {
    let length =
        u16::try_from(NLA_HDR_SIZE + payload.len()).map_err(|_| Error::TooLong(payload.len()))?;
    buf.extend_from_slice(&length.to_ne_bytes());
    buf.extend_from_slice(&type_id.to_ne_bytes());
    buf.extend_from_slice(payload);
    pad_to_align(buf);
    Ok(())
}

/// One attribute as found in a stream. The payload borrows the input and
/// excludes both the header and the alignment padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nla<'input> {
    pub type_id: u16,
    pub payload: &'input [u8],
}

impl Nla<'_> {
    /// Type id with the flag bits masked off.
    #[must_use]
    pub fn kind(&self) -> u16 {
        self.type_id & TypeFlags::TYPE_MASK
    }

    /// Flag bits of the type field.
    #[must_use]
    pub fn flags(&self) -> TypeFlags {
        TypeFlags::from_bits_truncate(self.type_id)
    }
}

/// Splits a buffer into a stream of attributes.
///
/// Yields one `Nla` per attribute, advancing by the aligned length. The
/// final attribute may omit its trailing padding. After yielding an error
/// the iterator is done.
#[derive(Debug, Clone)]
pub struct NlaIter<'input> {
    buffer: &'input [u8],
    offset: usize,
}

impl<'input> NlaIter<'input> {
    #[must_use]
    pub fn new(buffer: &'input [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn split_one(offset: usize, rest: &'input [u8]) -> Result<(usize, Nla<'input>), Error> {
        let Some(header) = rest.first_chunk::<NLA_HDR_SIZE>() else {
            return Err(Error::Truncated {
                offset,
                available: rest.len(),
            });
        };
        let length = u16::from_ne_bytes([header[0], header[1]]);
        let type_id = u16::from_ne_bytes([header[2], header[3]]);
        if (length as usize) < NLA_HDR_SIZE {
            return Err(Error::BadLength { offset, length });
        }
        if length as usize > rest.len() {
            return Err(Error::Overrun {
                offset,
                length,
                available: rest.len(),
            });
        }
        Ok((
            align4(length as usize),
            Nla {
                type_id,
                payload: &rest[NLA_HDR_SIZE..length as usize],
            },
        ))
    }
}

impl<'input> Iterator for NlaIter<'input> {
    type Item = Result<Nla<'input>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buffer.len() {
            return None;
        }
        let offset = self.offset;
        let rest: &'input [u8] = &self.buffer[offset..];
        let result = Self::split_one(offset, rest);
        match &result {
            // Don't keep scanning a stream that is already known bad.
            Err(_) => self.offset = self.buffer.len(),
            Ok((advance, _)) => self.offset += advance,
        }
        Some(result.map(|(_, nla)| nla))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(type_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        put_attr(&mut buf, type_id, payload).unwrap();
        buf
    }

    #[test]
    fn test_align4() {
        assert_eq!(0, align4(0));
        assert_eq!(4, align4(1));
        assert_eq!(4, align4(4));
        assert_eq!(8, align4(5));
        assert_eq!(8, align4(7));
    }

    #[test]
    fn test_put_attr_layout() {
        let buf = attr(3, &[0xaa, 0xbb, 0xcc]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&7u16.to_ne_bytes());
        expected.extend_from_slice(&3u16.to_ne_bytes());
        expected.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0x00]);
        assert_eq!(expected, buf);

        // Empty payload: header only, already aligned.
        assert_eq!(4, attr(9, &[]).len());
    }

    #[test]
    fn test_put_attr_too_long() {
        let mut buf = Vec::new();
        let payload = vec![0u8; usize::from(u16::MAX)];
        assert!(matches!(
            put_attr(&mut buf, 1, &payload),
            Err(Error::TooLong(_))
        ));
    }

    #[test]
    fn test_iter_splits_attrs() {
        let mut buf = attr(1, &[0xff]);
        buf.extend_from_slice(&attr(2, b"hi\0"));
        let attrs: Vec<_> = NlaIter::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(2, attrs.len());
        assert_eq!(1, attrs[0].type_id);
        assert_eq!(&[0xff], attrs[0].payload);
        assert_eq!(2, attrs[1].type_id);
        assert_eq!(b"hi\0", attrs[1].payload);
    }

    #[test]
    fn test_iter_empty() {
        assert!(NlaIter::new(&[]).next().is_none());
    }

    #[test]
    fn test_iter_unpadded_tail() {
        // 5-byte attribute with the trailing padding missing.
        let mut buf = Vec::new();
        buf.extend_from_slice(&5u16.to_ne_bytes());
        buf.extend_from_slice(&7u16.to_ne_bytes());
        buf.push(0x42);
        let mut iter = NlaIter::new(&buf);
        let nla = iter.next().unwrap().unwrap();
        assert_eq!(7, nla.type_id);
        assert_eq!(&[0x42], nla.payload);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_zero_length() {
        let buf = [0u8, 0, 1, 0];
        let mut iter = NlaIter::new(&buf);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::BadLength { offset: 0, length: 0 }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_truncated_header() {
        let mut buf = attr(1, &[1, 2, 3, 4]);
        buf.extend_from_slice(&[0, 0]);
        let mut iter = NlaIter::new(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(
            iter.next(),
            Some(Err(Error::Truncated { offset: 8, available: 2 }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_overrun() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&12u16.to_ne_bytes());
        buf.extend_from_slice(&1u16.to_ne_bytes());
        buf.extend_from_slice(&[0; 4]);
        let mut iter = NlaIter::new(&buf);
        assert!(matches!(
            iter.next(),
            Some(Err(Error::Overrun { offset: 0, length: 12, available: 8 }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_type_flags() {
        let nla = Nla {
            type_id: 7 | TypeFlags::NESTED.bits(),
            payload: &[],
        };
        assert_eq!(7, nla.kind());
        assert_eq!(TypeFlags::NESTED, nla.flags());
    }
}
