//! TLV8 encoder/decoder: HAP's tag-length-value wire format for pairing
//! messages and BLE additional parameters (R2 §5.15, §7.3.3.4). Every
//! element is `[tag: u8][len: u8][value: len bytes]`; a logical value
//! longer than 255 bytes is split across consecutive same-tag elements,
//! each exactly 255 bytes except the last (spec.md §4.6).

use crate::error::BufferError;
use crate::tlv::buffer::Buf;

type Result<T> = core::result::Result<T, BufferError>;

/// Pairing TLV tag catalogue (`original_source/Hap/HapTlv.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    SessionId = 0x0E,
    Flags = 0x13,
    Separator = 0xFF,
}

/// One decoded TLV element: its tag byte and a borrowed value slice.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Iterates the raw elements of a TLV8 stream in order, without
/// reassembling multi-element runs of the same tag — use [`read_value`]
/// when a field might have been split across several 255-byte chunks.
pub struct Reader<'a> {
    rest: &'a [u8],
    errored: bool,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes, errored: false }
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Item<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored || self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 2 {
            self.errored = true;
            return Some(Err(BufferError::Malformed));
        }
        let tag = self.rest[0];
        let len = self.rest[1] as usize;
        if self.rest.len() < 2 + len {
            self.errored = true;
            return Some(Err(BufferError::Malformed));
        }
        let value = &self.rest[2..2 + len];
        self.rest = &self.rest[2 + len..];
        Some(Ok(Item { tag, value }))
    }
}

/// Count the well-formed elements in `bytes`, or `None` if the stream is
/// truncated or malformed.
pub fn count(bytes: &[u8]) -> Option<usize> {
    let mut n = 0;
    for item in Reader::new(bytes) {
        item.ok()?;
        n += 1;
    }
    Some(n)
}

/// Find the first element of `tag`, without multi-element reassembly — for
/// single-chunk fields such as `State`/`Method`/`Error` that are never
/// longer than 255 bytes.
pub fn find<'a>(bytes: &'a [u8], tag: u8) -> Result<Option<&'a [u8]>> {
    for item in Reader::new(bytes) {
        let item = item?;
        if item.tag == tag {
            return Ok(Some(item.value));
        }
    }
    Ok(None)
}

pub fn find_byte(bytes: &[u8], tag: u8) -> Result<Option<u8>> {
    Ok(find(bytes, tag)?.and_then(|v| v.first().copied()))
}

/// Reassemble a value that may have been split into a multi-element run:
/// every *consecutive* element tagged `tag` is concatenated, stopping at
/// the first element of a different tag that follows the run (R2 §14.1 /
/// spec.md §4.6).
pub fn read_value<const N: usize>(bytes: &[u8], tag: u8) -> Result<Option<Buf<N>>> {
    let mut out: Option<Buf<N>> = None;
    let mut in_run = false;
    for item in Reader::new(bytes) {
        let item = item?;
        if item.tag == tag {
            in_run = true;
            let buf = match out.as_mut() {
                Some(b) => b,
                None => {
                    out = Some(Buf::new());
                    out.as_mut().unwrap()
                }
            };
            buf.append(item.value)?;
        } else if in_run {
            break;
        }
    }
    Ok(out)
}

/// Append `value` as one or more TLV elements sharing `tag`, splitting
/// every 255 bytes. A zero-length value still emits a single empty
/// element (used for `Separator` and empty `EncryptedData`/`Proof`).
pub fn write_value<const N: usize>(buf: &mut Buf<N>, tag: u8, value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return buf.append(&[tag, 0]);
    }
    let mut rest = value;
    while !rest.is_empty() {
        let chunk_len = rest.len().min(255);
        buf.append(&[tag, chunk_len as u8])?;
        buf.append(&rest[..chunk_len])?;
        rest = &rest[chunk_len..];
    }
    Ok(())
}

pub fn write_byte<const N: usize>(buf: &mut Buf<N>, tag: u8, byte: u8) -> Result<()> {
    write_value(buf, tag, &[byte])
}

pub fn write_separator<const N: usize>(buf: &mut Buf<N>) -> Result<()> {
    write_value(buf, Tag::Separator as u8, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_find_single_byte_fields() {
        let mut buf: Buf<32> = Buf::new();
        write_byte(&mut buf, Tag::State as u8, 1).unwrap();
        write_byte(&mut buf, Tag::Method as u8, 0).unwrap();
        assert_eq!(find_byte(&buf, Tag::State as u8).unwrap(), Some(1));
        assert_eq!(find_byte(&buf, Tag::Method as u8).unwrap(), Some(0));
        assert_eq!(find_byte(&buf, Tag::Error as u8).unwrap(), None);
    }

    #[test]
    fn count_matches_number_of_elements() {
        let mut buf: Buf<32> = Buf::new();
        write_byte(&mut buf, Tag::State as u8, 3).unwrap();
        write_separator(&mut buf).unwrap();
        assert_eq!(count(&buf), Some(2));
    }

    #[test]
    fn long_value_splits_into_255_byte_chunks() {
        let value = [0x7au8; 300];
        let mut buf: Buf<320> = Buf::new();
        write_value(&mut buf, Tag::EncryptedData as u8, &value).unwrap();
        assert_eq!(count(&buf), Some(2));
        let mut items = Reader::new(&buf);
        let first = items.next().unwrap().unwrap();
        assert_eq!(first.value.len(), 255);
        let second = items.next().unwrap().unwrap();
        assert_eq!(second.value.len(), 45);
        assert!(items.next().is_none());
    }

    #[test]
    fn read_value_reassembles_split_run() {
        let value = [0x11u8; 511];
        let mut buf: Buf<520> = Buf::new();
        write_value(&mut buf, Tag::EncryptedData as u8, &value).unwrap();
        let reassembled: Buf<512> = read_value(&buf, Tag::EncryptedData as u8).unwrap().unwrap();
        assert_eq!(reassembled.as_bytes(), &value[..]);
    }

    #[test]
    fn read_value_stops_at_next_distinct_tag() {
        let mut buf: Buf<32> = Buf::new();
        write_value(&mut buf, Tag::Identifier as u8, b"abc").unwrap();
        write_value(&mut buf, Tag::PublicKey as u8, b"xyz").unwrap();
        write_value(&mut buf, Tag::Identifier as u8, b"def").unwrap();
        let id: Buf<16> = read_value(&buf, Tag::Identifier as u8).unwrap().unwrap();
        assert_eq!(id.as_bytes(), b"abc");
    }

    #[test]
    fn empty_value_emits_single_zero_length_element() {
        let mut buf: Buf<8> = Buf::new();
        write_separator(&mut buf).unwrap();
        assert_eq!(buf.as_bytes(), &[0xFF, 0x00]);
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let bytes = [Tag::State as u8, 5, 1, 2];
        assert_eq!(count(&bytes), None);
        assert!(find(&bytes, Tag::State as u8).is_err());
    }

    #[test]
    fn write_value_rejects_capacity_overflow() {
        let mut buf: Buf<3> = Buf::new();
        assert_eq!(
            write_value(&mut buf, Tag::State as u8, b"ab"),
            Err(BufferError::CapacityExceeded)
        );
    }
}
