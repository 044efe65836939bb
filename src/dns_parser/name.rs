use std::borrow::Cow;
use std::fmt;
use std::fmt::Write;
use std::hash;
use std::io;
use std::str::from_utf8;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::Error;

/// Longest label allowed on the wire
pub const MAX_LABEL_LENGTH: usize = 63;
/// Longest encoded name, counting length bytes and the terminating zero
pub const MAX_NAME_LENGTH: usize = 255;

const POINTER_MASK: u8 = 0b1100_0000;

/// The DNS name as stored in the original packet
///
/// This is contains just a reference to the packet and the offset the name
/// starts at. You may turn this into a string using `.to_string()`
#[derive(Debug, Clone)]
pub enum Name<'a> {
    FromPacket {
        /// The original packet, cut at the limit the name was scanned with.
        /// Compression pointers are offsets into this buffer
        original: &'a [u8],
        offset: usize,
    },

    FromStr(Cow<'a, str>),
}

/// Visits every label of the name at `offset`, following compression
/// pointers, and returns the offset right after the name's first
/// occurrence.
///
/// Every pointer must point strictly before both its own position and the
/// previous pointer's target, so a chain always terminates.
fn walk<'a, F>(original: &'a [u8], offset: usize, mut visit: F) -> Result<usize, Error>
where
    F: FnMut(&'a [u8]),
{
    let mut pos = offset;
    let mut next = None;
    let mut last_target = None;
    let mut length = 1;
    loop {
        let byte = *original.get(pos).ok_or(Error::UnexpectedEOF)?;
        if byte == 0 {
            return Ok(next.unwrap_or(pos + 1));
        } else if byte & POINTER_MASK == POINTER_MASK {
            if original.len() < pos + 2 {
                return Err(Error::UnexpectedEOF);
            }
            let target = (BigEndian::read_u16(&original[pos..pos + 2])
                & !0b1100_0000_0000_0000) as usize;
            if target >= pos || last_target.map_or(false, |last| target >= last) {
                return Err(Error::BadPointer(target));
            }
            next.get_or_insert(pos + 2);
            last_target = Some(target);
            pos = target;
        } else if byte & POINTER_MASK == 0 {
            let end = pos + byte as usize + 1;
            if end >= original.len() {
                return Err(Error::UnexpectedEOF);
            }
            let label = &original[pos + 1..end];
            if from_utf8(label).is_err() {
                return Err(Error::LabelIsNotAscii);
            }
            length += label.len() + 1;
            if length > MAX_NAME_LENGTH {
                return Err(Error::NameTooLong);
            }
            visit(label);
            pos = end;
        } else {
            return Err(Error::UnknownLabelFormat);
        }
    }
}

fn check_str(name: &str) -> Result<(), Error> {
    let mut length = 1;
    for label in str_labels(name) {
        if label.is_empty() {
            return Err(Error::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::LabelTooLong);
        }
        length += label.len() + 1;
    }
    if length > MAX_NAME_LENGTH {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

/// Labels of a dotted name, ignoring a single trailing dot. The root name
/// ("" or ".") has no labels.
fn str_labels(name: &str) -> impl Iterator<Item = &str> {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.split('.').filter(move |_| !name.is_empty())
}

impl<'a> Name<'a> {
    /// Reads the name starting at `offset` of the packet `original`
    ///
    /// Returns the name and the offset of the field following it.
    pub fn scan(original: &'a [u8], offset: usize) -> Result<(Name<'a>, usize), Error> {
        Name::scan_within(original, offset, original.len())
    }

    /// Same as `scan` but no byte at or past `limit` is read
    pub fn scan_within(
        original: &'a [u8],
        offset: usize,
        limit: usize,
    ) -> Result<(Name<'a>, usize), Error> {
        let original = &original[..limit.min(original.len())];
        let next = walk(original, offset, |_| ())?;
        Ok((Name::FromPacket { original, offset }, next))
    }

    /// Creates a name from its dotted representation
    ///
    /// Fails when a label is empty or longer than 63 bytes, or when the
    /// encoded name would exceed 255 bytes.
    pub fn from_str<T: Into<Cow<'a, str>>>(name: T) -> Result<Name<'a>, Error> {
        let name = name.into();
        check_str(&name)?;
        Ok(Name::FromStr(name))
    }

    fn for_each_label<F: FnMut(&[u8])>(&self, mut visit: F) -> Result<(), Error> {
        match *self {
            Name::FromPacket { original, offset } => {
                walk(original, offset, |label| visit(label))?;
            }
            Name::FromStr(ref name) => {
                for label in str_labels(name) {
                    visit(label.as_bytes());
                }
            }
        }
        Ok(())
    }

    /// Size of the uncompressed wire representation
    pub fn encoded_len(&self) -> usize {
        let mut length = 1;
        let _ = self.for_each_label(|label| length += label.len() + 1);
        length
    }

    /// Writes the name without compression
    pub fn write_to<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        let mut result = Ok(());
        self.for_each_label(|label| {
            if result.is_ok() {
                result = writer
                    .write_u8(label.len() as u8)
                    .and_then(|()| writer.write_all(label));
            }
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        result?;
        writer.write_u8(0)
    }

    /// Writes the name without compression into `buf` at `offset`,
    /// returning the offset after it
    pub fn encode(&self, buf: &mut [u8], offset: usize) -> Result<usize, Error> {
        let end = offset + self.encoded_len();
        if end > buf.len() {
            return Err(Error::NoSpace);
        }
        let mut cursor = &mut buf[offset..end];
        self.write_to(&mut cursor).map_err(|_| Error::NoSpace)?;
        Ok(end)
    }

    /// Lowercased dotted representation, suitable as a map key
    pub fn to_lowercase(&self) -> String {
        self.to_string().to_ascii_lowercase()
    }

    fn folded_wire(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        let _ = self.for_each_label(|label| {
            buffer.push(label.len() as u8);
            buffer.extend(label.iter().map(u8::to_ascii_lowercase));
        });
        buffer
    }
}

impl<'a> fmt::Display for Name<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        let mut result = Ok(());
        self.for_each_label(|label| {
            if result.is_err() {
                return;
            }
            if !first {
                result = fmt.write_char('.');
            }
            first = false;
            if result.is_ok() {
                // labels were checked to be utf-8 when scanned
                result = fmt.write_str(from_utf8(label).unwrap_or_default());
            }
        })
        .map_err(|_| fmt::Error)?;
        result
    }
}

/// Names hash and compare case-insensitively, ignoring compression
impl<'a> hash::Hash for Name<'a> {
    fn hash<H>(&self, state: &mut H)
    where
        H: hash::Hasher,
    {
        hash::Hash::hash(&self.folded_wire(), state)
    }
}

impl<'a> PartialEq for Name<'a> {
    fn eq(&self, other: &Name) -> bool {
        self.folded_wire() == other.folded_wire()
    }
}

impl<'a> Eq for Name<'a> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scan_plain_name() {
        let data = b"\x07example\x03com\x00\x00\x01";
        let (name, next) = Name::scan(data, 0).unwrap();
        assert_eq!(name.to_string(), "example.com");
        assert_eq!(next, 13);
    }

    #[test]
    fn scan_root_name() {
        let (name, next) = Name::scan(b"\x00", 0).unwrap();
        assert_eq!(name.to_string(), "");
        assert_eq!(next, 1);
        assert_eq!(name, Name::from_str(".").unwrap());
    }

    #[test]
    fn scan_compressed_name() {
        // "example.com" at 0, "www" + pointer to 0 at 13
        let data = b"\x07example\x03com\x00\x03www\xc0\x00\xff";
        let (name, next) = Name::scan(data, 13).unwrap();
        assert_eq!(name.to_string(), "www.example.com");
        // offset after the pointer, not after the followed chain
        assert_eq!(next, 19);

        let (suffix, next) = Name::scan(data, 17).unwrap();
        assert_eq!(suffix, Name::from_str("example.com").unwrap());
        assert_eq!(next, 19);
    }

    #[test]
    fn scan_pointer_chain() {
        // "com" at 0, "example" + ptr(0) at 5, "www" + ptr(5) at 15
        let data = b"\x03com\x00\x07example\xc0\x00\x03www\xc0\x05";
        let (name, next) = Name::scan(data, 15).unwrap();
        assert_eq!(name.to_string(), "www.example.com");
        assert_eq!(next, 21);
    }

    #[test]
    fn rejects_self_pointer() {
        let data = b"\x00\x00\xc0\x02";
        assert_eq!(Name::scan(data, 2).unwrap_err(), Error::BadPointer(2));
    }

    #[test]
    fn rejects_forward_pointer() {
        let data = b"\xc0\x02\x03com\x00";
        assert_eq!(Name::scan(data, 0).unwrap_err(), Error::BadPointer(2));
    }

    #[test]
    fn rejects_pointer_loop_through_labels() {
        // "a" at 0, pointer back to 0 at 2: following it reaches the
        // pointer again with a target that is not lower than the last one
        let data = b"\x01a\xc0\x00";
        assert_eq!(Name::scan(data, 2).unwrap_err(), Error::BadPointer(0));
    }

    #[test]
    fn rejects_pointer_past_limit() {
        let data = b"\x03com\x00\x03www\xc0\x00";
        assert_eq!(
            Name::scan_within(data, 5, 10).unwrap_err(),
            Error::UnexpectedEOF
        );
    }

    #[test]
    fn rejects_truncated_name() {
        assert_eq!(
            Name::scan(b"\x07exam", 0).unwrap_err(),
            Error::UnexpectedEOF
        );
        assert_eq!(
            Name::scan(b"\x03com", 0).unwrap_err(),
            Error::UnexpectedEOF
        );
    }

    #[test]
    fn rejects_reserved_label_format() {
        assert_eq!(
            Name::scan(b"\x43abc\x00", 0).unwrap_err(),
            Error::UnknownLabelFormat
        );
    }

    #[test]
    fn rejects_too_long_name() {
        let mut data = Vec::new();
        for _ in 0..5 {
            data.push(60);
            data.extend(std::iter::repeat(b'a').take(60));
        }
        data.push(0);
        assert_eq!(Name::scan(&data, 0).unwrap_err(), Error::NameTooLong);
    }

    #[test]
    fn from_str_checks_labels() {
        let long_label = "a".repeat(64);
        assert_eq!(
            Name::from_str(format!("{}.com", long_label)).unwrap_err(),
            Error::LabelTooLong
        );
        assert_eq!(
            Name::from_str("a..com").unwrap_err(),
            Error::EmptyLabel
        );
        let long_name = vec!["a".repeat(63); 4].join(".");
        assert_eq!(Name::from_str(long_name).unwrap_err(), Error::NameTooLong);
        let longest = vec!["a".repeat(63), "a".repeat(63), "a".repeat(63), "a".repeat(61)].join(".");
        assert_eq!(Name::from_str(longest).unwrap().encoded_len(), 255);
    }

    #[test]
    fn encode_then_scan() {
        let long = vec!["x".repeat(63), "y".repeat(63), "z".repeat(63)].join(".");
        let names: [&str; 4] = ["a", "example.com", "Mixed-Case.Example.ORG", &long];
        for text in names.iter() {
            let name = Name::from_str(*text).unwrap();
            let mut buf = [0u8; 300];
            let end = name.encode(&mut buf, 7).unwrap();
            assert_eq!(end, 7 + name.encoded_len());
            let (scanned, next) = Name::scan(&buf[..end], 7).unwrap();
            assert_eq!(next, end);
            assert_eq!(scanned.to_string(), *text);
        }
    }

    #[test]
    fn encode_needs_space() {
        let name = Name::from_str("example.com").unwrap();
        let mut buf = [0u8; 13];
        assert_eq!(name.encode(&mut buf, 1), Err(Error::NoSpace));
        assert_eq!(name.encode(&mut buf, 0), Ok(13));
        assert_eq!(&buf, b"\x07example\x03com\x00");
    }

    #[test]
    fn write_expands_pointers() {
        let data = b"\x07example\x03com\x00\x03www\xc0\x00";
        let (name, _) = Name::scan(data, 13).unwrap();
        let mut out = Vec::new();
        name.write_to(&mut out).unwrap();
        assert_eq!(&out[..], b"\x03www\x07example\x03com\x00");
    }

    #[test]
    fn compare_ignores_case() {
        assert_eq!(
            Name::from_str("WWW.Example.com").unwrap(),
            Name::from_str("www.example.com.").unwrap()
        );
        assert_eq!(
            Name::from_str("WWW.Example.com").unwrap().to_lowercase(),
            "www.example.com"
        );
    }
}
