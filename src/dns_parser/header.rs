use byteorder::{BigEndian, ByteOrder};

use super::{Error, Opcode, ResponseCode};

mod flag {
    pub const QUERY: u16 = 0b1000_0000_0000_0000;
    pub const OPCODE_MASK: u16 = 0b0111_1000_0000_0000;
    pub const AUTHORITATIVE: u16 = 0b0000_0100_0000_0000;
    pub const TRUNCATED: u16 = 0b0000_0010_0000_0000;
    pub const RECURSION_DESIRED: u16 = 0b0000_0001_0000_0000;
    pub const RECURSION_AVAILABLE: u16 = 0b0000_0000_1000_0000;
    pub const RESERVED: u16 = 0b0000_0000_0100_0000;
    pub const AUTHENTICATED_DATA: u16 = 0b0000_0000_0010_0000;
    pub const CHECKING_DISABLED: u16 = 0b0000_0000_0001_0000;
    pub const RESPONSE_CODE_MASK: u16 = 0b0000_0000_0000_1111;
}

/// Size of the fixed packet header
pub const HEADER_SIZE: usize = 12;

/// Represents parsed header of the packet
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Header {
    pub id: u16,
    /// Set for questions. Note that the wire bit is inverted: QR is 0 for
    /// a query.
    pub query: bool,
    pub opcode: Opcode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authenticated_data: bool,
    pub checking_disabled: bool,
    pub response_code: ResponseCode,
    pub questions: u16,
    pub answers: u16,
    pub nameservers: u16,
    pub additional: u16,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Header, Error> {
        if data.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort);
        }
        let flags = BigEndian::read_u16(&data[2..4]);
        if flags & flag::RESERVED != 0 {
            return Err(Error::ReservedBitsAreNonZero);
        }
        Ok(Header {
            id: BigEndian::read_u16(&data[..2]),
            query: flags & flag::QUERY == 0,
            opcode: Opcode::from(((flags & flag::OPCODE_MASK) >> flag::OPCODE_MASK.trailing_zeros()) as u8),
            authoritative: flags & flag::AUTHORITATIVE != 0,
            truncated: flags & flag::TRUNCATED != 0,
            recursion_desired: flags & flag::RECURSION_DESIRED != 0,
            recursion_available: flags & flag::RECURSION_AVAILABLE != 0,
            authenticated_data: flags & flag::AUTHENTICATED_DATA != 0,
            checking_disabled: flags & flag::CHECKING_DISABLED != 0,
            response_code: ResponseCode::from((flags & flag::RESPONSE_CODE_MASK) as u8),
            questions: BigEndian::read_u16(&data[4..6]),
            answers: BigEndian::read_u16(&data[6..8]),
            nameservers: BigEndian::read_u16(&data[8..10]),
            additional: BigEndian::read_u16(&data[10..12]),
        })
    }

    /// Write a header to a buffer slice
    ///
    /// # Panics
    ///
    /// When buffer size is not exactly 12 bytes
    pub fn write(&self, data: &mut [u8]) {
        if data.len() != HEADER_SIZE {
            panic!("Header size is exactly 12 bytes");
        }
        let mut flags = 0u16;
        flags |= (u16::from(u8::from(self.opcode)) << flag::OPCODE_MASK.trailing_zeros())
            & flag::OPCODE_MASK;
        flags |= u16::from(u8::from(self.response_code)) & flag::RESPONSE_CODE_MASK;
        if !self.query {
            flags |= flag::QUERY;
        }
        if self.authoritative {
            flags |= flag::AUTHORITATIVE;
        }
        if self.truncated {
            flags |= flag::TRUNCATED;
        }
        if self.recursion_desired {
            flags |= flag::RECURSION_DESIRED;
        }
        if self.recursion_available {
            flags |= flag::RECURSION_AVAILABLE;
        }
        if self.authenticated_data {
            flags |= flag::AUTHENTICATED_DATA;
        }
        if self.checking_disabled {
            flags |= flag::CHECKING_DISABLED;
        }
        BigEndian::write_u16(&mut data[..2], self.id);
        BigEndian::write_u16(&mut data[2..4], flags);
        BigEndian::write_u16(&mut data[4..6], self.questions);
        BigEndian::write_u16(&mut data[6..8], self.answers);
        BigEndian::write_u16(&mut data[8..10], self.nameservers);
        BigEndian::write_u16(&mut data[10..12], self.additional);
    }

    /// Reads the transaction id of a raw datagram without parsing it
    pub fn id(data: &[u8]) -> Result<u16, Error> {
        if data.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort);
        }
        Ok(BigEndian::read_u16(&data[..2]))
    }

    /// Overwrites the transaction id of a raw datagram in place
    pub fn set_id(data: &mut [u8], id: u16) -> Result<(), Error> {
        if data.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort);
        }
        BigEndian::write_u16(&mut data[..2], id);
        Ok(())
    }

    /// Whether a raw datagram carries a query (QR bit clear)
    pub fn is_query(data: &[u8]) -> Result<bool, Error> {
        if data.len() < HEADER_SIZE {
            return Err(Error::HeaderTooShort);
        }
        Ok(BigEndian::read_u16(&data[2..4]) & flag::QUERY == 0)
    }

    pub fn set_truncated(data: &mut [u8]) {
        let oldflags = BigEndian::read_u16(&data[2..4]);
        BigEndian::write_u16(&mut data[2..4], oldflags | flag::TRUNCATED);
    }

    fn inc_count(data: &mut [u8], offset: usize) -> Option<u16> {
        let count = BigEndian::read_u16(&data[offset..offset + 2]).checked_add(1)?;
        BigEndian::write_u16(&mut data[offset..offset + 2], count);
        Some(count)
    }

    pub fn inc_questions(data: &mut [u8]) -> Option<u16> {
        Header::inc_count(data, 4)
    }

    pub fn inc_answers(data: &mut [u8]) -> Option<u16> {
        Header::inc_count(data, 6)
    }

    pub fn inc_nameservers(data: &mut [u8]) -> Option<u16> {
        Header::inc_count(data, 8)
    }

    pub fn inc_additional(data: &mut [u8]) -> Option<u16> {
        Header::inc_count(data, 10)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_example_query() {
        let query = b"\x06%\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
                      \x07example\x03com\x00\x00\x01\x00\x01";
        let header = Header::parse(query).unwrap();
        assert_eq!(
            header,
            Header {
                id: 1573,
                query: true,
                opcode: Opcode::StandardQuery,
                authoritative: false,
                truncated: false,
                recursion_desired: true,
                recursion_available: false,
                authenticated_data: false,
                checking_disabled: false,
                response_code: ResponseCode::NoError,
                questions: 1,
                answers: 0,
                nameservers: 0,
                additional: 0,
            }
        );
    }

    #[test]
    fn parse_example_response() {
        let response = b"\x06%\x81\x83\x00\x01\x00\x00\x00\x00\x00\x00";
        let header = Header::parse(response).unwrap();
        assert!(!header.query);
        assert!(header.recursion_desired);
        assert!(header.recursion_available);
        assert_eq!(header.response_code, ResponseCode::NameError);
    }

    #[test]
    fn write_then_parse() {
        let header = Header {
            id: 0xbeef,
            query: false,
            opcode: Opcode::StandardQuery,
            authoritative: true,
            truncated: false,
            recursion_desired: true,
            recursion_available: true,
            authenticated_data: false,
            checking_disabled: true,
            response_code: ResponseCode::Refused,
            questions: 1,
            answers: 2,
            nameservers: 3,
            additional: 4,
        };
        let mut buf = [0u8; 12];
        header.write(&mut buf);
        assert_eq!(Header::parse(&buf).unwrap(), header);
    }

    #[test]
    fn raw_id_swap() {
        let mut packet = b"\x06%\x81\x80\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        assert_eq!(Header::id(&packet), Ok(1573));
        assert_eq!(Header::is_query(&packet), Ok(false));
        Header::set_id(&mut packet, 7).unwrap();
        assert_eq!(&packet[..4], b"\x00\x07\x81\x80");
        assert_eq!(Header::id(&packet[..5]), Err(Error::HeaderTooShort));
    }

    #[test]
    fn rejects_reserved_bit() {
        let packet = b"\x00\x01\x01\x40\x00\x00\x00\x00\x00\x00\x00\x00";
        assert_eq!(Header::parse(packet), Err(Error::ReservedBitsAreNonZero));
    }
}
