use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::{Error, Name, Type};

/// The enumeration that represents known types of DNS resource records data
#[derive(Debug, Clone)]
pub enum RRData<'a> {
    CNAME(Name<'a>),
    NS(Name<'a>),
    PTR(Name<'a>),
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name<'a>,
    },
    MX {
        preference: u16,
        exchange: Name<'a>,
    },
    SOA {
        primary_ns: Name<'a>,
        mailbox: Name<'a>,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum_ttl: u32,
    },
    TXT(&'a [u8]),
    // Anything that can't be parsed yet
    Unknown {
        typ: Type,
        data: &'a [u8],
    },
}

impl<'a> RRData<'a> {
    pub fn typ(&self) -> Type {
        match *self {
            RRData::CNAME(..) => Type::CNAME,
            RRData::NS(..) => Type::NS,
            RRData::PTR(..) => Type::PTR,
            RRData::A(..) => Type::A,
            RRData::AAAA(..) => Type::AAAA,
            RRData::SRV { .. } => Type::SRV,
            RRData::MX { .. } => Type::MX,
            RRData::SOA { .. } => Type::SOA,
            RRData::TXT(..) => Type::TXT,
            RRData::Unknown { typ, .. } => typ,
        }
    }

    pub fn write_to<T: io::Write>(&self, writer: &mut T) -> io::Result<()> {
        match *self {
            RRData::CNAME(ref name) | RRData::NS(ref name) | RRData::PTR(ref name) => {
                name.write_to(writer)
            }

            RRData::A(ip) => writer.write_u32::<BigEndian>(ip.into()),

            RRData::AAAA(ip) => {
                for segment in ip.segments().iter() {
                    writer.write_u16::<BigEndian>(*segment)?;
                }
                Ok(())
            }
            RRData::SRV {
                priority,
                weight,
                port,
                ref target,
            } => {
                writer.write_u16::<BigEndian>(priority)?;
                writer.write_u16::<BigEndian>(weight)?;
                writer.write_u16::<BigEndian>(port)?;
                target.write_to(writer)
            }
            RRData::MX {
                preference,
                ref exchange,
            } => {
                writer.write_u16::<BigEndian>(preference)?;
                exchange.write_to(writer)
            }
            RRData::SOA {
                ref primary_ns,
                ref mailbox,
                serial,
                refresh,
                retry,
                expire,
                minimum_ttl,
            } => {
                primary_ns.write_to(writer)?;
                mailbox.write_to(writer)?;
                for value in [serial, refresh, retry, expire, minimum_ttl].iter() {
                    writer.write_u32::<BigEndian>(*value)?;
                }
                Ok(())
            }
            RRData::TXT(data) => writer.write_all(data),
            RRData::Unknown { data, .. } => writer.write_all(data),
        }
    }
}

/// Undecoded RDATA of a record
///
/// Holds the packet the record came from and the position of its RDATA,
/// so names inside it can follow compression pointers into earlier parts
/// of the packet. Decoding happens on demand.
#[derive(Debug, Clone, Copy)]
pub struct RData<'a> {
    original: &'a [u8],
    offset: usize,
    len: usize,
    typ: Type,
}

impl<'a> RData<'a> {
    pub fn new(original: &'a [u8], offset: usize, len: usize, typ: Type) -> Result<RData<'a>, Error> {
        if offset + len > original.len() {
            return Err(Error::UnexpectedEOF);
        }
        Ok(RData {
            original,
            offset,
            len,
            typ,
        })
    }

    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn bytes(&self) -> &'a [u8] {
        &self.original[self.offset..self.offset + self.len]
    }

    fn expect(&self, typ: Type) -> Result<(), Error> {
        if self.typ == typ {
            Ok(())
        } else {
            Err(Error::WrongRecordType(self.typ.into()))
        }
    }

    /// A name filling the whole RDATA, starting at `skip`
    fn name_at(&self, skip: usize) -> Result<Name<'a>, Error> {
        let end = self.offset + self.len;
        if skip >= self.len {
            return Err(Error::WrongRdataLength);
        }
        let (name, next) = Name::scan_within(self.original, self.offset + skip, end)?;
        if next != end {
            return Err(Error::WrongRdataLength);
        }
        Ok(name)
    }

    /// The address of an A record
    pub fn address(&self) -> Result<Ipv4Addr, Error> {
        self.expect(Type::A)?;
        if self.len != 4 {
            return Err(Error::WrongRdataLength);
        }
        Ok(Ipv4Addr::from(BigEndian::read_u32(self.bytes())))
    }

    /// The target of a CNAME record
    pub fn alias(&self) -> Result<Name<'a>, Error> {
        self.expect(Type::CNAME)?;
        self.name_at(0)
    }

    /// The server of an NS record
    pub fn name_server(&self) -> Result<Name<'a>, Error> {
        self.expect(Type::NS)?;
        self.name_at(0)
    }

    pub fn decode(&self) -> Result<RRData<'a>, Error> {
        let rdata = self.bytes();
        match self.typ {
            Type::A => Ok(RRData::A(self.address()?)),
            Type::AAAA => {
                if rdata.len() != 16 {
                    return Err(Error::WrongRdataLength);
                }
                let mut segments = [0u16; 8];
                BigEndian::read_u16_into(rdata, &mut segments);
                Ok(RRData::AAAA(Ipv6Addr::from(segments)))
            }
            Type::CNAME => Ok(RRData::CNAME(self.alias()?)),
            Type::NS => Ok(RRData::NS(self.name_server()?)),
            Type::PTR => Ok(RRData::PTR(self.name_at(0)?)),
            Type::MX => {
                if rdata.len() < 3 {
                    return Err(Error::WrongRdataLength);
                }
                Ok(RRData::MX {
                    preference: BigEndian::read_u16(&rdata[..2]),
                    exchange: self.name_at(2)?,
                })
            }
            Type::SRV => {
                if rdata.len() < 7 {
                    return Err(Error::WrongRdataLength);
                }
                Ok(RRData::SRV {
                    priority: BigEndian::read_u16(&rdata[..2]),
                    weight: BigEndian::read_u16(&rdata[2..4]),
                    port: BigEndian::read_u16(&rdata[4..6]),
                    target: self.name_at(6)?,
                })
            }
            Type::SOA => {
                let end = self.offset + self.len;
                let (primary_ns, pos) = Name::scan_within(self.original, self.offset, end)?;
                let (mailbox, pos) = Name::scan_within(self.original, pos, end)?;
                if end != pos + 20 {
                    return Err(Error::WrongRdataLength);
                }
                let mut fields = [0u32; 5];
                BigEndian::read_u32_into(&self.original[pos..end], &mut fields);
                Ok(RRData::SOA {
                    primary_ns,
                    mailbox,
                    serial: fields[0],
                    refresh: fields[1],
                    retry: fields[2],
                    expire: fields[3],
                    minimum_ttl: fields[4],
                })
            }
            Type::TXT => Ok(RRData::TXT(rdata)),
            typ => Ok(RRData::Unknown { typ, data: rdata }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // header omitted: "example.com" at 0, CNAME rdata "www" + ptr(0) at 13
    const PACKET: &[u8] = b"\x07example\x03com\x00\x03www\xc0\x00\x01\x02\x03\x04";

    #[test]
    fn address_view() {
        let rdata = RData::new(PACKET, 19, 4, Type::A).unwrap();
        assert_eq!(rdata.address().unwrap(), Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(
            rdata.alias().unwrap_err(),
            Error::WrongRecordType(1)
        );
    }

    #[test]
    fn alias_view_follows_pointer() {
        let rdata = RData::new(PACKET, 13, 6, Type::CNAME).unwrap();
        assert_eq!(rdata.alias().unwrap().to_string(), "www.example.com");
        match rdata.decode().unwrap() {
            RRData::CNAME(name) => assert_eq!(name.to_string(), "www.example.com"),
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn name_must_fill_rdata() {
        let rdata = RData::new(PACKET, 13, 7, Type::NS).unwrap();
        assert_eq!(rdata.name_server().unwrap_err(), Error::WrongRdataLength);
    }

    #[test]
    fn short_address() {
        let rdata = RData::new(PACKET, 19, 3, Type::A).unwrap();
        assert_eq!(rdata.address().unwrap_err(), Error::WrongRdataLength);
        assert_eq!(
            RData::new(PACKET, 19, 5, Type::A).unwrap_err(),
            Error::UnexpectedEOF
        );
    }

    #[test]
    fn unknown_type_is_opaque() {
        let rdata = RData::new(PACKET, 19, 4, Type::Unknown(65)).unwrap();
        match rdata.decode().unwrap() {
            RRData::Unknown { typ, data } => {
                assert_eq!(typ, Type::Unknown(65));
                assert_eq!(data, b"\x01\x02\x03\x04");
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn write_a_and_mx() {
        let mut out = Vec::new();
        RRData::A(Ipv4Addr::new(10, 0, 0, 1)).write_to(&mut out).unwrap();
        assert_eq!(&out[..], b"\x0a\x00\x00\x01");

        out.clear();
        RRData::MX {
            preference: 10,
            exchange: Name::from_str("mail.example.com").unwrap(),
        }
        .write_to(&mut out)
        .unwrap();
        assert_eq!(&out[..], b"\x00\x0a\x04mail\x07example\x03com\x00");
    }
}
