use byteorder::{BigEndian, ByteOrder};

use super::header::HEADER_SIZE;
use super::{Error, Header, Name, Packet, Question, RData, ResourceRecord};

impl<'a> Packet<'a> {
    /// Parse a full DNS Packet
    ///
    /// Fails when any section holds fewer records than the header claims.
    pub fn parse(data: &'a [u8]) -> Result<Packet<'a>, Error> {
        let header = Header::parse(data)?;
        let mut offset = HEADER_SIZE;

        let mut questions = Vec::new();
        for _ in 0..header.questions {
            let (question, next) = Question::parse(data, offset)?;
            questions.push(question);
            offset = next;
        }
        let answers = parse_records(data, &mut offset, header.answers)?;
        let nameservers = parse_records(data, &mut offset, header.nameservers)?;
        let additional = parse_records(data, &mut offset, header.additional)?;

        Ok(Packet {
            header,
            questions,
            answers,
            nameservers,
            additional,
        })
    }
}

fn parse_records<'a>(
    data: &'a [u8],
    offset: &mut usize,
    count: u16,
) -> Result<Vec<ResourceRecord<'a>>, Error> {
    let mut records = Vec::new();
    for _ in 0..count {
        let (record, next) = ResourceRecord::parse(data, *offset)?;
        records.push(record);
        *offset = next;
    }
    Ok(records)
}

impl<'a> Question<'a> {
    /// Reads the question at `offset`, returning it with the offset of the
    /// next record
    pub fn parse(data: &'a [u8], offset: usize) -> Result<(Question<'a>, usize), Error> {
        let (qname, offset) = Name::scan(data, offset)?;
        if offset + 4 > data.len() {
            return Err(Error::UnexpectedEOF);
        }
        let qtype = BigEndian::read_u16(&data[offset..offset + 2]).into();
        let qclass = BigEndian::read_u16(&data[offset + 2..offset + 4]).into();
        Ok((
            Question {
                qname,
                qtype,
                qclass,
            },
            offset + 4,
        ))
    }
}

impl<'a> ResourceRecord<'a> {
    /// Reads the record at `offset`, returning it with the offset of the
    /// next record
    ///
    /// Only the RDATA bounds are checked here, its content is decoded
    /// through `RData`.
    pub fn parse(data: &'a [u8], offset: usize) -> Result<(ResourceRecord<'a>, usize), Error> {
        let (name, offset) = Name::scan(data, offset)?;
        if offset + 10 > data.len() {
            return Err(Error::UnexpectedEOF);
        }
        let typ = BigEndian::read_u16(&data[offset..offset + 2]).into();
        let cls = BigEndian::read_u16(&data[offset + 2..offset + 4]).into();
        let ttl = BigEndian::read_u32(&data[offset + 4..offset + 8]);
        let rdlen = BigEndian::read_u16(&data[offset + 8..offset + 10]) as usize;
        let rdata = RData::new(data, offset + 10, rdlen, typ)?;
        Ok((
            ResourceRecord {
                name,
                cls,
                ttl,
                data: rdata,
            },
            offset + 10 + rdlen,
        ))
    }
}
