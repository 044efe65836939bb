use std::net::Ipv4Addr;

use crate::dns_parser::{
    self, Builder, Class, Name, Packet, QueryClass, QueryType, RRData, ResponseCode, Type,
};
use crate::DEFAULT_TTL;

/// An A record: `name` has address `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub name: String,
    pub address: Ipv4Addr,
}

/// A CNAME record: `name` is an alias of `alias`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub name: String,
    pub alias: String,
}

/// An NS record: `name` is served by `server`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameServerRecord {
    pub name: String,
    pub server: String,
}

/// The parts of a DNS message the server acts upon
///
/// Records of all response sections are flattened into the three lists by
/// type, in wire order. Other record types are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub id: u16,
    pub is_question: bool,
    pub response_code: ResponseCode,
    pub questions: Vec<String>,
    pub addresses: Vec<AddressRecord>,
    pub aliases: Vec<AliasRecord>,
    pub name_servers: Vec<NameServerRecord>,
}

impl ParsedMessage {
    /// Parses a whole message, failing if any record is malformed
    pub fn parse(buffer: &[u8]) -> Result<ParsedMessage, dns_parser::Error> {
        let packet = Packet::parse(buffer)?;

        let mut message = ParsedMessage {
            id: packet.header.id,
            is_question: packet.header.query,
            response_code: packet.header.response_code,
            questions: packet
                .questions
                .iter()
                .map(|question| question.qname.to_string())
                .collect(),
            addresses: Vec::new(),
            aliases: Vec::new(),
            name_servers: Vec::new(),
        };

        let records = packet
            .answers
            .iter()
            .chain(packet.nameservers.iter())
            .chain(packet.additional.iter());
        for record in records {
            match record.data.typ() {
                Type::A => message.addresses.push(AddressRecord {
                    name: record.name.to_string(),
                    address: record.data.address()?,
                }),
                Type::CNAME => message.aliases.push(AliasRecord {
                    name: record.name.to_string(),
                    alias: record.data.alias()?.to_string(),
                }),
                Type::NS => message.name_servers.push(NameServerRecord {
                    name: record.name.to_string(),
                    server: record.data.name_server()?.to_string(),
                }),
                _ => (),
            }
        }

        Ok(message)
    }
}

/// Builds a recursive A query for `host_name`
pub fn build_question(id: u16, host_name: &str) -> Result<Vec<u8>, dns_parser::Error> {
    let name = Name::from_str(host_name)?;
    let builder = Builder::new_query(id, true).add_question(&name, QueryType::A, QueryClass::IN);
    Ok(builder.build().unwrap_or_else(|x| x))
}

/// Builds the reply to an A query for `host_name`
///
/// An unspecified `address` yields a name error with no answers.
pub fn build_host_address_answer(
    id: u16,
    host_name: &str,
    address: Ipv4Addr,
) -> Result<Vec<u8>, dns_parser::Error> {
    let name = Name::from_str(host_name)?;
    let builder =
        Builder::new_response(id, true, false).add_question(&name, QueryType::A, QueryClass::IN);
    let packet = if address.is_unspecified() {
        let mut builder = builder;
        builder.set_response_code(ResponseCode::NameError);
        builder.build()
    } else {
        builder
            .add_answer(&name, Class::IN, DEFAULT_TTL, &RRData::A(address))
            .build()
    };
    Ok(packet.unwrap_or_else(|x| x))
}
