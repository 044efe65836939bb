//! Wire format of DNS messages
//!
//! Parsing borrows from the packet buffer: names and record data are
//! views that are decoded when accessed.

mod builder;
mod enums;
mod error;
mod header;
mod name;
mod parser;
mod rrdata;
mod structs;

pub use self::builder::{
    Additional, Answers, Builder, MoveTo, Nameservers, Questions, MAX_UDP_SIZE,
};
pub use self::enums::{Class, Opcode, QueryClass, QueryType, ResponseCode, Type};
pub use self::error::Error;
pub use self::header::{Header, HEADER_SIZE};
pub use self::name::{Name, MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
pub use self::rrdata::{RData, RRData};
pub use self::structs::{Packet, Question, ResourceRecord};
