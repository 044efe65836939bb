use thiserror::Error;

/// Error parsing or building a DNS packet
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("packet is smaller than header size")]
    HeaderTooShort,
    #[error("packet is has incomplete data")]
    UnexpectedEOF,
    #[error("wrong (too short or too long) size of RDATA")]
    WrongRdataLength,
    #[error("packet has non-zero reserved bits")]
    ReservedBitsAreNonZero,
    #[error("label in domain name has unknown label format")]
    UnknownLabelFormat,
    #[error("invalid characters encountered while reading label")]
    LabelIsNotAscii,
    #[error("label is longer than 63 bytes")]
    LabelTooLong,
    #[error("domain name is longer than 255 bytes")]
    NameTooLong,
    #[error("domain name has an empty label")]
    EmptyLabel,
    #[error("compression pointer to offset {0} does not point backwards")]
    BadPointer(usize),
    #[error("not enough space left in buffer")]
    NoSpace,
    #[error("record of type {0} can't be read as this kind of data")]
    WrongRecordType(u16),
}
