//! Structures related to application protocol data units (APDUs).


use std::fmt;
use std::io::{self, Write};


#[derive(Debug)]
pub enum WriteError {
    Io(io::Error),
    EmptyData,
    DataTooLong { maximum: usize, obtained: usize },
}
impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::EmptyData => write!(f, "data is, but must not be, empty"),
            Self::DataTooLong { maximum, obtained } => write!(f, "too much data: obtained {} bytes, expected maximum {} bytes", obtained, maximum),
        }
    }
}
impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::EmptyData => None,
            Self::DataTooLong { .. } => None,
        }
    }
}
impl From<io::Error> for WriteError {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}


#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CommandHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}
impl CommandHeader {
    pub const fn to_bytes(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    pub const fn to_be_u32(&self) -> u32 {
        ((self.cla as u32) << 24)
        | ((self.ins as u32) << 16)
        | ((self.p1 as u32) <<  8)
        | ((self.p2 as u32) <<  0)
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(())
    }
}
impl fmt::Debug for CommandHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CommandHeader {} cla: 0x{:02X}, ins: 0x{:02X}, p1: 0x{:02X}, p2: 0x{:02X} {}",
            '{', self.cla, self.ins, self.p1, self.p2, '}',
        )
    }
}

#[derive(Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResponseTrailer {
    pub sw1: u8,
    pub sw2: u8,
}
impl ResponseTrailer {
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self {
            sw1,
            sw2,
        }
    }

    pub const fn to_bytes(&self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    pub const fn to_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(())
    }
}
impl fmt::Debug for ResponseTrailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseTrailer {} sw1: 0x{:02X}, sw2: 0x{:02X} {}", '{', self.sw1, self.sw2, '}')
    }
}


/// The body of a command APDU.
///
/// A short response length of 0 requests up to 256 bytes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Data {
    NoData,
    RequestDataShort {
        request_data: Vec<u8>,
    },
    ResponseDataShort {
        response_data_length: u8,
    },
    BothDataShort {
        request_data: Vec<u8>,
        response_data_length: u8,
    },
}
impl Data {
    /// The maximum number of response bytes, if a response is requested.
    pub fn response_data_length(&self) -> Option<usize> {
        fn short_length(length_byte: u8) -> usize {
            if length_byte == 0x00 { 256 } else { length_byte.into() }
        }

        match self {
            Self::NoData => None,
            Self::RequestDataShort { .. } => None,
            Self::ResponseDataShort { response_data_length } => Some(short_length(*response_data_length)),
            Self::BothDataShort { response_data_length, .. } => Some(short_length(*response_data_length)),
        }
    }

    pub fn request_data(&self) -> Option<&[u8]> {
        match self {
            Self::NoData => None,
            Self::RequestDataShort { request_data } => Some(request_data.as_slice()),
            Self::ResponseDataShort { .. } => None,
            Self::BothDataShort { request_data, .. } => Some(request_data.as_slice()),
        }
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        fn length_byte(request_data: &[u8]) -> Result<u8, WriteError> {
            match request_data.len() {
                0 => Err(WriteError::EmptyData),
                256 => Ok(0x00),
                length => u8::try_from(length)
                    .map_err(|_| WriteError::DataTooLong { maximum: 256, obtained: length }),
            }
        }

        match self {
            // "case" refers to the cases in ISO/IEC 7816-3:2006 § 12.1.3
            Data::NoData => {
                // case 1
                Ok(())
            },
            Data::RequestDataShort { request_data } => {
                // case 3S: [Lc] [Data]
                writer.write_all(&[length_byte(request_data)?])?;
                writer.write_all(request_data)?;
                Ok(())
            },
            Data::ResponseDataShort { response_data_length } => {
                // case 2S: [Le]
                writer.write_all(&[*response_data_length])?;
                Ok(())
            },
            Data::BothDataShort { request_data, response_data_length } => {
                // case 4S: [Lc] [Data] [Le]
                writer.write_all(&[length_byte(request_data)?])?;
                writer.write_all(request_data)?;
                writer.write_all(&[*response_data_length])?;
                Ok(())
            },
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Apdu {
    pub header: CommandHeader,
    pub data: Data,
}
impl Apdu {
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), WriteError> {
        self.header.write_bytes(writer)?;
        self.data.write_bytes(writer)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut bytes = Vec::new();
        self.write_bytes(&mut bytes)?;
        Ok(bytes)
    }
}


/// Status words a health card answers with during connection establishment.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResponseStatus {
    Success,
    WrongLength,
    SecurityStatusNotSatisfied,
    KeyInvalid,
    ConditionsNotSatisfied,
    FileNotFound,
    KeyNotFound,
    Unknown(u16),
}
impl ResponseStatus {
    pub const fn from_word(word: u16) -> Self {
        match word {
            0x9000 => Self::Success,
            0x6700 => Self::WrongLength,
            0x6982 => Self::SecurityStatusNotSatisfied,
            0x6983 => Self::KeyInvalid,
            0x6985 => Self::ConditionsNotSatisfied,
            0x6A82 => Self::FileNotFound,
            0x6A88 => Self::KeyNotFound,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(&self) -> u16 {
        match self {
            Self::Success => 0x9000,
            Self::WrongLength => 0x6700,
            Self::SecurityStatusNotSatisfied => 0x6982,
            Self::KeyInvalid => 0x6983,
            Self::ConditionsNotSatisfied => 0x6985,
            Self::FileNotFound => 0x6A82,
            Self::KeyNotFound => 0x6A88,
            Self::Unknown(word) => *word,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(word) => write!(f, "0x{:04X}", word),
            other => write!(f, "{:?} (0x{:04X})", other, other.to_word()),
        }
    }
}
impl From<ResponseStatus> for ResponseTrailer {
    fn from(value: ResponseStatus) -> Self {
        let [sw1, sw2] = value.to_word().to_be_bytes();
        Self { sw1, sw2 }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Response {
    pub data: Vec<u8>,
    pub trailer: ResponseTrailer,
}
impl Response {
    pub fn new(data: Vec<u8>, status: ResponseStatus) -> Self {
        Self {
            data,
            trailer: status.into(),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        ResponseStatus::from_word(self.trailer.to_word())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }

        let data = bytes[..bytes.len() - 2].to_vec();
        let trailer = ResponseTrailer {
            sw1: bytes[bytes.len() - 2],
            sw2: bytes[bytes.len() - 1],
        };
        Some(Self {
            data,
            trailer,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_write_cases() {
        let select = Apdu {
            header: CommandHeader { cla: 0x00, ins: 0xA4, p1: 0x02, p2: 0x0C },
            data: Data::RequestDataShort { request_data: vec![0x01, 0x1C] },
        };
        assert_eq!(select.to_bytes().unwrap(), hex!("00 A4 02 0C 02 01 1C"));

        let read = Apdu {
            header: CommandHeader { cla: 0x00, ins: 0xB0, p1: 0x00, p2: 0x00 },
            data: Data::ResponseDataShort { response_data_length: 0 },
        };
        assert_eq!(read.to_bytes().unwrap(), hex!("00 B0 00 00 00"));
        assert_eq!(read.data.response_data_length(), Some(256));

        let general_authenticate = Apdu {
            header: CommandHeader { cla: 0x10, ins: 0x86, p1: 0x00, p2: 0x00 },
            data: Data::BothDataShort { request_data: vec![0x7C, 0x00], response_data_length: 0 },
        };
        assert_eq!(general_authenticate.to_bytes().unwrap(), hex!("10 86 00 00 02 7C 00 00"));

        let empty = Apdu {
            header: CommandHeader::default(),
            data: Data::RequestDataShort { request_data: Vec::new() },
        };
        assert!(matches!(empty.to_bytes(), Err(WriteError::EmptyData)));

        let too_long = Apdu {
            header: CommandHeader::default(),
            data: Data::RequestDataShort { request_data: vec![0u8; 257] },
        };
        assert!(matches!(too_long.to_bytes(), Err(WriteError::DataTooLong { maximum: 256, obtained: 257 })));
    }

    #[test]
    fn test_status_words() {
        let response = Response::from_slice(&hex!("01 02 69 83")).unwrap();
        assert_eq!(response.data, [0x01, 0x02]);
        assert_eq!(response.status(), ResponseStatus::KeyInvalid);
        assert_eq!(ResponseStatus::from_word(0x6A88), ResponseStatus::KeyNotFound);
        assert_eq!(ResponseStatus::from_word(0x6F00), ResponseStatus::Unknown(0x6F00));
        assert_eq!(Response::new(Vec::new(), ResponseStatus::Success).trailer, ResponseTrailer::new(0x90, 0x00));
        assert!(Response::from_slice(&[0x90]).is_none());
    }
}
