//! TLS record layer framing.

use bytes::Bytes;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn to_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(v) => *v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            v => ContentType::Unknown(v),
        }
    }
}

/// A single `TLSPlaintext`/`TLSCiphertext` record. `legacy_record_version` is
/// named to match later TLS versions' naming even though every version this
/// crate negotiates uses it as the real record version.
#[derive(Clone, Debug)]
pub struct Record {
    pub typ: ContentType,
    pub legacy_record_version: u16,
    pub data: Bytes,
}

impl Record {
    pub fn parse(input: &[u8]) -> Result<(Self, usize)> {
        if input.len() < 5 {
            return Err(Error::DecodeError("record header truncated".into()));
        }
        let typ = ContentType::from_u8(input[0]);
        let version = u16::from_be_bytes([input[1], input[2]]);
        let len = u16::from_be_bytes([input[3], input[4]]) as usize;
        if input.len() < 5 + len {
            return Err(Error::DecodeError("record body truncated".into()));
        }
        Ok((
            Record {
                typ,
                legacy_record_version: version,
                data: Bytes::copy_from_slice(&input[5..5 + len]),
            },
            5 + len,
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.typ.to_u8());
        out.extend_from_slice(&self.legacy_record_version.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_wire_values_round_trip() {
        for typ in [
            ContentType::ChangeCipherSpec,
            ContentType::Alert,
            ContentType::Handshake,
            ContentType::ApplicationData,
            ContentType::Unknown(200),
        ] {
            assert_eq!(ContentType::from_u8(typ.to_u8()), typ);
        }
    }

    #[test]
    fn record_round_trips_through_serialize_and_parse() {
        let record = Record {
            typ: ContentType::Handshake,
            legacy_record_version: 0x0303,
            data: Bytes::from_static(b"hello"),
        };
        let mut out = Vec::new();
        record.serialize(&mut out);

        let (parsed, consumed) = Record::parse(&out).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(parsed.typ, ContentType::Handshake);
        assert_eq!(parsed.legacy_record_version, 0x0303);
        assert_eq!(&parsed.data[..], b"hello");
    }

    #[test]
    fn parse_rejects_a_truncated_header() {
        assert!(Record::parse(&[22, 0x03]).is_err());
    }

    #[test]
    fn parse_rejects_a_truncated_body() {
        let mut out = Vec::new();
        out.push(ContentType::Handshake.to_u8());
        out.extend_from_slice(&0x0303u16.to_be_bytes());
        out.extend_from_slice(&10u16.to_be_bytes());
        out.extend_from_slice(b"short");
        assert!(Record::parse(&out).is_err());
    }

    #[test]
    fn parse_leaves_trailing_bytes_for_the_caller() {
        let mut out = Vec::new();
        out.push(ContentType::Alert.to_u8());
        out.extend_from_slice(&0x0301u16.to_be_bytes());
        out.extend_from_slice(&2u16.to_be_bytes());
        out.extend_from_slice(&[1, 2]);
        out.extend_from_slice(&[0xAA, 0xBB]);

        let (_, consumed) = Record::parse(&out).unwrap();
        assert_eq!(consumed, out.len() - 2);
    }
}
