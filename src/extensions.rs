//! `ClientHello`/`ServerHello` extensions this handshake core actually
//! consults: SNI (presence only), `signature_algorithms`, and
//! `renegotiation_info` (RFC 5746). TLS 1.3 extensions like `key_share` and
//! `supported_versions` are out of scope.

use crate::crypto::SignatureHash;
use crate::error::{Error, Result};
use crate::parsing::{write_u16, write_vector, Cursor};

const EXT_SERVER_NAME: u16 = 0;
const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
const EXT_RENEGOTIATION_INFO: u16 = 0xff01;

#[derive(Clone, Debug)]
pub enum Extension {
    /// Carries the raw `server_name_list` body. The handshake core only acts
    /// on whether the client sent one (the server echoes back an empty
    /// extension, §4.5 step 6) but must retain the bytes verbatim: they flow
    /// into the handshake transcript, and dropping them there would make the
    /// transcript diverge from what the client actually sent.
    ServerName(Vec<u8>),
    SignatureAlgorithms(Vec<(u8, u8)>),
    RenegotiationInfo(Vec<u8>),
    Unknown { typ: u16, data: Vec<u8> },
}

impl Extension {
    pub fn parse(c: &mut Cursor) -> Result<Self> {
        let typ = c.u16()?;
        let data = c.vector(2)?;
        let mut body = Cursor::new(&data);

        let ext = match typ {
            EXT_SERVER_NAME => Extension::ServerName(data),
            EXT_SIGNATURE_ALGORITHMS => {
                let list = body.vector(2)?;
                if list.len() % 2 != 0 {
                    return Err(Error::DecodeError("signature_algorithms has odd length".into()));
                }
                let pairs = list.chunks(2).map(|c| (c[0], c[1])).collect();
                Extension::SignatureAlgorithms(pairs)
            }
            EXT_RENEGOTIATION_INFO => {
                let info = body.vector(1)?;
                Extension::RenegotiationInfo(info)
            }
            _ => Extension::Unknown { typ, data },
        };
        Ok(ext)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Extension::ServerName(data) => {
                write_u16(out, EXT_SERVER_NAME);
                write_vector(out, 2, data);
            }
            Extension::SignatureAlgorithms(pairs) => {
                write_u16(out, EXT_SIGNATURE_ALGORITHMS);
                let mut inner = Vec::new();
                let mut list = Vec::new();
                for (hash, sig) in pairs {
                    list.push(*hash);
                    list.push(*sig);
                }
                write_vector(&mut inner, 2, &list);
                write_vector(out, 2, &inner);
            }
            Extension::RenegotiationInfo(info) => {
                write_u16(out, EXT_RENEGOTIATION_INFO);
                let mut inner = Vec::new();
                write_vector(&mut inner, 1, info);
                write_vector(out, 2, &inner);
            }
            Extension::Unknown { typ, data } => {
                write_u16(out, *typ);
                write_vector(out, 2, data);
            }
        }
    }
}

/// Result of intersecting the client's `signature_algorithms` extension
/// with our supported hashes (§4.5 step 8). The extension being present but
/// matching nothing is distinct from it being absent: absence falls back to
/// SHA1; an empty intersection fails the handshake outright.
pub enum SignatureHashNegotiation {
    ExtensionAbsent,
    NoAcceptableHash,
    Matched(SignatureHash),
}

/// Finds the first `signature_algorithms` RSA hash (intersected with
/// `supported`, preserving the client's order) per §4.5 step 8.
pub fn negotiate_signature_hash(extensions: &[Extension], supported: &[SignatureHash]) -> SignatureHashNegotiation {
    for ext in extensions {
        if let Extension::SignatureAlgorithms(pairs) = ext {
            for (hash, sig) in pairs {
                if *sig != crate::crypto::SIGNATURE_ALGORITHM_RSA {
                    continue;
                }
                if let Some(h) = SignatureHash::from_u8(*hash) {
                    if supported.contains(&h) {
                        return SignatureHashNegotiation::Matched(h);
                    }
                }
            }
            return SignatureHashNegotiation::NoAcceptableHash;
        }
    }
    SignatureHashNegotiation::ExtensionAbsent
}

pub fn find_renegotiation_info(extensions: &[Extension]) -> Option<&[u8]> {
    extensions.iter().find_map(|e| match e {
        Extension::RenegotiationInfo(data) => Some(data.as_slice()),
        _ => None,
    })
}

pub fn has_server_name(extensions: &[Extension]) -> bool {
    extensions.iter().any(|e| matches!(e, Extension::ServerName(_)))
}
