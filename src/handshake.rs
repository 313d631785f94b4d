//! Handshake message types and wire codecs, restricted to the messages this
//! RSA/DHE_RSA TLS 1.0-1.2 state machine actually exchanges (no
//! `EncryptedExtensions`, `CertificateVerify`, `NewSessionTicket`,
//! `KeyUpdate` — those are TLS 1.3 or client-cert-auth concerns, both
//! non-goals here).

use crate::cipher_suite::CipherSuite;
use crate::error::{Error, Result};
use crate::extensions::Extension;
use crate::parsing::{write_u16, write_u24, write_vector, Cursor};

pub const TLS_1_0_VERSION: u16 = 0x0301;
pub const TLS_1_1_VERSION: u16 = 0x0302;
pub const TLS_1_2_VERSION: u16 = 0x0303;
pub const SSL_3_0_VERSION: u16 = 0x0300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl HandshakeType {
    pub fn to_u8(&self) -> u8 {
        match self {
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
            HandshakeType::Unknown(v) => *v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            14 => HandshakeType::ServerHelloDone,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            v => HandshakeType::Unknown(v),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub legacy_compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    fn parse(c: &mut Cursor) -> Result<Self> {
        let legacy_version = c.u16()?;
        let random_vec = c.fixed(32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(&random_vec);
        let legacy_session_id = c.vector(1)?;

        let cipher_suites_bytes = c.vector(2)?;
        if cipher_suites_bytes.len() % 2 != 0 {
            return Err(Error::DecodeError("cipher_suites has odd length".into()));
        }
        let cipher_suites = cipher_suites_bytes
            .chunks(2)
            .map(|c| CipherSuite::from_u16(u16::from_be_bytes([c[0], c[1]])))
            .collect();

        let legacy_compression_methods = c.vector(1)?;

        let mut extensions = Vec::new();
        if !c.is_empty() {
            let ext_bytes = c.vector(2)?;
            let mut ext_cursor = Cursor::new(&ext_bytes);
            while !ext_cursor.is_empty() {
                extensions.push(Extension::parse(&mut ext_cursor)?);
            }
        }

        Ok(ClientHello {
            legacy_version,
            random,
            legacy_session_id,
            cipher_suites,
            legacy_compression_methods,
            extensions,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        write_u16(out, self.legacy_version);
        out.extend_from_slice(&self.random);
        write_vector(out, 1, &self.legacy_session_id);

        let mut suites = Vec::new();
        for s in &self.cipher_suites {
            write_u16(&mut suites, s.to_u16());
        }
        write_vector(out, 2, &suites);

        write_vector(out, 1, &self.legacy_compression_methods);

        let mut ext_bytes = Vec::new();
        for e in &self.extensions {
            e.serialize(&mut ext_bytes);
        }
        write_vector(out, 2, &ext_bytes);
    }
}

#[derive(Clone, Debug)]
pub struct ServerHello {
    pub version: u16,
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    fn parse(c: &mut Cursor) -> Result<Self> {
        let version = c.u16()?;
        let random_vec = c.fixed(32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(&random_vec);
        let session_id = c.vector(1)?;
        let cipher_suite = CipherSuite::from_u16(c.u16()?);
        let compression_method = c.u8()?;

        let mut extensions = Vec::new();
        if !c.is_empty() {
            let ext_bytes = c.vector(2)?;
            let mut ext_cursor = Cursor::new(&ext_bytes);
            while !ext_cursor.is_empty() {
                extensions.push(Extension::parse(&mut ext_cursor)?);
            }
        }

        Ok(ServerHello {
            version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        write_u16(out, self.version);
        out.extend_from_slice(&self.random);
        write_vector(out, 1, &self.session_id);
        write_u16(out, self.cipher_suite.to_u16());
        out.push(self.compression_method);

        let mut ext_bytes = Vec::new();
        for e in &self.extensions {
            e.serialize(&mut ext_bytes);
        }
        // Omit the extensions block entirely when empty, matching servers
        // that only emit it once there is something to say.
        if !ext_bytes.is_empty() {
            write_vector(out, 2, &ext_bytes);
        }
    }
}

/// `Certificate.certificate_list`: each entry is an opaque DER blob (§6).
/// Certificate parsing/validation itself stays out of scope (§1).
#[derive(Clone, Debug)]
pub struct Certificate {
    pub certificate_list: Vec<Vec<u8>>,
}

impl Certificate {
    fn parse(c: &mut Cursor) -> Result<Self> {
        let total = c.vector(3)?;
        let mut inner = Cursor::new(&total);
        let mut certificate_list = Vec::new();
        while !inner.is_empty() {
            certificate_list.push(inner.vector(3)?);
        }
        Ok(Certificate { certificate_list })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let mut inner = Vec::new();
        for cert in &self.certificate_list {
            write_vector(&mut inner, 3, cert);
        }
        write_vector(out, 3, &inner);
    }
}

/// `ServerKeyExchange` for DHE_RSA only (§6): RSA key exchange needs no
/// `ServerKeyExchange` message at all.
#[derive(Clone, Debug)]
pub struct ServerKeyExchangeDheRsa {
    pub dh_p: Vec<u8>,
    pub dh_g: Vec<u8>,
    pub dh_ys: Vec<u8>,
    /// `Some((hash, sig))` for TLS 1.2, `None` for TLS 1.0/1.1 (the
    /// signature there is always PKCS#1-v1.5(MD5||SHA1), no explicit
    /// algorithm prefix on the wire).
    pub signature_algorithm: Option<(u8, u8)>,
    pub signature: Vec<u8>,
}

impl ServerKeyExchangeDheRsa {
    fn parse(c: &mut Cursor, is_tls12: bool) -> Result<Self> {
        let dh_p = c.vector(2)?;
        let dh_g = c.vector(2)?;
        let dh_ys = c.vector(2)?;
        let signature_algorithm = if is_tls12 {
            Some((c.u8()?, c.u8()?))
        } else {
            None
        };
        let signature = c.vector(2)?;
        Ok(ServerKeyExchangeDheRsa {
            dh_p,
            dh_g,
            dh_ys,
            signature_algorithm,
            signature,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        write_vector(out, 2, &self.dh_p);
        write_vector(out, 2, &self.dh_g);
        write_vector(out, 2, &self.dh_ys);
        if let Some((hash, sig)) = self.signature_algorithm {
            out.push(hash);
            out.push(sig);
        }
        write_vector(out, 2, &self.signature);
    }
}

#[derive(Clone, Debug)]
pub enum ClientKeyExchange {
    /// PKCS#1 v1.5 ciphertext of a 48-byte pre-master secret (§6).
    Rsa(Vec<u8>),
    /// The client's DH public value `Yc` (§4.5's DHE_RSA handling).
    DheRsa(Vec<u8>),
}

impl ClientKeyExchange {
    fn parse(c: &mut Cursor, is_dhe: bool) -> Result<Self> {
        let value = c.vector(2)?;
        if is_dhe {
            Ok(ClientKeyExchange::DheRsa(value))
        } else {
            Ok(ClientKeyExchange::Rsa(value))
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let value = match self {
            ClientKeyExchange::Rsa(v) => v,
            ClientKeyExchange::DheRsa(v) => v,
        };
        write_vector(out, 2, value);
    }
}

/// Exactly 12 bytes of verify_data (§6, §4.1).
#[derive(Clone, Debug)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    fn parse(c: &mut Cursor) -> Result<Self> {
        let verify_data = c.fixed(crate::prf::VERIFY_DATA_LENGTH)?;
        Ok(Finished { verify_data })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.verify_data);
    }
}

#[derive(Clone, Debug)]
pub enum Handshake {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    Certificate(Certificate),
    ServerKeyExchangeDheRsa(ServerKeyExchangeDheRsa),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl Handshake {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            Handshake::ClientHello(_) => HandshakeType::ClientHello,
            Handshake::ServerHello(_) => HandshakeType::ServerHello,
            Handshake::Certificate(_) => HandshakeType::Certificate,
            Handshake::ServerKeyExchangeDheRsa(_) => HandshakeType::ServerKeyExchange,
            Handshake::ServerHelloDone => HandshakeType::ServerHelloDone,
            Handshake::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            Handshake::Finished(_) => HandshakeType::Finished,
        }
    }

    /// Parses one `{ type(1) || length(3) || body }` handshake message.
    /// `is_dhe`/`is_tls12` disambiguate wire shapes that otherwise depend on
    /// handshake-level context the message bytes alone don't carry.
    pub fn parse(input: &[u8], is_dhe: bool, is_tls12: bool) -> Result<(Self, usize)> {
        let mut header = Cursor::new(input);
        let typ = HandshakeType::from_u8(header.u8()?);
        let len = header.u24()? as usize;
        let total = 4 + len;
        if input.len() < total {
            return Err(Error::DecodeError("handshake message body truncated".into()));
        }
        let body = &input[4..total];
        let mut c = Cursor::new(body);

        let message = match typ {
            HandshakeType::ClientHello => Handshake::ClientHello(ClientHello::parse(&mut c)?),
            HandshakeType::ServerHello => Handshake::ServerHello(ServerHello::parse(&mut c)?),
            HandshakeType::Certificate => Handshake::Certificate(Certificate::parse(&mut c)?),
            HandshakeType::ServerKeyExchange => {
                Handshake::ServerKeyExchangeDheRsa(ServerKeyExchangeDheRsa::parse(&mut c, is_tls12)?)
            }
            HandshakeType::ServerHelloDone => Handshake::ServerHelloDone,
            HandshakeType::ClientKeyExchange => Handshake::ClientKeyExchange(ClientKeyExchange::parse(&mut c, is_dhe)?),
            HandshakeType::Finished => Handshake::Finished(Finished::parse(&mut c)?),
            HandshakeType::Unknown(v) => {
                return Err(Error::UnexpectedMessage(format!("unknown handshake type {}", v)))
            }
        };

        c.expect_empty()?;
        Ok((message, total))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        match self {
            Handshake::ClientHello(m) => m.serialize(&mut body),
            Handshake::ServerHello(m) => m.serialize(&mut body),
            Handshake::Certificate(m) => m.serialize(&mut body),
            Handshake::ServerKeyExchangeDheRsa(m) => m.serialize(&mut body),
            Handshake::ServerHelloDone => {}
            Handshake::ClientKeyExchange(m) => m.serialize(&mut body),
            Handshake::Finished(m) => m.serialize(&mut body),
        }

        out.push(self.handshake_type().to_u8());
        write_u24(out, body.len() as u32);
        out.extend_from_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_round_trips() {
        let hello = ClientHello {
            legacy_version: TLS_1_2_VERSION,
            random: [7u8; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![CipherSuite::TlsRsaWith3DesEdeCbcSha, CipherSuite::TlsEmptyRenegotiationInfoScsv],
            legacy_compression_methods: vec![0],
            extensions: vec![Extension::RenegotiationInfo(vec![])],
        };

        let msg = Handshake::ClientHello(hello);
        let mut bytes = Vec::new();
        msg.serialize(&mut bytes);

        let (parsed, consumed) = Handshake::parse(&bytes, false, true).unwrap();
        assert_eq!(consumed, bytes.len());
        match parsed {
            Handshake::ClientHello(ch) => {
                assert_eq!(ch.legacy_version, TLS_1_2_VERSION);
                assert_eq!(ch.cipher_suites.len(), 2);
            }
            _ => panic!("expected ClientHello"),
        }
    }

    #[test]
    fn finished_round_trips_exact_length() {
        let finished = Finished {
            verify_data: vec![9u8; 12],
        };
        let msg = Handshake::Finished(finished);
        let mut bytes = Vec::new();
        msg.serialize(&mut bytes);
        assert_eq!(bytes.len(), 4 + 12);

        let (parsed, _) = Handshake::parse(&bytes, false, true).unwrap();
        match parsed {
            Handshake::Finished(f) => assert_eq!(f.verify_data.len(), 12),
            _ => panic!("expected Finished"),
        }
    }

    #[test]
    fn server_hello_done_has_empty_body() {
        let msg = Handshake::ServerHelloDone;
        let mut bytes = Vec::new();
        msg.serialize(&mut bytes);
        assert_eq!(bytes, vec![14, 0, 0, 0]);
    }
}
