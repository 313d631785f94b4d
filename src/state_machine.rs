//! Server-side handshake state machine (§4.5, ≈35% of the core): an explicit
//! stage-by-stage driver that assembles and emits each handshake message in
//! order, structured as a pure `(state, input) -> (state', outputs)` tagged
//! sum type per §9's design note, since this crate has no socket loop of its
//! own to drive.

use std::sync::Arc;

use log::{debug, trace, warn};
use num_bigint_dig::BigUint;
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::alert::Alert;
use crate::cipher_suite::{params_of, CipherSuite, CipherSuiteParams, KeyExchange};
use crate::config::Configuration;
use crate::crypto::{dh_mod_exp, oakley_group_2_generator, oakley_group_2_prime, Random, RsaKeyPair, SignatureHash};
use crate::error::{Error, Result};
use crate::extensions::{find_renegotiation_info, has_server_name, negotiate_signature_hash, Extension, SignatureHashNegotiation};
use crate::handshake::{
    Certificate, ClientHello, ClientKeyExchange, Finished, Handshake, ServerHello, ServerKeyExchangeDheRsa,
    TLS_1_0_VERSION, TLS_1_2_VERSION,
};
use crate::key_schedule;
use crate::prf::{self, PrfHash, TlsVersion};
use crate::record::{ContentType, Record};
use crate::record_crypto::CryptoContext;
use crate::transcript::Transcript;

/// Outputs the core emits for the record layer to act on (§6).
pub enum Output {
    /// A plaintext handshake/CCS/alert record to send, already framed.
    Record(ContentType, Vec<u8>),
    /// Install (or, if `None`, disable) encryption for outgoing records.
    ChangeEnc(Option<CryptoContext>),
    /// Install (or, if `None`, disable) decryption for incoming records.
    ChangeDec(Option<CryptoContext>),
}

/// Per-handshake negotiated parameters (§3).
#[derive(Clone)]
struct HandshakeParams {
    client_random: [u8; 32],
    server_random: [u8; 32],
    client_version: u16,
    cipher: CipherSuite,
}

enum PendingKeyExchange {
    Rsa,
    DheRsa { p: BigUint, secret: BigUint },
}

enum Machina {
    ServerInitial,
    ServerHelloDoneSent {
        params: HandshakeParams,
        transcript: Transcript,
        pending: PendingKeyExchange,
    },
    ClientKeyExchangeReceived {
        params: HandshakeParams,
        transcript: Transcript,
        master_secret: Vec<u8>,
        client_ctx: CryptoContext,
        server_ctx: CryptoContext,
    },
    ClientChangeCipherSpecReceived {
        params: HandshakeParams,
        transcript: Transcript,
        master_secret: Vec<u8>,
        server_ctx: CryptoContext,
    },
    ServerEstablished,
}

/// One server-side TLS connection's handshake state (§3's "Handshake
/// state"). `rekeying` survives across the `Established` tag so a later
/// renegotiation's `ClientHello` can be gated against it (§4.5 step 4).
pub struct Connection {
    config: Arc<Configuration>,
    machina: Machina,
    version: Option<TlsVersion>,
    rekeying: Option<(Vec<u8>, Vec<u8>)>,
    /// Set by the driver before delivering a `ChangeCipherSpec`/`Finished`
    /// input if it is still holding back a partial handshake message.
    /// Reassembly itself is the record layer's job (§1), this flag is just
    /// the boundary check §4.5 requires.
    pub hs_fragment_pending: bool,
}

impl Connection {
    pub fn new(config: Arc<Configuration>) -> Self {
        Connection {
            config,
            machina: Machina::ServerInitial,
            version: None,
            rekeying: None,
            hs_fragment_pending: false,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self.machina, Machina::ServerEstablished)
    }

    fn transition_error(input: &str) -> Error {
        Error::UnexpectedMessage(format!("unexpected {} for the current handshake state", input))
    }

    /// Dispatches a decoded handshake message against the current state
    /// (§4.5's state table). Any (state, message) pair not in the table is
    /// a fatal `UnexpectedMessage` with no state change.
    pub fn handle_handshake_message(&mut self, raw: &[u8], message: &Handshake, rng: &mut dyn Random) -> Result<Vec<Output>> {
        match (&self.machina, message) {
            (Machina::ServerInitial, Handshake::ClientHello(hello)) => self.handle_client_hello(raw, hello, rng),
            (Machina::ServerEstablished, Handshake::ClientHello(hello)) => self.handle_client_hello(raw, hello, rng),
            (Machina::ServerHelloDoneSent { .. }, Handshake::ClientKeyExchange(cke)) => {
                self.handle_client_key_exchange(raw, cke, rng)
            }
            (Machina::ClientChangeCipherSpecReceived { .. }, Handshake::Finished(finished)) => {
                self.handle_finished(raw, finished)
            }
            _ => {
                let err = Self::transition_error(&format!("{:?}", message.handshake_type()));
                warn!("{}", err);
                Err(err)
            }
        }
    }

    /// `ChangeCipherSpec` arrives out of band at the record layer, not as a
    /// `Handshake` message (§4.5).
    pub fn handle_change_cipher_spec(&mut self) -> Result<Vec<Output>> {
        if self.hs_fragment_pending {
            let err = Error::UnexpectedMessage("ChangeCipherSpec received with a pending handshake fragment".into());
            warn!("{}", err);
            return Err(err);
        }

        let machina = std::mem::replace(&mut self.machina, Machina::ServerInitial);
        match machina {
            Machina::ClientKeyExchangeReceived {
                params,
                transcript,
                master_secret,
                client_ctx,
                server_ctx,
            } => {
                trace!("activating client_ctx for incoming records after ChangeCipherSpec");
                self.machina = Machina::ClientChangeCipherSpecReceived {
                    params,
                    transcript,
                    master_secret,
                    server_ctx,
                };
                Ok(vec![Output::ChangeDec(Some(client_ctx))])
            }
            other => {
                self.machina = other;
                Err(Self::transition_error("ChangeCipherSpec"))
            }
        }
    }

    fn emit(out: &mut Vec<Output>, transcript: &mut Transcript, message: &Handshake) {
        let mut bytes = Vec::new();
        message.serialize(&mut bytes);
        transcript.push(bytes.clone());
        out.push(Output::Record(ContentType::Handshake, bytes));
    }

    fn negotiate_version(config: &Configuration, client_version: u16) -> Result<TlsVersion> {
        let client = match TlsVersion::from_wire(client_version) {
            Some(v) => v,
            // Below our lowest known version (SSLv3 and any unrecognized
            // predecessor) there's nothing to negotiate down to.
            None if client_version < TLS_1_0_VERSION => {
                return Err(Error::ProtocolVersion("client does not support TLS".into()));
            }
            // Above our highest known version: treat it as an offer of our
            // max, matching servers that don't special-case unreleased
            // future versions.
            None => config.max_version,
        };

        let chosen = std::cmp::min(client, config.max_version);
        if chosen < config.min_version {
            return Err(Error::ProtocolVersion(format!(
                "no version in [{:?}, {:?}] is acceptable to a client offering at most {:?}",
                config.min_version, config.max_version, client
            )));
        }
        Ok(chosen)
    }

    fn select_cipher_suite(config: &Configuration, offered: &[CipherSuite]) -> Result<CipherSuite> {
        for suite in &config.ciphers {
            if offered.contains(suite) {
                return Ok(*suite);
            }
        }
        Err(Error::HandshakeFailure("no mutually acceptable ciphersuite".into()))
    }

    /// §4.5 step 4: renegotiation_info / SCSV gating.
    fn check_renegotiation(&self, hello: &ClientHello) -> Result<()> {
        let scsv_present = hello.cipher_suites.contains(&CipherSuite::TlsEmptyRenegotiationInfoScsv);
        let their_data: Option<&[u8]> = if scsv_present {
            Some(&[])
        } else {
            find_renegotiation_info(&hello.extensions)
        };

        match &self.rekeying {
            None => {
                if let Some(data) = their_data {
                    if !data.is_empty() {
                        return Err(Error::HandshakeFailure(
                            "initial handshake carried a non-empty renegotiation_info".into(),
                        ));
                    }
                } else if self.config.require_secure_renegotiation {
                    return Err(Error::HandshakeFailure(
                        "secure renegotiation is required but the client sent neither SCSV nor the extension".into(),
                    ));
                }
            }
            Some((client_verify_data, _)) => {
                let matches = their_data
                    .map(|data| data.ct_eq(client_verify_data.as_slice()).unwrap_u8() == 1)
                    .unwrap_or(false);
                if !matches {
                    return Err(Error::HandshakeFailure(
                        "renegotiation_info does not match the prior handshake's client verify_data".into(),
                    ));
                }
            }
        }

        if matches!(self.machina, Machina::ServerEstablished) && !self.config.use_renegotiation {
            return Err(Error::HandshakeFailure("the server does not allow renegotiation".into()));
        }

        Ok(())
    }

    fn handle_client_hello(&mut self, raw: &[u8], hello: &ClientHello, rng: &mut dyn Random) -> Result<Vec<Output>> {
        if hello.cipher_suites.is_empty() {
            return Err(Error::IllegalParameter("ClientHello has an empty cipher_suites list".into()));
        }
        if hello.random == [0u8; 32] {
            return Err(Error::IllegalParameter("ClientHello random is all zero".into()));
        }
        if hello.legacy_compression_methods.is_empty() || !hello.legacy_compression_methods.contains(&0) {
            return Err(Error::IllegalParameter(
                "ClientHello does not offer the null compression method".into(),
            ));
        }

        let version = Self::negotiate_version(&self.config, hello.legacy_version)?;
        self.check_renegotiation(hello)?;

        let cipher = Self::select_cipher_suite(&self.config, &hello.cipher_suites)?;
        let params = params_of(cipher).expect("selected ciphersuite always has params");
        debug!("negotiated {:?} with {:?}", version, cipher);

        let own_certificate = self
            .config
            .own_certificate
            .as_ref()
            .ok_or_else(|| Error::HandshakeFailure("the selected ciphersuite requires a certificate".into()))?;

        let mut server_random = [0u8; 32];
        rng.fill(&mut server_random);

        let hs_params = HandshakeParams {
            client_random: hello.random,
            server_random,
            client_version: hello.legacy_version,
            cipher,
        };

        let mut transcript = Transcript::new();
        transcript.push(raw.to_vec());

        let mut outputs = Vec::new();

        let mut server_extensions = Vec::new();
        if has_server_name(&hello.extensions) {
            server_extensions.push(Extension::ServerName(Vec::new()));
        }
        let renegotiation_payload = match &self.rekeying {
            None => Vec::new(),
            Some((client_vd, server_vd)) => {
                let mut v = client_vd.clone();
                v.extend_from_slice(server_vd);
                v
            }
        };
        server_extensions.push(Extension::RenegotiationInfo(renegotiation_payload));

        let server_hello = ServerHello {
            version: version.wire(),
            random: server_random,
            session_id: vec![],
            cipher_suite: cipher,
            compression_method: 0,
            extensions: server_extensions,
        };
        Self::emit(&mut outputs, &mut transcript, &Handshake::ServerHello(server_hello));

        let certificate = Certificate {
            certificate_list: own_certificate.certificate_chain.clone(),
        };
        Self::emit(&mut outputs, &mut transcript, &Handshake::Certificate(certificate));

        let pending = match params.key_exchange {
            KeyExchange::Rsa => PendingKeyExchange::Rsa,
            KeyExchange::DheRsa => {
                let (dh_message, p, secret) =
                    Self::build_server_key_exchange(version, &hs_params, &hello.extensions, &own_certificate.private_key, &self.config.hashes, rng)?;
                Self::emit(&mut outputs, &mut transcript, &Handshake::ServerKeyExchangeDheRsa(dh_message));
                PendingKeyExchange::DheRsa { p, secret }
            }
        };

        Self::emit(&mut outputs, &mut transcript, &Handshake::ServerHelloDone);

        self.version = Some(version);
        self.machina = Machina::ServerHelloDoneSent {
            params: hs_params,
            transcript,
            pending,
        };

        Ok(outputs)
    }

    /// Builds the `ServerKeyExchange` for DHE_RSA and signs it (§4.5 step
    /// 8). Returns the message plus the DH state the server must remember
    /// to derive the shared secret once `ClientKeyExchange` arrives.
    fn build_server_key_exchange(
        version: TlsVersion,
        params: &HandshakeParams,
        client_extensions: &[Extension],
        private_key: &RsaKeyPair,
        supported_hashes: &[SignatureHash],
        rng: &mut dyn Random,
    ) -> Result<(ServerKeyExchangeDheRsa, BigUint, BigUint)> {
        let p = oakley_group_2_prime();
        let g = oakley_group_2_generator();

        let secret = Self::generate_dh_secret(&p, rng);
        let public = dh_mod_exp(&g, &secret, &p);

        let p_bytes = p.to_bytes_be();
        let g_bytes = g.to_bytes_be();
        let ys_bytes = public.to_bytes_be();

        let mut data = Vec::new();
        data.extend_from_slice(&params.client_random);
        data.extend_from_slice(&params.server_random);
        crate::parsing::write_vector(&mut data, 2, &p_bytes);
        crate::parsing::write_vector(&mut data, 2, &g_bytes);
        crate::parsing::write_vector(&mut data, 2, &ys_bytes);

        let (signature_algorithm, signature) = match version {
            TlsVersion::Tls10 | TlsVersion::Tls11 => {
                use sha2::Digest as _;
                let mut hashed = md5::Md5::digest(&data).to_vec();
                hashed.extend_from_slice(&Sha1::digest(&data));
                (None, private_key.sign_pkcs1v15_raw(&hashed)?)
            }
            TlsVersion::Tls12 => {
                use sha2::Digest as _;
                let hash = match negotiate_signature_hash(client_extensions, supported_hashes) {
                    SignatureHashNegotiation::ExtensionAbsent => SignatureHash::Sha1,
                    SignatureHashNegotiation::Matched(h) => h,
                    SignatureHashNegotiation::NoAcceptableHash => {
                        return Err(Error::HandshakeFailure(
                            "no acceptable signature hash in the client's signature_algorithms".into(),
                        ))
                    }
                };
                let hashed = match hash {
                    SignatureHash::Sha1 => Sha1::digest(&data).to_vec(),
                    SignatureHash::Sha256 => Sha256::digest(&data).to_vec(),
                };
                let signature = private_key.sign_pkcs1v15(hash, &hashed)?;
                (Some((hash.to_u8(), crate::crypto::SIGNATURE_ALGORITHM_RSA)), signature)
            }
        };

        Ok((
            ServerKeyExchangeDheRsa {
                dh_p: p_bytes,
                dh_g: g_bytes,
                dh_ys: ys_bytes,
                signature_algorithm,
                signature,
            },
            p,
            secret,
        ))
    }

    fn generate_dh_secret(p: &BigUint, rng: &mut dyn Random) -> BigUint {
        let byte_len = (p.bits() + 7) / 8;
        let bound = p - BigUint::from(2u32);
        loop {
            let candidate = BigUint::from_bytes_be(&rng.bytes(byte_len));
            if candidate > BigUint::from(0u32) && candidate < bound {
                return candidate;
            }
        }
    }

    fn handle_client_key_exchange(&mut self, raw: &[u8], cke: &ClientKeyExchange, rng: &mut dyn Random) -> Result<Vec<Output>> {
        // Clone the `Arc` so the certificate's private key can be borrowed
        // from this owned handle instead of from `self`, leaving `self.machina`
        // free to be reassigned below without a dangling self-borrow.
        let config = self.config.clone();
        let machina = std::mem::replace(&mut self.machina, Machina::ServerInitial);
        let (params, mut transcript, pending) = match machina {
            Machina::ServerHelloDoneSent { params, transcript, pending } => (params, transcript, pending),
            other => {
                self.machina = other;
                return Err(Self::transition_error("ClientKeyExchange"));
            }
        };
        let own_private_key = &config
            .own_certificate
            .as_ref()
            .expect("a certificate was required to reach this state")
            .private_key;

        let version = self.version.expect("version is set once ClientHello is processed");
        let cipher_params = params_of(params.cipher).expect("negotiated ciphersuite always has params");

        let pre_master_secret = match (pending, cke) {
            (PendingKeyExchange::Rsa, ClientKeyExchange::Rsa(ciphertext)) => {
                Self::decode_rsa_premaster(own_private_key, ciphertext, params.client_version, version.wire(), rng)
            }
            (PendingKeyExchange::DheRsa { p, secret }, ClientKeyExchange::DheRsa(client_public)) => {
                let yc = BigUint::from_bytes_be(client_public);
                let shared = dh_mod_exp(&yc, &secret, &p);
                shared.to_bytes_be()
            }
            _ => {
                return Err(Error::UnexpectedMessage(
                    "ClientKeyExchange shape does not match the negotiated key exchange".into(),
                ))
            }
        };

        transcript.push(raw.to_vec());

        let established = key_schedule::establish(
            version,
            &cipher_params,
            &pre_master_secret,
            &params.client_random,
            &params.server_random,
        );

        self.machina = Machina::ClientKeyExchangeReceived {
            params,
            transcript,
            master_secret: established.master_secret,
            client_ctx: established.client_ctx,
            server_ctx: established.server_ctx,
        };

        Ok(vec![])
    }

    /// Bleichenbacher-indistinguishable RSA `ClientKeyExchange` decryption
    /// (§4.5). Always returns a 48-byte value; a decryption failure or a
    /// malformed result is laundered into random bytes rather than
    /// surfaced as an error. `other`'s two-byte prefix is the *negotiated*
    /// version; the success check's expected prefix is the version the
    /// client advertised in its `ClientHello`, per §4.5's construction.
    fn decode_rsa_premaster(
        key: &RsaKeyPair,
        ciphertext: &[u8],
        client_version: u16,
        negotiated_version: u16,
        rng: &mut dyn Random,
    ) -> Vec<u8> {
        let mut other = Vec::with_capacity(48);
        other.extend_from_slice(&negotiated_version.to_be_bytes());
        other.extend_from_slice(&rng.bytes(46));

        match key.decrypt_pkcs1v15(ciphertext) {
            Ok(value) if value.len() == 48 && value[0] == (client_version >> 8) as u8 && value[1] == (client_version & 0xff) as u8 => value,
            _ => other,
        }
    }

    fn handle_finished(&mut self, raw: &[u8], finished: &Finished) -> Result<Vec<Output>> {
        let machina = std::mem::replace(&mut self.machina, Machina::ServerInitial);
        let (params, mut transcript, master_secret, server_ctx) = match machina {
            Machina::ClientChangeCipherSpecReceived {
                params,
                transcript,
                master_secret,
                server_ctx,
            } => (params, transcript, master_secret, server_ctx),
            other => {
                self.machina = other;
                return Err(Self::transition_error("Finished"));
            }
        };

        let version = self.version.expect("version is set once ClientHello is processed");
        let prf_hash = params_of(params.cipher).expect("negotiated ciphersuite always has params").prf_hash;

        let client_verify_data = prf::verify_data(
            version,
            prf_hash,
            &master_secret,
            prf::LABEL_CLIENT_FINISHED,
            &transcript.concat(),
        );

        if client_verify_data.ct_eq(&finished.verify_data).unwrap_u8() != 1 {
            let err = Error::BadRecordMAC("client Finished verify_data did not match".into());
            warn!("{}", err);
            return Err(err);
        }

        transcript.push(raw.to_vec());

        let server_verify_data = prf::verify_data(
            version,
            prf_hash,
            &master_secret,
            prf::LABEL_SERVER_FINISHED,
            &transcript.concat(),
        );

        let mut outputs = Vec::new();
        outputs.push(Output::Record(ContentType::ChangeCipherSpec, vec![1]));
        outputs.push(Output::ChangeEnc(Some(server_ctx)));

        let server_finished = Finished {
            verify_data: server_verify_data.clone(),
        };
        let mut bytes = Vec::new();
        Handshake::Finished(server_finished).serialize(&mut bytes);
        transcript.push(bytes.clone());
        outputs.push(Output::Record(ContentType::Handshake, bytes));

        self.rekeying = Some((client_verify_data, server_verify_data));
        self.machina = Machina::ServerEstablished;
        debug!("handshake established");

        let _ = params;
        Ok(outputs)
    }
}

impl Error {
    /// Builds the fatal alert record a driver sends before dropping the
    /// connection on any handshake error (§6, §7).
    pub fn to_alert_record(&self) -> Record {
        let alert = Alert::fatal(self.to_alert());
        let mut bytes = Vec::new();
        alert.serialize(&mut bytes);
        Record {
            typ: ContentType::Alert,
            legacy_record_version: TLS_1_2_VERSION,
            data: bytes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::OsRng;
    use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};

    use super::*;
    use crate::config::{ConfigurationOptions, OwnCertificate};
    use crate::crypto::FixedRandom;

    /// Generates a fresh 1024-bit RSA keypair and wraps it the way a caller
    /// of this crate would: a certificate chain is just opaque DER blobs
    /// (§1, parsing out of scope), so a placeholder stands in for one.
    fn test_own_certificate() -> (OwnCertificate, rsa::RsaPublicKey) {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).expect("1024-bit RSA keygen succeeds");
        let pair = RsaKeyPair::new(key);
        let public_key = pair.public_key();
        (
            OwnCertificate {
                certificate_chain: vec![vec![0x30, 0x03, 0x02, 0x01, 0x00]],
                private_key: pair,
            },
            public_key,
        )
    }

    fn test_config(
        ciphers: Vec<CipherSuite>,
        min_version: TlsVersion,
        max_version: TlsVersion,
        use_renegotiation: bool,
        require_secure_renegotiation: bool,
    ) -> (Arc<Configuration>, rsa::RsaPublicKey) {
        let (own_certificate, public_key) = test_own_certificate();
        let config = Configuration::server(ConfigurationOptions {
            ciphers,
            min_version,
            max_version,
            hashes: vec![SignatureHash::Sha1, SignatureHash::Sha256],
            use_renegotiation,
            require_secure_renegotiation,
            own_certificate: Some(own_certificate),
            peer_name: None,
        })
        .expect("well-formed configuration is accepted");
        (config, public_key)
    }

    fn client_hello(cipher_suites: Vec<CipherSuite>, random: [u8; 32], extensions: Vec<Extension>) -> ClientHello {
        ClientHello {
            legacy_version: TLS_1_2_VERSION,
            random,
            legacy_session_id: vec![],
            cipher_suites,
            legacy_compression_methods: vec![0],
            extensions,
        }
    }

    fn serialize(message: &Handshake) -> Vec<u8> {
        let mut bytes = Vec::new();
        message.serialize(&mut bytes);
        bytes
    }

    fn record_bytes(output: &Output) -> &[u8] {
        match output {
            Output::Record(_, bytes) => bytes,
            _ => panic!("expected an Output::Record"),
        }
    }

    /// §8 scenario 1 (RSA handshake happy path) plus scenario 6 (the initial
    /// ClientHello carries the SCSV rather than an explicit extension).
    /// Drives a full handshake to `ServerEstablished` and independently
    /// recomputes both Finished `verify_data` values from the transcript the
    /// test assembles itself, instead of trusting the state machine's own
    /// arithmetic.
    #[test]
    fn rsa_handshake_happy_path_matches_independently_recomputed_verify_data() {
        let (config, public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls12,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0xAA; 64]);

        let client_random = [7u8; 32];
        let hello = client_hello(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha, CipherSuite::TlsEmptyRenegotiationInfoScsv],
            client_random,
            vec![],
        );
        let client_hello_bytes = serialize(&Handshake::ClientHello(hello.clone()));

        let outputs = conn
            .handle_handshake_message(&client_hello_bytes, &Handshake::ClientHello(hello), &mut rng)
            .expect("a well-formed ClientHello is accepted");
        assert_eq!(outputs.len(), 3, "ServerHello, Certificate, ServerHelloDone");
        let server_hello_bytes = record_bytes(&outputs[0]).to_vec();
        let certificate_bytes = record_bytes(&outputs[1]).to_vec();
        let server_hello_done_bytes = record_bytes(&outputs[2]).to_vec();

        // `FixedRandom` cycling through all-0xAA bytes hands back constant
        // 0xAA server_random regardless of position.
        let server_random = [0xAAu8; 32];

        let mut pre_master_secret = Vec::with_capacity(48);
        pre_master_secret.extend_from_slice(&TLS_1_2_VERSION.to_be_bytes());
        pre_master_secret.extend_from_slice(&[0x5Cu8; 46]);
        let ciphertext = public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &pre_master_secret)
            .expect("RSA encryption of a 48-byte PMS succeeds");

        let cke = ClientKeyExchange::Rsa(ciphertext);
        let cke_bytes = serialize(&Handshake::ClientKeyExchange(cke.clone()));
        let outputs = conn
            .handle_handshake_message(&cke_bytes, &Handshake::ClientKeyExchange(cke), &mut rng)
            .expect("a correctly RSA-encrypted ClientKeyExchange is accepted");
        assert!(outputs.is_empty());

        let outputs = conn.handle_change_cipher_spec().expect("CCS is legal after ClientKeyExchange");
        assert!(matches!(outputs.as_slice(), [Output::ChangeDec(Some(_))]));

        let master_secret = prf::master_secret(
            TlsVersion::Tls12,
            PrfHash::Sha256,
            &pre_master_secret,
            &client_random,
            &server_random,
        );

        let mut transcript_before_client_finished = Vec::new();
        transcript_before_client_finished.extend_from_slice(&client_hello_bytes);
        transcript_before_client_finished.extend_from_slice(&server_hello_bytes);
        transcript_before_client_finished.extend_from_slice(&certificate_bytes);
        transcript_before_client_finished.extend_from_slice(&server_hello_done_bytes);
        transcript_before_client_finished.extend_from_slice(&cke_bytes);

        let client_verify_data = prf::verify_data(
            TlsVersion::Tls12,
            PrfHash::Sha256,
            &master_secret,
            prf::LABEL_CLIENT_FINISHED,
            &transcript_before_client_finished,
        );

        let client_finished = Finished {
            verify_data: client_verify_data.clone(),
        };
        let client_finished_bytes = serialize(&Handshake::Finished(client_finished.clone()));

        let outputs = conn
            .handle_handshake_message(&client_finished_bytes, &Handshake::Finished(client_finished), &mut rng)
            .expect("the correct client verify_data is accepted");
        assert_eq!(outputs.len(), 3, "CCS, ChangeEnc, Finished");
        assert!(matches!(outputs[0], Output::Record(ContentType::ChangeCipherSpec, _)));
        assert!(matches!(outputs[1], Output::ChangeEnc(Some(_))));
        let server_finished_bytes = record_bytes(&outputs[2]);

        let mut transcript_before_server_finished = transcript_before_client_finished.clone();
        transcript_before_server_finished.extend_from_slice(&client_finished_bytes);
        let expected_server_verify_data = prf::verify_data(
            TlsVersion::Tls12,
            PrfHash::Sha256,
            &master_secret,
            prf::LABEL_SERVER_FINISHED,
            &transcript_before_server_finished,
        );

        let (parsed, _) = Handshake::parse(server_finished_bytes, false, true).unwrap();
        match parsed {
            Handshake::Finished(f) => assert_eq!(f.verify_data, expected_server_verify_data),
            _ => panic!("expected a Finished message"),
        }

        assert!(conn.is_established());
    }

    /// §8 scenario 2.
    #[test]
    fn client_hello_below_the_configured_minimum_version_fails_protocol_version() {
        let (config, _public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls10,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x11; 32]);

        let mut hello = client_hello(vec![CipherSuite::TlsRsaWith3DesEdeCbcSha], [1u8; 32], vec![]);
        hello.legacy_version = crate::handshake::SSL_3_0_VERSION;
        let raw = serialize(&Handshake::ClientHello(hello.clone()));

        let err = conn
            .handle_handshake_message(&raw, &Handshake::ClientHello(hello), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolVersion(_)));
    }

    /// §8 scenario 3.
    #[test]
    fn client_hello_with_no_mutually_acceptable_cipher_fails_handshake_failure() {
        let (config, _public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls10,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x22; 32]);

        // SCSV keeps renegotiation gating out of the way so the failure is
        // unambiguously the empty cipher intersection.
        let hello = client_hello(
            vec![CipherSuite::Unknown(0xFFFF), CipherSuite::TlsEmptyRenegotiationInfoScsv],
            [2u8; 32],
            vec![],
        );
        let raw = serialize(&Handshake::ClientHello(hello.clone()));

        let err = conn
            .handle_handshake_message(&raw, &Handshake::ClientHello(hello), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailure(_)));
    }

    /// §8 scenario 4 / the Bleichenbacher-indistinguishability property: a
    /// malformed RSA ciphertext is never rejected at `ClientKeyExchange`.
    /// The handshake proceeds all the way to `Finished`, which then fails
    /// `BadRecordMAC` because the laundered premaster secret doesn't match
    /// what the client actually used.
    #[test]
    fn malformed_rsa_ciphertext_is_laundered_and_only_fails_at_finished() {
        let (config, _public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls12,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x33; 64]);

        let hello = client_hello(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha, CipherSuite::TlsEmptyRenegotiationInfoScsv],
            [3u8; 32],
            vec![],
        );
        let raw = serialize(&Handshake::ClientHello(hello.clone()));
        conn.handle_handshake_message(&raw, &Handshake::ClientHello(hello), &mut rng)
            .expect("ClientHello is accepted");

        // Not a valid PKCS#1 v1.5 ciphertext under the server's key; a
        // 1024-bit RSA key expects a 128-byte ciphertext.
        let garbage = vec![0x42u8; 128];
        let cke = ClientKeyExchange::Rsa(garbage);
        let cke_bytes = serialize(&Handshake::ClientKeyExchange(cke.clone()));
        let outputs = conn
            .handle_handshake_message(&cke_bytes, &Handshake::ClientKeyExchange(cke), &mut rng)
            .expect("a malformed ciphertext is never rejected here (Bleichenbacher mitigation)");
        assert!(outputs.is_empty());

        conn.handle_change_cipher_spec().expect("CCS is legal after ClientKeyExchange");

        let bogus_finished = Finished { verify_data: vec![0u8; 12] };
        let finished_bytes = serialize(&Handshake::Finished(bogus_finished.clone()));
        let err = conn
            .handle_handshake_message(&finished_bytes, &Handshake::Finished(bogus_finished), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::BadRecordMAC(_)));
    }

    /// §8 scenario 5: a renegotiation `ClientHello` whose `renegotiation_info`
    /// doesn't match the prior handshake's client verify_data is rejected.
    #[test]
    fn renegotiation_with_mismatched_verify_data_fails_handshake_failure() {
        let (config, public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls12,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x44; 64]);

        establish(&mut conn, &public_key, &mut rng, [4u8; 32]);
        assert!(conn.is_established());

        let hello = client_hello(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            [5u8; 32],
            vec![Extension::RenegotiationInfo(vec![0xFFu8; 12])],
        );
        let raw = serialize(&Handshake::ClientHello(hello.clone()));
        let err = conn
            .handle_handshake_message(&raw, &Handshake::ClientHello(hello), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailure(_)));
    }

    /// §8's renegotiation-gating property: `use_renegotiation = false` must
    /// reject a `ClientHello` once established, even with correct SCSV/
    /// renegotiation_info framing.
    #[test]
    fn renegotiation_is_rejected_when_disabled_by_configuration() {
        let (config, public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls12,
            TlsVersion::Tls12,
            false,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x55; 64]);

        establish(&mut conn, &public_key, &mut rng, [6u8; 32]);
        assert!(conn.is_established());

        let hello = client_hello(vec![CipherSuite::TlsRsaWith3DesEdeCbcSha, CipherSuite::TlsEmptyRenegotiationInfoScsv], [7u8; 32], vec![]);
        let raw = serialize(&Handshake::ClientHello(hello.clone()));
        let err = conn
            .handle_handshake_message(&raw, &Handshake::ClientHello(hello), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailure(_)));
    }

    /// §8's state-machine property: any (state, message) pair outside
    /// §4.5's table is a fatal `UnexpectedMessage` with no state change.
    #[test]
    fn unexpected_message_in_initial_state_is_rejected_without_a_transition() {
        let (config, _public_key) = test_config(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha],
            TlsVersion::Tls12,
            TlsVersion::Tls12,
            true,
            true,
        );
        let mut conn = Connection::new(config);
        let mut rng = FixedRandom::new(vec![0x66; 32]);

        let cke = ClientKeyExchange::Rsa(vec![0u8; 128]);
        let raw = serialize(&Handshake::ClientKeyExchange(cke.clone()));
        let err = conn
            .handle_handshake_message(&raw, &Handshake::ClientKeyExchange(cke), &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
        assert!(matches!(conn.machina, Machina::ServerInitial));

        let err = conn.handle_change_cipher_spec().unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
        assert!(matches!(conn.machina, Machina::ServerInitial));
    }

    /// Drives one full RSA handshake to `ServerEstablished` on `conn`;
    /// used by tests that only care about behavior once a connection is
    /// already established (renegotiation gating). Recomputes the master
    /// secret and client `verify_data` from the exact bytes exchanged so
    /// the client Finished it sends is genuinely correct.
    fn establish(conn: &mut Connection, public_key: &rsa::RsaPublicKey, rng: &mut FixedRandom, client_random: [u8; 32]) {
        let hello = client_hello(
            vec![CipherSuite::TlsRsaWith3DesEdeCbcSha, CipherSuite::TlsEmptyRenegotiationInfoScsv],
            client_random,
            vec![],
        );
        let client_hello_bytes = serialize(&Handshake::ClientHello(hello.clone()));
        let outputs = conn
            .handle_handshake_message(&client_hello_bytes, &Handshake::ClientHello(hello), rng)
            .expect("ClientHello is accepted");
        let server_hello_bytes = record_bytes(&outputs[0]).to_vec();
        let certificate_bytes = record_bytes(&outputs[1]).to_vec();
        let server_hello_done_bytes = record_bytes(&outputs[2]).to_vec();

        let server_random = match Handshake::parse(&server_hello_bytes, false, true).unwrap().0 {
            Handshake::ServerHello(sh) => sh.random,
            _ => panic!("expected a ServerHello"),
        };

        let mut pre_master_secret = Vec::with_capacity(48);
        pre_master_secret.extend_from_slice(&TLS_1_2_VERSION.to_be_bytes());
        pre_master_secret.extend_from_slice(&[0x99u8; 46]);
        let ciphertext = public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &pre_master_secret)
            .expect("RSA encryption of a 48-byte PMS succeeds");
        let cke = ClientKeyExchange::Rsa(ciphertext);
        let cke_bytes = serialize(&Handshake::ClientKeyExchange(cke.clone()));
        conn.handle_handshake_message(&cke_bytes, &Handshake::ClientKeyExchange(cke), rng)
            .expect("ClientKeyExchange is accepted");

        conn.handle_change_cipher_spec().expect("CCS is legal after ClientKeyExchange");

        let master_secret = prf::master_secret(
            TlsVersion::Tls12,
            PrfHash::Sha256,
            &pre_master_secret,
            &client_random,
            &server_random,
        );

        let mut transcript_before_client_finished = Vec::new();
        transcript_before_client_finished.extend_from_slice(&client_hello_bytes);
        transcript_before_client_finished.extend_from_slice(&server_hello_bytes);
        transcript_before_client_finished.extend_from_slice(&certificate_bytes);
        transcript_before_client_finished.extend_from_slice(&server_hello_done_bytes);
        transcript_before_client_finished.extend_from_slice(&cke_bytes);

        let client_verify_data = prf::verify_data(
            TlsVersion::Tls12,
            PrfHash::Sha256,
            &master_secret,
            prf::LABEL_CLIENT_FINISHED,
            &transcript_before_client_finished,
        );
        let finished = Finished {
            verify_data: client_verify_data,
        };
        let finished_bytes = serialize(&Handshake::Finished(finished.clone()));
        conn.handle_handshake_message(&finished_bytes, &Handshake::Finished(finished), rng)
            .expect("the correct client verify_data is accepted");
    }
}
