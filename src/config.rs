//! Frozen, validated server configuration (§3, §4.6): a "recommended"
//! defaults builder plus a validating freeze constructor.

use std::sync::Arc;

use log::warn;

use crate::cipher_suite::{params_of, CipherSuite};
use crate::crypto::{RsaKeyPair, SignatureHash, MIN_RSA_MODULUS_BITS};
use crate::error::{Error, Result};
use crate::prf::TlsVersion;

/// Certificate chain (leaf-first, DER-encoded, parsing out of scope per
/// §1) and the private key used to authenticate it.
pub struct OwnCertificate {
    pub certificate_chain: Vec<Vec<u8>>,
    pub private_key: RsaKeyPair,
}

/// Overrides accepted by [`Configuration::server`]. `Default` matches
/// "recommended" policy: every ciphersuite this crate knows about, the full
/// TLS 1.0-1.2 version window, SHA1+SHA256 signature hashes, and secure
/// renegotiation required.
pub struct ConfigurationOptions {
    pub ciphers: Vec<CipherSuite>,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub hashes: Vec<SignatureHash>,
    pub use_renegotiation: bool,
    pub require_secure_renegotiation: bool,
    pub own_certificate: Option<OwnCertificate>,
    pub peer_name: Option<String>,
}

impl Default for ConfigurationOptions {
    fn default() -> Self {
        ConfigurationOptions {
            ciphers: vec![
                CipherSuite::TlsDheRsaWithAes256CbcSha,
                CipherSuite::TlsDheRsaWithAes128CbcSha,
                CipherSuite::TlsDheRsaWith3DesEdeCbcSha,
                CipherSuite::TlsRsaWithAes256CbcSha,
                CipherSuite::TlsRsaWithAes128CbcSha,
                CipherSuite::TlsRsaWith3DesEdeCbcSha,
                CipherSuite::TlsRsaWithRc4_128Sha,
            ],
            min_version: TlsVersion::Tls10,
            max_version: TlsVersion::Tls12,
            hashes: vec![SignatureHash::Sha1, SignatureHash::Sha256],
            use_renegotiation: true,
            require_secure_renegotiation: true,
            own_certificate: None,
            peer_name: None,
        }
    }
}

pub struct Configuration {
    pub ciphers: Vec<CipherSuite>,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub hashes: Vec<SignatureHash>,
    pub use_renegotiation: bool,
    pub require_secure_renegotiation: bool,
    pub own_certificate: Option<OwnCertificate>,
    pub peer_name: Option<String>,
}

impl Configuration {
    /// Validates and freezes `options` (§4.6). Only a server-role
    /// constructor is exposed: §1 scopes the client-side handshake out
    /// entirely, so there is nothing for a `client()` constructor to build.
    pub fn server(options: ConfigurationOptions) -> Result<Arc<Self>> {
        Self::validate(&options).map_err(|e| {
            warn!("rejecting server configuration: {}", e);
            e
        })?;

        Ok(Arc::new(Configuration {
            ciphers: options.ciphers,
            min_version: options.min_version,
            max_version: options.max_version,
            hashes: options.hashes,
            use_renegotiation: options.use_renegotiation,
            require_secure_renegotiation: options.require_secure_renegotiation,
            own_certificate: options.own_certificate,
            peer_name: options.peer_name,
        }))
    }

    fn validate(options: &ConfigurationOptions) -> Result<()> {
        if options.min_version > options.max_version {
            return Err(Error::HandshakeFailure(
                "configuration min_version is greater than max_version".into(),
            ));
        }

        if options.ciphers.is_empty() {
            return Err(Error::HandshakeFailure("configuration has no ciphersuites".into()));
        }

        if options.hashes.is_empty() {
            return Err(Error::HandshakeFailure("configuration has no signature hashes".into()));
        }

        let any_suite_requires_certificate = options
            .ciphers
            .iter()
            .filter_map(|s| params_of(*s))
            .any(|p| p.requires_certificate());

        if any_suite_requires_certificate && options.own_certificate.is_none() {
            return Err(Error::HandshakeFailure(
                "configuration lists a certificate-requiring ciphersuite without a certificate".into(),
            ));
        }

        if let Some(cert) = &options.own_certificate {
            if cert.private_key.modulus_bits() < MIN_RSA_MODULUS_BITS {
                return Err(Error::HandshakeFailure(format!(
                    "RSA modulus is below the minimum of {} bits",
                    MIN_RSA_MODULUS_BITS
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_greater_than_max_is_rejected() {
        let options = ConfigurationOptions {
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls10,
            own_certificate: None,
            ciphers: vec![],
            ..ConfigurationOptions::default()
        };
        assert!(Configuration::server(options).is_err());
    }

    #[test]
    fn empty_cipher_list_is_rejected() {
        let options = ConfigurationOptions {
            ciphers: vec![],
            ..ConfigurationOptions::default()
        };
        assert!(Configuration::server(options).is_err());
    }

    #[test]
    fn certificate_requiring_suites_without_a_certificate_are_rejected() {
        let options = ConfigurationOptions {
            own_certificate: None,
            ..ConfigurationOptions::default()
        };
        assert!(Configuration::server(options).is_err());
    }

    #[test]
    fn empty_hash_list_is_rejected() {
        let options = ConfigurationOptions {
            hashes: vec![],
            own_certificate: None,
            ciphers: vec![],
            ..ConfigurationOptions::default()
        };
        assert!(Configuration::server(options).is_err());
    }
}
