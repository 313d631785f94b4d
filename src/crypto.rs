//! Thin, fixed-contract adapter over external RSA, DH, hash and RNG
//! implementations (§2's "Crypto primitives adapter", ≈10% of the core).
//! RSA and DH are treated as external collaborators per §1, so this module
//! wraps the `rsa` and `num-bigint-dig` crates instead of reimplementing
//! big-integer arithmetic by hand.

use num_bigint_dig::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::error::{Error, Result};

/// Minimum RSA modulus size the configuration builder accepts (§3, §4.6).
pub const MIN_RSA_MODULUS_BITS: usize = 1024;

/// An RSA keypair used both to decrypt `ClientKeyExchange` (RSA key
/// transport) and to sign the `ServerKeyExchange` params (DHE_RSA).
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
}

impl RsaKeyPair {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    pub fn modulus_bits(&self) -> usize {
        use rsa::traits::PublicKeyParts;
        self.private_key.n().bits()
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private_key)
    }

    /// PKCS#1 v1.5 decryption for the RSA `ClientKeyExchange` message.
    ///
    /// Intentionally returns a plain `Result` here; the Bleichenbacher
    /// mitigation in the handshake state machine is what throws away the
    /// distinction between "decryption failed" and "decryption succeeded
    /// but the value is malformed" — this adapter just reports what
    /// happened so the caller can launder it.
    pub fn decrypt_pkcs1v15(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.private_key
            .decrypt(rsa::Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| Error::DecodeError(format!("rsa decrypt failed: {}", e)))
    }

    /// Signs already-hashed data with PKCS#1 v1.5 and no DigestInfo prefix,
    /// used for the TLS 1.0/1.1 MD5||SHA1 `ServerKeyExchange` signature.
    pub fn sign_pkcs1v15_raw(&self, hashed: &[u8]) -> Result<Vec<u8>> {
        self.private_key
            .sign(Pkcs1v15Sign::new_unprefixed(), hashed)
            .map_err(|e| Error::HandshakeFailure(format!("rsa sign failed: {}", e)))
    }

    /// Signs a digest with PKCS#1 v1.5 under the given hash's DigestInfo
    /// prefix, used for the TLS 1.2 `ServerKeyExchange` signature once a
    /// hash has been negotiated (§4.5 step 8).
    pub fn sign_pkcs1v15(&self, hash: SignatureHash, hashed: &[u8]) -> Result<Vec<u8>> {
        let padding = match hash {
            SignatureHash::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
            SignatureHash::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        };
        self.private_key
            .sign(padding, hashed)
            .map_err(|e| Error::HandshakeFailure(format!("rsa sign failed: {}", e)))
    }
}

/// `SignatureAndHashAlgorithm.hash` values this crate negotiates (TLS 1.2
/// `signature_algorithms` extension, RFC 5246 §7.4.1.4.1). Only the two
/// hashes actually reachable per §4.5 step 8 (negotiated default SHA1, or
/// SHA256 from the client's advertised list) are modeled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureHash {
    Sha1,
    Sha256,
}

impl SignatureHash {
    pub fn to_u8(&self) -> u8 {
        match self {
            SignatureHash::Sha1 => 2,
            SignatureHash::Sha256 => 4,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            2 => Some(SignatureHash::Sha1),
            4 => Some(SignatureHash::Sha256),
            _ => None,
        }
    }
}

/// `SignatureAndHashAlgorithm.signature` value for RSA (the only signature
/// algorithm this crate implements; ECDSA is a Non-goal).
pub const SIGNATURE_ALGORITHM_RSA: u8 = 1;

/// Fixed 1024-bit Oakley Group 2 (RFC 2409 §6.2), used as the sole DHE_RSA
/// group: DH group negotiation is out of scope, so a single hardcoded safe
/// group is enough to implement the key exchange.
pub fn oakley_group_2_prime() -> BigUint {
    BigUint::parse_bytes(
        b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B\
302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286\
651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4\
ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
        16,
    )
    .expect("fixed Oakley Group 2 prime is valid hex")
}

pub fn oakley_group_2_generator() -> BigUint {
    BigUint::from(2u32)
}

/// `g^secret mod p`, used both to generate our own DH public value and to
/// apply the peer's public value to our secret to derive the shared secret.
pub fn dh_mod_exp(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exponent, modulus)
}

/// Process-wide CSPRNG handle (§5). Abstracted behind a trait so tests can
/// substitute [`FixedRandom`] (§13) for determinism.
pub trait Random {
    fn fill(&mut self, buf: &mut [u8]);

    fn bytes(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf);
        buf
    }

    fn random_32(&mut self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.fill(&mut buf);
        buf
    }
}

#[derive(Default)]
pub struct SystemRandom;

impl Random for SystemRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Deterministic RNG for tests: cycles through a fixed byte sequence instead
/// of drawing from the system CSPRNG.
pub struct FixedRandom {
    bytes: Vec<u8>,
    pos: usize,
}

impl FixedRandom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Random for FixedRandom {
    fn fill(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.bytes[self.pos % self.bytes.len()];
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oakley_prime_is_1024_bits() {
        assert_eq!(oakley_group_2_prime().bits(), 1024);
    }

    #[test]
    fn fixed_random_is_deterministic() {
        let mut a = FixedRandom::new(vec![1, 2, 3]);
        let mut b = FixedRandom::new(vec![1, 2, 3]);
        assert_eq!(a.bytes(10), b.bytes(10));
    }
}
