//! TLS pseudo-random function, Finished verify_data, master secret and key
//! block derivation (§4.1). The hash used by the PRF is one of a closed set
//! (MD5, SHA-1, SHA-256) per §9's "Dynamic cipher dispatch" design note, so
//! dispatch here is a plain `match` over [`PrfHash`] rather than a boxed
//! trait object.

use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub const VERIFY_DATA_LENGTH: usize = 12;

/// Hash algorithm driving the single-HMAC TLS 1.2 PRF. TLS 1.0/1.1 always
/// use the fixed MD5+SHA1 construction below and don't go through this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrfHash {
    Sha256,
}

fn hmac_hash(hash: PrfHash, secret: &[u8], data: &[u8]) -> Vec<u8> {
    match hash {
        PrfHash::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts keys of any length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

fn hmac_md5(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Md5>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha1(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// `p_hash(HMAC, secret, seed, n)` from §4.1: `A(0) = seed`,
/// `A(i) = HMAC(secret, A(i-1))`, output is the prefix of length `n` of
/// `HMAC(secret, A(1)||seed) || HMAC(secret, A(2)||seed) || ...`.
fn p_hash(hmac_fn: impl Fn(&[u8], &[u8]) -> Vec<u8>, secret: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    let mut a = seed.to_vec();
    while out.len() < n {
        a = hmac_fn(secret, &a);
        let mut data = a.clone();
        data.extend_from_slice(seed);
        out.extend_from_slice(&hmac_fn(secret, &data));
    }
    out.truncate(n);
    out
}

fn p_hash_md5(secret: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    p_hash(hmac_md5, secret, seed, n)
}

fn p_hash_sha1(secret: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    p_hash(hmac_sha1, secret, seed, n)
}

fn p_hash_generic(hash: PrfHash, secret: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    p_hash(move |s, d| hmac_hash(hash, s, d), secret, seed, n)
}

/// TLS 1.0/1.1 PRF: splits `secret` into two overlapping halves and XORs
/// `p_hash(HMAC-MD5, ...)` with `p_hash(HMAC-SHA1, ...)`.
pub fn prf_tls10(secret: &[u8], label: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    let half = (secret.len() + 1) / 2;
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let mut data = label.to_vec();
    data.extend_from_slice(seed);

    let a = p_hash_md5(s1, &data, n);
    let b = p_hash_sha1(s2, &data, n);

    a.into_iter().zip(b).map(|(x, y)| x ^ y).collect()
}

/// TLS 1.2 PRF: single-HMAC `p_hash` keyed by the ciphersuite's PRF hash
/// (SHA-256 unless the ciphersuite specifies otherwise).
pub fn prf_tls12(hash: PrfHash, secret: &[u8], label: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    let mut data = label.to_vec();
    data.extend_from_slice(seed);
    p_hash_generic(hash, secret, &data, n)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
}

impl TlsVersion {
    pub fn wire(&self) -> u16 {
        match self {
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 => 0x0303,
        }
    }

    pub fn from_wire(v: u16) -> Option<Self> {
        match v {
            0x0301 => Some(TlsVersion::Tls10),
            0x0302 => Some(TlsVersion::Tls11),
            0x0303 => Some(TlsVersion::Tls12),
            _ => None,
        }
    }
}

fn prf(version: TlsVersion, prf_hash: PrfHash, secret: &[u8], label: &[u8], seed: &[u8], n: usize) -> Vec<u8> {
    match version {
        TlsVersion::Tls10 | TlsVersion::Tls11 => prf_tls10(secret, label, seed, n),
        TlsVersion::Tls12 => prf_tls12(prf_hash, secret, label, seed, n),
    }
}

/// `master_secret = PRF(pre_master_secret, "master secret", client_random||server_random, 48)`.
pub fn master_secret(
    version: TlsVersion,
    prf_hash: PrfHash,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf(version, prf_hash, pre_master_secret, b"master secret", &seed, 48)
}

/// `key_block = PRF(master_secret, "key expansion", server_random||client_random, n)`.
///
/// Note the random order is reversed relative to `master_secret` (§4.1).
pub fn key_block(
    version: TlsVersion,
    prf_hash: PrfHash,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    n: usize,
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);
    prf(version, prf_hash, master_secret, b"key expansion", &seed, n)
}

pub const LABEL_CLIENT_FINISHED: &[u8] = b"client finished";
pub const LABEL_SERVER_FINISHED: &[u8] = b"server finished";

/// Finished `verify_data` (§4.1): 12 bytes, seeded by a transcript hash that
/// differs by version (MD5||SHA1 for 1.0/1.1, SHA256 for 1.2).
pub fn verify_data(
    version: TlsVersion,
    prf_hash: PrfHash,
    master_secret: &[u8],
    label: &[u8],
    transcript_bytes: &[u8],
) -> Vec<u8> {
    let seed = match version {
        TlsVersion::Tls10 | TlsVersion::Tls11 => {
            let mut md5 = md5::Md5::new();
            md5.update(transcript_bytes);
            let mut sha1 = Sha1::new();
            sha1.update(transcript_bytes);
            let mut out = md5.finalize().to_vec();
            out.extend_from_slice(&sha1.finalize());
            out
        }
        TlsVersion::Tls12 => {
            let mut sha256 = Sha256::new();
            sha256.update(transcript_bytes);
            sha256.finalize().to_vec()
        }
    };

    prf(version, prf_hash, master_secret, label, &seed, VERIFY_DATA_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_hash_produces_exact_length() {
        for n in [0usize, 1, 12, 48, 100] {
            let out = p_hash_md5(b"secret", b"seed", n);
            assert_eq!(out.len(), n);
            let out = p_hash_sha1(b"secret", b"seed", n);
            assert_eq!(out.len(), n);
            let out = p_hash_generic(PrfHash::Sha256, b"secret", b"seed", n);
            assert_eq!(out.len(), n);
        }
    }

    #[test]
    fn p_hash_is_deterministic() {
        let a = p_hash_generic(PrfHash::Sha256, b"secret", b"seed", 80);
        let b = p_hash_generic(PrfHash::Sha256, b"secret", b"seed", 80);
        assert_eq!(a, b);
    }

    #[test]
    fn prf_tls10_output_length_matches_request() {
        let out = prf_tls10(b"0123456789abcdef", b"label", b"seed", 32);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn master_secret_is_48_bytes() {
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let ms = master_secret(TlsVersion::Tls12, PrfHash::Sha256, &[3u8; 48], &cr, &sr);
        assert_eq!(ms.len(), 48);
    }

    #[test]
    fn verify_data_is_12_bytes_for_every_version() {
        let ms = vec![9u8; 48];
        for version in [TlsVersion::Tls10, TlsVersion::Tls11, TlsVersion::Tls12] {
            let vd = verify_data(version, PrfHash::Sha256, &ms, LABEL_CLIENT_FINISHED, b"transcript bytes");
            assert_eq!(vd.len(), VERIFY_DATA_LENGTH);
        }
    }

    #[test]
    fn verify_data_depends_on_full_transcript_not_chunking() {
        let ms = vec![9u8; 48];
        let whole = verify_data(TlsVersion::Tls12, PrfHash::Sha256, &ms, LABEL_SERVER_FINISHED, b"abcdef");
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(b"abc");
        concatenated.extend_from_slice(b"def");
        let chunked = verify_data(TlsVersion::Tls12, PrfHash::Sha256, &ms, LABEL_SERVER_FINISHED, &concatenated);
        assert_eq!(whole, chunked);
    }
}
