//! MAC-then-encrypt record signing, CBC padding/block chaining, and the
//! stream-cipher alternative (§4.2, §4.3): per-direction state carrying a
//! sequence number and an additional-data prefix, with encrypt/decrypt
//! methods producing/consuming a `Record`, for the CBC/RC4 ciphersuites
//! this crate supports rather than TLS 1.3's AEAD-only record layer.

use aes::Aes128;
use aes::Aes256;
use cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use des::TdesEde3;
use hmac::{Hmac, Mac};
use md5::Md5;
use rc4::StreamCipher;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::cipher_suite::{BulkCipher, CipherSuiteParams, MacAlgorithm};
use crate::error::{Error, Result};
use crate::record::{ContentType, Record};

/// `mac(prefix(seq, ty, version, len) || data)` (§4.2). `prefix` is the
/// 13-byte sequence-number/type/version/length header.
fn mac(alg: MacAlgorithm, mac_key: &[u8], seq_num: u64, ty: ContentType, version: u16, data: &[u8]) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(13 + data.len());
    prefix.extend_from_slice(&seq_num.to_be_bytes());
    prefix.push(ty.to_u8());
    prefix.extend_from_slice(&version.to_be_bytes());
    prefix.extend_from_slice(&(data.len() as u16).to_be_bytes());
    prefix.extend_from_slice(data);

    match alg {
        MacAlgorithm::Md5 => {
            let mut m = Hmac::<Md5>::new_from_slice(mac_key).expect("HMAC accepts keys of any length");
            m.update(&prefix);
            m.finalize().into_bytes().to_vec()
        }
        MacAlgorithm::Sha1 => {
            let mut m = Hmac::<Sha1>::new_from_slice(mac_key).expect("HMAC accepts keys of any length");
            m.update(&prefix);
            m.finalize().into_bytes().to_vec()
        }
    }
}

/// CBC padding (§4.3): `pad_len = B - ((len(P) + 1) mod B)`, then append
/// `pad_len + 1` bytes each equal to `pad_len`.
pub fn pad(plaintext: &[u8], block_size: usize) -> Vec<u8> {
    let pad_len = block_size - ((plaintext.len() + 1) % block_size);
    let mut out = Vec::with_capacity(plaintext.len() + pad_len + 1);
    out.extend_from_slice(plaintext);
    out.resize(out.len() + pad_len + 1, pad_len as u8);
    out
}

/// Verifies and strips CBC padding. Returns `BadRecordMAC` on any failure,
/// uniformly with a failed MAC check (§4.3's padding-oracle mitigation: the
/// same alert regardless of whether padding or MAC failed).
pub fn unpad(padded: &[u8], block_size: usize) -> Result<&[u8]> {
    if padded.is_empty() || padded.len() % block_size != 0 {
        return Err(Error::BadRecordMAC("invalid padded length".into()));
    }
    let pad_len = *padded.last().unwrap() as usize;
    if pad_len + 1 > padded.len() {
        return Err(Error::BadRecordMAC("padding length exceeds record".into()));
    }
    let pad_start = padded.len() - pad_len - 1;
    let expected: Vec<u8> = vec![pad_len as u8; pad_len + 1];
    if padded[pad_start..].ct_eq(&expected[..]).unwrap_u8() != 1 {
        return Err(Error::BadRecordMAC("invalid padding".into()));
    }
    Ok(&padded[..pad_start])
}

fn encrypt_block(cipher: BulkCipher, key: &[u8], block: &mut [u8]) {
    match cipher {
        BulkCipher::TripleDesEdeCbc => {
            let c = TdesEde3::new_from_slice(key).expect("3DES key is 24 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.encrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Aes128Cbc => {
            let c = Aes128::new_from_slice(key).expect("AES-128 key is 16 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.encrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Aes256Cbc => {
            let c = Aes256::new_from_slice(key).expect("AES-256 key is 32 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.encrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Rc4_128 => unreachable!("RC4 has no block chaining"),
    }
}

fn decrypt_block(cipher: BulkCipher, key: &[u8], block: &mut [u8]) {
    match cipher {
        BulkCipher::TripleDesEdeCbc => {
            let c = TdesEde3::new_from_slice(key).expect("3DES key is 24 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.decrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Aes128Cbc => {
            let c = Aes128::new_from_slice(key).expect("AES-128 key is 16 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.decrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Aes256Cbc => {
            let c = Aes256::new_from_slice(key).expect("AES-256 key is 32 bytes");
            let mut b = GenericArray::clone_from_slice(block);
            c.decrypt_block(&mut b);
            block.copy_from_slice(&b);
        }
        BulkCipher::Rc4_128 => unreachable!("RC4 has no block chaining"),
    }
}

/// CBC encrypt: chains `iv` through `plaintext`'s blocks, returns
/// `(ciphertext, next_iv)` where `next_iv` is the final ciphertext block
/// (§4.3).
pub fn cbc_encrypt(cipher: BulkCipher, key: &[u8], iv: &[u8], plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let block_size = cipher.block_size().expect("CBC cipher has a block size");
    assert_eq!(plaintext.len() % block_size, 0, "caller must pad first");

    let mut prev = iv.to_vec();
    let mut out = Vec::with_capacity(plaintext.len());
    for chunk in plaintext.chunks(block_size) {
        let mut block = chunk.to_vec();
        for i in 0..block_size {
            block[i] ^= prev[i];
        }
        encrypt_block(cipher, key, &mut block);
        out.extend_from_slice(&block);
        prev = block;
    }
    (out, prev)
}

/// CBC decrypt: symmetric to [`cbc_encrypt`]; `next_iv` is the final
/// ciphertext block of the *input*.
pub fn cbc_decrypt(cipher: BulkCipher, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let block_size = cipher.block_size().expect("CBC cipher has a block size");
    if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
        return Err(Error::BadRecordMAC("ciphertext not a multiple of the block size".into()));
    }

    let mut prev = iv.to_vec();
    let mut out = Vec::with_capacity(ciphertext.len());
    for chunk in ciphertext.chunks(block_size) {
        let mut block = chunk.to_vec();
        decrypt_block(cipher, key, &mut block);
        for i in 0..block_size {
            block[i] ^= prev[i];
        }
        out.extend_from_slice(&block);
        prev = chunk.to_vec();
    }
    Ok((out, prev))
}

type Rc4_128 = rc4::Rc4<rc4::consts::U16>;

/// Per-direction state used after `establish_master_secret` (§3's "Crypto
/// context", §4.4). Holds whatever the negotiated cipher needs to carry
/// across records: a chained IV for CBC, or RC4's running keystream state.
pub enum CipherState {
    Cbc { cipher: BulkCipher, key: Vec<u8>, iv: Vec<u8> },
    Rc4(Rc4_128),
}

impl CipherState {
    pub fn new_cbc(cipher: BulkCipher, key: Vec<u8>, iv: Vec<u8>) -> Self {
        CipherState::Cbc { cipher, key, iv }
    }

    pub fn new_rc4(key: &[u8]) -> Self {
        CipherState::Rc4(Rc4_128::new_from_slice(key).expect("RC4-128 key is 16 bytes"))
    }
}

pub struct CryptoContext {
    pub mac_key: Vec<u8>,
    pub mac_algorithm: MacAlgorithm,
    pub cipher_state: CipherState,
    pub seq_num: u64,
}

impl CryptoContext {
    pub fn new(params: &CipherSuiteParams, mac_key: Vec<u8>, enc_key: Vec<u8>, iv: Vec<u8>) -> Self {
        let cipher_state = if params.cipher.is_stream() {
            CipherState::new_rc4(&enc_key)
        } else {
            CipherState::new_cbc(params.cipher, enc_key, iv)
        };
        Self {
            mac_key,
            mac_algorithm: params.mac,
            cipher_state,
            seq_num: 0,
        }
    }

    /// MAC-then-encrypt a plaintext application/handshake record (§4.2,
    /// §4.3). Returns the ciphertext `Record`; the sequence number is
    /// incremented exactly once.
    pub fn encrypt(&mut self, typ: ContentType, version: u16, plaintext: &[u8]) -> Record {
        let tag = mac(self.mac_algorithm, &self.mac_key, self.seq_num, typ, version, plaintext);

        let mut signed = Vec::with_capacity(plaintext.len() + tag.len());
        signed.extend_from_slice(plaintext);
        signed.extend_from_slice(&tag);

        let ciphertext = match &mut self.cipher_state {
            CipherState::Rc4(rc4) => {
                let mut buf = signed;
                rc4.apply_keystream(&mut buf);
                buf
            }
            CipherState::Cbc { cipher, key, iv } => {
                let padded = pad(&signed, cipher.block_size().unwrap());
                let (ciphertext, next_iv) = cbc_encrypt(*cipher, key, iv, &padded);
                *iv = next_iv;
                ciphertext
            }
        };

        self.seq_num += 1;

        Record {
            typ,
            legacy_record_version: version,
            data: ciphertext.into(),
        }
    }

    /// Decrypt-then-verify a received record. A MAC mismatch and a padding
    /// failure both surface as `BadRecordMAC` with no distinguishing
    /// information (§4.3, §7).
    pub fn decrypt(&mut self, record: &Record) -> Result<Vec<u8>> {
        let signed = match &mut self.cipher_state {
            CipherState::Rc4(rc4) => {
                let mut buf = record.data.to_vec();
                rc4.apply_keystream(&mut buf);
                buf
            }
            CipherState::Cbc { cipher, key, iv } => {
                let (padded, next_iv) = cbc_decrypt(*cipher, key, iv, &record.data)?;
                let unpadded = unpad(&padded, cipher.block_size().unwrap())?.to_vec();
                *iv = next_iv;
                unpadded
            }
        };

        let mac_len = match self.mac_algorithm {
            MacAlgorithm::Md5 => 16,
            MacAlgorithm::Sha1 => 20,
        };
        if signed.len() < mac_len {
            return Err(Error::BadRecordMAC("record shorter than one MAC tag".into()));
        }
        let (plaintext, received_tag) = signed.split_at(signed.len() - mac_len);

        let expected_tag = mac(
            self.mac_algorithm,
            &self.mac_key,
            self.seq_num,
            record.typ,
            record.legacy_record_version,
            plaintext,
        );

        if expected_tag.ct_eq(received_tag).unwrap_u8() != 1 {
            return Err(Error::BadRecordMAC("mac mismatch".into()));
        }

        self.seq_num += 1;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_length_is_multiple_of_block_size_and_covers_input() {
        for len in 0..40 {
            let data = vec![0xABu8; len];
            let padded = pad(&data, 8);
            assert_eq!(padded.len() % 8, 0);
            assert!(padded.len() >= data.len() + 1);
        }
    }

    #[test]
    fn unpad_recovers_original_plaintext() {
        for len in 0..40 {
            let data = vec![0xCDu8; len];
            let padded = pad(&data, 16);
            let recovered = unpad(&padded, 16).unwrap();
            assert_eq!(recovered, &data[..]);
        }
    }

    #[test]
    fn unpad_rejects_corrupted_padding() {
        let mut padded = pad(b"hello", 8);
        let last = padded.len() - 1;
        padded[last] ^= 0xFF;
        assert!(unpad(&padded, 8).is_err());
    }

    #[test]
    fn cbc_round_trip_recovers_plaintext_and_chains_iv() {
        let key = vec![0x11u8; 16];
        let iv = vec![0x22u8; 16];
        let padded = pad(b"a CBC round-trip test message", 16);

        let (ciphertext, enc_next_iv) = cbc_encrypt(BulkCipher::Aes128Cbc, &key, &iv, &padded);
        let (decrypted, dec_next_iv) = cbc_decrypt(BulkCipher::Aes128Cbc, &key, &iv, &ciphertext).unwrap();

        assert_eq!(decrypted, padded);
        assert_eq!(enc_next_iv, dec_next_iv);
        assert_eq!(&enc_next_iv[..], &ciphertext[ciphertext.len() - 16..]);
    }

    #[test]
    fn crypto_context_round_trips_a_record() {
        use crate::cipher_suite::{params_of, CipherSuite};

        let params = params_of(CipherSuite::TlsRsaWithAes128CbcSha).unwrap();
        let mut enc = CryptoContext::new(&params, vec![1u8; 20], vec![2u8; 16], vec![3u8; 16]);
        let mut dec = CryptoContext::new(&params, vec![1u8; 20], vec![2u8; 16], vec![3u8; 16]);

        let record = enc.encrypt(ContentType::ApplicationData, 0x0303, b"hello record layer");
        let plaintext = dec.decrypt(&record).unwrap();

        assert_eq!(plaintext, b"hello record layer");
    }

    #[test]
    fn crypto_context_rejects_tampered_ciphertext() {
        use crate::cipher_suite::{params_of, CipherSuite};

        let params = params_of(CipherSuite::TlsRsaWith3DesEdeCbcSha).unwrap();
        let mut enc = CryptoContext::new(&params, vec![1u8; 20], vec![2u8; 24], vec![3u8; 8]);
        let mut dec = CryptoContext::new(&params, vec![1u8; 20], vec![2u8; 24], vec![3u8; 8]);

        let mut record = enc.encrypt(ContentType::ApplicationData, 0x0301, b"tamper with me");
        let mut tampered = record.data.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        record.data = tampered.into();

        assert!(dec.decrypt(&record).is_err());
    }
}
