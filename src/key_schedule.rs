//! Key-schedule initialisation (§4.4): derives the master secret and key
//! block from a pre-master secret and splits the block into the two
//! per-direction crypto contexts, for the CBC/RC4 ciphersuites this crate
//! supports.

use crate::cipher_suite::CipherSuiteParams;
use crate::prf::{self, TlsVersion};
use crate::record_crypto::CryptoContext;

pub struct EstablishedKeys {
    pub master_secret: Vec<u8>,
    pub client_ctx: CryptoContext,
    pub server_ctx: CryptoContext,
}

/// Produces `(client_ctx, server_ctx, master_secret)` from a pre-master
/// secret (§4.4). The key block is consumed in the fixed order §4.1
/// mandates: client MAC key, server MAC key, client enc key, server enc
/// key, client IV, server IV.
pub fn establish(
    version: TlsVersion,
    params: &CipherSuiteParams,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> EstablishedKeys {
    let master_secret = prf::master_secret(version, params.prf_hash, pre_master_secret, client_random, server_random);

    let mac_len = params.mac_key_len();
    let enc_len = params.enc_key_len();
    let iv_len = params.fixed_iv_len();
    let total = 2 * mac_len + 2 * enc_len + 2 * iv_len;

    let block = prf::key_block(version, params.prf_hash, &master_secret, client_random, server_random, total);

    let mut offset = 0;
    let mut next = |n: usize, offset: &mut usize| -> Vec<u8> {
        let s = block[*offset..*offset + n].to_vec();
        *offset += n;
        s
    };

    let client_mac = next(mac_len, &mut offset);
    let server_mac = next(mac_len, &mut offset);
    let client_enc = next(enc_len, &mut offset);
    let server_enc = next(enc_len, &mut offset);
    let client_iv = next(iv_len, &mut offset);
    let server_iv = next(iv_len, &mut offset);

    let client_ctx = CryptoContext::new(params, client_mac, client_enc, client_iv);
    let server_ctx = CryptoContext::new(params, server_mac, server_enc, server_iv);

    EstablishedKeys {
        master_secret,
        client_ctx,
        server_ctx,
    }
}
