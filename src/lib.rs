//! Server-side TLS 1.0/1.1/1.2 handshake core.
//!
//! Drives a `ClientHello` through key exchange, `ChangeCipherSpec` and
//! `Finished` verification into an established (and renegotiable) session,
//! plus the record-layer primitives the handshake depends on: the PRF,
//! the Finished MAC, and MAC-then-encrypt record signing. Raw socket I/O,
//! certificate parsing, and the client-side handshake are external
//! collaborators this crate does not implement.

pub mod alert;
pub mod cipher_suite;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extensions;
pub mod handshake;
pub mod key_schedule;
pub mod parsing;
pub mod prf;
pub mod record;
pub mod record_crypto;
pub mod state_machine;
pub mod transcript;

pub use error::{Error, Result};
