//! Handshake message transcript.

use bytes::Bytes;
use digest::Digest;

/// Ordered sequence of raw handshake-message byte strings, excluding
/// `HelloRequest` and `ChangeCipherSpec` (§3). Stored as `Bytes` per §9's
/// "Byte buffers" design note: one contiguous, cheaply-cloneable buffer
/// abstraction used throughout instead of plain `Vec<u8>`/`String`.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Bytes>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { messages: vec![] }
    }

    pub fn push(&mut self, message: impl Into<Bytes>) {
        self.messages.push(message.into());
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Hashes every message seen so far with `D`. Recomputed from scratch
    /// each time; an incremental hash state is a valid optimization as long
    /// as it produces identical output (§9 design note).
    pub fn hash<D: Digest>(&self) -> Vec<u8> {
        let mut hasher = D::new();
        for m in &self.messages {
            hasher.update(m);
        }
        hasher.finalize().to_vec()
    }

    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for m in &self.messages {
            out.extend_from_slice(m);
        }
        out
    }
}
