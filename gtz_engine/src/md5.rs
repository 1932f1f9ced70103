//! Rolling MD5 over plaintext bytes in file order (§4.12, `--md5`).
//!
//! Each vblock's plaintext is hashed independently via [`digest_bytes`] for
//! its own `TXT_HEADER` record; [`Md5Accumulator`] is fed vblocks in strict
//! `vblock_i` order afterward to produce the whole-concatenation hash the
//! container header and `list` subcommand report.

use md5::{Digest, Md5};

/// MD5 of one vblock's plaintext, computed independently of all others.
pub fn digest_bytes(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Accumulates a single ordered digest across many vblocks without holding
/// their plaintext in memory simultaneously: each vblock's bytes are fed in
/// strict `vblock_i` order as they become available.
pub struct Md5Accumulator {
    hasher: Md5,
}

impl Md5Accumulator {
    pub fn new() -> Self {
        Md5Accumulator { hasher: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> [u8; 16] {
        self.hasher.finalize().into()
    }
}

impl Default for Md5Accumulator {
    fn default() -> Self {
        Md5Accumulator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamed_update_matches_single_shot_digest() {
        let data = b"chr1\t100\tA\tG\nchr1\t200\tC\tT\n";
        let whole = digest_bytes(data);

        let mut acc = Md5Accumulator::new();
        acc.update(&data[..10]);
        acc.update(&data[10..]);
        assert_eq!(acc.finalize(), whole);
    }

    #[test]
    fn empty_input_is_well_known_md5() {
        let d = digest_bytes(b"");
        assert_eq!(hex::encode(d), "d41d8cd98f00b204e9800998ecf8427e");
    }
}

#[cfg(test)]
mod hex {
    pub fn encode(bytes: [u8; 16]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
