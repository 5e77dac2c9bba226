//! XOR parity
//!
//! A parity block is the XOR of every data block in its row, so any single
//! member of the row equals the XOR of all the others.

/// XOR `src` into `acc` in place
pub fn xor_into(acc: &mut [u8], src: &[u8]) {
    debug_assert_eq!(acc.len(), src.len());
    for (a, s) in acc.iter_mut().zip(src) {
        *a ^= s;
    }
}

/// Parity after replacing `old_data` with `new_data` in a row
///
/// `new_parity = old_data ^ new_data ^ parity`
#[must_use]
pub fn updated_parity(old_data: &[u8], new_data: &[u8], parity: &[u8]) -> Vec<u8> {
    let mut out = parity.to_vec();
    xor_into(&mut out, old_data);
    xor_into(&mut out, new_data);
    out
}

/// Accumulates the XOR of a row's surviving members
#[derive(Debug, Clone)]
pub struct ParityAccumulator {
    buf: Vec<u8>,
}

impl ParityAccumulator {
    /// Start from an all-zero block
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0u8; block_size],
        }
    }

    /// Fold one member into the accumulator
    pub fn absorb(&mut self, block: &[u8]) {
        xor_into(&mut self.buf, block);
    }

    /// The XOR of everything absorbed so far
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_block(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.r#gen()).collect()
    }

    #[test]
    fn test_xor_into() {
        let mut acc = vec![0b1010u8, 0xff];
        xor_into(&mut acc, &[0b0110, 0x0f]);
        assert_eq!(acc, vec![0b1100, 0xf0]);
    }

    #[test]
    fn test_incremental_update_matches_full_recompute() {
        let blocks: Vec<Vec<u8>> = (0..4).map(|_| random_block(64)).collect();

        let mut acc = ParityAccumulator::new(64);
        for block in &blocks {
            acc.absorb(block);
        }
        let parity = acc.finish();

        let replacement = random_block(64);
        let updated = updated_parity(&blocks[2], &replacement, &parity);

        let mut acc = ParityAccumulator::new(64);
        for (i, block) in blocks.iter().enumerate() {
            acc.absorb(if i == 2 { &replacement } else { block });
        }
        assert_eq!(updated, acc.finish());
    }

    #[test]
    fn test_missing_member_is_xor_of_survivors() {
        let blocks: Vec<Vec<u8>> = (0..3).map(|_| random_block(32)).collect();
        let mut acc = ParityAccumulator::new(32);
        blocks.iter().for_each(|b| acc.absorb(b));
        let parity = acc.finish();

        let mut rebuild = ParityAccumulator::new(32);
        rebuild.absorb(&blocks[0]);
        rebuild.absorb(&blocks[2]);
        rebuild.absorb(&parity);
        assert_eq!(rebuild.finish(), blocks[1]);
    }
}
