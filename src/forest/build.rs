//! Recursive construction of one search tree over a set of item ids.
//!
//! Each call partitions its ids by a chosen split bit and recurses until the
//! sets are small enough to store inline. Splits that fail to separate the
//! set fall back to a random partition, so construction terminates even when
//! every vector is identical.

use crate::config::{SPLIT_ACCEPT_FRACTION, SPLIT_ATTEMPTS, SPLIT_SALVAGE_FRACTION};
use crate::error::Result;
use crate::forest::hamming;
use crate::forest::node::NodeStore;
use crate::rng::Kiss64Random;

pub(crate) struct TreeBuilder<'a> {
    pub store: &'a mut NodeStore,
    pub rng: &'a mut Kiss64Random,
    pub n_items: u32,
    pub n_nodes: &'a mut u32,
    pub inline_cap: u32,
    pub bits: usize,
    pub verbose: bool,
}

impl TreeBuilder<'_> {
    /// Builds a tree over `ids` and returns its root slot.
    ///
    /// Appends one record per recursive call; leaf items are referenced by
    /// their existing slots rather than copied.
    pub fn make_tree(&mut self, ids: &[u32], is_root: bool) -> Result<u32> {
        if ids.len() == 1 && !is_root {
            return Ok(ids[0]);
        }

        let cap = self.inline_cap as usize;
        // A root collapses to an inline group only when the whole index fits;
        // otherwise small id sets become groups on the way down.
        if ids.len() <= cap && (!is_root || self.n_items as usize <= cap || ids.len() == 1) {
            let slot = self.push_slot()?;
            self.store.write_group(slot, ids);
            return Ok(slot);
        }

        let mut split_bit = 0;
        let mut sides: [Vec<u32>; 2] = [Vec::new(), Vec::new()];
        for _ in 0..SPLIT_ATTEMPTS {
            sides[0].clear();
            sides[1].clear();
            split_bit = {
                let mut vectors: Vec<&[u8]> = Vec::with_capacity(ids.len());
                for &id in ids {
                    vectors.push(self.store.vector_bytes(id));
                }
                hamming::choose_split_bit(&vectors, self.bits, self.rng)
            };
            for &id in ids {
                let side = hamming::bit_set(self.store.vector_bytes(id), split_bit);
                sides[side as usize].push(id);
            }
            if larger_fraction(&sides) < SPLIT_ACCEPT_FRACTION {
                break;
            }
        }

        // No acceptable split was found: assign sides at random until neither
        // side dominates. The stored split bit is retained; it only biases
        // traversal order, never correctness.
        while larger_fraction(&sides) > SPLIT_SALVAGE_FRACTION {
            if self.verbose {
                tracing::warn!(
                    left = sides[0].len(),
                    right = sides[1].len(),
                    "no separating bit found, splitting at random"
                );
            }
            sides[0].clear();
            sides[1].clear();
            for &id in ids {
                sides[usize::from(self.rng.flip())].push(id);
            }
        }

        let flip = usize::from(sides[0].len() > sides[1].len());
        let descendants = if is_root { self.n_items } else { ids.len() as u32 };
        let mut children = [0u32; 2];
        // Recurse into the smaller side first so the larger subtree's records
        // land adjacent to their parent slot.
        for side in 0..2 {
            let branch = side ^ flip;
            children[branch] = self.make_tree(&sides[branch], false)?;
        }

        let slot = self.push_slot()?;
        self.store.write_inner(slot, descendants, children, split_bit);
        Ok(slot)
    }

    fn push_slot(&mut self) -> Result<u32> {
        self.store.reserve(*self.n_nodes as usize + 1)?;
        let slot = *self.n_nodes;
        *self.n_nodes += 1;
        Ok(slot)
    }
}

/// Fraction of ids on the larger side; 1.0 when either side is empty.
fn larger_fraction(sides: &[Vec<u32>; 2]) -> f64 {
    let (left, right) = (sides[0].len(), sides[1].len());
    if left == 0 || right == 0 {
        return 1.0;
    }
    left.max(right) as f64 / (left + right) as f64
}
