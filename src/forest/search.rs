//! Best-first search across the forest.
//!
//! One max-heap ranks pending tree nodes by a margin-agreement key: every
//! root starts at the maximum key, and a branch loses a point each time the
//! query's bit disagrees with the side taken, so the paths that agreed most
//! are expanded first. Item candidates gathered from leaves are deduplicated
//! and reranked by exact Hamming distance.

use crate::forest::hamming;
use crate::forest::node::{NodeKind, NodeStore};
use std::collections::BinaryHeap;

pub(crate) struct ForestSearcher<'a> {
    pub store: &'a NodeStore,
    pub roots: &'a [u32],
    pub n_items: u32,
    pub inline_cap: u32,
}

impl ForestSearcher<'_> {
    /// Returns up to `n` item ids nearest to the packed query vector with
    /// their exact distances, ordered ascending.
    ///
    /// `search_k` caps the number of leaf candidates gathered before the
    /// rerank; `None` defaults to `n` times the number of trees.
    pub fn nearest(
        &self,
        query: &[u8],
        n: usize,
        search_k: Option<usize>,
    ) -> (Vec<u32>, Vec<u32>) {
        let budget = search_k.unwrap_or(n * self.roots.len());

        let mut queue: BinaryHeap<(i32, u32)> = BinaryHeap::with_capacity(self.roots.len());
        for &root in self.roots {
            queue.push((hamming::pq_initial(), root));
        }

        // The budget is only checked between pops, so every root contributes
        // at least one expansion even for tiny budgets.
        let mut candidates: Vec<u32> = Vec::new();
        while candidates.len() < budget {
            let Some((key, slot)) = queue.pop() else {
                break;
            };
            match self.store.kind(slot, self.n_items, self.inline_cap) {
                NodeKind::Item => candidates.push(slot),
                NodeKind::Group(count) => {
                    candidates.extend(self.store.inline_ids(slot, count));
                }
                NodeKind::Inner => {
                    let margin = hamming::bit_set(query, self.store.split_bit(slot));
                    queue.push((
                        hamming::pq_descend(key, margin, true),
                        self.store.child(slot, 1),
                    ));
                    queue.push((
                        hamming::pq_descend(key, margin, false),
                        self.store.child(slot, 0),
                    ));
                }
            }
        }

        // The same item reaches the candidate list once per tree; sort and
        // skip runs so each id is ranked once.
        candidates.sort_unstable();
        let mut ranked: Vec<(u32, u32)> = Vec::with_capacity(candidates.len());
        let mut last = None;
        for id in candidates {
            if last == Some(id) {
                continue;
            }
            last = Some(id);
            if self.store.descendant_count(id) == 1 {
                ranked.push((hamming::distance(query, self.store.vector_bytes(id)), id));
            }
        }

        ranked.sort_unstable();
        ranked.truncate(n);
        let (distances, ids) = ranked.into_iter().unzip();
        (ids, distances)
    }
}
