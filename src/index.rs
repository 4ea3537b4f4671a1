//! The public Hamming index: bulk insertion, forest construction, queries,
//! and single-file persistence.

use crate::error::{IndexError, Result};
use crate::forest::build::TreeBuilder;
use crate::forest::hamming;
use crate::forest::node::{inline_capacity, stride_for, NodeStore};
use crate::forest::search::ForestSearcher;
use crate::rng::Kiss64Random;
use crate::storage::persistence::{self, IndexHeader};
use std::path::Path;

/// Approximate nearest-neighbor index over fixed-width binary vectors under
/// Hamming distance.
///
/// Items are inserted in bulk, the forest is built once, and the result is
/// queried, saved to a single file, or memory-mapped back. A loaded index is
/// backed by a read-only mapping and cannot be modified.
///
/// All operations run on the caller's thread; sharing an index across threads
/// without external synchronization is the caller's responsibility.
#[derive(Debug)]
pub struct HammingIndex {
    f: usize,
    inline_cap: u32,
    store: NodeStore,
    n_items: u32,
    n_nodes: u32,
    roots: Vec<u32>,
    rng: Kiss64Random,
    built: bool,
    verbose: bool,
}

impl HammingIndex {
    /// Creates an empty index over vectors of `f` 32-bit words.
    ///
    /// # Panics
    ///
    /// Panics if `f` is zero.
    pub fn new(f: usize) -> Self {
        assert!(f >= 1, "vector width must be at least one word");
        let stride = stride_for(f);
        Self {
            f,
            inline_cap: inline_capacity(stride),
            store: NodeStore::new(stride),
            n_items: 0,
            n_nodes: 0,
            roots: Vec::new(),
            rng: Kiss64Random::default(),
            built: false,
            verbose: false,
        }
    }

    /// Vector width in 32-bit words.
    pub fn dims(&self) -> usize {
        self.f
    }

    /// Number of stored items: one past the highest inserted id.
    pub fn n_items(&self) -> u32 {
        self.n_items
    }

    /// Number of trees in the built forest.
    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    /// Reseeds the build-time random stream. Equal seeds and equal insert
    /// order produce identical forests.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    /// Enables per-tree build progress and degenerate-split warnings on the
    /// diagnostic stream. Never affects results.
    pub fn verbose(&mut self, enabled: bool) {
        self.verbose = enabled;
    }

    /// Stores `vector` under `id`, growing the item region as needed.
    ///
    /// Ids need not be dense; unassigned slots below the highest id read as
    /// all-zero vectors and are never returned from queries.
    pub fn add_item(&mut self, id: u32, vector: &[i32]) -> Result<()> {
        if self.built {
            return Err(IndexError::AlreadyBuilt);
        }
        if vector.len() != self.f {
            return Err(IndexError::BadVector {
                expected: self.f,
                actual: vector.len(),
            });
        }
        self.store.reserve(id as usize + 1)?;
        self.store.write_item(id, vector);
        self.n_items = self.n_items.max(id + 1);
        Ok(())
    }

    /// Builds `trees` independent search trees over all stored items and
    /// freezes the index. More trees cost memory and build time but improve
    /// recall.
    pub fn build(&mut self, trees: usize) -> Result<()> {
        if self.built {
            return Err(IndexError::AlreadyBuilt);
        }
        if self.n_items == 0 {
            return Err(IndexError::NoItems);
        }

        self.n_nodes = self.n_items;
        let ids: Vec<u32> = (0..self.n_items).collect();
        for tree in 0..trees {
            let mut builder = TreeBuilder {
                store: &mut self.store,
                rng: &mut self.rng,
                n_items: self.n_items,
                n_nodes: &mut self.n_nodes,
                inline_cap: self.inline_cap,
                bits: hamming::bit_width(self.f),
                verbose: self.verbose,
            };
            let root = builder.make_tree(&ids, true)?;
            self.roots.push(root);
            if self.verbose {
                tracing::info!(tree = tree + 1, of = trees, "built tree");
            }
        }
        if self.verbose {
            tracing::info!(trees, nodes = self.n_nodes, "forest complete");
        }
        self.built = true;
        Ok(())
    }

    /// Single-threaded [`build`](Self::build); the thread count is accepted
    /// for signature compatibility and ignored.
    pub fn build_with_threads(&mut self, trees: usize, _n_threads: usize) -> Result<()> {
        self.build(trees)
    }

    /// Discards the forest but keeps the stored items, allowing further
    /// [`add_item`](Self::add_item) calls followed by a rebuild.
    ///
    /// Fails on a loaded index: a read-only mapping cannot accept the writes
    /// an unbuilt index exists to receive.
    pub fn unbuild(&mut self) -> Result<()> {
        if !self.built {
            return Err(IndexError::NotBuilt);
        }
        if self.store.is_mapped() {
            return Err(IndexError::ReadOnly);
        }
        self.roots.clear();
        self.n_nodes = self.n_items;
        self.built = false;
        Ok(())
    }

    /// Releases the node region — owned buffer or file mapping — and resets
    /// the index to its initial empty state.
    pub fn unload(&mut self) {
        self.store.truncate();
        self.roots.clear();
        self.n_items = 0;
        self.n_nodes = 0;
        self.built = false;
    }

    /// Returns the stored vector for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the allocated item region.
    pub fn get_item(&self, id: u32) -> Vec<i32> {
        self.store
            .vector_bytes(id)
            .chunks_exact(4)
            .map(|word| i32::from_le_bytes(word.try_into().expect("4-byte word")))
            .collect()
    }

    /// Exact Hamming distance between two stored items.
    ///
    /// # Panics
    ///
    /// Panics if either id is outside the allocated item region.
    pub fn get_distance(&self, i: u32, j: u32) -> u32 {
        hamming::distance(self.store.vector_bytes(i), self.store.vector_bytes(j))
    }

    /// Finds the `n` stored items nearest to `vector`.
    ///
    /// `search_k` caps the number of leaf candidates inspected before the
    /// exact rerank; `None` defaults to `n * n_trees()`. Larger budgets trade
    /// time for recall; `n_items * n_trees()` makes the search exhaustive.
    ///
    /// Returns `(ids, distances)` ordered by ascending distance, ties by id.
    pub fn get_nns_by_vector(
        &self,
        vector: &[i32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<(Vec<u32>, Vec<u32>)> {
        if vector.len() != self.f {
            return Err(IndexError::BadVector {
                expected: self.f,
                actual: vector.len(),
            });
        }
        let mut query = vec![0u8; self.f * 4];
        for (dst, word) in query.chunks_exact_mut(4).zip(vector) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
        Ok(self.searcher().nearest(&query, n, search_k))
    }

    /// Finds the `n` stored items nearest to stored item `id`. The item is
    /// its own nearest neighbor at distance zero.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the allocated item region.
    pub fn get_nns_by_item(
        &self,
        id: u32,
        n: usize,
        search_k: Option<usize>,
    ) -> Result<(Vec<u32>, Vec<u32>)> {
        Ok(self.searcher().nearest(self.store.vector_bytes(id), n, search_k))
    }

    /// Writes the built index to a single file whose node region can be
    /// memory-mapped back by [`load`](Self::load).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        if !self.built {
            return Err(IndexError::NotBuilt);
        }
        persistence::write_index(
            path.as_ref(),
            &IndexHeader {
                f: self.f as u32,
                n_items: self.n_items,
                n_nodes: self.n_nodes,
                nodes_capacity: self.store.capacity() as u32,
                inline_cap: self.inline_cap,
                roots: self.roots.clone(),
            },
            self.store.record_bytes(self.n_nodes as usize),
        )?;
        Ok(())
    }

    /// Replaces this index with the contents of a saved file.
    ///
    /// The node region is memory-mapped read-only, so loading is independent
    /// of index size; with `prefault` the pages are populated eagerly where
    /// the platform supports it. A failed load leaves the index empty.
    pub fn load(&mut self, path: impl AsRef<Path>, prefault: bool) -> Result<()> {
        self.unload();
        let (header, file) = persistence::read_index(path.as_ref())?;
        if header.f as usize != self.f {
            return Err(IndexError::DimensionMismatch {
                expected: self.f,
                actual: header.f as usize,
            });
        }
        debug_assert_eq!(header.inline_cap, self.inline_cap);

        let nodes_len = self.store.stride() * header.n_nodes as usize;
        let offset = persistence::header_len(header.roots.len());
        if file.metadata()?.len() < (offset + nodes_len) as u64 {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "index file is shorter than its node region",
            )));
        }
        let map = persistence::map_nodes(&file, offset as u64, nodes_len, prefault)?;
        self.store.attach_mapping(map, file, header.n_nodes as usize);
        self.n_items = header.n_items;
        self.n_nodes = header.n_nodes;
        self.roots = header.roots;
        self.built = true;
        Ok(())
    }

    fn searcher(&self) -> ForestSearcher<'_> {
        ForestSearcher {
            store: &self.store,
            roots: &self.roots,
            n_items: self.n_items,
            inline_cap: self.inline_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_vector_workflow() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[0b0011]).unwrap();
        index.add_item(1, &[0b0110]).unwrap();
        index.add_item(2, &[0b1111]).unwrap();

        assert_eq!(index.get_distance(0, 1), 2);
        assert_eq!(index.get_distance(0, 2), 2);
        assert_eq!(index.get_distance(1, 2), 2);

        index.build(5).unwrap();
        assert_eq!(index.n_trees(), 5);

        let (ids, distances) = index.get_nns_by_vector(&[0b0000], 3, None).unwrap();
        assert_eq!(ids.len(), 3);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
        assert_eq!(distances, vec![2, 2, 4]);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let mut index = HammingIndex::new(2);
        index.add_item(0, &[0x0F0F_0F0F, -1]).unwrap();
        index.add_item(1, &[0, 0x00FF_00FF]).unwrap();
        assert_eq!(index.get_distance(0, 1), index.get_distance(1, 0));
        assert_eq!(index.get_distance(0, 0), 0);
    }

    #[test]
    fn test_get_item_returns_inserted_bits() {
        let mut index = HammingIndex::new(3);
        let vector = [i32::MIN, -1, 0x1234_5678];
        index.add_item(5, &vector).unwrap();
        assert_eq!(index.get_item(5), vector.to_vec());
        assert_eq!(index.n_items(), 6);
    }

    #[test]
    fn test_add_item_rejects_wrong_length() {
        let mut index = HammingIndex::new(4);
        let err = index.add_item(0, &[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::BadVector {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_add_after_build_rejected() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[1]).unwrap();
        index.build(1).unwrap();
        assert!(matches!(
            index.add_item(1, &[2]),
            Err(IndexError::AlreadyBuilt)
        ));
    }

    #[test]
    fn test_build_twice_rejected() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[1]).unwrap();
        index.build(1).unwrap();
        assert!(matches!(index.build(1), Err(IndexError::AlreadyBuilt)));
    }

    #[test]
    fn test_build_without_items_rejected() {
        let mut index = HammingIndex::new(1);
        assert!(matches!(index.build(1), Err(IndexError::NoItems)));
    }

    #[test]
    fn test_query_rejects_wrong_length() {
        let mut index = HammingIndex::new(2);
        index.add_item(0, &[1, 2]).unwrap();
        index.build(1).unwrap();
        assert!(matches!(
            index.get_nns_by_vector(&[1], 1, None),
            Err(IndexError::BadVector { .. })
        ));
    }

    #[test]
    fn test_unbuild_allows_rebuild() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[0b01]).unwrap();
        index.add_item(1, &[0b10]).unwrap();
        index.build(2).unwrap();
        index.unbuild().unwrap();
        assert_eq!(index.n_trees(), 0);

        index.add_item(2, &[0b11]).unwrap();
        index.build(3).unwrap();
        assert_eq!(index.n_trees(), 3);
        assert_eq!(index.n_items(), 3);
    }

    #[test]
    fn test_unbuild_requires_built() {
        let mut index = HammingIndex::new(1);
        assert!(matches!(index.unbuild(), Err(IndexError::NotBuilt)));
    }

    #[test]
    fn test_save_requires_built() {
        let index = HammingIndex::new(1);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            index.save(dir.path().join("x.bf")),
            Err(IndexError::NotBuilt)
        ));
    }

    #[test]
    fn test_unload_resets() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[1]).unwrap();
        index.build(1).unwrap();
        index.unload();
        assert_eq!(index.n_items(), 0);
        assert_eq!(index.n_trees(), 0);
        // The index is reusable after unload.
        index.add_item(0, &[3]).unwrap();
        index.build(1).unwrap();
        assert_eq!(index.n_items(), 1);
    }

    #[test]
    fn test_degenerate_corpus_of_identical_vectors() {
        let mut index = HammingIndex::new(1);
        for id in 0..64 {
            index.add_item(id, &[0x0BAD_F00D]).unwrap();
        }
        index.build(3).unwrap();

        let (ids, distances) = index
            .get_nns_by_vector(&[0x0BAD_F00D], 64, Some(64 * 3))
            .unwrap();
        assert_eq!(ids.len(), 64);
        assert!(distances.iter().all(|&d| d == 0));
        let mut sorted = ids;
        sorted.sort_unstable();
        let expected: Vec<u32> = (0..64).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_sparse_ids_are_never_returned() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[0b01]).unwrap();
        index.add_item(2, &[0b11]).unwrap();
        assert_eq!(index.n_items(), 3);
        index.build(2).unwrap();

        let (ids, _) = index.get_nns_by_vector(&[0], 3, Some(100)).unwrap();
        assert!(!ids.contains(&1), "unassigned id must not appear");
        let mut sorted = ids;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 2]);
    }

    #[test]
    fn test_single_item_index() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[42]).unwrap();
        index.build(2).unwrap();
        let (ids, distances) = index.get_nns_by_item(0, 1, None).unwrap();
        assert_eq!(ids, vec![0]);
        assert_eq!(distances, vec![0]);
    }

    #[test]
    fn test_zero_n_and_zero_search_k() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[1]).unwrap();
        index.add_item(1, &[2]).unwrap();
        index.build(2).unwrap();
        let (ids, _) = index.get_nns_by_vector(&[0], 0, None).unwrap();
        assert!(ids.is_empty());
        let (ids, _) = index.get_nns_by_vector(&[0], 2, Some(0)).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_build_with_threads_ignores_count() {
        let mut index = HammingIndex::new(1);
        index.add_item(0, &[1]).unwrap();
        index.build_with_threads(4, 8).unwrap();
        assert_eq!(index.n_trees(), 4);
    }

    #[test]
    fn test_equal_seeds_give_equal_results() {
        let corpus: Vec<Vec<i32>> = (0..100)
            .map(|i: i32| vec![i.wrapping_mul(0x9E37_79B9u32 as i32), !i])
            .collect();

        let build = |seed: u64| {
            let mut index = HammingIndex::new(2);
            for (id, vector) in corpus.iter().enumerate() {
                index.add_item(id as u32, vector).unwrap();
            }
            index.set_seed(seed);
            index.build(5).unwrap();
            index
        };

        let a = build(1234);
        let b = build(1234);
        for probe in 0..20 {
            let query = vec![probe * 17, probe];
            assert_eq!(
                a.get_nns_by_vector(&query, 10, None).unwrap(),
                b.get_nns_by_vector(&query, 10, None).unwrap()
            );
        }
    }
}
