//! Packed node records and their backing store.
//!
//! Every tree node — item leaf, inline leaf group, or inner split node —
//! shares one fixed-stride record layout, so the whole forest lives in a
//! single contiguous byte region. That region is written to disk verbatim and
//! memory-mapped back unchanged: the in-memory and on-disk representations
//! are identical.
//!
//! Record layout, little-endian, no padding:
//!
//! ```text
//! offset 0   descendants  u32       role discriminant
//! offset 4   children     [u32; 2]  child slots, or the start of inline ids
//! offset 12  v            [i32; f]  item vector, or the split bit in v[0]
//! ```
//!
//! A record whose discriminant is at most `K` reuses the `children` words and
//! the vector payload behind them as a flat array of inline item ids.

use crate::config::STORE_GROWTH_FACTOR;
use crate::error::{IndexError, Result};
use memmap2::Mmap;
use std::fs::File;

/// Byte offset of the `children` field within a record.
pub const CHILDREN_OFFSET: usize = 4;
/// Byte offset of the vector payload within a record.
pub const VECTOR_OFFSET: usize = 12;
/// Bytes per vector word.
pub const WORD_BYTES: usize = 4;

/// Record stride in bytes for an index of `f` vector words.
pub fn stride_for(f: usize) -> usize {
    VECTOR_OFFSET + f * WORD_BYTES
}

/// Maximum number of item ids one record holds inline (`K`).
pub fn inline_capacity(stride: usize) -> u32 {
    ((stride - CHILDREN_OFFSET) / WORD_BYTES - 2) as u32
}

/// Role of a record, decided by its discriminant and slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A single stored item; the slot index is the item id.
    Item,
    /// An inline group holding this many item ids.
    Group(u32),
    /// A split node with two children.
    Inner,
}

/// Growable fixed-stride node region.
///
/// Starts as an owned heap buffer that [`reserve`](NodeStore::reserve) grows
/// in place. After a load the backing is a read-only file mapping and the
/// store is immutable.
#[derive(Debug)]
pub struct NodeStore {
    stride: usize,
    capacity: usize,
    backing: Backing,
}

#[derive(Debug)]
enum Backing {
    Owned(Vec<u8>),
    Mapped {
        map: Mmap,
        // Keeps the descriptor open for the lifetime of the mapping.
        _file: File,
    },
}

impl NodeStore {
    /// Empty owned store for records of `stride` bytes.
    pub fn new(stride: usize) -> Self {
        Self {
            stride,
            capacity: 0,
            backing: Backing::Owned(Vec::new()),
        }
    }

    /// Record stride in bytes.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of record slots currently allocated.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the store is backed by a read-only file mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped { .. })
    }

    fn bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Owned(buf) => buf,
            Backing::Mapped { map, .. } => map,
        }
    }

    /// Ensures capacity for at least `slots` records.
    ///
    /// Growth reallocates to `max(slots, ceil((capacity + 1) * 1.3))` slots,
    /// preserving existing contents and zero-filling the remainder.
    pub fn reserve(&mut self, slots: usize) -> Result<()> {
        if slots <= self.capacity {
            return Ok(());
        }
        let Backing::Owned(buf) = &mut self.backing else {
            return Err(IndexError::ReadOnly);
        };
        let grown = (((self.capacity + 1) as f64) * STORE_GROWTH_FACTOR).ceil() as usize;
        let new_capacity = slots.max(grown);
        let new_len = new_capacity * self.stride;
        buf.try_reserve_exact(new_len - buf.len())
            .map_err(|_| IndexError::OutOfMemory)?;
        buf.resize(new_len, 0);
        self.capacity = new_capacity;
        Ok(())
    }

    /// Drops all records and returns the store to an empty owned buffer,
    /// releasing any mapping and its file descriptor.
    pub fn truncate(&mut self) {
        self.backing = Backing::Owned(Vec::new());
        self.capacity = 0;
    }

    /// Replaces the backing with a read-only mapping of `slots` records.
    pub fn attach_mapping(&mut self, map: Mmap, file: File, slots: usize) {
        self.backing = Backing::Mapped { map, _file: file };
        self.capacity = slots;
    }

    /// Raw bytes of the first `slots` records, as persisted.
    pub fn record_bytes(&self, slots: usize) -> &[u8] {
        &self.bytes()[..slots * self.stride]
    }

    fn record(&self, slot: u32) -> &[u8] {
        let start = slot as usize * self.stride;
        &self.bytes()[start..start + self.stride]
    }

    fn record_mut(&mut self, slot: u32) -> &mut [u8] {
        let stride = self.stride;
        let Backing::Owned(buf) = &mut self.backing else {
            panic!("write to a node store backed by a read-only mapping");
        };
        let start = slot as usize * stride;
        &mut buf[start..start + stride]
    }

    /// Role discriminant of the record at `slot`.
    pub fn descendant_count(&self, slot: u32) -> u32 {
        read_u32(self.record(slot), 0)
    }

    /// Child slot on the given side of an inner record.
    pub fn child(&self, slot: u32, side: usize) -> u32 {
        read_u32(self.record(slot), CHILDREN_OFFSET + side * WORD_BYTES)
    }

    /// Split bit index stored in `v[0]` of an inner record.
    pub fn split_bit(&self, slot: u32) -> u32 {
        read_u32(self.record(slot), VECTOR_OFFSET)
    }

    /// Vector payload bytes of the record at `slot`.
    pub fn vector_bytes(&self, slot: u32) -> &[u8] {
        let start = slot as usize * self.stride + VECTOR_OFFSET;
        &self.bytes()[start..start + self.stride - VECTOR_OFFSET]
    }

    /// Inline item ids of a leaf group.
    pub fn inline_ids(&self, slot: u32, count: u32) -> impl Iterator<Item = u32> + '_ {
        self.record(slot)[CHILDREN_OFFSET..]
            .chunks_exact(WORD_BYTES)
            .take(count as usize)
            .map(|word| u32::from_le_bytes(word.try_into().expect("4-byte id")))
    }

    /// Classifies the record at `slot`.
    ///
    /// An item leaf takes precedence over a single-id group: a discriminant
    /// of 1 inside the item prefix is the item itself, while the same
    /// discriminant in an appended slot is a group of one.
    pub fn kind(&self, slot: u32, n_items: u32, inline_cap: u32) -> NodeKind {
        let count = self.descendant_count(slot);
        if count == 1 && slot < n_items {
            NodeKind::Item
        } else if count <= inline_cap {
            NodeKind::Group(count)
        } else {
            NodeKind::Inner
        }
    }

    /// Writes an item leaf: discriminant 1 and the packed vector.
    pub fn write_item(&mut self, slot: u32, words: &[i32]) {
        let record = self.record_mut(slot);
        record[..4].copy_from_slice(&1u32.to_le_bytes());
        record[CHILDREN_OFFSET..VECTOR_OFFSET].fill(0);
        for (dst, word) in record[VECTOR_OFFSET..].chunks_exact_mut(WORD_BYTES).zip(words) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Writes a leaf group holding `ids` inline.
    pub fn write_group(&mut self, slot: u32, ids: &[u32]) {
        let record = self.record_mut(slot);
        record.fill(0);
        record[..4].copy_from_slice(&(ids.len() as u32).to_le_bytes());
        for (dst, id) in record[CHILDREN_OFFSET..].chunks_exact_mut(WORD_BYTES).zip(ids) {
            dst.copy_from_slice(&id.to_le_bytes());
        }
    }

    /// Writes an inner split record.
    pub fn write_inner(&mut self, slot: u32, descendants: u32, children: [u32; 2], split_bit: u32) {
        let record = self.record_mut(slot);
        record.fill(0);
        record[..4].copy_from_slice(&descendants.to_le_bytes());
        record[4..8].copy_from_slice(&children[0].to_le_bytes());
        record[8..12].copy_from_slice(&children[1].to_le_bytes());
        record[VECTOR_OFFSET..VECTOR_OFFSET + 4].copy_from_slice(&split_bit.to_le_bytes());
    }
}

fn read_u32(record: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        record[offset..offset + 4]
            .try_into()
            .expect("4-byte field"),
    )
}
