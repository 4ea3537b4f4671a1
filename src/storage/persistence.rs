//! Single-file persistence for a built index.
//!
//! File layout, every field a little-endian `u32`:
//!
//! ```text
//! f           vector width in words
//! n_items     item count
//! n_nodes     total record count
//! nodes_size  record capacity at save time (hint only; load uses n_nodes)
//! K           inline id capacity per record
//! roots_size  tree count
//! roots       roots_size root slots
//! nodes       n_nodes fixed-stride records, verbatim
//! ```
//!
//! The node region is the exact in-memory byte image, so load maps it
//! read-only and the index is live without parsing. The format is
//! platform-local: a file is loadable only where the field widths and record
//! stride match.

use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Byte length of the fixed fields preceding the roots list.
const FIXED_HEADER_BYTES: usize = 6 * 4;

/// Decoded header of a saved index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    /// Vector width in 32-bit words.
    pub f: u32,
    /// Number of stored items.
    pub n_items: u32,
    /// Total number of records, items included.
    pub n_nodes: u32,
    /// Record capacity when the index was saved.
    pub nodes_capacity: u32,
    /// Inline id capacity per record.
    pub inline_cap: u32,
    /// Root slot of every tree.
    pub roots: Vec<u32>,
}

/// Total header length in bytes for a given tree count.
pub fn header_len(roots: usize) -> usize {
    FIXED_HEADER_BYTES + roots * 4
}

/// Writes the header and the verbatim node region to `path`.
pub fn write_index(path: &Path, header: &IndexHeader, nodes: &[u8]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(&header.f.to_le_bytes())?;
    out.write_all(&header.n_items.to_le_bytes())?;
    out.write_all(&header.n_nodes.to_le_bytes())?;
    out.write_all(&header.nodes_capacity.to_le_bytes())?;
    out.write_all(&header.inline_cap.to_le_bytes())?;
    out.write_all(&(header.roots.len() as u32).to_le_bytes())?;
    for &root in &header.roots {
        out.write_all(&root.to_le_bytes())?;
    }
    out.write_all(nodes)?;
    out.flush()?;
    tracing::debug!(
        path = %path.display(),
        bytes = header_len(header.roots.len()) + nodes.len(),
        trees = header.roots.len(),
        "saved index"
    );
    Ok(())
}

/// Reads the header from `path`, returning it with the open file so the
/// node region can be mapped from the same descriptor.
pub fn read_index(path: &Path) -> io::Result<(IndexHeader, File)> {
    let file = File::open(path)?;
    let mut input = BufReader::new(&file);
    let f = read_u32(&mut input)?;
    let n_items = read_u32(&mut input)?;
    let n_nodes = read_u32(&mut input)?;
    let nodes_capacity = read_u32(&mut input)?;
    let inline_cap = read_u32(&mut input)?;
    let n_roots = read_u32(&mut input)?;
    // Grown by reading rather than preallocated, so a corrupt count fails at
    // end-of-file instead of over-allocating.
    let mut roots = Vec::new();
    for _ in 0..n_roots {
        roots.push(read_u32(&mut input)?);
    }
    tracing::debug!(
        path = %path.display(),
        n_items,
        n_nodes,
        trees = n_roots,
        "read index header"
    );
    Ok((
        IndexHeader {
            f,
            n_items,
            n_nodes,
            nodes_capacity,
            inline_cap,
            roots,
        },
        file,
    ))
}

fn read_u32(input: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Maps `len` bytes of the node region read-only, starting at `offset`.
///
/// With `prefault`, asks the kernel to populate the pages eagerly where
/// supported.
pub fn map_nodes(file: &File, offset: u64, len: usize, prefault: bool) -> io::Result<Mmap> {
    let mut options = MmapOptions::new();
    options.offset(offset).len(len);
    #[cfg(target_os = "linux")]
    if prefault {
        options.populate();
    }
    #[cfg(not(target_os = "linux"))]
    let _ = prefault;
    // Safety: the file is opened read-only and the mapping is private to one
    // index instance; the on-disk file must not change while mapped.
    unsafe { options.map(file) }
}
