//! Fixed, versioned, little-endian wire types for the distribution protocols.
//!
//! Fixed-size headers are `bytemuck` Pod structs; variable-length records are
//! written with [`WireWriter`] and read back with the bounds-checked
//! [`WireReader`], which never panics on short input.

use crate::mesh_error::MeshShardError;
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use static_assertions::assert_eq_size;
use std::collections::HashMap;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

// ===== Common records ======================================================

/// Leads every section payload.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16, // = WIRE_VERSION.to_le()
    pub kind_le: u16,    // payload kind code
    pub reserved_le: u32, // future use; keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following bytes or records
}

impl WireCount {
    pub fn new(n: u32) -> Self {
        Self { n_le: n.to_le() }
    }
    pub fn try_new(n: usize) -> Result<Self, MeshShardError> {
        u32::try_from(n)
            .map(Self::new)
            .map_err(|_| MeshShardError::Wire(format!("count {n} does not fit in u32")))
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

assert_eq_size!(WireHdr, [u8; 8]);
assert_eq_size!(WireCount, [u8; 4]);

// ===== Section tags ========================================================

/// Section of the distribution stream, announced by a preceding string tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SectionKind {
    Vertex,
    VolumeElements,
    FaceDescriptor,
    SurfaceElements,
    EdgeSegments,
    EndMesh,
}

const SECTION_TAGS: [(SectionKind, &str); 6] = [
    (SectionKind::Vertex, "vertex"),
    (SectionKind::VolumeElements, "volumeelements"),
    (SectionKind::FaceDescriptor, "facedescriptor"),
    (SectionKind::SurfaceElements, "surfaceelementsgi"),
    (SectionKind::EdgeSegments, "edgesegmentsgi"),
    (SectionKind::EndMesh, "endmesh"),
];

static TAG_LOOKUP: Lazy<HashMap<&'static str, SectionKind>> =
    Lazy::new(|| SECTION_TAGS.iter().map(|&(k, t)| (t, k)).collect());

impl SectionKind {
    /// Sections in the order the coordinator sends them.
    pub const ORDER: [SectionKind; 6] = [
        SectionKind::Vertex,
        SectionKind::VolumeElements,
        SectionKind::FaceDescriptor,
        SectionKind::SurfaceElements,
        SectionKind::EdgeSegments,
        SectionKind::EndMesh,
    ];

    pub fn as_tag(self) -> &'static str {
        SECTION_TAGS[self as usize].1
    }

    /// `None` for tags this build does not know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        TAG_LOOKUP.get(tag).copied()
    }

    pub fn code(self) -> u16 {
        self as u16 + 1
    }
}

// ===== Record codec ========================================================

/// Append-only little-endian record writer.
#[derive(Debug)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Start a payload of `kind`.
    pub fn with_header(kind: u16) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(cast_slice(std::slice::from_ref(&WireHdr::new(kind))));
        Self { buf }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }
    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }
    pub fn put_usize(&mut self, v: usize) {
        self.buf.put_u64_le(v as u64);
    }
    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }
    /// Length-prefixed list of ids.
    pub fn put_ids(&mut self, ids: impl ExactSizeIterator<Item = usize>) {
        self.put_u32(ids.len() as u32);
        for id in ids {
            self.put_usize(id);
        }
    }

    /// Length-prefixed opaque bytes.
    pub fn put_blob(&mut self, blob: &[u8]) {
        self.put_u32(blob.len() as u32);
        self.buf.put_slice(blob);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked reader over a received payload.
#[derive(Debug)]
pub struct WireReader {
    buf: Bytes,
}

macro_rules! checked_get {
    ($name:ident, $ty:ty, $get:ident) => {
        pub fn $name(&mut self) -> Result<$ty, MeshShardError> {
            self.need(std::mem::size_of::<$ty>())?;
            Ok(self.buf.$get())
        }
    };
}

impl WireReader {
    /// Validate the header and return a reader positioned after it.
    pub fn open(payload: impl Into<Bytes>, expected_kind: u16) -> Result<Self, MeshShardError> {
        let mut buf: Bytes = payload.into();
        let hdr_len = std::mem::size_of::<WireHdr>();
        if buf.len() < hdr_len {
            return Err(MeshShardError::Wire(format!(
                "payload of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        let mut hdr = WireHdr::zeroed();
        cast_slice_mut(std::slice::from_mut(&mut hdr)).copy_from_slice(&buf[..hdr_len]);
        buf.advance(hdr_len);
        if hdr.version() != WIRE_VERSION {
            return Err(MeshShardError::WireVersion {
                expected: WIRE_VERSION,
                got: hdr.version(),
            });
        }
        if hdr.kind() != expected_kind {
            return Err(MeshShardError::Wire(format!(
                "expected payload kind {expected_kind}, got {}",
                hdr.kind()
            )));
        }
        Ok(Self { buf })
    }

    fn need(&self, n: usize) -> Result<(), MeshShardError> {
        if self.buf.remaining() < n {
            Err(MeshShardError::Wire(format!(
                "truncated record: need {n} bytes, {} left",
                self.buf.remaining()
            )))
        } else {
            Ok(())
        }
    }

    checked_get!(get_u8, u8, get_u8);
    checked_get!(get_u32, u32, get_u32_le);
    checked_get!(get_u64, u64, get_u64_le);
    checked_get!(get_f64, f64, get_f64_le);

    pub fn get_usize(&mut self) -> Result<usize, MeshShardError> {
        let v = self.get_u64()?;
        usize::try_from(v).map_err(|_| MeshShardError::Wire(format!("id {v} overflows usize")))
    }

    pub fn get_ids(&mut self) -> Result<Vec<usize>, MeshShardError> {
        let n = self.get_u32()? as usize;
        self.need(n * 8)?;
        (0..n).map(|_| self.get_usize()).collect()
    }

    pub fn get_blob(&mut self) -> Result<Bytes, MeshShardError> {
        let n = self.get_u32()? as usize;
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }
}
