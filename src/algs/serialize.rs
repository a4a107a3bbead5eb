//! Mesh serializer/deserializer for the distribution stream.
//!
//! The coordinator turns a [`Partition`] into a [`DistributionPlan`] (which
//! global entities every rank receives) and encodes one payload per
//! [`SectionKind`] and rank. Every record carries its own global ids, so a
//! worker can decode sections independently as long as vertices arrive before
//! anything that references them.
//!
//! Records, all little-endian:
//!
//! | section | record |
//! |---|---|
//! | vertex | `gid, x, y, z, extra, [holder ranks]` |
//! | volumeelements | `gid, type, material, [global vertex ids]` |
//! | facedescriptor | `surface, domain_in, domain_out, bc` |
//! | surfaceelementsgi | `gid, type, face descriptor, [global vertex ids], geominfo per vertex` |
//! | edgesegmentsgi | `gid, v0, v1, edge_nr, surface0, surface1, geominfo0, geominfo1` |
//! | endmesh | header only |

use crate::algs::communicator::{COORDINATOR, RankContext};
use crate::algs::partition::Partition;
use crate::algs::wire::{SectionKind, WireReader, WireWriter};
use crate::mesh_error::MeshShardError;
use crate::overlap::IndexMapTable;
use crate::overlap::perf::FastMap;
use crate::topology::cell_type::ElementType;
use crate::topology::entity::EntityKind;
use crate::topology::mesh::{
    BoundarySegment, FaceDescriptor, Mesh, MeshPoint, SurfaceElement, VolumeElement,
};
use crate::topology::shard::MeshShard;
use bytes::Bytes;
use fixedbitset as fb;

/// Global entities one rank receives, each list ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardPlan {
    pub rank: usize,
    pub elements: Vec<usize>,
    pub vertices: Vec<usize>,
    pub surface_elements: Vec<usize>,
    pub segments: Vec<usize>,
}

/// Per-rank plans plus, per global vertex, every rank receiving it.
#[derive(Clone, Debug, Default)]
pub struct DistributionPlan {
    pub shards: Vec<ShardPlan>,
    vertex_holders: Vec<Vec<usize>>,
}

impl DistributionPlan {
    /// Induce per-rank subsets from element ownership. Surface elements and
    /// segments go to every rank holding all of their vertices.
    pub fn build(mesh: &Mesh, partition: &Partition) -> Self {
        let n_parts = partition.n_parts;
        let mut shards: Vec<ShardPlan> = (1..=n_parts)
            .map(|rank| ShardPlan {
                rank,
                ..ShardPlan::default()
            })
            .collect();
        let mut has_vertex: Vec<fb::FixedBitSet> =
            vec![fb::FixedBitSet::with_capacity(mesh.points.len()); n_parts];

        for (e, owner) in partition.owner.iter().enumerate() {
            let Some(rank) = *owner else { continue };
            shards[rank - 1].elements.push(e);
            for &v in &mesh.volume_elements[e].vertices {
                has_vertex[rank - 1].insert(v);
            }
        }

        let mut vertex_holders = vec![Vec::new(); mesh.points.len()];
        for (slot, bits) in has_vertex.iter().enumerate() {
            shards[slot].vertices = bits.ones().collect();
            for v in bits.ones() {
                vertex_holders[v].push(slot + 1);
            }
        }

        let covering = |vertices: &[usize]| -> Vec<usize> {
            match vertices.split_first() {
                Some((first, rest)) => vertex_holders[*first]
                    .iter()
                    .copied()
                    .filter(|&r| rest.iter().all(|&v| has_vertex[r - 1].contains(v)))
                    .collect(),
                None => Vec::new(),
            }
        };
        let se_targets: Vec<Vec<usize>> = mesh
            .surface_elements
            .iter()
            .map(|se| covering(&se.vertices))
            .collect();
        let seg_targets: Vec<Vec<usize>> =
            mesh.segments.iter().map(|s| covering(&s.vertices)).collect();
        for (i, ranks) in se_targets.into_iter().enumerate() {
            for r in ranks {
                shards[r - 1].surface_elements.push(i);
            }
        }
        for (i, ranks) in seg_targets.into_iter().enumerate() {
            for r in ranks {
                shards[r - 1].segments.push(i);
            }
        }

        DistributionPlan {
            shards,
            vertex_holders,
        }
    }

    pub fn shard(&self, rank: usize) -> Option<&ShardPlan> {
        rank.checked_sub(1).and_then(|i| self.shards.get(i))
    }

    /// Ranks receiving global vertex `v`.
    pub fn holders(&self, v: usize) -> &[usize] {
        self.vertex_holders.get(v).map_or(&[], Vec::as_slice)
    }
}

// ===== records =============================================================

fn put_count(w: &mut WireWriter, n: usize) -> Result<(), MeshShardError> {
    let n = u32::try_from(n)
        .map_err(|_| MeshShardError::Wire(format!("{n} records exceed a u32 count")))?;
    w.put_u32(n);
    Ok(())
}

fn get_element_type(r: &mut WireReader) -> Result<ElementType, MeshShardError> {
    let code = r.get_u8()?;
    ElementType::from_code(code)
        .ok_or_else(|| MeshShardError::Wire(format!("unknown element type code {code}")))
}

/// A vertex as transmitted: global id, geometry and the ranks holding it.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexRecord {
    pub gid: usize,
    pub point: MeshPoint,
    pub holders: Vec<usize>,
}

impl VertexRecord {
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_usize(self.gid);
        for c in self.point.coords {
            w.put_f64(c);
        }
        w.put_f64(self.point.extra);
        w.put_ids(self.holders.iter().copied());
    }

    pub fn decode(r: &mut WireReader) -> Result<Self, MeshShardError> {
        let gid = r.get_usize()?;
        let coords = [r.get_f64()?, r.get_f64()?, r.get_f64()?];
        let extra = r.get_f64()?;
        let holders = r.get_ids()?;
        Ok(VertexRecord {
            gid,
            point: MeshPoint { coords, extra },
            holders,
        })
    }
}

/// A volume element as transmitted, vertices as global ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeRecord {
    pub gid: usize,
    pub kind: ElementType,
    pub material: u32,
    pub vertices: Vec<usize>,
}

impl VolumeRecord {
    pub fn encode(&self, w: &mut WireWriter) {
        w.put_usize(self.gid);
        w.put_u8(self.kind.code());
        w.put_u32(self.material);
        w.put_ids(self.vertices.iter().copied());
    }

    pub fn decode(r: &mut WireReader) -> Result<Self, MeshShardError> {
        Ok(VolumeRecord {
            gid: r.get_usize()?,
            kind: get_element_type(r)?,
            material: r.get_u32()?,
            vertices: r.get_ids()?,
        })
    }
}

// ===== serialize ===========================================================

/// Encode every section for `rank`, in stream order, ending with `endmesh`.
pub fn serialize_shard(
    mesh: &Mesh,
    plan: &DistributionPlan,
    rank: usize,
) -> Result<Vec<(SectionKind, Bytes)>, MeshShardError> {
    let shard = plan
        .shard(rank)
        .ok_or_else(|| MeshShardError::InvalidState(format!("no shard plan for rank {rank}")))?;
    let mut sections = Vec::with_capacity(SectionKind::ORDER.len());

    let mut w = WireWriter::with_header(SectionKind::Vertex.code());
    put_count(&mut w, shard.vertices.len())?;
    for &v in &shard.vertices {
        VertexRecord {
            gid: v,
            point: mesh.points[v],
            holders: plan.holders(v).iter().copied().filter(|&r| r != rank).collect(),
        }
        .encode(&mut w);
    }
    sections.push((SectionKind::Vertex, w.finish()));

    let mut w = WireWriter::with_header(SectionKind::VolumeElements.code());
    put_count(&mut w, shard.elements.len())?;
    for &e in &shard.elements {
        let el = &mesh.volume_elements[e];
        VolumeRecord {
            gid: e,
            kind: el.kind,
            material: el.material,
            vertices: el.vertices.clone(),
        }
        .encode(&mut w);
    }
    sections.push((SectionKind::VolumeElements, w.finish()));

    let mut w = WireWriter::with_header(SectionKind::FaceDescriptor.code());
    put_count(&mut w, mesh.face_descriptors.len())?;
    for fd in &mesh.face_descriptors {
        w.put_u32(fd.surface);
        w.put_u32(fd.domain_in);
        w.put_u32(fd.domain_out);
        w.put_u32(fd.bc);
    }
    sections.push((SectionKind::FaceDescriptor, w.finish()));

    let mut w = WireWriter::with_header(SectionKind::SurfaceElements.code());
    put_count(&mut w, shard.surface_elements.len())?;
    for &s in &shard.surface_elements {
        let se = &mesh.surface_elements[s];
        w.put_usize(s);
        w.put_u8(se.kind.code());
        w.put_u32(se.face_descriptor as u32);
        w.put_ids(se.vertices.iter().copied());
        for i in 0..se.vertices.len() {
            w.put_u32(se.geominfo.get(i).copied().unwrap_or(0));
        }
    }
    sections.push((SectionKind::SurfaceElements, w.finish()));

    let mut w = WireWriter::with_header(SectionKind::EdgeSegments.code());
    put_count(&mut w, shard.segments.len())?;
    for &s in &shard.segments {
        let seg = &mesh.segments[s];
        w.put_usize(s);
        w.put_usize(seg.vertices[0]);
        w.put_usize(seg.vertices[1]);
        w.put_u32(seg.edge_nr);
        w.put_u32(seg.surfaces[0]);
        w.put_u32(seg.surfaces[1]);
        w.put_u32(seg.geominfo[0]);
        w.put_u32(seg.geominfo[1]);
    }
    sections.push((SectionKind::EdgeSegments, w.finish()));

    sections.push((
        SectionKind::EndMesh,
        WireWriter::with_header(SectionKind::EndMesh.code()).finish(),
    ));
    Ok(sections)
}

// ===== deserialize =========================================================

/// Worker-side assembly of a shard from decoded sections.
#[derive(Debug)]
pub struct ShardBuilder {
    ctx: RankContext,
    mesh: Mesh,
    index: IndexMapTable,
    share_hints: Vec<Vec<usize>>,
    vertex_lookup: FastMap<usize, usize>,
}

impl ShardBuilder {
    pub fn new(ctx: RankContext) -> Self {
        ShardBuilder {
            ctx,
            mesh: Mesh::new(),
            index: IndexMapTable::new(),
            share_hints: Vec::new(),
            vertex_lookup: FastMap::default(),
        }
    }

    fn local_vertex(&self, global: usize) -> Result<usize, MeshShardError> {
        self.vertex_lookup
            .get(&global)
            .copied()
            .ok_or(MeshShardError::UnknownVertexReference {
                global: global as u64,
            })
    }

    fn local_vertices(&self, globals: &[usize]) -> Result<Vec<usize>, MeshShardError> {
        globals.iter().map(|&g| self.local_vertex(g)).collect()
    }

    /// Record origin link `remote[COORDINATOR] = gid` for a freshly appended entity.
    fn link_origin(&mut self, kind: EntityKind, local: usize, gid: usize) -> Result<(), MeshShardError> {
        self.index.resize(kind, local + 1);
        self.index.set_remote(kind, local, COORDINATOR, gid)
    }

    /// Decode one section payload into the shard under construction.
    pub fn consume(&mut self, kind: SectionKind, payload: Bytes) -> Result<(), MeshShardError> {
        let mut r = WireReader::open(payload, kind.code())?;
        match kind {
            SectionKind::Vertex => {
                let n = r.get_u32()? as usize;
                for _ in 0..n {
                    let rec = VertexRecord::decode(&mut r)?;
                    if self.vertex_lookup.contains_key(&rec.gid) {
                        continue;
                    }
                    let local = self.mesh.add_point(rec.point);
                    self.vertex_lookup.insert(rec.gid, local);
                    self.share_hints.push(
                        rec.holders
                            .into_iter()
                            .filter(|&h| h != self.ctx.self_rank)
                            .collect(),
                    );
                    self.link_origin(EntityKind::Vertex, local, rec.gid)?;
                }
            }
            SectionKind::VolumeElements => {
                let n = r.get_u32()? as usize;
                for _ in 0..n {
                    let rec = VolumeRecord::decode(&mut r)?;
                    let vertices = self.local_vertices(&rec.vertices)?;
                    let local = self
                        .mesh
                        .add_volume_element(VolumeElement::new(rec.kind, rec.material, vertices))?;
                    self.link_origin(EntityKind::VolumeElement, local, rec.gid)?;
                }
            }
            SectionKind::FaceDescriptor => {
                let n = r.get_u32()? as usize;
                for _ in 0..n {
                    self.mesh.add_face_descriptor(FaceDescriptor {
                        surface: r.get_u32()?,
                        domain_in: r.get_u32()?,
                        domain_out: r.get_u32()?,
                        bc: r.get_u32()?,
                    });
                }
            }
            SectionKind::SurfaceElements => {
                let n = r.get_u32()? as usize;
                for _ in 0..n {
                    let gid = r.get_usize()?;
                    let kind = get_element_type(&mut r)?;
                    let face_descriptor = r.get_u32()? as usize;
                    let globals = r.get_ids()?;
                    let geominfo = (0..globals.len())
                        .map(|_| r.get_u32())
                        .collect::<Result<Vec<_>, _>>()?;
                    let vertices = self.local_vertices(&globals)?;
                    let local = self.mesh.add_surface_element(SurfaceElement {
                        kind,
                        face_descriptor,
                        vertices,
                        geominfo,
                    })?;
                    self.link_origin(EntityKind::SurfaceElement, local, gid)?;
                }
            }
            SectionKind::EdgeSegments => {
                let n = r.get_u32()? as usize;
                for _ in 0..n {
                    let gid = r.get_usize()?;
                    let v0 = self.local_vertex(r.get_usize()?)?;
                    let v1 = self.local_vertex(r.get_usize()?)?;
                    let seg = BoundarySegment {
                        vertices: [v0, v1],
                        edge_nr: r.get_u32()?,
                        surfaces: [r.get_u32()?, r.get_u32()?],
                        geominfo: [r.get_u32()?, r.get_u32()?],
                    };
                    let local = self.mesh.add_segment(seg)?;
                    self.link_origin(EntityKind::BoundarySegment, local, gid)?;
                }
            }
            SectionKind::EndMesh => {}
        }
        if !r.is_empty() {
            return Err(MeshShardError::Wire(format!(
                "trailing bytes after {} section",
                kind.as_tag()
            )));
        }
        log::trace!("rank {}: consumed {} section", self.ctx.self_rank, kind.as_tag());
        Ok(())
    }

    pub fn n_points(&self) -> usize {
        self.mesh.points.len()
    }

    /// Derive topology and size every table.
    pub fn finish(self) -> MeshShard {
        MeshShard::new(self.ctx, self.mesh, self.index, self.share_hints)
    }
}
