//! METIS k-way partitioning of a CSR adjacency graph.

use crate::algs::dual_graph::AdjacencyGraph;
use crate::partitioning::{GraphPartitioner, PartitionError, PartitionId};
use metis_sys::{METIS_PartGraphKway, idx_t};

const METIS_OK: i32 = 1;

/// `GraphPartitioner` backed by `METIS_PartGraphKway` with default options.
#[derive(Copy, Clone, Debug, Default)]
pub struct MetisPartitioner;

fn to_idx(v: usize) -> Result<idx_t, PartitionError> {
    idx_t::try_from(v).map_err(|_| PartitionError::Other(format!("{v} does not fit in idx_t")))
}

impl GraphPartitioner for MetisPartitioner {
    fn partition_graph(
        &self,
        graph: &AdjacencyGraph,
        n_parts: usize,
    ) -> Result<Vec<PartitionId>, PartitionError> {
        if n_parts == 0 {
            return Err(PartitionError::InvalidPartCount(n_parts));
        }
        let n = graph.n_vertices();
        if n == 0 {
            return Ok(Vec::new());
        }
        // METIS rejects nparts == 1 on some builds
        if n_parts == 1 {
            return Ok(vec![0; n]);
        }

        let mut nvtxs = to_idx(n)?;
        let mut ncon: idx_t = 1;
        let mut nparts = to_idx(n_parts)?;
        let mut xadj = graph.xadj.iter().map(|&u| to_idx(u)).collect::<Result<Vec<_>, _>>()?;
        let mut adjncy = graph
            .adjncy
            .iter()
            .map(|&v| to_idx(v))
            .collect::<Result<Vec<_>, _>>()?;
        let mut vwgt: Vec<idx_t> = graph.vwgt.iter().map(|&w| w as idx_t).collect();
        let mut part: Vec<idx_t> = vec![0; n];
        let mut objval: idx_t = 0;

        // SAFETY: every pointer refers to a live, correctly sized buffer for the
        // duration of the call; null pointers select METIS defaults.
        let ret = unsafe {
            METIS_PartGraphKway(
                &mut nvtxs,
                &mut ncon,
                xadj.as_mut_ptr(),
                adjncy.as_mut_ptr(),
                vwgt.as_mut_ptr(),
                std::ptr::null_mut(), // vsize
                std::ptr::null_mut(), // adjwgt
                &mut nparts,
                std::ptr::null_mut(), // tpwgts
                std::ptr::null_mut(), // ubvec
                std::ptr::null_mut(), // options
                &mut objval,
                part.as_mut_ptr(),
            )
        };
        if ret != METIS_OK {
            return Err(PartitionError::Other(format!("METIS_PartGraphKway returned {ret}")));
        }
        log::debug!("METIS k-way: {n} vertices, {n_parts} parts, edge cut {objval}");
        part.into_iter()
            .map(|p| {
                usize::try_from(p)
                    .map_err(|_| PartitionError::Other(format!("METIS returned part {p}")))
            })
            .collect()
    }
}
