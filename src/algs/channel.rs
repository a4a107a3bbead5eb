//! Framed messages over a [`Communicator`]: a `WireCount` length header followed
//! by the body, both on the same tag. Per-channel FIFO delivery keeps the pair
//! together.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshShardError;

/// Send one framed message and wait for both parts to complete.
pub fn send_message<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    body: &[u8],
) -> Result<(), MeshShardError> {
    let count = WireCount::try_new(body.len())?;
    let header = comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&count)));
    let payload = comm.isend(peer, tag.as_u16(), body);
    // the header buffer must outlive both sends
    for handle in [header, payload] {
        if let Some(echo) = handle.wait() {
            return Err(MeshShardError::transport(
                peer,
                format!("send completion returned {} bytes of data", echo.len()),
            ));
        }
    }
    Ok(())
}

/// Receive one framed message from `peer`.
pub fn recv_message<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
) -> Result<Vec<u8>, MeshShardError> {
    let mut count = WireCount::new(0);
    let data = comm
        .irecv(
            peer,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut count)),
        )
        .wait()
        .ok_or_else(|| MeshShardError::transport(peer, "no size header received"))?;
    if data.len() != std::mem::size_of::<WireCount>() {
        return Err(MeshShardError::transport(
            peer,
            format!(
                "expected {} bytes for size header, got {}",
                std::mem::size_of::<WireCount>(),
                data.len()
            ),
        ));
    }
    cast_slice_mut(std::slice::from_mut(&mut count)).copy_from_slice(&data);
    let len = count.get();

    let mut body = vec![0u8; len];
    let data = comm
        .irecv(peer, tag.as_u16(), &mut body)
        .wait()
        .ok_or_else(|| MeshShardError::transport(peer, "no payload received"))?;
    if data.len() != len {
        return Err(MeshShardError::transport(
            peer,
            format!("expected {len} payload bytes, got {}", data.len()),
        ));
    }
    Ok(data)
}
