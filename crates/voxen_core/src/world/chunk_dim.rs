use glam::IVec2;

pub const CX: usize = 16;
pub const CY: usize = 256;
pub const CZ: usize = 16;
pub const BLOCKS_PER_CHUNK: usize = CX * CY * CZ;

/// Chunks per region file edge. One region owns REGION_CHUNKS² slots.
pub const REGION_CHUNKS: i32 = 32;
pub const REGION_SLOTS: usize = (REGION_CHUNKS * REGION_CHUNKS) as usize;

pub const SEA_LEVEL: i32 = 64;

#[inline]
pub fn world_to_chunk_xz(x: i32, z: i32) -> (IVec2, (usize, usize)) {
    let cx = x.div_euclid(CX as i32);
    let cz = z.div_euclid(CZ as i32);
    let lx = x.rem_euclid(CX as i32) as usize;
    let lz = z.rem_euclid(CZ as i32) as usize;
    (IVec2::new(cx, cz), (lx, lz))
}

/// World-space origin (min corner) of a chunk.
#[inline]
pub fn chunk_origin(coord: IVec2) -> (i32, i32) {
    (coord.x * CX as i32, coord.y * CZ as i32)
}

#[inline]
pub fn chunk_to_region(coord: IVec2) -> IVec2 {
    IVec2::new(
        coord.x.div_euclid(REGION_CHUNKS),
        coord.y.div_euclid(REGION_CHUNKS),
    )
}

/// Region coordinate plus the slot index of the chunk inside it.
#[inline]
pub fn chunk_to_region_slot(coord: IVec2) -> (IVec2, usize) {
    let region = chunk_to_region(coord);
    let lx = coord.x.rem_euclid(REGION_CHUNKS) as usize;
    let lz = coord.y.rem_euclid(REGION_CHUNKS) as usize;
    (region, lz * REGION_CHUNKS as usize + lx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_chunk_handles_negatives() {
        let (c, (lx, lz)) = world_to_chunk_xz(-1, -1);
        assert_eq!(c, IVec2::new(-1, -1));
        assert_eq!((lx, lz), (15, 15));

        let (c, (lx, lz)) = world_to_chunk_xz(16, 0);
        assert_eq!(c, IVec2::new(1, 0));
        assert_eq!((lx, lz), (0, 0));
    }

    #[test]
    fn region_slot_wraps_negatives() {
        let (r, idx) = chunk_to_region_slot(IVec2::new(-1, -1));
        assert_eq!(r, IVec2::new(-1, -1));
        assert_eq!(idx, 31 * 32 + 31);

        let (r, idx) = chunk_to_region_slot(IVec2::new(33, 2));
        assert_eq!(r, IVec2::new(1, 0));
        assert_eq!(idx, 2 * 32 + 1);
    }
}
