use crate::world::block::{id, BlockId};
use crate::world::chunk_dim::{BLOCKS_PER_CHUNK, CX, CY, CZ};
use glam::IVec2;
use std::io;

/// Serialized chunk bodies start with these four bytes: identifier + version.
pub const CHUNK_MAGIC: [u8; 4] = *b"CHK\x01";
const HEADER_LEN: usize = CHUNK_MAGIC.len() + 8;

#[inline]
pub fn block_index(x: usize, y: usize, z: usize) -> usize {
    x + z * CX + y * CX * CZ
}

/// A 16x256x16 column of block ids, the unit of generation, storage and
/// meshing.
///
/// Out-of-range reads come back as air and out-of-range writes are dropped,
/// so callers never bounds-check themselves. `dirty` tracks "modified since
/// last save"; `mesh_version` bumps whenever the visible contents change so
/// mesh caches can compare stamps instead of block data.
#[derive(Clone)]
pub struct ChunkData {
    coord: IVec2,
    blocks: Vec<BlockId>,
    generated: bool,
    dirty: bool,
    loaded: bool,
    mesh_version: u64,
}

impl ChunkData {
    /// Fresh air-filled chunk. Not generated, not dirty.
    pub fn new(coord: IVec2) -> Self {
        Self {
            coord,
            blocks: vec![id::AIR; BLOCKS_PER_CHUNK],
            generated: false,
            dirty: false,
            loaded: true,
            mesh_version: 0,
        }
    }

    #[inline]
    pub fn coord(&self) -> IVec2 {
        self.coord
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        if x < 0 || x >= CX as i32 || y < 0 || y >= CY as i32 || z < 0 || z >= CZ as i32 {
            return id::AIR;
        }
        self.blocks[block_index(x as usize, y as usize, z as usize)]
    }

    /// Writes a block. Ignored out of bounds; dirty and the mesh stamp only
    /// move when the id actually changes.
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockId) {
        if x < 0 || x >= CX as i32 || y < 0 || y >= CY as i32 || z < 0 || z >= CZ as i32 {
            return;
        }
        let idx = block_index(x as usize, y as usize, z as usize);
        if self.blocks[idx] != block {
            self.blocks[idx] = block;
            self.dirty = true;
            self.mesh_version += 1;
        }
    }

    pub fn fill(&mut self, block: BlockId) {
        self.blocks.fill(block);
        self.dirty = true;
        self.mesh_version += 1;
    }

    /// Y of the topmost non-air block in a column, 0 when the column is all
    /// air or out of range.
    pub fn highest_non_air(&self, x: i32, z: i32) -> i32 {
        if x < 0 || x >= CX as i32 || z < 0 || z >= CZ as i32 {
            return 0;
        }
        for y in (0..CY as i32).rev() {
            if self.get(x, y, z) != id::AIR {
                return y;
            }
        }
        0
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    pub fn set_generated(&mut self, generated: bool) {
        self.generated = generated;
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Forces a mesh rebuild without a block change, e.g. when a neighbor's
    /// edge column changed.
    pub fn invalidate_mesh(&mut self) {
        self.mesh_version += 1;
    }

    /// `CHK\x01`, two little-endian i32 coordinates, then one byte per block
    /// in `x + z*16 + y*256` order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + BLOCKS_PER_CHUNK);
        data.extend_from_slice(&CHUNK_MAGIC);
        data.extend_from_slice(&self.coord.x.to_le_bytes());
        data.extend_from_slice(&self.coord.y.to_le_bytes());
        data.extend_from_slice(&self.blocks);
        data
    }

    /// Restores block data from serialized bytes. The stored coordinate must
    /// match this grid's; any mismatch or short buffer fails and leaves the
    /// grid untouched.
    pub fn deserialize(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() < HEADER_LEN + BLOCKS_PER_CHUNK {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated chunk body"));
        }
        if data[..CHUNK_MAGIC.len()] != CHUNK_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad chunk identifier"));
        }
        let x = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let z = i32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        if x != self.coord.x || z != self.coord.y {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk body for ({x}, {z}) loaded into ({}, {})", self.coord.x, self.coord.y),
            ));
        }

        self.blocks.copy_from_slice(&data[HEADER_LEN..HEADER_LEN + BLOCKS_PER_CHUNK]);
        self.generated = true;
        self.dirty = false;
        self.mesh_version += 1;
        Ok(())
    }
}
