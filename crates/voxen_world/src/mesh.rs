use glam::{IVec2, Vec2, Vec3};
use std::collections::HashMap;
use std::sync::Arc;
use voxen_core::world::block::{id, BlockId, Face};
use voxen_core::world::catalog::BlockCatalog;
use voxen_core::world::chunk::ChunkData;
use voxen_core::world::chunk_dim::{chunk_origin, CX, CY, CZ};

/// Opaque handle handed back by the renderer's texture supply.
pub type TextureHandle = u32;

/// Texture supply the mesher consults while building quads. Implemented at
/// the renderer boundary; a key the renderer does not know resolves to None
/// and the quad ships without a handle.
pub trait TextureLookup: Send + Sync {
    fn lookup_texture(&self, key: &str) -> Option<TextureHandle>;
}

/// Planar neighbors of a chunk, borrowed under the manager lock for the
/// duration of one meshing call.
#[derive(Clone, Copy, Default)]
pub struct Neighbors<'a> {
    /// z - 1
    pub north: Option<&'a ChunkData>,
    /// z + 1
    pub south: Option<&'a ChunkData>,
    /// x + 1
    pub east: Option<&'a ChunkData>,
    /// x - 1
    pub west: Option<&'a ChunkData>,
}

/// One merged rectangle of identical exposed faces.
///
/// `size` spans the two in-plane axes: (x, z) for top/bottom faces,
/// (horizontal, height) for side faces. The bound texture tiles over
/// `(0,0)..(size.x, size.y)` so merged quads never stretch.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadMesh {
    pub center: Vec3,
    pub size: Vec2,
    pub block: BlockId,
    pub face: Face,
    pub texture: Option<TextureHandle>,
}

impl QuadMesh {
    /// Corner positions, counter-clockwise seen from outside the block:
    /// `cross(c1 - c0, c2 - c0)` points along the face normal.
    pub fn corners(&self) -> [Vec3; 4] {
        let c = self.center;
        match self.face {
            Face::Top => {
                let (hx, hz) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x - hx, c.y + 0.5, c.z + hz),
                    Vec3::new(c.x + hx, c.y + 0.5, c.z + hz),
                    Vec3::new(c.x + hx, c.y + 0.5, c.z - hz),
                    Vec3::new(c.x - hx, c.y + 0.5, c.z - hz),
                ]
            }
            Face::Bottom => {
                let (hx, hz) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x - hx, c.y - 0.5, c.z - hz),
                    Vec3::new(c.x + hx, c.y - 0.5, c.z - hz),
                    Vec3::new(c.x + hx, c.y - 0.5, c.z + hz),
                    Vec3::new(c.x - hx, c.y - 0.5, c.z + hz),
                ]
            }
            Face::North => {
                let (hx, hy) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x - hx, c.y - hy, c.z - 0.5),
                    Vec3::new(c.x - hx, c.y + hy, c.z - 0.5),
                    Vec3::new(c.x + hx, c.y + hy, c.z - 0.5),
                    Vec3::new(c.x + hx, c.y - hy, c.z - 0.5),
                ]
            }
            Face::South => {
                let (hx, hy) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x + hx, c.y - hy, c.z + 0.5),
                    Vec3::new(c.x + hx, c.y + hy, c.z + 0.5),
                    Vec3::new(c.x - hx, c.y + hy, c.z + 0.5),
                    Vec3::new(c.x - hx, c.y - hy, c.z + 0.5),
                ]
            }
            Face::East => {
                let (hz, hy) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x + 0.5, c.y - hy, c.z - hz),
                    Vec3::new(c.x + 0.5, c.y + hy, c.z - hz),
                    Vec3::new(c.x + 0.5, c.y + hy, c.z + hz),
                    Vec3::new(c.x + 0.5, c.y - hy, c.z + hz),
                ]
            }
            Face::West => {
                let (hz, hy) = (self.size.x * 0.5, self.size.y * 0.5);
                [
                    Vec3::new(c.x - 0.5, c.y - hy, c.z + hz),
                    Vec3::new(c.x - 0.5, c.y + hy, c.z + hz),
                    Vec3::new(c.x - 0.5, c.y + hy, c.z - hz),
                    Vec3::new(c.x - 0.5, c.y - hy, c.z - hz),
                ]
            }
        }
    }

    /// UV per corner, tiling `size` times so the texture reads upright from
    /// outside and never stretches.
    pub fn uvs(&self) -> [Vec2; 4] {
        let (u, v) = (self.size.x, self.size.y);
        match self.face {
            Face::Top => [
                Vec2::new(0.0, v),
                Vec2::new(u, v),
                Vec2::new(u, 0.0),
                Vec2::new(0.0, 0.0),
            ],
            Face::Bottom => [
                Vec2::new(0.0, 0.0),
                Vec2::new(u, 0.0),
                Vec2::new(u, v),
                Vec2::new(0.0, v),
            ],
            // sides: first corner is the bottom of the strip
            Face::North | Face::East => [
                Vec2::new(u, v),
                Vec2::new(u, 0.0),
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, v),
            ],
            Face::South | Face::West => [
                Vec2::new(0.0, v),
                Vec2::new(0.0, 0.0),
                Vec2::new(u, 0.0),
                Vec2::new(u, v),
            ],
        }
    }
}

/// Whether the face of the cell at (x, y, z) is exposed, consulting the
/// planar neighbor across chunk boundaries. Air cells have no faces; a
/// missing neighbor always renders so chunk edges never drop geometry.
pub fn face_visible(
    chunk: &ChunkData,
    neighbors: Neighbors<'_>,
    x: i32,
    y: i32,
    z: i32,
    face: Face,
) -> bool {
    let block = chunk.get(x, y, z);
    if block == id::AIR {
        return false;
    }
    let n = face.normal();
    let (ax, ay, az) = (x + n.x, y + n.y, z + n.z);

    if ay >= CY as i32 {
        return true;
    }
    if ay < 0 {
        return false;
    }
    if ax >= 0 && ax < CX as i32 && az >= 0 && az < CZ as i32 {
        let adjacent = chunk.get(ax, ay, az);
        return adjacent == id::AIR || adjacent != block;
    }

    // mirrored cell on the planar neighbor
    let (neighbor, nx, nz) = match face {
        Face::North => (neighbors.north, ax, CZ as i32 - 1),
        Face::South => (neighbors.south, ax, 0),
        Face::East => (neighbors.east, 0, az),
        Face::West => (neighbors.west, CX as i32 - 1, az),
        Face::Top | Face::Bottom => (None, ax, az),
    };
    match neighbor {
        Some(other) => {
            let adjacent = other.get(nx, ay, nz);
            adjacent == id::AIR || adjacent != block
        }
        None => true,
    }
}

/// Greedy mesher: merges co-planar identical faces into fewer, larger quads.
///
/// Top and bottom faces merge as rectangles over the (x, z) plane; side
/// faces are emitted for the four boundary slices as one-tall strips merged
/// along the in-plane horizontal only.
pub struct Mesher {
    catalog: Arc<BlockCatalog>,
    textures: Option<Arc<dyn TextureLookup>>,
}

impl Mesher {
    pub fn new(catalog: Arc<BlockCatalog>) -> Self {
        Self { catalog, textures: None }
    }

    pub fn with_textures(catalog: Arc<BlockCatalog>, textures: Arc<dyn TextureLookup>) -> Self {
        Self { catalog, textures: Some(textures) }
    }

    pub fn mesh_chunk(&self, chunk: &ChunkData, neighbors: Neighbors<'_>) -> Vec<QuadMesh> {
        let mut quads = Vec::new();
        for face in Face::ALL {
            match face {
                Face::Top | Face::Bottom => self.mesh_plane(chunk, neighbors, face, &mut quads),
                _ => self.mesh_side(chunk, neighbors, face, &mut quads),
            }
        }
        quads
    }

    fn emit(&self, quads: &mut Vec<QuadMesh>, center: Vec3, size: Vec2, block: BlockId, face: Face) {
        let texture = self
            .textures
            .as_deref()
            .and_then(|t| t.lookup_texture(self.catalog.texture_key(block, face)));
        quads.push(QuadMesh { center, size, block, face, texture });
    }

    fn mesh_plane(
        &self,
        chunk: &ChunkData,
        neighbors: Neighbors<'_>,
        face: Face,
        quads: &mut Vec<QuadMesh>,
    ) {
        let (ox, oz) = chunk_origin(chunk.coord());

        // highest renderable face for TOP, lowest for BOTTOM
        let face_y = |x: i32, z: i32| -> Option<i32> {
            if face == Face::Top {
                (0..CY as i32).rev().find(|&y| face_visible(chunk, neighbors, x, y, z, face))
            } else {
                (0..CY as i32).find(|&y| face_visible(chunk, neighbors, x, y, z, face))
            }
        };

        let mut processed = [[false; CZ]; CX];
        for x in 0..CX {
            for z in 0..CZ {
                if processed[x][z] {
                    continue;
                }
                let Some(y) = face_y(x as i32, z as i32) else {
                    processed[x][z] = true;
                    continue;
                };
                let block = chunk.get(x as i32, y, z as i32);

                let mut width = 1;
                while x + width < CX
                    && !processed[x + width][z]
                    && face_y((x + width) as i32, z as i32) == Some(y)
                    && chunk.get((x + width) as i32, y, z as i32) == block
                {
                    width += 1;
                }

                let mut depth = 1;
                'grow: while z + depth < CZ {
                    for cx in x..x + width {
                        if processed[cx][z + depth]
                            || face_y(cx as i32, (z + depth) as i32) != Some(y)
                            || chunk.get(cx as i32, y, (z + depth) as i32) != block
                        {
                            break 'grow;
                        }
                    }
                    depth += 1;
                }

                for px in x..x + width {
                    for pz in z..z + depth {
                        processed[px][pz] = true;
                    }
                }

                let center = Vec3::new(
                    ox as f32 + x as f32 + width as f32 * 0.5 - 0.5,
                    y as f32,
                    oz as f32 + z as f32 + depth as f32 * 0.5 - 0.5,
                );
                self.emit(quads, center, Vec2::new(width as f32, depth as f32), block, face);
            }
        }
    }

    fn mesh_side(
        &self,
        chunk: &ChunkData,
        neighbors: Neighbors<'_>,
        face: Face,
        quads: &mut Vec<QuadMesh>,
    ) {
        let (ox, oz) = chunk_origin(chunk.coord());

        // (u, v) = (in-plane horizontal, height) over the boundary slice
        let cell = |u: usize, v: usize| -> (i32, i32, i32) {
            match face {
                Face::North => (u as i32, v as i32, 0),
                Face::South => (u as i32, v as i32, CZ as i32 - 1),
                Face::East => (CX as i32 - 1, v as i32, u as i32),
                Face::West => (0, v as i32, u as i32),
                Face::Top | Face::Bottom => unreachable!("planar faces use mesh_plane"),
            }
        };
        let slice_len = match face {
            Face::North | Face::South => CX,
            _ => CZ,
        };

        let mut processed = vec![[false; CY]; slice_len];
        for u in 0..slice_len {
            for v in 0..CY {
                if processed[u][v] {
                    continue;
                }
                let (x, y, z) = cell(u, v);
                if !face_visible(chunk, neighbors, x, y, z, face) {
                    processed[u][v] = true;
                    continue;
                }
                let block = chunk.get(x, y, z);

                let mut width = 1;
                while u + width < slice_len && !processed[u + width][v] {
                    let (tx, ty, tz) = cell(u + width, v);
                    if chunk.get(tx, ty, tz) != block
                        || !face_visible(chunk, neighbors, tx, ty, tz, face)
                    {
                        break;
                    }
                    width += 1;
                }

                for pu in u..u + width {
                    processed[pu][v] = true;
                }

                let center = match face {
                    Face::North | Face::South => Vec3::new(
                        ox as f32 + x as f32 + width as f32 * 0.5 - 0.5,
                        y as f32,
                        oz as f32 + z as f32,
                    ),
                    _ => Vec3::new(
                        ox as f32 + x as f32,
                        y as f32,
                        oz as f32 + z as f32 + width as f32 * 0.5 - 0.5,
                    ),
                };
                self.emit(quads, center, Vec2::new(width as f32, 1.0), block, face);
            }
        }
    }
}

/// Per-chunk quad cache at the renderer boundary, keyed by coordinate and
/// stamped with the chunk's mesh version. The manager bumps that version for
/// a chunk and its affected neighbors on every relevant mutation, so a stale
/// stamp is the only rebuild signal needed.
#[derive(Default)]
pub struct MeshCache {
    entries: HashMap<IVec2, CachedMesh>,
}

struct CachedMesh {
    stamp: u64,
    quads: Vec<QuadMesh>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached quads for the chunk, rebuilt when the stamp moved.
    pub fn quads(
        &mut self,
        mesher: &Mesher,
        chunk: &ChunkData,
        neighbors: Neighbors<'_>,
    ) -> &[QuadMesh] {
        let stamp = chunk.mesh_version();
        let coord = chunk.coord();
        let stale = self.entries.get(&coord).map(|e| e.stamp != stamp).unwrap_or(true);
        if stale {
            let quads = mesher.mesh_chunk(chunk, neighbors);
            self.entries.insert(coord, CachedMesh { stamp, quads });
        }
        self.entries.get(&coord).map(|e| e.quads.as_slice()).unwrap_or(&[])
    }

    pub fn invalidate(&mut self, coord: IVec2) {
        self.entries.remove(&coord);
    }

    /// Drops cached meshes outside a Chebyshev radius of the center.
    pub fn retain_near(&mut self, center: IVec2, distance: i32) {
        self.entries.retain(|coord, _| {
            (coord.x - center.x).abs().max((coord.y - center.y).abs()) <= distance
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Arc<BlockCatalog> {
        let dir = std::env::temp_dir().join(format!("voxen-mesh-cat-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("blocks.json"),
            r#"{ "blocks": [
                { "id": 1, "name": "grass", "textures": { "top": "grass_top", "side": "grass_side" } },
                { "id": 3, "name": "stone" },
                { "id": 15, "name": "glass", "transparent": true }
            ] }"#,
        )
        .unwrap();
        Arc::new(BlockCatalog::load_from(&dir).unwrap())
    }

    fn grass_slab(y: i32) -> ChunkData {
        let mut c = ChunkData::new(IVec2::new(0, 0));
        for x in 0..CX as i32 {
            for z in 0..CZ as i32 {
                c.set(x, y, z, id::GRASS);
            }
        }
        c
    }

    fn full_chunk(coord: IVec2, block: BlockId) -> ChunkData {
        let mut c = ChunkData::new(coord);
        c.fill(block);
        c
    }

    #[test]
    fn uniform_top_layer_merges_into_one_quad() {
        let mesher = Mesher::new(catalog());
        let chunk = grass_slab(64);
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());

        let tops: Vec<_> = quads.iter().filter(|q| q.face == Face::Top).collect();
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].size, Vec2::new(16.0, 16.0));
        assert_eq!(tops[0].block, id::GRASS);
        assert_eq!(tops[0].center, Vec3::new(7.5, 64.0, 7.5));
    }

    #[test]
    fn meshing_is_idempotent() {
        let mesher = Mesher::new(catalog());
        let mut chunk = grass_slab(64);
        chunk.set(4, 65, 4, id::STONE);
        chunk.set(9, 64, 9, id::STONE);

        let a = mesher.mesh_chunk(&chunk, Neighbors::default());
        let b = mesher.mesh_chunk(&chunk, Neighbors::default());
        assert_eq!(a, b);
    }

    #[test]
    fn bottom_faces_never_render_at_world_floor() {
        let mesher = Mesher::new(catalog());
        let mut chunk = ChunkData::new(IVec2::new(0, 0));
        for x in 0..CX as i32 {
            for z in 0..CZ as i32 {
                for y in 0..4 {
                    chunk.set(x, y, z, id::STONE);
                }
            }
        }
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());
        assert!(quads.iter().all(|q| q.face != Face::Bottom));
    }

    #[test]
    fn absent_neighbor_renders_edges_present_neighbor_occludes() {
        let mesher = Mesher::new(catalog());
        let chunk = full_chunk(IVec2::new(0, 0), id::STONE);

        let alone = mesher.mesh_chunk(&chunk, Neighbors::default());
        assert!(alone.iter().any(|q| q.face == Face::East));

        let east = full_chunk(IVec2::new(1, 0), id::STONE);
        let meshed = mesher.mesh_chunk(&chunk, Neighbors { east: Some(&east), ..Default::default() });
        assert!(meshed.iter().all(|q| q.face != Face::East));
        assert!(meshed.iter().any(|q| q.face == Face::West), "west edge has no neighbor");
    }

    #[test]
    fn differing_neighbor_id_keeps_the_face() {
        let mesher = Mesher::new(catalog());
        let chunk = full_chunk(IVec2::new(0, 0), id::STONE);
        let east = full_chunk(IVec2::new(1, 0), id::GLASS);
        let quads = mesher.mesh_chunk(&chunk, Neighbors { east: Some(&east), ..Default::default() });
        assert!(quads.iter().any(|q| q.face == Face::East));
    }

    #[test]
    fn side_strips_merge_horizontally_only() {
        let mesher = Mesher::new(catalog());
        let mut chunk = ChunkData::new(IVec2::new(0, 0));
        // 4 wide, 2 tall wall on the north boundary
        for x in 2..6 {
            for y in 10..12 {
                chunk.set(x, y, 0, id::STONE);
            }
        }
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());
        let north: Vec<_> = quads.iter().filter(|q| q.face == Face::North).collect();
        assert_eq!(north.len(), 2, "one strip per row, no vertical merge");
        for q in north {
            assert_eq!(q.size, Vec2::new(4.0, 1.0));
        }
    }

    #[test]
    fn quads_are_sound() {
        let mesher = Mesher::new(catalog());
        let mut chunk = grass_slab(60);
        chunk.set(3, 61, 3, id::STONE);
        chunk.set(3, 62, 3, id::STONE);
        chunk.set(8, 61, 12, id::GRASS);
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());

        for q in &quads {
            // anchor cell of the merged rectangle
            let (x, y, z) = match q.face {
                Face::Top | Face::Bottom => (
                    (q.center.x - q.size.x * 0.5 + 0.5) as i32,
                    q.center.y as i32,
                    (q.center.z - q.size.y * 0.5 + 0.5) as i32,
                ),
                Face::North | Face::South => (
                    (q.center.x - q.size.x * 0.5 + 0.5) as i32,
                    q.center.y as i32,
                    q.center.z as i32,
                ),
                Face::East | Face::West => (
                    q.center.x as i32,
                    q.center.y as i32,
                    (q.center.z - q.size.x * 0.5 + 0.5) as i32,
                ),
            };
            assert_eq!(chunk.get(x, y, z), q.block, "{q:?}");
            assert!(face_visible(&chunk, Neighbors::default(), x, y, z, q.face), "{q:?}");
        }
    }

    #[test]
    fn uv_bounds_tile_with_quad_size() {
        let mesher = Mesher::new(catalog());
        let chunk = grass_slab(64);
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());
        let top = quads.iter().find(|q| q.face == Face::Top).unwrap();

        let uvs = top.uvs();
        let max_u = uvs.iter().map(|uv| uv.x).fold(0.0f32, f32::max);
        let max_v = uvs.iter().map(|uv| uv.y).fold(0.0f32, f32::max);
        assert_eq!((max_u, max_v), (16.0, 16.0));
        assert!(uvs.iter().any(|uv| *uv == Vec2::ZERO));

        let corners = top.corners();
        assert!(corners.iter().all(|p| p.y == 64.5));
    }

    #[test]
    fn winding_is_counter_clockwise_from_outside() {
        let mesher = Mesher::new(catalog());
        // a floating slab exposes all six face directions
        let chunk = grass_slab(64);
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());

        let mut seen = std::collections::HashSet::new();
        for q in &quads {
            let c = q.corners();
            let cross = (c[1] - c[0]).cross(c[2] - c[0]);
            let normal = q.face.normal().as_vec3();
            assert!(
                cross.normalize().dot(normal) > 0.99,
                "{:?} face winds the wrong way (cross {cross:?})",
                q.face
            );
            seen.insert(q.face);
        }
        assert_eq!(seen.len(), 6, "slab mesh should carry every face direction");
    }

    struct FixedLookup;
    impl TextureLookup for FixedLookup {
        fn lookup_texture(&self, key: &str) -> Option<TextureHandle> {
            (key == "grass_top").then_some(7)
        }
    }

    #[test]
    fn texture_handles_resolve_through_the_lookup() {
        let mesher = Mesher::with_textures(catalog(), Arc::new(FixedLookup));
        let chunk = grass_slab(64);
        let quads = mesher.mesh_chunk(&chunk, Neighbors::default());

        let top = quads.iter().find(|q| q.face == Face::Top).unwrap();
        assert_eq!(top.texture, Some(7));
        let north = quads.iter().find(|q| q.face == Face::North).unwrap();
        assert_eq!(north.texture, None, "grass_side is unknown to the lookup");
    }

    #[test]
    fn cache_rebuilds_only_on_version_change() {
        let mesher = Mesher::new(catalog());
        let mut cache = MeshCache::new();
        let mut chunk = grass_slab(64);

        let count = cache.quads(&mesher, &chunk, Neighbors::default()).len();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.quads(&mesher, &chunk, Neighbors::default()).len(), count);

        chunk.set(0, 65, 0, id::STONE);
        let after = cache.quads(&mesher, &chunk, Neighbors::default()).len();
        assert!(after > count);

        cache.retain_near(IVec2::new(100, 100), 2);
        assert!(cache.is_empty());
    }
}
