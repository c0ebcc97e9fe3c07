use crate::gen::{column_rand_u32, TerrainGenerator};
use voxen_core::world::biome::Biome;
use voxen_core::world::block::id;
use voxen_core::world::chunk::ChunkData;
use voxen_core::world::chunk_dim::{chunk_origin, CX, CY, CZ};

const SALT_TREES: u32 = 0x7EE5_0001;

/// Secondary cave field is sampled with a stretched y axis and a softer
/// threshold; a tunnel needs both fields to agree.
const CAVE_B_Y_STRETCH: f32 = 3.0;
const CAVE_B_THRESHOLD_SCALE: f32 = 0.8;

/// Trees sit on a coarse sub-grid so trunks never crowd each other.
const TREE_GRID: usize = 4;
const TREE_MARGIN: usize = 2;

/* =========================
   Tiny deterministic RNG
   ========================= */

struct Rng(u64);

impl Rng {
    #[inline]
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    #[inline]
    fn f01(&mut self) -> f32 {
        (self.next_u64() >> 11) as f32 * (1.0 / ((1u64 << 53) as f32))
    }

    #[inline]
    fn range_i(&mut self, a: i32, b: i32) -> i32 {
        a + ((self.next_u64() % (1 + (b - a) as u64)) as i32)
    }

    #[inline]
    fn prob(&mut self, p: f32) -> bool {
        self.f01() < p
    }
}

/* =========================
   Caves
   ========================= */

/// Caves and ores keep out of the two bottom layers so the bedrock shell
/// and the stratum above it stay closed.
const DECOR_FLOOR: i32 = 2;

pub(crate) fn carve_caves(gen: &TerrainGenerator, chunk: &mut ChunkData) {
    let (ox, oz) = chunk_origin(chunk.coord());
    let ceiling = gen.params.cave_ceiling.min(CY as i32);

    for x in 0..CX as i32 {
        for z in 0..CZ as i32 {
            let wx = (ox + x) as f32;
            let wz = (oz + z) as f32;
            for y in DECOR_FLOOR..ceiling {
                if chunk.get(x, y, z) == id::AIR {
                    continue;
                }
                let wy = y as f32;
                let a = gen.cave_a.get_noise_3d(wx, wy, wz);
                if a <= gen.params.cave_threshold {
                    continue;
                }
                let b = gen.cave_b.get_noise_3d(wx, wy * CAVE_B_Y_STRETCH, wz);
                if b > gen.params.cave_threshold * CAVE_B_THRESHOLD_SCALE {
                    chunk.set(x, y, z, id::AIR);
                }
            }
        }
    }
}

/* =========================
   Ores
   ========================= */

pub(crate) fn seed_ores(gen: &TerrainGenerator, chunk: &mut ChunkData) {
    let (ox, oz) = chunk_origin(chunk.coord());
    let ceiling = gen.params.ore_ceiling.min(CY as i32);

    for x in 0..CX as i32 {
        for z in 0..CZ as i32 {
            let wx = (ox + x) as f32;
            let wz = (oz + z) as f32;
            for y in DECOR_FLOOR..ceiling {
                if chunk.get(x, y, z) != id::STONE {
                    continue;
                }
                let n = gen.ore.get_noise_3d(wx, y as f32, wz);
                let ore = if n > 0.85 && y < 16 {
                    id::DIAMOND_ORE
                } else if n > 0.78 && y < 48 {
                    id::IRON_ORE
                } else if n > 0.7 {
                    id::COAL_ORE
                } else {
                    continue;
                };
                chunk.set(x, y, z, ore);
            }
        }
    }
}

/* =========================
   Trees
   ========================= */

pub(crate) fn plant_trees(gen: &TerrainGenerator, chunk: &mut ChunkData) {
    let (ox, oz) = chunk_origin(chunk.coord());

    for x in (TREE_MARGIN..CX - TREE_MARGIN).step_by(TREE_GRID) {
        for z in (TREE_MARGIN..CZ - TREE_MARGIN).step_by(TREE_GRID) {
            let wx = ox + x as i32;
            let wz = oz + z as i32;

            let surface = chunk.highest_non_air(x as i32, z as i32);
            if surface < gen.params.sea_level || surface >= CY as i32 - 10 {
                continue;
            }
            if !gen.biome_at(wx as f32, wz as f32).grows_trees() {
                continue;
            }

            let mut rng = Rng::new(column_rand_u32(wx, wz, gen.seed() as u32 ^ SALT_TREES) as u64);
            if !rng.prob(gen.params.tree_chance) {
                continue;
            }

            let height = rng.range_i(4, 6);
            for dy in 1..=height {
                chunk.set(x as i32, surface + dy, z as i32, id::WOOD);
            }
        }
    }
}

/* =========================
   Surface finalization
   ========================= */

/// Exposed dirt weathers into grass everywhere but deserts.
pub(crate) fn finalize_surface(gen: &TerrainGenerator, chunk: &mut ChunkData) {
    let (ox, oz) = chunk_origin(chunk.coord());

    for x in 0..CX as i32 {
        for z in 0..CZ as i32 {
            let top = chunk.highest_non_air(x, z);
            if chunk.get(x, top, z) != id::DIRT {
                continue;
            }
            if gen.biome_at((ox + x) as f32, (oz + z) as f32) != Biome::Desert {
                chunk.set(x, top, z, id::GRASS);
            }
        }
    }
}
