mod decor;
pub mod spline;

use crate::gen::spline::Spline;
use fastnoise_lite::{CellularReturnType, FastNoiseLite, FractalType, NoiseType};
use tracing::debug;
use voxen_core::config::GenParams;
use voxen_core::world::biome::Biome;
use voxen_core::world::block::{id, BlockId};
use voxen_core::world::chunk::ChunkData;
use voxen_core::world::chunk_dim::{chunk_origin, CX, CY, CZ};

/* ========================= Seed offsets ========================== */

const SEED_CONTINENTAL: i32 = 0;
const SEED_EROSION: i32 = 1000;
const SEED_PEAKS_VALLEYS: i32 = 2000;
const SEED_TEMPERATURE: i32 = 3000;
const SEED_HUMIDITY: i32 = 4000;
const SEED_DENSITY: i32 = 5000;
const SEED_CAVE_A: i32 = 6000;
const SEED_CAVE_B: i32 = 7000;
const SEED_ORE: i32 = 8000;

/* ========================= Window / bias ========================== */

const WINDOW_BELOW: i32 = 30;
const WINDOW_ABOVE: i32 = 20;
const BIAS_FALLOFF: f32 = 20.0;
const BIAS_BELOW: f32 = 1.5;
const BIAS_ABOVE: f32 = 0.8;

/// Deterministic multi-layer terrain generator. Every sample is a pure
/// function of the world seed and the coordinate, so two generators built
/// from the same seed produce byte-identical chunks.
pub struct TerrainGenerator {
    pub(crate) params: GenParams,

    continental: FastNoiseLite,
    erosion: FastNoiseLite,
    peaks_valleys: FastNoiseLite,
    temperature: FastNoiseLite,
    humidity: FastNoiseLite,
    density: FastNoiseLite,
    pub(crate) cave_a: FastNoiseLite,
    pub(crate) cave_b: FastNoiseLite,
    pub(crate) ore: FastNoiseLite,

    continental_spline: Spline,
    erosion_spline: Spline,
    peaks_valleys_spline: Spline,
}

impl TerrainGenerator {
    pub fn new(params: GenParams) -> Self {
        let seed = params.seed;
        let gen = Self {
            continental: fbm_noise(seed.wrapping_add(SEED_CONTINENTAL), params.continental_freq, 4),
            erosion: fbm_noise(seed.wrapping_add(SEED_EROSION), params.erosion_freq, 4),
            peaks_valleys: fbm_noise(seed.wrapping_add(SEED_PEAKS_VALLEYS), params.peaks_valleys_freq, 4),
            temperature: fbm_noise(seed.wrapping_add(SEED_TEMPERATURE), params.climate_freq, 3),
            humidity: fbm_noise(seed.wrapping_add(SEED_HUMIDITY), params.climate_freq, 3),
            density: fbm_noise(seed.wrapping_add(SEED_DENSITY), params.density_freq, 3),
            cave_a: ridged_noise(seed.wrapping_add(SEED_CAVE_A), params.cave_freq),
            cave_b: ridged_noise(seed.wrapping_add(SEED_CAVE_B), params.cave_freq * 0.5),
            ore: cellular_noise(seed.wrapping_add(SEED_ORE), params.ore_freq),

            // Continentalness shapes oceans vs. inland, erosion flattens or
            // raises, peaks/valleys adds local relief.
            continental_spline: Spline::new(vec![
                (-1.0, 30.0),
                (-0.6, 45.0),
                (-0.2, 60.0),
                (0.1, 70.0),
                (0.4, 80.0),
                (0.8, 100.0),
                (1.0, 120.0),
            ]),
            erosion_spline: Spline::new(vec![
                (-1.0, 40.0),
                (-0.5, 20.0),
                (0.0, 0.0),
                (0.5, -20.0),
                (1.0, -40.0),
            ]),
            peaks_valleys_spline: Spline::new(vec![
                (-1.0, -30.0),
                (-0.5, -15.0),
                (0.0, 0.0),
                (0.5, 15.0),
                (1.0, 30.0),
            ]),

            params,
        };
        debug!("terrain generator ready (seed {})", seed);
        gen
    }

    pub fn seed(&self) -> i32 {
        self.params.seed
    }

    pub fn sea_level(&self) -> i32 {
        self.params.sea_level
    }

    /// Spline-shaped surface height, clamped to [1, CY - 10].
    pub fn height_at(&self, wx: f32, wz: f32) -> i32 {
        let base = self.continental_spline.evaluate(self.continental.get_noise_2d(wx, wz));
        let erosion = self.erosion_spline.evaluate(self.erosion.get_noise_2d(wx, wz));
        let relief = self.peaks_valleys_spline.evaluate(self.peaks_valleys.get_noise_2d(wx, wz));
        ((base + erosion + relief) as i32).clamp(1, CY as i32 - 10)
    }

    pub fn biome_at(&self, wx: f32, wz: f32) -> Biome {
        let t = self.temperature.get_noise_2d(wx, wz);
        let m = self.humidity.get_noise_2d(wx, wz);
        Biome::pick(t, m, self.height_at(wx, wz), self.params.sea_level)
    }

    fn density_at(&self, wx: f32, wy: f32, wz: f32) -> f32 {
        self.density.get_noise_3d(wx, wy, wz)
    }

    /// Runs the full terrain pass into a fresh chunk: column fill, caves,
    /// ores, trees, surface finalization. The chunk comes out generated and
    /// dirty.
    pub fn generate(&self, chunk: &mut ChunkData) {
        self.fill_columns(chunk);
        decor::carve_caves(self, chunk);
        decor::seed_ores(self, chunk);
        decor::plant_trees(self, chunk);
        decor::finalize_surface(self, chunk);

        chunk.set_generated(true);
        chunk.set_dirty(true);
    }

    fn fill_columns(&self, chunk: &mut ChunkData) {
        let (ox, oz) = chunk_origin(chunk.coord());

        // One height/biome sample per column, reused by the whole y loop.
        let mut heights = [[0i32; CZ]; CX];
        let mut biomes = [[Biome::Plains; CZ]; CX];
        for x in 0..CX {
            for z in 0..CZ {
                let wx = (ox + x as i32) as f32;
                let wz = (oz + z as i32) as f32;
                heights[x][z] = self.height_at(wx, wz);
                let t = self.temperature.get_noise_2d(wx, wz);
                let m = self.humidity.get_noise_2d(wx, wz);
                biomes[x][z] = Biome::pick(t, m, heights[x][z], self.params.sea_level);
            }
        }

        for x in 0..CX {
            for z in 0..CZ {
                let wx = (ox + x as i32) as f32;
                let wz = (oz + z as i32) as f32;
                let surface = heights[x][z];
                let biome = biomes[x][z];

                let min_y = (surface - WINDOW_BELOW).max(1);
                let max_y = (surface + WINDOW_ABOVE).min(CY as i32);

                for y in min_y..max_y {
                    let mut density = self.density_at(wx, y as f32, wz);

                    let dist = (y - surface) as f32;
                    let bias = 1.0 - (dist.abs() / BIAS_FALLOFF).clamp(0.0, 1.0);
                    if y < surface {
                        density += bias * BIAS_BELOW;
                        if y <= surface - 2 {
                            // terrain must stay closed well below the surface
                            density = density.max(0.1);
                        }
                    } else {
                        density -= bias * BIAS_ABOVE;
                    }

                    if density > 0.0 {
                        let block = self.block_for_depth(surface - y, biome, y);
                        if block != id::AIR {
                            chunk.set(x as i32, y, z as i32, block);
                        }
                    }
                }

                chunk.set(x as i32, 0, z as i32, id::BEDROCK);
                for y in 1..min_y {
                    chunk.set(x as i32, y, z as i32, id::STONE);
                }
            }
        }
    }

    fn block_for_depth(&self, depth: i32, biome: Biome, y: i32) -> BlockId {
        if depth < 0 {
            id::AIR
        } else if depth == 0 {
            biome.surface_block(y, self.params.sea_level)
        } else if depth < self.params.dirt_depth {
            biome.subsurface_block()
        } else {
            id::STONE
        }
    }
}

/* ============================= Noise builders ======================================= */

fn fbm_noise(seed: i32, freq: f32, octaves: i32) -> FastNoiseLite {
    let mut n = FastNoiseLite::with_seed(seed);
    n.set_noise_type(Some(NoiseType::OpenSimplex2));
    n.set_frequency(Some(freq));
    n.set_fractal_type(Some(FractalType::FBm));
    n.set_fractal_octaves(Some(octaves));
    n.set_fractal_gain(Some(0.5));
    n.set_fractal_lacunarity(Some(2.0));
    n
}

fn ridged_noise(seed: i32, freq: f32) -> FastNoiseLite {
    let mut n = FastNoiseLite::with_seed(seed);
    n.set_noise_type(Some(NoiseType::OpenSimplex2));
    n.set_frequency(Some(freq));
    n.set_fractal_type(Some(FractalType::Ridged));
    n.set_fractal_octaves(Some(3));
    n
}

fn cellular_noise(seed: i32, freq: f32) -> FastNoiseLite {
    let mut n = FastNoiseLite::with_seed(seed);
    n.set_noise_type(Some(NoiseType::Cellular));
    n.set_frequency(Some(freq));
    n.set_cellular_return_type(Some(CellularReturnType::CellValue));
    n.set_cellular_jitter(Some(1.0));
    n
}

/// Deterministic per-column hash, independent of generation order.
#[inline]
pub(crate) fn column_rand_u32(wx: i32, wz: i32, seed: u32) -> u32 {
    let mut h = (wx as i64).wrapping_mul(0x9E3779B185EBCA87u64 as i64)
        ^ (wz as i64).wrapping_mul(0xC2B2AE3D27D4EB4Fu64 as i64);
    h ^= (seed as i64).wrapping_mul(0xD6E8FEB86659FD93u64 as i64);
    let h = h as u64;
    ((h >> 32) ^ h) as u32
}
