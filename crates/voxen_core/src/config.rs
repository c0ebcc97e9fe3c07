use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Terrain generation parameters. All load-bearing frequencies and
/// thresholds live here so reproducibility tests have a single knob set.
#[derive(Clone, Debug)]
pub struct GenParams {
    pub seed: i32,
    pub sea_level: i32,
    /// Blocks of biome material under the surface block before plain stone.
    pub dirt_depth: i32,

    pub continental_freq: f32,
    pub erosion_freq: f32,
    pub peaks_valleys_freq: f32,
    pub climate_freq: f32,
    pub density_freq: f32,

    pub cave_freq: f32,
    pub cave_threshold: f32,
    /// Caves only carve below this height.
    pub cave_ceiling: i32,

    pub ore_freq: f32,
    /// Ores only spawn below this height.
    pub ore_ceiling: i32,

    pub tree_chance: f32,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            seed: 1337,
            sea_level: 64,
            dirt_depth: 4,

            continental_freq: 0.0025,
            erosion_freq: 0.005,
            peaks_valleys_freq: 0.01,
            climate_freq: 0.003,
            density_freq: 0.02,

            cave_freq: 0.02,
            cave_threshold: 0.6,
            cave_ceiling: 80,

            ore_freq: 0.1,
            ore_ceiling: 64,

            tree_chance: 0.10,
        }
    }
}

/// Runtime limits for the chunk manager, loadable from `config/engine.toml`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EngineConfig {
    pub seed: i32,
    pub render_distance: i32,
    pub worker_count: usize,
    pub world_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            render_distance: 8,
            worker_count: 4,
            world_path: String::from("world"),
        }
    }
}

impl EngineConfig {
    /// Chunks are kept loaded a little beyond the render ring.
    pub fn load_distance(&self) -> i32 {
        self.render_distance + 2
    }

    /// Reads the config file, falling back to defaults when it is missing.
    /// A present but unparseable file is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, toml_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = EngineConfig::load_or_default("definitely/not/here.toml").unwrap();
        assert_eq!(cfg.render_distance, 8);
        assert_eq!(cfg.load_distance(), 10);
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let dir = std::env::temp_dir().join(format!("voxen-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");

        let mut cfg = EngineConfig::default();
        cfg.render_distance = 12;
        cfg.seed = -5;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.render_distance, 12);
        assert_eq!(loaded.seed, -5);
        fs::remove_dir_all(&dir).ok();
    }
}
