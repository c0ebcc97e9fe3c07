use crate::world::block::{id, BlockId};

/// Biomes picked from climate noise plus terrain height. Each one decides
/// the surface material of a column and whether trees may grow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Biome {
    Ocean,
    FrozenPeaks,
    Mountains,
    Desert,
    Plains,
    Swamp,
    Forest,
    Hills,
}

impl Biome {
    /// Decision table over temperature, humidity and absolute height.
    /// Height rules come first, then temperature, then humidity.
    pub fn pick(temperature: f32, humidity: f32, height: i32, sea_level: i32) -> Biome {
        if height < sea_level - 5 {
            return Biome::Ocean;
        }
        if height > sea_level + 60 {
            return if temperature < -0.3 { Biome::FrozenPeaks } else { Biome::Mountains };
        }
        if temperature < -0.5 {
            Biome::FrozenPeaks
        } else if temperature > 0.5 {
            if humidity < -0.3 { Biome::Desert } else { Biome::Plains }
        } else if humidity > 0.3 {
            Biome::Swamp
        } else if humidity > -0.2 {
            Biome::Forest
        } else {
            Biome::Hills
        }
    }

    /// Block placed right at the surface of a column.
    pub fn surface_block(self, height: i32, sea_level: i32) -> BlockId {
        match self {
            Biome::Ocean => {
                if height <= sea_level { id::DIRT } else { id::GRASS }
            }
            Biome::Desert => id::SAND,
            Biome::FrozenPeaks => id::SNOW,
            Biome::Swamp => id::DIRT,
            _ => id::GRASS,
        }
    }

    /// Blocks in the shallow band below the surface.
    pub fn subsurface_block(self) -> BlockId {
        match self {
            Biome::Desert => id::SAND,
            _ => id::DIRT,
        }
    }

    pub fn grows_trees(self) -> bool {
        !matches!(self, Biome::Desert | Biome::FrozenPeaks | Biome::Ocean)
    }
}
