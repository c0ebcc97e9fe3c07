use glam::IVec3;

/// Identifier for a block. The persisted form is one byte per block, so ids
/// stay below 256; id 0 is always air.
pub type BlockId = u8;

/// Well-known ids matching the shipped block definition document. Terrain
/// generation and tests refer to blocks through these instead of magic
/// numbers; everything else goes through the catalog by name.
pub mod id {
    use super::BlockId;

    pub const AIR: BlockId = 0;
    pub const GRASS: BlockId = 1;
    pub const DIRT: BlockId = 2;
    pub const STONE: BlockId = 3;
    pub const WOOD: BlockId = 4;
    pub const COBBLESTONE: BlockId = 5;
    pub const SAND: BlockId = 6;
    pub const WATER: BlockId = 7;
    pub const LAVA: BlockId = 8;
    pub const IRON_ORE: BlockId = 9;
    pub const COAL_ORE: BlockId = 10;
    pub const DIAMOND_ORE: BlockId = 11;
    pub const GOLD_ORE: BlockId = 12;
    pub const BEDROCK: BlockId = 13;
    pub const OBSIDIAN: BlockId = 14;
    pub const GLASS: BlockId = 15;
    pub const LEAVES: BlockId = 16;
    pub const PLANKS: BlockId = 17;
    pub const BRICK: BlockId = 18;
    pub const SNOW: BlockId = 19;
    pub const ICE: BlockId = 20;
}

/// Block faces for the direction of a block. Used by the mesher and for
/// per-face texture lookup.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Face { Top, Bottom, North, South, East, West }

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Top, Face::Bottom, Face::North, Face::South, Face::East, Face::West,
    ];

    /// Outward unit normal. North is -Z, east is +X.
    #[inline]
    pub fn normal(self) -> IVec3 {
        match self {
            Face::Top => IVec3::new(0, 1, 0),
            Face::Bottom => IVec3::new(0, -1, 0),
            Face::North => IVec3::new(0, 0, -1),
            Face::South => IVec3::new(0, 0, 1),
            Face::East => IVec3::new(1, 0, 0),
            Face::West => IVec3::new(-1, 0, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Face::Top => "top",
            Face::Bottom => "bottom",
            Face::North => "north",
            Face::South => "south",
            Face::East => "east",
            Face::West => "west",
        }
    }
}
