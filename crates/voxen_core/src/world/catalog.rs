use crate::world::block::{BlockId, Face};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Hardness at or above this value marks a block as unbreakable.
pub const UNBREAKABLE_HARDNESS: f32 = 1.0e6;

/// Immutable per-id block properties, loaded once from `blocks.json`.
#[derive(Clone, Debug)]
pub struct BlockProperties {
    pub name: String,
    pub display_name: String,
    pub transparent: bool,
    pub liquid: bool,
    pub flammable: bool,
    pub breakable: bool,
    pub emits_light: bool,
    /// Seconds to break with bare hands.
    pub hardness: f32,
    pub light_level: u8,
    pub sound_group: String,
    pub tool_required: String,
    pub tint: [u8; 4],
    textures: FaceTextures,
}

impl BlockProperties {
    pub fn is_unbreakable(&self) -> bool {
        !self.breakable || self.hardness >= UNBREAKABLE_HARDNESS
    }

    /// Face-specific texture key, else the ALL key, else the block name.
    pub fn texture_key(&self, face: Face) -> &str {
        let specific = self.textures.for_face(face);
        if !specific.is_empty() {
            return specific;
        }
        if !self.textures.all.is_empty() {
            return &self.textures.all;
        }
        &self.name
    }
}

impl Default for BlockProperties {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            display_name: String::from("Unknown Block"),
            transparent: false,
            liquid: false,
            flammable: false,
            breakable: true,
            emits_light: false,
            hardness: 1.0,
            light_level: 0,
            sound_group: String::from("stone"),
            tool_required: String::new(),
            tint: [255, 255, 255, 255],
            textures: FaceTextures::default(),
        }
    }
}

/// Read-only registry mapping block ids to their properties.
///
/// Built once at startup and shared by reference (`Arc`) into the manager and
/// the mesher; all reads are lock-free. Replacing the catalog means building
/// a new one, so a reload either fully succeeds or leaves the old value.
#[derive(Debug)]
pub struct BlockCatalog {
    blocks: HashMap<BlockId, BlockProperties>,
    name_to_id: HashMap<String, BlockId>,
    default_props: BlockProperties,
}

impl BlockCatalog {
    /// Loads `blocks.json` from the data directory. `biomes.json` and
    /// `recipes.json` may sit next to it; both are optional and their absence
    /// is not an error.
    pub fn load_from(data_dir: impl AsRef<Path>) -> io::Result<Self> {
        let data_dir = data_dir.as_ref();
        let doc: BlocksDoc = read_json(&data_dir.join("blocks.json"))?;

        let mut blocks = HashMap::new();
        let mut name_to_id = HashMap::new();
        for entry in doc.blocks {
            if entry.id > BlockId::MAX as u32 {
                warn!("block '{}' id {} exceeds one byte, skipping", entry.name, entry.id);
                continue;
            }
            let id = entry.id as BlockId;
            let props = entry.into_properties();
            name_to_id.insert(props.name.clone(), id);
            blocks.insert(id, props);
        }

        for optional in ["biomes.json", "recipes.json"] {
            if data_dir.join(optional).is_file() {
                debug!("optional data file {} present", optional);
            }
        }

        debug!("block catalog loaded ({} blocks)", blocks.len());
        Ok(Self { blocks, name_to_id, default_props: BlockProperties::default() })
    }

    /// Properties for an id. Unknown ids get a stable default record, never
    /// an error.
    pub fn properties_of(&self, id: BlockId) -> &BlockProperties {
        self.blocks.get(&id).unwrap_or(&self.default_props)
    }

    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    pub fn texture_key(&self, id: BlockId, face: Face) -> &str {
        self.properties_of(id).texture_key(face)
    }

    pub fn display_name(&self, id: BlockId) -> &str {
        let props = self.properties_of(id);
        if props.display_name.is_empty() { &props.name } else { &props.display_name }
    }

    pub fn is_transparent(&self, id: BlockId) -> bool {
        id == 0 || self.properties_of(id).transparent
    }

    pub fn is_liquid(&self, id: BlockId) -> bool {
        self.properties_of(id).liquid
    }

    pub fn hardness(&self, id: BlockId) -> f32 {
        self.properties_of(id).hardness
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// =================================================================================================
//
//                                            Json Mapper
//
// =================================================================================================

#[derive(Deserialize)]
struct BlocksDoc {
    blocks: Vec<BlockJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockJson {
    id: u32,
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    transparent: bool,
    #[serde(default)]
    liquid: bool,
    #[serde(default)]
    flammable: bool,
    #[serde(default = "d_true")]
    breakable: bool,
    #[serde(default)]
    emits_light: bool,
    #[serde(default = "d_hardness")]
    hardness: f32,
    #[serde(default)]
    light_level: u8,
    #[serde(default = "d_sound")]
    sound_group: String,
    #[serde(default)]
    tool_required: String,
    #[serde(default)]
    textures: FaceTextures,
    #[serde(default = "d_tint")]
    tint_color: [u8; 4],
}

impl BlockJson {
    fn into_properties(self) -> BlockProperties {
        BlockProperties {
            display_name: if self.display_name.is_empty() { self.name.clone() } else { self.display_name },
            name: self.name,
            transparent: self.transparent,
            liquid: self.liquid,
            flammable: self.flammable,
            breakable: self.breakable,
            emits_light: self.emits_light,
            hardness: self.hardness,
            light_level: self.light_level.min(15),
            sound_group: self.sound_group,
            tool_required: self.tool_required,
            tint: self.tint_color,
            textures: self.textures,
        }
    }
}

/// Per-face texture keys. `side` is a legacy alias for `all`.
#[derive(Deserialize, Clone, Debug, Default)]
struct FaceTextures {
    #[serde(default)]
    top: String,
    #[serde(default)]
    bottom: String,
    #[serde(default)]
    north: String,
    #[serde(default)]
    south: String,
    #[serde(default)]
    east: String,
    #[serde(default)]
    west: String,
    #[serde(default, alias = "side")]
    all: String,
}

impl FaceTextures {
    fn for_face(&self, face: Face) -> &str {
        match face {
            Face::Top => &self.top,
            Face::Bottom => &self.bottom,
            Face::North => &self.north,
            Face::South => &self.south,
            Face::East => &self.east,
            Face::West => &self.west,
        }
    }
}

fn d_true() -> bool { true }
fn d_hardness() -> f32 { 1.0 }
fn d_sound() -> String { String::from("stone") }
fn d_tint() -> [u8; 4] { [255, 255, 255, 255] }

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> io::Result<T> {
    let s = fs::read_to_string(path)?;
    serde_json::from_str(&s)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display())))
}

// =================================================================================================
//
//                                            Unit Tests
//
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog_from(json: &str) -> BlockCatalog {
        let dir = std::env::temp_dir().join(format!(
            "voxen-catalog-{}-{:p}",
            std::process::id(),
            &json
        ));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("blocks.json"), json).unwrap();
        let catalog = BlockCatalog::load_from(&dir).unwrap();
        fs::remove_dir_all(&dir).ok();
        catalog
    }

    #[test]
    fn loads_blocks_and_resolves_names() {
        let catalog = catalog_from(
            r#"{ "blocks": [
                { "id": 1, "name": "grass", "displayName": "Grass Block",
                  "hardness": 0.6, "soundGroup": "grass",
                  "textures": { "top": "grass_top", "bottom": "dirt", "side": "grass_side" } },
                { "id": 13, "name": "bedrock", "breakable": false, "hardness": 1000000.0 }
            ] }"#,
        );

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.id_of("grass"), Some(1));
        assert_eq!(catalog.id_of("granite"), None);
        assert_eq!(catalog.display_name(1), "Grass Block");
        assert!(catalog.properties_of(13).is_unbreakable());
    }

    #[test]
    fn texture_key_falls_back_face_then_all_then_name() {
        let catalog = catalog_from(
            r#"{ "blocks": [
                { "id": 1, "name": "grass",
                  "textures": { "top": "grass_top", "side": "grass_side" } },
                { "id": 3, "name": "stone" }
            ] }"#,
        );

        assert_eq!(catalog.texture_key(1, Face::Top), "grass_top");
        assert_eq!(catalog.texture_key(1, Face::North), "grass_side");
        assert_eq!(catalog.texture_key(3, Face::East), "stone");
    }

    #[test]
    fn unknown_id_gets_default_record() {
        let catalog = catalog_from(r#"{ "blocks": [] }"#);
        let props = catalog.properties_of(200);
        assert_eq!(props.name, "default");
        assert!(props.breakable);
        assert_eq!(props.hardness, 1.0);
        assert_eq!(props.tint, [255, 255, 255, 255]);
        assert_eq!(catalog.texture_key(200, Face::Top), "default");
    }

    #[test]
    fn bad_json_is_invalid_data() {
        let dir = std::env::temp_dir().join(format!("voxen-catalog-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("blocks.json"), "{ not json").unwrap();
        let err = BlockCatalog::load_from(&dir).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        fs::remove_dir_all(&dir).ok();
    }
}
