use glam::IVec2;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use voxen_core::world::chunk::ChunkData;
use voxen_core::world::chunk_dim::{chunk_to_region_slot, REGION_SLOTS};

pub const REGION_MAGIC: [u8; 4] = *b"REGI";
pub const REGION_VERSION: u32 = 1;
/// Magic + version + three u32 tables (offsets, sizes, mtimes).
pub const REGION_HEADER_LEN: usize = 8 + REGION_SLOTS * 4 * 3;

/// Slot table at the head of a region file. A slot with offset 0 or size 0
/// is empty.
#[derive(Clone)]
struct RegionHeader {
    offsets: Vec<u32>,
    sizes: Vec<u32>,
    mtimes: Vec<u32>,
}

impl RegionHeader {
    fn empty() -> Self {
        Self {
            offsets: vec![0; REGION_SLOTS],
            sizes: vec![0; REGION_SLOTS],
            mtimes: vec![0; REGION_SLOTS],
        }
    }

    fn slot_present(&self, idx: usize) -> bool {
        self.offsets[idx] != 0 && self.sizes[idx] != 0
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(REGION_HEADER_LEN);
        bytes.extend_from_slice(&REGION_MAGIC);
        bytes.extend_from_slice(&REGION_VERSION.to_le_bytes());
        for table in [&self.offsets, &self.sizes, &self.mtimes] {
            for v in table.iter() {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < REGION_HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated region header"));
        }
        if bytes[..4] != REGION_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad region magic"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version > REGION_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("region version {version} is newer than {REGION_VERSION}"),
            ));
        }

        let mut header = Self::empty();
        let mut at = 8;
        for table in [&mut header.offsets, &mut header.sizes, &mut header.mtimes] {
            for v in table.iter_mut() {
                *v = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
                at += 4;
            }
        }
        Ok(header)
    }
}

/// Persistence for chunks, packed 32x32 per region file under
/// `<world>/region/`.
///
/// Writes append the chunk body to the end of the file and rewrite the
/// header; replaced bodies become dead space until an explicit compaction.
/// Headers are cached in memory; files are opened per operation and a
/// store-wide lock serializes everything touching the same region.
pub struct RegionStore {
    world_root: PathBuf,
    headers: Mutex<HashMap<IVec2, RegionHeader>>,
}

impl RegionStore {
    pub fn new(world_root: impl Into<PathBuf>) -> Self {
        Self { world_root: world_root.into(), headers: Mutex::new(HashMap::new()) }
    }

    fn region_path(&self, region: IVec2) -> PathBuf {
        self.world_root.join("region").join(format!("r.{}.{}.rgn", region.x, region.y))
    }

    /// Appends the chunk body and rewrites the slot table. A region whose
    /// header turns out unreadable gets a fresh table; its old slots are
    /// unrecoverable anyway.
    pub fn save(&self, chunk: &ChunkData) -> io::Result<()> {
        let (region, idx) = chunk_to_region_slot(chunk.coord());
        let path = self.region_path(region);
        let mut cache = self.headers.lock();

        let mut header = match self.header_for(&mut cache, region, &path) {
            Ok(h) => h,
            Err(e) => {
                warn!("resetting unreadable region {}: {e}", path.display());
                RegionHeader::empty()
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        if file.metadata()?.len() < REGION_HEADER_LEN as u64 {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.to_bytes())?;
        }

        let body = chunk.serialize();
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_all(&body)?;

        header.offsets[idx] = offset as u32;
        header.sizes[idx] = body.len() as u32;
        header.mtimes[idx] = unix_now();

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.flush()?;

        cache.insert(region, header);
        Ok(())
    }

    /// Reads persisted bytes into the grid. `Ok(false)` means the chunk was
    /// never saved; corruption and I/O trouble come back as errors and leave
    /// the grid untouched.
    pub fn load(&self, coord: IVec2, chunk: &mut ChunkData) -> io::Result<bool> {
        let (region, idx) = chunk_to_region_slot(coord);
        let path = self.region_path(region);
        let mut cache = self.headers.lock();

        let header = self.header_for(&mut cache, region, &path)?;
        if !header.slot_present(idx) {
            return Ok(false);
        }

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(header.offsets[idx] as u64))?;
        let mut body = vec![0u8; header.sizes[idx] as usize];
        file.read_exact(&mut body)?;

        chunk.deserialize(&body)?;
        Ok(true)
    }

    pub fn exists(&self, coord: IVec2) -> bool {
        let (region, idx) = chunk_to_region_slot(coord);
        let path = self.region_path(region);
        let mut cache = self.headers.lock();
        match self.header_for(&mut cache, region, &path) {
            Ok(header) => header.slot_present(idx),
            Err(_) => false,
        }
    }

    /// Empties the chunk's slot. The body bytes stay behind as dead space.
    pub fn delete(&self, coord: IVec2) -> io::Result<()> {
        let (region, idx) = chunk_to_region_slot(coord);
        let path = self.region_path(region);
        let mut cache = self.headers.lock();

        let mut header = self.header_for(&mut cache, region, &path)?;
        if !header.slot_present(idx) {
            return Ok(());
        }
        header.offsets[idx] = 0;
        header.sizes[idx] = 0;
        header.mtimes[idx] = 0;

        if path.is_file() {
            let mut file = OpenOptions::new().write(true).open(&path)?;
            file.write_all(&header.to_bytes())?;
            file.flush()?;
        }
        cache.insert(region, header);
        Ok(())
    }

    /// Rewrites a region file with live bodies packed back to back, dropping
    /// the dead space accumulated by the append-only write policy.
    pub fn compact_region(&self, region: IVec2) -> io::Result<()> {
        let path = self.region_path(region);
        let mut cache = self.headers.lock();
        if !path.is_file() {
            return Ok(());
        }

        let mut header = self.header_for(&mut cache, region, &path)?;
        let mut file = File::open(&path)?;
        let before = file.metadata()?.len();

        let mut packed: Vec<u8> = Vec::new();
        for idx in 0..REGION_SLOTS {
            if !header.slot_present(idx) {
                continue;
            }
            file.seek(SeekFrom::Start(header.offsets[idx] as u64))?;
            let mut body = vec![0u8; header.sizes[idx] as usize];
            file.read_exact(&mut body)?;

            header.offsets[idx] = (REGION_HEADER_LEN + packed.len()) as u32;
            packed.extend_from_slice(&body);
        }
        drop(file);

        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&packed);
        fs::write(&path, &bytes)?;

        debug!(
            "compacted region ({}, {}): {} -> {} bytes",
            region.x, region.y, before, bytes.len()
        );
        cache.insert(region, header);
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.headers.lock().clear();
    }

    pub fn region_file_size(&self, region: IVec2) -> u64 {
        fs::metadata(self.region_path(region)).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of live slots in a region.
    pub fn chunk_count(&self, region: IVec2) -> usize {
        let path = self.region_path(region);
        let mut cache = self.headers.lock();
        match self.header_for(&mut cache, region, &path) {
            Ok(header) => (0..REGION_SLOTS).filter(|&i| header.slot_present(i)).count(),
            Err(_) => 0,
        }
    }

    /// Cached header for a region, reading it from disk on first touch. A
    /// region without a file starts from a zeroed table that materializes on
    /// the first save. Unreadable headers are not cached, so a repaired file
    /// is picked up on the next call.
    fn header_for(
        &self,
        cache: &mut HashMap<IVec2, RegionHeader>,
        region: IVec2,
        path: &Path,
    ) -> io::Result<RegionHeader> {
        if let Some(header) = cache.get(&region) {
            return Ok(header.clone());
        }
        let header = if path.is_file() {
            let mut bytes = vec![0u8; REGION_HEADER_LEN];
            let mut file = File::open(path)?;
            file.read_exact(&mut bytes)?;
            RegionHeader::from_bytes(&bytes)?
        } else {
            RegionHeader::empty()
        };
        cache.insert(region, header.clone());
        Ok(header)
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

// =================================================================================================
//
//                                            Unit Tests
//
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use voxen_core::world::block::{id, BlockId};

    fn temp_store(tag: &str) -> (PathBuf, RegionStore) {
        let root = std::env::temp_dir().join(format!("voxen-region-{tag}-{}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        (root.clone(), RegionStore::new(root))
    }

    fn chunk_with_marker(coord: IVec2, marker: BlockId) -> ChunkData {
        let mut c = ChunkData::new(coord);
        c.set(1, 2, 3, marker);
        c
    }

    #[test]
    fn save_then_load_roundtrips() {
        let (root, store) = temp_store("roundtrip");
        let coord = IVec2::new(5, -3);
        let chunk = chunk_with_marker(coord, id::COBBLESTONE);
        store.save(&chunk).unwrap();

        let mut restored = ChunkData::new(coord);
        assert!(store.load(coord, &mut restored).unwrap());
        assert_eq!(restored.serialize(), chunk.serialize());
        assert!(store.exists(coord));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_chunk_reports_not_present() {
        let (root, store) = temp_store("missing");
        let mut chunk = ChunkData::new(IVec2::new(0, 0));
        assert!(!store.load(IVec2::new(0, 0), &mut chunk).unwrap());
        assert!(!store.exists(IVec2::new(0, 0)));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn cache_survives_clear_and_reread() {
        let (root, store) = temp_store("cache");
        let coord = IVec2::new(40, 40);
        store.save(&chunk_with_marker(coord, id::STONE)).unwrap();
        store.clear_cache();

        let mut restored = ChunkData::new(coord);
        assert!(store.load(coord, &mut restored).unwrap());
        assert_eq!(restored.get(1, 2, 3), id::STONE);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn rewrite_keeps_latest_body() {
        let (root, store) = temp_store("rewrite");
        let coord = IVec2::new(2, 2);
        store.save(&chunk_with_marker(coord, id::STONE)).unwrap();
        store.save(&chunk_with_marker(coord, id::SAND)).unwrap();

        let mut restored = ChunkData::new(coord);
        assert!(store.load(coord, &mut restored).unwrap());
        assert_eq!(restored.get(1, 2, 3), id::SAND);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn delete_empties_the_slot() {
        let (root, store) = temp_store("delete");
        let coord = IVec2::new(1, 1);
        store.save(&chunk_with_marker(coord, id::STONE)).unwrap();
        store.delete(coord).unwrap();

        assert!(!store.exists(coord));
        let mut restored = ChunkData::new(coord);
        assert!(!store.load(coord, &mut restored).unwrap());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn corrupt_magic_fails_load_and_heals_on_save() {
        let (root, store) = temp_store("corrupt");
        let coord = IVec2::new(0, 0);
        store.save(&chunk_with_marker(coord, id::STONE)).unwrap();

        // stomp the magic
        let path = root.join("region").join("r.0.0.rgn");
        let mut bytes = fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(&[0, 0, 0, 0]);
        fs::write(&path, &bytes).unwrap();
        store.clear_cache();

        let mut restored = ChunkData::new(coord);
        let err = store.load(coord, &mut restored).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!restored.is_generated(), "failed load must leave the grid untouched");

        // a save resets the header, restoring the magic
        store.save(&chunk_with_marker(coord, id::SAND)).unwrap();
        let healed = fs::read(&path).unwrap();
        assert_eq!(&healed[..4], b"REGI");
        assert!(store.load(coord, &mut restored).unwrap());
        assert_eq!(restored.get(1, 2, 3), id::SAND);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn newer_version_is_rejected() {
        let (root, store) = temp_store("version");
        let coord = IVec2::new(0, 0);
        store.save(&chunk_with_marker(coord, id::STONE)).unwrap();

        let path = root.join("region").join("r.0.0.rgn");
        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        store.clear_cache();

        let mut restored = ChunkData::new(coord);
        assert!(store.load(coord, &mut restored).is_err());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn compaction_drops_dead_space_and_keeps_chunks() {
        let (root, store) = temp_store("compact");
        let a = IVec2::new(0, 0);
        let b = IVec2::new(1, 0);
        store.save(&chunk_with_marker(a, id::STONE)).unwrap();
        store.save(&chunk_with_marker(b, id::SAND)).unwrap();
        for _ in 0..4 {
            store.save(&chunk_with_marker(a, id::GRASS)).unwrap();
        }

        let region = IVec2::new(0, 0);
        let bloated = store.region_file_size(region);
        store.compact_region(region).unwrap();
        let compacted = store.region_file_size(region);
        assert!(compacted < bloated);
        assert_eq!(store.chunk_count(region), 2);

        store.clear_cache();
        let mut restored = ChunkData::new(a);
        assert!(store.load(a, &mut restored).unwrap());
        assert_eq!(restored.get(1, 2, 3), id::GRASS);
        let mut restored = ChunkData::new(b);
        assert!(store.load(b, &mut restored).unwrap());
        assert_eq!(restored.get(1, 2, 3), id::SAND);
        fs::remove_dir_all(&root).ok();
    }
}
