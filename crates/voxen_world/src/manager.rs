use crate::gen::TerrainGenerator;
use crate::mesh::{MeshCache, Mesher, Neighbors, QuadMesh, TextureLookup};
use crate::region::RegionStore;
use glam::{IVec2, Vec3};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use voxen_core::config::{EngineConfig, GenParams};
use voxen_core::world::block::{id, BlockId};
use voxen_core::world::catalog::BlockCatalog;
use voxen_core::world::chunk::ChunkData;
use voxen_core::world::chunk_dim::{world_to_chunk_xz, CX, CY, CZ};

const WORLD_MAGIC: &[u8; 5] = b"WORLD";
const WORLD_VERSION: u32 = 1;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// A queued generation candidate. Lower priority dequeues first; the
/// sequence number keeps equal priorities in enqueue order.
struct QueuedChunk {
    coord: IVec2,
    priority: f32,
    seq: u64,
}

impl PartialEq for QueuedChunk {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedChunk {}

impl PartialOrd for QueuedChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the maximum, so invert: smallest priority wins
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Everything behind the manager lock: the live map, the generation queue
/// with its membership set, and detached dirty chunks waiting for a save.
struct WorldState {
    chunks: HashMap<IVec2, ChunkData>,
    gen_queue: BinaryHeap<QueuedChunk>,
    queued: HashSet<IVec2>,
    save_queue: VecDeque<ChunkData>,
    next_seq: u64,
}

impl WorldState {
    fn new() -> Self {
        Self {
            chunks: HashMap::new(),
            gen_queue: BinaryHeap::new(),
            queued: HashSet::new(),
            save_queue: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn enqueue(&mut self, coord: IVec2, priority: f32) {
        if self.chunks.contains_key(&coord) || !self.queued.insert(coord) {
            return;
        }
        self.gen_queue.push(QueuedChunk { coord, priority, seq: self.next_seq });
        self.next_seq += 1;
    }

    /// Publishes a finished chunk and pokes the neighbors' mesh stamps so
    /// their edge faces get rebuilt against the new data.
    fn insert_chunk(&mut self, chunk: ChunkData) {
        let coord = chunk.coord();
        if self.chunks.contains_key(&coord) {
            return;
        }
        self.chunks.insert(coord, chunk);
        self.touch_neighbors(coord);
    }

    fn touch_neighbors(&mut self, coord: IVec2) {
        for d in [IVec2::new(0, -1), IVec2::new(0, 1), IVec2::new(1, 0), IVec2::new(-1, 0)] {
            if let Some(n) = self.chunks.get_mut(&(coord + d)) {
                n.invalidate_mesh();
            }
        }
    }

    /// Pulls a dirty evictee back into the live map before its save landed.
    /// Without this, re-entering the area could regenerate over pending
    /// edits.
    fn resurrect(&mut self, coord: IVec2) -> bool {
        let Some(pos) = self.save_queue.iter().position(|c| c.coord() == coord) else {
            return false;
        };
        match self.save_queue.remove(pos) {
            Some(chunk) => {
                self.insert_chunk(chunk);
                true
            }
            None => false,
        }
    }
}

/// Observer-centric chunk cache: prioritized background generation inside
/// the load ring, distance-based eviction outside it, block access routed
/// to the owning grid, and lazy meshing for everything in render range.
pub struct ChunkManager {
    render_distance: i32,
    load_distance: i32,

    state: Arc<RwLock<WorldState>>,
    generator: Arc<TerrainGenerator>,
    store: Arc<RegionStore>,
    mesher: Mesher,

    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    last_observer: Mutex<Option<IVec2>>,
}

impl ChunkManager {
    /// Builds the generator and store, reconciles `world.dat`, and spawns
    /// the worker pool. A valid existing world keeps its stored seed; the
    /// configured seed only applies to fresh worlds.
    pub fn initialize(
        world_root: impl Into<PathBuf>,
        config: &EngineConfig,
        mut params: GenParams,
        catalog: Arc<BlockCatalog>,
        textures: Option<Arc<dyn TextureLookup>>,
    ) -> io::Result<Self> {
        let world_root = world_root.into();
        fs::create_dir_all(&world_root)?;

        params.seed = match load_world_meta(&world_root) {
            Some(stored) => {
                info!("existing world, seed {stored}");
                stored
            }
            None => {
                save_world_meta(&world_root, config.seed)?;
                info!("new world, seed {}", config.seed);
                config.seed
            }
        };

        let mesher = match textures {
            Some(lookup) => Mesher::with_textures(catalog.clone(), lookup),
            None => Mesher::new(catalog),
        };

        let mut manager = Self {
            render_distance: config.render_distance,
            load_distance: config.load_distance(),
            state: Arc::new(RwLock::new(WorldState::new())),
            generator: Arc::new(TerrainGenerator::new(params)),
            store: Arc::new(RegionStore::new(world_root)),
            mesher,
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            last_observer: Mutex::new(None),
        };
        manager.spawn_workers(config.worker_count.max(1));
        Ok(manager)
    }

    fn spawn_workers(&mut self, count: usize) {
        for i in 0..count {
            let state = self.state.clone();
            let generator = self.generator.clone();
            let store = self.store.clone();
            let stop = self.stop.clone();
            let handle = thread::Builder::new()
                .name(format!("chunk-worker-{i}"))
                .spawn(move || worker_loop(state, generator, store, stop))
                .expect("spawn chunk worker");
            self.workers.push(handle);
        }
        debug!("{} chunk workers running", self.workers.len());
    }

    pub fn seed(&self) -> i32 {
        self.generator.seed()
    }

    pub fn render_distance(&self) -> i32 {
        self.render_distance
    }

    pub fn loaded_count(&self) -> usize {
        self.state.read().chunks.len()
    }

    pub fn queued_count(&self) -> usize {
        self.state.read().queued.len()
    }

    pub fn is_loaded(&self, coord: IVec2) -> bool {
        self.state.read().chunks.contains_key(&coord)
    }

    pub fn is_queued(&self, coord: IVec2) -> bool {
        self.state.read().queued.contains(&coord)
    }

    pub fn dirty_count(&self) -> usize {
        let state = self.state.read();
        state.chunks.values().filter(|c| c.is_dirty()).count() + state.save_queue.len()
    }

    pub fn loaded_coords(&self) -> Vec<IVec2> {
        self.state.read().chunks.keys().copied().collect()
    }

    /// Synchronously fills a (2·radius+1)² square around the origin, loading
    /// persisted chunks and generating the rest. Call before any
    /// observer-driven work.
    pub fn pregenerate_spawn(&self, origin: Vec3, radius: i32) {
        let center = observer_chunk(origin);
        let mut generated = 0;
        let mut loaded = 0;

        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let coord = IVec2::new(center.x + dx, center.y + dz);
                if self.is_loaded(coord) || self.state.write().resurrect(coord) {
                    continue;
                }
                let (chunk, from_disk) = self.load_or_generate(coord);
                if from_disk { loaded += 1 } else { generated += 1 }
                self.state.write().insert_chunk(chunk);
            }
        }
        info!("spawn area ready: {generated} generated, {loaded} loaded from disk");
    }

    /// Reacts to observer movement. The chunk under the observer and its
    /// four cardinal neighbors materialize immediately on this thread; the
    /// remaining load ring is queued by velocity-biased distance and
    /// everything beyond the keep ring is evicted.
    pub fn update_observer(&self, position: Vec3, velocity: Vec3) {
        let obs = observer_chunk(position);
        {
            let mut last = self.last_observer.lock();
            if *last == Some(obs) {
                return;
            }
            *last = Some(obs);
        }

        let immediate = [
            obs,
            IVec2::new(obs.x + 1, obs.y),
            IVec2::new(obs.x - 1, obs.y),
            IVec2::new(obs.x, obs.y + 1),
            IVec2::new(obs.x, obs.y - 1),
        ];
        for coord in immediate {
            if !self.is_loaded(coord) && !self.state.write().resurrect(coord) {
                let (chunk, _) = self.load_or_generate(coord);
                self.state.write().insert_chunk(chunk);
            }
        }

        {
            let mut state = self.state.write();
            for coord in chunks_in_radius(obs, self.load_distance) {
                if !state.chunks.contains_key(&coord) && !state.queued.contains(&coord) {
                    let priority = queue_priority(coord, obs, velocity);
                    state.enqueue(coord, priority);
                }
            }
        }

        self.evict_beyond(obs, self.load_distance + 1);
    }

    fn evict_beyond(&self, center: IVec2, keep: i32) {
        let mut state = self.state.write();
        let doomed: Vec<IVec2> = state
            .chunks
            .keys()
            .filter(|c| (c.x - center.x).abs().max((c.y - center.y).abs()) > keep)
            .copied()
            .collect();

        for coord in doomed {
            if let Some(chunk) = state.chunks.remove(&coord) {
                if chunk.is_dirty() {
                    state.save_queue.push_back(chunk);
                }
                state.touch_neighbors(coord);
            }
        }
    }

    /// Block read routed to the owning chunk. Out-of-world heights and
    /// unloaded chunks read as air.
    pub fn get_block(&self, wx: i32, wy: i32, wz: i32) -> BlockId {
        if wy < 0 || wy >= CY as i32 {
            return id::AIR;
        }
        let (coord, (lx, lz)) = world_to_chunk_xz(wx, wz);
        let state = self.state.read();
        match state.chunks.get(&coord) {
            Some(chunk) => chunk.get(lx as i32, wy, lz as i32),
            None => id::AIR,
        }
    }

    /// Block write routed to the owning chunk; writes into unloaded chunks
    /// are dropped. Edge writes poke the bordering neighbor so its cached
    /// mesh rebuilds.
    pub fn set_block(&self, wx: i32, wy: i32, wz: i32, block: BlockId) {
        if wy < 0 || wy >= CY as i32 {
            return;
        }
        let (coord, (lx, lz)) = world_to_chunk_xz(wx, wz);
        let mut state = self.state.write();
        let Some(chunk) = state.chunks.get_mut(&coord) else { return };

        if chunk.get(lx as i32, wy, lz as i32) == block {
            return;
        }
        chunk.set(lx as i32, wy, lz as i32, block);

        let mut touched = Vec::new();
        if lx == 0 {
            touched.push(IVec2::new(coord.x - 1, coord.y));
        }
        if lx == CX - 1 {
            touched.push(IVec2::new(coord.x + 1, coord.y));
        }
        if lz == 0 {
            touched.push(IVec2::new(coord.x, coord.y - 1));
        }
        if lz == CZ - 1 {
            touched.push(IVec2::new(coord.x, coord.y + 1));
        }
        for n in touched {
            if let Some(neighbor) = state.chunks.get_mut(&n) {
                neighbor.invalidate_mesh();
            }
        }
    }

    /// Topmost non-air height at a world column, falling back to the
    /// generator's surface function when the chunk is not in memory.
    pub fn surface_height(&self, wx: i32, wz: i32) -> i32 {
        let (coord, (lx, lz)) = world_to_chunk_xz(wx, wz);
        let state = self.state.read();
        match state.chunks.get(&coord) {
            Some(chunk) => chunk.highest_non_air(lx as i32, lz as i32),
            None => self.generator.height_at(wx as f32, wz as f32),
        }
    }

    /// Meshes every generated chunk within render distance and pushes the
    /// quads to the sink. Holds the read lock for the whole pass; neighbor
    /// borrows never leave it. No generation or eviction happens here.
    pub fn render_chunks(
        &self,
        observer: Vec3,
        cache: &mut MeshCache,
        mut sink: impl FnMut(&QuadMesh),
    ) {
        let center = observer_chunk(observer);
        let state = self.state.read();

        for coord in chunks_in_radius(center, self.render_distance) {
            let Some(chunk) = state.chunks.get(&coord) else { continue };
            if !chunk.is_generated() {
                continue;
            }
            let neighbors = Neighbors {
                north: state.chunks.get(&IVec2::new(coord.x, coord.y - 1)),
                south: state.chunks.get(&IVec2::new(coord.x, coord.y + 1)),
                east: state.chunks.get(&IVec2::new(coord.x + 1, coord.y)),
                west: state.chunks.get(&IVec2::new(coord.x - 1, coord.y)),
            };
            for quad in cache.quads(&self.mesher, chunk, neighbors) {
                sink(quad);
            }
        }
    }

    /// Flushes every dirty chunk (live and evicted) through the region
    /// store. Returns the number saved; failures stay dirty and are
    /// reported as a summary.
    pub fn save_all(&self) -> usize {
        let mut state = self.state.write();
        let mut saved = 0;
        let mut failed = 0;

        for _ in 0..state.save_queue.len() {
            let Some(chunk) = state.save_queue.pop_front() else { break };
            match self.store.save(&chunk) {
                Ok(()) => saved += 1,
                Err(e) => {
                    warn!("save of evicted chunk {:?} failed: {e}", chunk.coord());
                    failed += 1;
                    state.save_queue.push_back(chunk);
                }
            }
        }

        for chunk in state.chunks.values_mut() {
            if !chunk.is_dirty() {
                continue;
            }
            match self.store.save(chunk) {
                Ok(()) => {
                    chunk.set_dirty(false);
                    saved += 1;
                }
                Err(e) => {
                    warn!("save of chunk {:?} failed: {e}", chunk.coord());
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!("{failed} chunk saves failed, left dirty for retry");
        }
        info!("saved {saved} chunks");
        saved
    }

    /// Cooperative shutdown: stop flag, join workers, then drain all dirty
    /// state synchronously.
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.save_all();
        info!("chunk manager shut down");
    }

    fn load_or_generate(&self, coord: IVec2) -> (ChunkData, bool) {
        let mut chunk = ChunkData::new(coord);
        match self.store.load(coord, &mut chunk) {
            Ok(true) => (chunk, true),
            Ok(false) => {
                self.generator.generate(&mut chunk);
                (chunk, false)
            }
            Err(e) => {
                // corrupt or unreadable region data: regenerate, the next
                // save overwrites the legacy bytes
                warn!("load of chunk {:?} failed ({e}), regenerating", coord);
                let mut fresh = ChunkData::new(coord);
                self.generator.generate(&mut fresh);
                (fresh, false)
            }
        }
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/* ============================= Worker loop ======================================= */

enum Job {
    Generate(IVec2),
    Save(ChunkData),
    Idle,
}

fn worker_loop(
    state: Arc<RwLock<WorldState>>,
    generator: Arc<TerrainGenerator>,
    store: Arc<RegionStore>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(AtomicOrdering::SeqCst) {
        let job = {
            let mut s = state.write();
            if let Some(entry) = s.gen_queue.pop() {
                s.queued.remove(&entry.coord);
                Job::Generate(entry.coord)
            } else if let Some(chunk) = s.save_queue.pop_front() {
                Job::Save(chunk)
            } else {
                Job::Idle
            }
        };

        match job {
            Job::Generate(coord) => {
                {
                    let mut s = state.write();
                    if s.chunks.contains_key(&coord) || s.resurrect(coord) {
                        continue;
                    }
                }
                let mut chunk = ChunkData::new(coord);
                let ok = match store.load(coord, &mut chunk) {
                    Ok(true) => true,
                    Ok(false) => false,
                    Err(e) => {
                        warn!("load of chunk {:?} failed ({e}), regenerating", coord);
                        chunk = ChunkData::new(coord);
                        false
                    }
                };
                if !ok {
                    generator.generate(&mut chunk);
                }
                state.write().insert_chunk(chunk);
            }
            Job::Save(chunk) => {
                if let Err(e) = store.save(&chunk) {
                    warn!("background save of {:?} failed: {e}", chunk.coord());
                    state.write().save_queue.push_back(chunk);
                    // back off instead of spinning on a failing disk
                    thread::sleep(IDLE_SLEEP);
                }
                // a clean save drops the detached chunk here
            }
            Job::Idle => thread::sleep(IDLE_SLEEP),
        }
    }
}

/* ============================= Helpers ======================================= */

#[inline]
fn observer_chunk(position: Vec3) -> IVec2 {
    IVec2::new(
        (position.x / CX as f32).floor() as i32,
        (position.z / CZ as f32).floor() as i32,
    )
}

/// Manhattan distance, shrunk for candidates ahead of the motion vector so
/// the world streams in where the observer is going.
fn queue_priority(coord: IVec2, observer: IVec2, velocity: Vec3) -> f32 {
    let base = ((coord.x - observer.x).abs() + (coord.y - observer.y).abs()) as f32;

    let speed_sq = velocity.x * velocity.x + velocity.z * velocity.z;
    if speed_sq > 0.01 {
        let dx = (coord.x - observer.x) as f32;
        let dz = (coord.y - observer.y) as f32;
        let dist_sq = dx * dx + dz * dz;
        if dist_sq > 0.0 {
            let inv_speed = 1.0 / speed_sq.sqrt();
            let align = (dx * velocity.x * inv_speed + dz * velocity.z * inv_speed) / dist_sq.sqrt();
            if align > 0.0 {
                return base * (1.0 - 0.5 * align);
            }
        }
    }
    base
}

/// Square ring walk outward from the center, so nearer coordinates come
/// first without a sort.
fn chunks_in_radius(center: IVec2, radius: i32) -> Vec<IVec2> {
    let mut chunks = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    chunks.push(center);
    for ring in 1..=radius {
        for x in center.x - ring..=center.x + ring {
            for z in center.y - ring..=center.y + ring {
                if (x - center.x).abs() == ring || (z - center.y).abs() == ring {
                    chunks.push(IVec2::new(x, z));
                }
            }
        }
    }
    chunks
}

fn load_world_meta(world_root: &Path) -> Option<i32> {
    let mut file = File::open(world_root.join("world.dat")).ok()?;
    let mut bytes = [0u8; 13];
    file.read_exact(&mut bytes).ok()?;

    if &bytes[..5] != WORLD_MAGIC {
        warn!("world.dat has a bad magic, treating the world as new");
        return None;
    }
    let version = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    if version != WORLD_VERSION {
        warn!("world.dat version {version} unknown, treating the world as new");
        return None;
    }
    Some(i32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]))
}

fn save_world_meta(world_root: &Path, seed: i32) -> io::Result<()> {
    let mut bytes = Vec::with_capacity(13);
    bytes.extend_from_slice(WORLD_MAGIC);
    bytes.extend_from_slice(&WORLD_VERSION.to_le_bytes());
    bytes.extend_from_slice(&seed.to_le_bytes());

    let mut file = File::create(world_root.join("world.dat"))?;
    file.write_all(&bytes)?;
    file.flush()
}

// =================================================================================================
//
//                                            Unit Tests
//
// =================================================================================================
