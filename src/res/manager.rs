use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use serde::{Deserialize, Serialize};

use super::factory::{Factory, FontHandle, HeadlessFactory, SoundHandle, TextureHandle, TextureParams};
use super::handle::{Resource, WeakResource};
use super::id::{ManagerId, Mark, RecordHandle, ResourceId, ResourceKind, ResourceState};
use super::load::{LoadKind, LoadSpec, LoadTask};
use super::payload::{Data, OpenFile, Payload};
use super::registry;
use super::resolve;
use super::table::{Record, RecordState, SlotTable};
use crate::errors::*;
use crate::memory::prelude::{AllocFlags, Allocator, Buffer, SystemAllocator};
use crate::utils::object_pool::INLINE_ENTRIES;

/// Setup parameters of one `ResourceManager`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceParams {
    /// Number of slots to reserve up front. The table grows on demand.
    pub capacity: usize,
    /// Directory relative resource names are resolved against. Defaults to
    /// `resolve::default_root()`.
    pub root: Option<PathBuf>,
}

impl Default for ResourceParams {
    fn default() -> Self {
        ResourceParams {
            capacity: INLINE_ENTRIES,
            root: None,
        }
    }
}

/// The state of a manager which is shared with links, guards and the
/// manager registry.
pub(crate) struct Shared {
    pub id: ManagerId,
    table: Mutex<SlotTable>,
    allocator: Arc<dyn Allocator>,
    factory: Arc<dyn Factory>,
    root: PathBuf,
}

impl Shared {
    #[inline]
    fn table(&self) -> MutexGuard<SlotTable> {
        self.table.lock().unwrap()
    }

    fn insert<F>(&self, func: F) -> Result<ResourceId>
    where
        F: FnOnce(&SlotTable) -> Record,
    {
        let rsp = {
            let mut table = self.table();
            let record = func(&*table);
            table.add(record)
        };

        rsp.map_err(|(record, err)| {
            self.dispose(record);
            err
        })
    }

    /// Discards a record which has been removed from the table: waits for
    /// its load, gives its payload back and turns its weak observers stale.
    fn dispose(&self, record: Record) {
        if let Some(task) = record.task {
            if let Some(Ok(_)) = task.finish(&*self.allocator, true) {
                trace!("Discards the result of loading '{}'.", task.name);
            }
        }

        if let Some(payload) = record.payload {
            payload.release(&*self.factory);
        }

        for (manager, id) in record.weak {
            if let Some(observer) = registry::get(manager) {
                observer.table().mark_stale(id);
            }
        }
    }

    fn release(&self, handle: RecordHandle) {
        let record = self.table().release(handle);
        if let Some(record) = record {
            self.dispose(record);
            self.collect();
        }
    }

    /// Leaves the registry once destroyed and drained.
    fn collect(&self) {
        let drained = {
            let mut table = self.table();
            if table.is_destroyed() && table.records_len() == 0 {
                table.destroy();
                true
            } else {
                false
            }
        };

        if drained {
            registry::remove(self.id);
        }
    }

    fn with_record<T, F>(&self, id: ResourceId, func: F) -> Result<T>
    where
        F: FnOnce(&mut Record) -> Result<T>,
    {
        let target = self.table().target(id)?;
        let owner = registry::get(target.manager).ok_or(Error::Stale(id))?;
        let mut table = owner.table();
        let record = table.record_mut(target.record).ok_or(Error::Stale(id))?;
        func(record)
    }

    fn with_payload<T, F>(&self, id: ResourceId, expected: ResourceKind, func: F) -> Result<T>
    where
        F: FnOnce(&mut Payload) -> Result<T>,
    {
        self.with_record(id, |record| {
            if record.kind != expected {
                return Err(Error::KindMismatch {
                    id,
                    expected,
                    found: record.kind,
                });
            }

            match record.state {
                RecordState::Loading => Err(Error::NotReady(id)),
                RecordState::Failed => Err(Error::LoadFailed(id)),
                RecordState::Loaded => match record.payload {
                    Some(ref mut payload) => func(payload),
                    None => Err(Error::LoadFailed(id)),
                },
            }
        })
    }

    pub fn try_get_data(&self, id: ResourceId) -> Result<Data> {
        self.with_payload(id, ResourceKind::Data, |payload| {
            payload.as_data().ok_or(Error::LoadFailed(id))
        })
    }

    pub fn try_get_texture(&self, id: ResourceId) -> Result<TextureHandle> {
        self.with_payload(id, ResourceKind::Texture, |payload| match *payload {
            Payload::Texture(handle) => Ok(handle),
            _ => Err(Error::LoadFailed(id)),
        })
    }

    pub fn try_get_font(&self, id: ResourceId) -> Result<FontHandle> {
        self.with_payload(id, ResourceKind::Font, |payload| match *payload {
            Payload::Font(handle) => Ok(handle),
            _ => Err(Error::LoadFailed(id)),
        })
    }

    pub fn try_get_sound(&self, id: ResourceId) -> Result<SoundHandle> {
        self.with_payload(id, ResourceKind::Sound, |payload| match *payload {
            Payload::Sound(handle) => Ok(handle),
            _ => Err(Error::LoadFailed(id)),
        })
    }

    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        let target = self.table().target(id);
        let target = match target {
            Ok(target) => target,
            Err(Error::Stale(_)) => return Some(ResourceState::Stale),
            Err(_) => return None,
        };

        let owner = match registry::get(target.manager) {
            Some(owner) => owner,
            None => return Some(ResourceState::Stale),
        };

        let table = owner.table();
        let state = table
            .record(target.record)
            .map(|v| v.state())
            .unwrap_or(ResourceState::Stale);

        Some(state)
    }

    pub fn is_stale(&self, id: ResourceId) -> bool {
        self.table().slot(id).map(|v| v.stale).unwrap_or(false)
    }

    pub fn is_strong(&self, id: ResourceId) -> bool {
        self.table().slot(id).map(|v| v.strong).unwrap_or(false)
    }

    /// Creates a strong slot in this manager, referring to whatever `id` of
    /// `src` refers to.
    pub fn link(&self, src: &Shared, id: ResourceId) -> Result<ResourceId> {
        let target = src.table().target(id)?;
        let owner = registry::get(target.manager).ok_or(Error::Stale(id))?;

        let retained = owner.table().retain(target.record);
        if !retained {
            return Err(Error::Stale(id));
        }

        let rsp = self.table().add_slot(target, true);
        if rsp.is_err() {
            owner.release(target.record);
        }

        rsp
    }

    /// Creates a weak slot in this manager. Linking a stale slot succeeds,
    /// and yields a slot which is stale already.
    pub fn link_weak(&self, src: &Shared, id: ResourceId) -> Result<ResourceId> {
        let target = src.table().target(id);
        let target = match target {
            Ok(target) => target,
            Err(Error::Stale(_)) => return self.table().add_stale_slot(),
            Err(err) => return Err(err),
        };

        let weak = self.table().add_slot(target, false)?;
        let attached = registry::get(target.manager)
            .map(|owner| owner.table().attach_weak(target.record, self.id, weak))
            .unwrap_or(false);

        if !attached {
            self.table().mark_stale(weak);
        }

        Ok(weak)
    }

    /// Frees one slot. Unknown and already freed ids are ignored.
    pub fn free(&self, id: ResourceId) {
        let slot = match self.table().remove_slot(id) {
            Some(slot) => slot,
            None => return,
        };

        if slot.stale {
            return;
        }

        let owner = match registry::get(slot.target.manager) {
            Some(owner) => owner,
            None => return,
        };

        if slot.strong {
            owner.release(slot.target.record);
        } else {
            owner
                .table()
                .detach_weak(slot.target.record, self.id, id);
        }
    }

    pub fn mark(&self) -> Mark {
        self.table().mark()
    }

    pub fn sync(&self, mark: Mark) -> bool {
        let pending = self.table().pending(mark);
        if pending.is_empty() {
            return true;
        }

        for (handle, task) in &pending {
            if let Some(rsp) = task.finish(&*self.allocator, false) {
                self.complete(*handle, task, rsp);
            }
        }

        self.table().pending(mark).is_empty()
    }

    pub fn wait(&self, mark: Mark) {
        loop {
            let pending = self.table().pending(mark);
            if pending.is_empty() {
                return;
            }

            let mut progressed = false;
            for (handle, task) in &pending {
                if let Some(rsp) = task.finish(&*self.allocator, true) {
                    self.complete(*handle, task, rsp);
                    progressed = true;
                }
            }

            // Some other thread is installing the rest.
            if !progressed {
                thread::yield_now();
            }
        }
    }

    fn complete(&self, handle: RecordHandle, task: &Arc<LoadTask>, rsp: Result<Buffer>) {
        let outcome = rsp.and_then(|buf| self.build(task.spec.kind, buf));
        if let Err(ref err) = outcome {
            warn!("Failed to load '{}': {}", task.name, err);
        }

        let orphan = self.table().install(handle, task, outcome);
        if let Some(payload) = orphan {
            payload.release(&*self.factory);
        }
    }

    fn build(&self, kind: LoadKind, buf: Buffer) -> Result<Payload> {
        match kind {
            LoadKind::Data => Ok(Payload::data(buf)),
            LoadKind::Texture(params) => self
                .factory
                .create_texture(&buf, &params)
                .map(Payload::Texture),
            LoadKind::BitmapFont => self.factory.parse_bitmap_font(&buf).map(Payload::Font),
            LoadKind::FreeTypeFont(size) => self
                .factory
                .parse_freetype_font(&buf, size)
                .map(Payload::Font),
            LoadKind::Sound => self.factory.create_sound(&buf).map(Payload::Sound),
        }
    }

    fn load(&self, name: &str, spec: LoadSpec) -> Result<ResourceId> {
        let source = resolve::resolve(&self.root, name)?;
        let task = LoadTask::start(name, source, spec, &self.allocator)?;
        self.insert(|table| {
            Record::loading(spec.kind.resource_kind(), task, table.current_mark())
        })
    }

    fn with_file<T, F>(&self, id: ResourceId, func: F) -> Result<T>
    where
        F: FnOnce(&mut OpenFile) -> Result<T>,
    {
        self.with_payload(id, ResourceKind::File, |payload| match *payload {
            Payload::File(ref mut file) => func(file),
            _ => Err(Error::LoadFailed(id)),
        })
    }

    fn free_all(&self) {
        self.wait(Mark::max_value());

        let ids = self.table().slot_ids();
        for id in ids {
            self.free(id);
        }
    }

    fn shutdown(&self) {
        self.free_all();
        self.table().destroy();
        self.collect();
    }
}

fn read_range(file: &OpenFile, pos: u64, buf: &mut [u8]) -> Result<usize> {
    if pos >= file.size {
        return Ok(0);
    }

    let n = (file.size - pos).min(buf.len() as u64) as usize;
    file.file.read_exact_at(&mut buf[..n], file.offset + pos)?;
    Ok(n)
}

/// The arena of resources owned by one part of a program, such as a level or
/// a screen.
///
/// Every operation takes `&self` and may be called from any thread. Dropping
/// the manager frees all of its resources, waiting for loads in flight.
pub struct ResourceManager {
    shared: Arc<Shared>,
}

impl ResourceManager {
    /// Creates a manager backed by the system allocator and a
    /// `HeadlessFactory`.
    pub fn new(params: ResourceParams) -> Self {
        ResourceManager::with_services(
            params,
            Arc::new(HeadlessFactory::new()),
            Arc::new(SystemAllocator),
        )
    }

    /// Creates a manager which builds typed resources with `factory`, and
    /// allocates every buffer from `allocator`.
    pub fn with_services(
        params: ResourceParams,
        factory: Arc<dyn Factory>,
        allocator: Arc<dyn Allocator>,
    ) -> Self {
        let id = ManagerId::next();
        let root = params.root.unwrap_or_else(resolve::default_root);

        let shared = Arc::new(Shared {
            id,
            table: Mutex::new(SlotTable::new(id, params.capacity)),
            allocator,
            factory,
            root,
        });

        registry::add(shared.clone());
        debug!("Created {} rooted at {:?}.", id, shared.root);
        ResourceManager { shared }
    }

    #[inline]
    pub fn id(&self) -> ManagerId {
        self.shared.id
    }

    /// Returns the directory relative names are resolved against.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Returns the number of live ids, including links and stale ones.
    pub fn len(&self) -> usize {
        self.shared.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts loading `name` as raw bytes, allocated with `align` and
    /// `flags`. The id is usable once a `sync` or `wait` covering it is done.
    pub fn load_data(&self, name: &str, align: usize, flags: AllocFlags) -> Result<ResourceId> {
        let spec = LoadSpec {
            kind: LoadKind::Data,
            align,
            flags,
        };

        self.shared.load(name, spec)
    }

    pub fn load_texture(&self, name: &str, params: TextureParams) -> Result<ResourceId> {
        let spec = LoadSpec::intermediate(LoadKind::Texture(params));
        self.shared.load(name, spec)
    }

    pub fn load_bitmap_font(&self, name: &str) -> Result<ResourceId> {
        self.shared
            .load(name, LoadSpec::intermediate(LoadKind::BitmapFont))
    }

    pub fn load_freetype_font(&self, name: &str, size: u32) -> Result<ResourceId> {
        self.shared
            .load(name, LoadSpec::intermediate(LoadKind::FreeTypeFont(size)))
    }

    pub fn load_sound(&self, name: &str) -> Result<ResourceId> {
        self.shared
            .load(name, LoadSpec::intermediate(LoadKind::Sound))
    }

    /// Creates a data resource of `size` bytes. Zero sized resources are
    /// valid, and hold an empty slice.
    pub fn new_data(&self, size: usize, align: usize, flags: AllocFlags) -> Result<ResourceId> {
        let buf = self
            .shared
            .allocator
            .allocate(size, align, flags)
            .ok_or(Error::OutOfMemory(size))?;

        self.shared.insert(|_| Record::loaded(Payload::data(buf)))
    }

    /// Creates a data resource holding a copy of `bytes`.
    pub fn copy_data(&self, bytes: &[u8], align: usize, flags: AllocFlags) -> Result<ResourceId> {
        let mut buf = self
            .shared
            .allocator
            .allocate(bytes.len(), align, flags)
            .ok_or(Error::OutOfMemory(bytes.len()))?;

        buf.copy_from_slice(bytes);
        self.shared.insert(|_| Record::loaded(Payload::data(buf)))
    }

    /// Creates a data resource holding the bytes of `s`, without terminator.
    pub fn strdup(&self, s: &str) -> Result<ResourceId> {
        self.copy_data(s.as_bytes(), 1, AllocFlags::default())
    }

    /// Creates a data resource which adopts `bytes` without copying them.
    pub fn take_data(&self, bytes: Vec<u8>) -> Result<ResourceId> {
        let buf = Buffer::from_vec(bytes);
        self.shared.insert(|_| Record::loaded(Payload::data(buf)))
    }

    /// Creates a blank texture.
    pub fn new_texture(&self, width: u32, height: u32, params: TextureParams) -> Result<ResourceId> {
        let handle = self.shared.factory.new_texture(width, height, &params)?;
        self.shared.insert(|_| Record::loaded(Payload::Texture(handle)))
    }

    /// Adopts a texture created by the factory of this manager. It will be
    /// deleted when the resource is released.
    pub fn take_texture(&self, handle: TextureHandle) -> Result<ResourceId> {
        self.shared.insert(|_| Record::loaded(Payload::Texture(handle)))
    }

    /// Adopts a sound created by the factory of this manager.
    pub fn take_sound(&self, handle: SoundHandle) -> Result<ResourceId> {
        self.shared.insert(|_| Record::loaded(Payload::Sound(handle)))
    }

    /// Runs `func` on the bytes of a data resource. This fails with `Busy` if
    /// any `Data` of the resource is alive. `func` must not call back into
    /// any resource manager.
    pub fn update_data<T, F>(&self, id: ResourceId, func: F) -> Result<T>
    where
        F: FnOnce(&mut [u8]) -> T,
    {
        self.shared
            .with_payload(id, ResourceKind::Data, |payload| match payload.data_mut() {
                Some(buf) => match Arc::get_mut(buf) {
                    Some(buf) => Ok(func(&mut buf[..])),
                    None => Err(Error::Busy(id)),
                },
                None => Err(Error::LoadFailed(id)),
            })
    }

    /// Returns a watermark covering every load issued so far.
    pub fn mark(&self) -> Mark {
        self.shared.mark()
    }

    /// Completes the loads covered by `mark` which are done, without
    /// blocking. Returns true if none of them is pending anymore.
    pub fn sync(&self, mark: Mark) -> bool {
        self.shared.sync(mark)
    }

    /// Blocks until every load covered by `mark` has completed.
    pub fn wait(&self, mark: Mark) {
        self.shared.wait(mark)
    }

    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.shared.state(id)
    }

    /// Returns true if `id` is a weak link whose target has been released.
    pub fn is_stale(&self, id: ResourceId) -> bool {
        self.shared.is_stale(id)
    }

    pub fn try_get_data(&self, id: ResourceId) -> Result<Data> {
        self.shared.try_get_data(id)
    }

    pub fn get_data(&self, id: ResourceId) -> Option<Data> {
        self.shared.try_get_data(id).ok()
    }

    pub fn try_get_texture(&self, id: ResourceId) -> Result<TextureHandle> {
        self.shared.try_get_texture(id)
    }

    pub fn get_texture(&self, id: ResourceId) -> Option<TextureHandle> {
        self.shared.try_get_texture(id).ok()
    }

    pub fn try_get_font(&self, id: ResourceId) -> Result<FontHandle> {
        self.shared.try_get_font(id)
    }

    pub fn get_font(&self, id: ResourceId) -> Option<FontHandle> {
        self.shared.try_get_font(id).ok()
    }

    pub fn try_get_sound(&self, id: ResourceId) -> Result<SoundHandle> {
        self.shared.try_get_sound(id)
    }

    pub fn get_sound(&self, id: ResourceId) -> Option<SoundHandle> {
        self.shared.try_get_sound(id).ok()
    }

    /// Creates a strong link in this manager to resource `id` of `src`. The
    /// resource stays alive until every strong link and the original id are
    /// freed. `src` may be this manager.
    pub fn link(&self, src: &ResourceManager, id: ResourceId) -> Result<ResourceId> {
        self.shared.link(&src.shared, id)
    }

    pub(crate) fn link_from_shared(&self, src: &Shared, id: ResourceId) -> Result<ResourceId> {
        self.shared.link(src, id)
    }

    /// Creates a weak link in this manager to resource `id` of `src`. It
    /// turns stale once the resource is released.
    pub fn link_weak(&self, src: &ResourceManager, id: ResourceId) -> Result<ResourceId> {
        self.shared.link_weak(&src.shared, id)
    }

    /// Frees `id`. Freeing an unknown, freed or stale id does nothing. If this
    /// releases a resource which is still loading, it blocks until the load
    /// is done and discards the result.
    pub fn free(&self, id: ResourceId) {
        self.shared.free(id)
    }

    /// Frees every id of this manager, after waiting for all loads in flight.
    pub fn free_all(&self) {
        self.shared.free_all()
    }

    /// Frees everything and gives back the slot storage.
    pub fn destroy(self) {}

    /// Wraps a strong id into a guard which frees it when dropped.
    pub fn guard(&self, id: ResourceId) -> Result<Resource> {
        if !self.shared.is_strong(id) {
            return Err(Error::InvalidHandle(id));
        }

        Ok(Resource::adopt(self.shared.clone(), id))
    }

    /// Wraps a weak id into a guard which frees it when dropped.
    pub fn guard_weak(&self, id: ResourceId) -> Result<WeakResource> {
        if self.shared.table().slot(id).map(|v| v.strong).unwrap_or(true) {
            return Err(Error::InvalidHandle(id));
        }

        Ok(WeakResource::adopt(self.shared.clone(), id))
    }

    /// Opens `name` for raw reads, without loading it. Compressed package
    /// entries can not be opened.
    pub fn open_file(&self, name: &str) -> Result<ResourceId> {
        let source = resolve::resolve(&self.shared.root, name)?;
        if source.info.compressed {
            return Err(Error::Compressed(name.to_owned()));
        }

        let file = OpenFile {
            file: source.info.file,
            offset: source.info.offset,
            size: source.info.length,
            pos: 0,
        };

        self.shared.insert(|_| Record::loaded(Payload::File(file)))
    }

    pub fn file_size(&self, id: ResourceId) -> Result<u64> {
        self.shared.with_file(id, |file| Ok(file.size))
    }

    /// Returns the current read position.
    pub fn tell(&self, id: ResourceId) -> Result<u64> {
        self.shared.with_file(id, |file| Ok(file.pos))
    }

    /// Moves the read position. Positions past the end are allowed, and make
    /// reads return nothing.
    pub fn seek(&self, id: ResourceId, pos: SeekFrom) -> Result<u64> {
        self.shared.with_file(id, |file| {
            let (base, delta) = match pos {
                SeekFrom::Start(v) => (0, v as i128),
                SeekFrom::End(v) => (file.size, v as i128),
                SeekFrom::Current(v) => (file.pos, v as i128),
            };

            let v = base as i128 + delta;
            if v < 0 || v > u64::max_value() as i128 {
                return Err(Error::IO(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "invalid seek to a negative or overflowing position",
                )));
            }

            file.pos = v as u64;
            Ok(file.pos)
        })
    }

    /// Reads from the current position and advances it.
    pub fn read(&self, id: ResourceId, buf: &mut [u8]) -> Result<usize> {
        let file = self.shared.with_file(id, |file| Ok(file.clone()))?;
        let n = read_range(&file, file.pos, buf)?;
        self.shared.with_file(id, |v| {
            v.pos = file.pos + n as u64;
            Ok(n)
        })
    }

    /// Reads at `offset`, leaving the current position alone.
    pub fn read_at(&self, id: ResourceId, buf: &mut [u8], offset: u64) -> Result<usize> {
        let file = self.shared.with_file(id, |file| Ok(file.clone()))?;
        read_range(&file, offset, buf)
    }

    /// Returns true if `name` resolves to a file.
    pub fn exists(&self, name: &str) -> bool {
        resolve::resolve(&self.shared.root, name).is_ok()
    }

    /// Lists the names of all files under the directory `dir`, sorted.
    pub fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        resolve::list(&self.shared.root, dir)
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shared.shutdown();
        debug!("Destroyed {}.", self.shared.id);
    }
}
