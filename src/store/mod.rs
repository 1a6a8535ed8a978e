//! store
//!
//! Document store over a synchronized working directory.
//!
//! # Architecture
//!
//! [`DocumentStore`] turns object operations (read, create, update, delete)
//! into filesystem writes and remembers which objects it touched. Committing
//! hands those paths to the [`SyncEngine`], which owns every git operation.
//! Callers never see git vocabulary or git errors.
//!
//! # State machine
//!
//! `uninitialized -> initializing -> ready`, and from `ready` every write
//! goes `ready -> mutating -> ready`. Writes are serialized by a store-level
//! async lock held exclusively; reads share it, so they wait for a running
//! write but not for each other. A fatal sync error moves the store to
//! `error` until it is reinitialized with `force`.
//!
//! # Crash recovery
//!
//! [`DocumentStore::initialize`] discards every working-tree change the
//! store did not make itself before it accepts any operation.

mod codec;
mod error;
mod fs;
mod layout;
pub mod manager;
mod record;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{RwLock as AsyncRwLock, RwLockWriteGuard};

pub use codec::{Codec, CodecError, YamlCodec};
pub use error::StoreError;
pub use fs::{FilesystemWrapper, FsError, LocalFs};
pub use layout::{Layout, Location, ObjectType, META_STEM};
pub use manager::{ManagerContext, ManagerError, ManagerRegistry, StoreManager};
pub use record::Record;

use crate::core::paths::normalize_relative;
use crate::core::status::SyncStatus;
use crate::core::types::{CommitId, ObjectId};
use crate::git::VcsBackend;
use crate::sync::{InitOutcome, SyncEngine, SyncError, SyncReport};

/// Lifecycle state of a [`DocumentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    Uninitialized,
    /// Attached to an existing working directory; reads only.
    #[serde(rename = "readonly")]
    ReadOnly,
    Initializing,
    Ready,
    Mutating,
    Error,
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StoreState::Uninitialized => "uninitialized",
            StoreState::ReadOnly => "read-only",
            StoreState::Initializing => "initializing",
            StoreState::Ready => "ready",
            StoreState::Mutating => "mutating",
            StoreState::Error => "in error state",
        };
        f.write_str(s)
    }
}

/// Result of [`DocumentStore::get_index`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectIndex {
    pub entries: BTreeMap<String, Record>,
    pub skipped: Vec<SkippedEntry>,
}

/// An object [`DocumentStore::get_index`] could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub id: ObjectId,
    pub reason: String,
}

/// Summary of a store, from [`DocumentStore::describe`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDescription {
    pub work_dir: PathBuf,
    pub remote_url: String,
    pub branch: String,
    pub state: StoreState,
    pub uncommitted: usize,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Written,
    Removed,
}

/// Holds the store write mutex for one write and restores `ready` after it.
struct WriteGuard<'a> {
    state: &'a RwLock<StoreState>,
    _lock: RwLockWriteGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state == StoreState::Mutating {
            *state = StoreState::Ready;
        }
    }
}

fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn valid_field_name(field: &str) -> bool {
    !field.is_empty()
        && field != META_STEM
        && !field.starts_with('.')
        && !field.contains(['/', '\\'])
        && !field.chars().any(char::is_control)
}

/// Object store over the working directory of a [`SyncEngine`].
pub struct DocumentStore<B: VcsBackend, C: Codec = YamlCodec, F: FilesystemWrapper = LocalFs> {
    engine: SyncEngine<B>,
    codec: C,
    fs: F,
    layout: Layout,
    state: RwLock<StoreState>,
    /// Writes hold it exclusively, reads shared.
    access: AsyncRwLock<()>,
    /// Objects written or removed since their last commit.
    tracking: StdMutex<BTreeMap<Location, Change>>,
    /// Bare id to last known location.
    known: RwLock<BTreeMap<ObjectId, Location>>,
    managers: ManagerRegistry,
}

impl<B: VcsBackend> DocumentStore<B> {
    /// Store with YAML files on the local disk.
    pub fn new(engine: SyncEngine<B>, object_types: Vec<ObjectType>) -> Self {
        let fs = LocalFs::new(engine.paths().work_dir());
        Self::with_parts(engine, YamlCodec, fs, object_types)
    }
}

impl<B: VcsBackend, C: Codec, F: FilesystemWrapper> DocumentStore<B, C, F> {
    pub fn with_parts(engine: SyncEngine<B>, codec: C, fs: F, object_types: Vec<ObjectType>) -> Self {
        let layout = Layout::new(object_types, codec.extension());
        Self {
            engine,
            codec,
            fs,
            layout,
            state: RwLock::new(StoreState::Uninitialized),
            access: AsyncRwLock::new(()),
            tracking: StdMutex::new(BTreeMap::new()),
            known: RwLock::new(BTreeMap::new()),
            managers: ManagerRegistry::new(),
        }
    }

    pub fn engine(&self) -> &SyncEngine<B> {
        &self.engine
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn state(&self) -> StoreState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: StoreState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn tracking(&self) -> MutexGuard<'_, BTreeMap<Location, Change>> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> ManagerContext {
        ManagerContext {
            work_dir: self.fs.root().to_path_buf(),
            object_types: self.layout.object_types().to_vec(),
        }
    }

    fn ensure_readable(&self) -> Result<(), StoreError> {
        match self.state() {
            StoreState::Ready | StoreState::Mutating | StoreState::ReadOnly => Ok(()),
            other => Err(StoreError::NotReady(other)),
        }
    }

    async fn begin_write(&self) -> Result<WriteGuard<'_>, StoreError> {
        let lock = self.access.write().await;
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match *state {
                StoreState::Ready => *state = StoreState::Mutating,
                other => return Err(StoreError::NotReady(other)),
            }
        }
        Ok(WriteGuard {
            state: &self.state,
            _lock: lock,
        })
    }

    /// Wrap an engine error, moving the store to `error` if it is fatal.
    fn vcs(&self, err: SyncError) -> StoreError {
        if err.is_fatal() {
            tracing::warn!(error = %err, "fatal sync error, store needs reinitialization");
            self.set_state(StoreState::Error);
        }
        StoreError::Sync(err)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn exists(&self, location: &Location) -> bool {
        match location {
            Location::File(path) => self.fs.exists(path) && !self.fs.is_dir(path),
            Location::FileSet(dir) => self.fs.is_dir(dir),
        }
    }

    fn is_file_set_dir(&self, dir: &str) -> bool {
        let candidate = Location::FileSet(dir.to_string());
        self.fs.exists(&self.layout.meta_file(dir))
            || self.tracking().contains_key(&candidate)
            || self
                .known
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .any(|l| *l == candidate)
    }

    fn remember(&self, location: &Location) {
        if let Ok(id) = location.id() {
            self.known
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, location.clone());
        }
    }

    fn known_location(&self, id: &ObjectId) -> Option<Location> {
        if id.is_qualified() {
            return None;
        }
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Existing location of `id`, if any.
    fn resolve(&self, id: &ObjectId) -> Option<Location> {
        if let Some(location) = self.known_location(id) {
            if self.exists(&location) {
                return Some(location);
            }
        }
        self.layout
            .candidates(id)
            .into_iter()
            .find(|location| self.exists(location))
    }

    fn tracked(&self, id: &ObjectId) -> Option<(Location, Change)> {
        let matches = |location: &Location| {
            let own = if id.is_qualified() {
                location.qualified_id()
            } else {
                location.id()
            };
            own.as_ref() == Ok(id)
        };
        self.tracking()
            .iter()
            .find(|(location, _)| matches(location))
            .map(|(location, change)| (location.clone(), *change))
    }

    fn mark(&self, location: &Location, change: Change) {
        self.tracking().insert(location.clone(), change);
    }

    fn clear_marks(&self, locations: &[Location]) {
        let mut tracking = self.tracking();
        for location in locations {
            tracking.remove(location);
        }
    }

    /// Forget index entries whose objects are gone from disk.
    fn prune_known(&self) {
        let known: Vec<(ObjectId, Location)> = self
            .known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, loc)| (id.clone(), loc.clone()))
            .collect();
        let gone: Vec<ObjectId> = known
            .into_iter()
            .filter(|(_, location)| !self.exists(location))
            .map(|(id, _)| id)
            .collect();
        if gone.is_empty() {
            return;
        }
        let mut index = self.known.write().unwrap_or_else(PoisonError::into_inner);
        for id in gone {
            index.remove(&id);
        }
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    fn decode_file(&self, path: &str, bytes: &[u8]) -> Result<Map<String, Value>, StoreError> {
        self.codec
            .decode(bytes)
            .map_err(|e| StoreError::codec(path, e))
    }

    fn read_at(
        &self,
        location: &Location,
        meta_fields: Option<&[String]>,
    ) -> Result<Record, StoreError> {
        let id = location.id()?;
        let fields = match location {
            Location::File(path) => {
                let bytes = self.fs.read(path)?;
                self.decode_file(path, &bytes)?
            }
            Location::FileSet(dir) => self.read_file_set(dir, meta_fields)?,
        };
        Ok(Record::new(id, fields))
    }

    /// All fields of a file set, or only its meta file when `meta_fields`
    /// is given (restricted to the named fields unless empty).
    fn read_file_set(
        &self,
        dir: &str,
        meta_fields: Option<&[String]>,
    ) -> Result<Map<String, Value>, StoreError> {
        let meta_path = self.layout.meta_file(dir);
        let mut fields = if self.fs.exists(&meta_path) {
            let bytes = self.fs.read(&meta_path)?;
            self.decode_file(&meta_path, &bytes)?
        } else {
            Map::new()
        };

        if let Some(meta) = meta_fields {
            if !meta.is_empty() {
                fields.retain(|key, _| meta.iter().any(|m| m == key));
            }
            return Ok(fields);
        }

        for name in self.fs.list_dir(dir)? {
            let Some(field) = self.layout.field_of(&name) else {
                continue;
            };
            if field == META_STEM {
                continue;
            }
            let path = self.layout.field_file(dir, &field);
            let bytes = self.fs.read(&path)?;
            let value = self
                .codec
                .decode_value(&bytes)
                .map_err(|e| StoreError::codec(&path, e))?;
            fields.insert(field, value);
        }
        Ok(fields)
    }

    fn meta_keys(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let meta_path = self.layout.meta_file(dir);
        if !self.fs.exists(&meta_path) {
            return Ok(Vec::new());
        }
        let bytes = self.fs.read(&meta_path)?;
        Ok(self.decode_file(&meta_path, &bytes)?.keys().cloned().collect())
    }

    fn write_at(
        &self,
        location: &Location,
        fields: &Map<String, Value>,
        meta_fields: &[String],
    ) -> Result<(), StoreError> {
        match location {
            Location::File(path) => {
                let bytes = self
                    .codec
                    .encode(fields)
                    .map_err(|e| StoreError::codec(path, e))?;
                self.fs.write(path, &bytes)?;
            }
            Location::FileSet(dir) => self.write_file_set(dir, fields, meta_fields)?,
        }
        Ok(())
    }

    fn write_file_set(
        &self,
        dir: &str,
        fields: &Map<String, Value>,
        meta_fields: &[String],
    ) -> Result<(), StoreError> {
        let is_meta = |key: &str| meta_fields.iter().any(|m| m == key);
        if let Some(bad) = fields
            .keys()
            .find(|key| !is_meta(key) && !valid_field_name(key))
        {
            return Err(StoreError::Validation(format!(
                "field '{}' cannot be stored as a file in {}",
                bad, dir
            )));
        }

        let meta: Map<String, Value> = fields
            .iter()
            .filter(|(key, _)| is_meta(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let meta_path = self.layout.meta_file(dir);
        let bytes = self
            .codec
            .encode(&meta)
            .map_err(|e| StoreError::codec(&meta_path, e))?;
        self.fs.write(&meta_path, &bytes)?;

        for (field, value) in fields.iter().filter(|(key, _)| !is_meta(key)) {
            let path = self.layout.field_file(dir, field);
            let bytes = self
                .codec
                .encode_value(value)
                .map_err(|e| StoreError::codec(&path, e))?;
            self.fs.write(&path, &bytes)?;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initialize the engine, discard orphaned changes, notify managers.
    ///
    /// `force` re-clones the working directory and is the only way out of
    /// the `error` state.
    pub async fn initialize(&self, force: bool) -> Result<InitOutcome, StoreError> {
        let _lock = self.access.write().await;
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == StoreState::Error && !force {
                return Err(StoreError::NotReady(StoreState::Error));
            }
            *state = StoreState::Initializing;
        }

        let result = self.initialize_locked(force).await;
        let next = match &result {
            Ok(_) => StoreState::Ready,
            Err(StoreError::Sync(err)) if err.is_fatal() => StoreState::Error,
            Err(_) => StoreState::Uninitialized,
        };
        self.set_state(next);
        tracing::info!(state = %next, "document store initialization finished");
        result
    }

    async fn initialize_locked(&self, force: bool) -> Result<InitOutcome, StoreError> {
        let outcome = self.engine.initialize(force).await?;
        if force {
            self.tracking().clear();
            self.known
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        let orphans = self.reset_orphans().await?;
        if !orphans.is_empty() {
            tracing::info!(count = orphans.len(), "discarded orphaned changes");
        }
        self.managers.initialize_all(&self.context()).await?;
        Ok(outcome)
    }

    /// Serve reads from an already initialized working directory without
    /// contacting the remote or discarding anything.
    ///
    /// Writes stay rejected until [`DocumentStore::initialize`] has run.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnownedChanges`] if the working tree differs from HEAD.
    /// A fresh store owns no changes, so anything git reports would be
    /// discarded by `initialize`; reads are refused instead of serving it.
    pub async fn attach(&self) -> Result<(), StoreError> {
        let _lock = self.access.write().await;
        if !self.engine.is_initialized().await {
            return Err(StoreError::NotReady(StoreState::Uninitialized));
        }
        let drift = self
            .engine
            .list_changed_files(None)
            .await
            .map_err(|e| self.vcs(e))?;
        if !drift.is_empty() {
            tracing::warn!(count = drift.len(), "refusing read-only attach over unowned changes");
            return Err(StoreError::UnownedChanges(drift));
        }
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == StoreState::Uninitialized {
                *state = StoreState::ReadOnly;
            }
        }
        tracing::debug!(root = %self.fs.root().display(), "attached read-only");
        Ok(())
    }

    /// Add a manager. On a ready store its `on_initialize` runs right away.
    pub async fn register_manager(&self, handle: Arc<dyn StoreManager>) -> Result<(), StoreError> {
        self.managers.register(Arc::clone(&handle));
        if matches!(self.state(), StoreState::Ready | StoreState::Mutating) {
            manager::initialize_one(handle.as_ref(), &self.context()).await?;
        }
        Ok(())
    }

    pub fn managers(&self) -> &ManagerRegistry {
        &self.managers
    }

    pub fn describe(&self) -> StoreDescription {
        let options = self.engine.options();
        StoreDescription {
            work_dir: self.fs.root().to_path_buf(),
            remote_url: options.location.remote_url.clone(),
            branch: options.location.branch.to_string(),
            state: self.state(),
            uncommitted: self.tracking().len(),
            status: self.engine.status(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current content of `id`.
    ///
    /// For a file set, `meta_fields` limits the read to its meta file.
    pub async fn read(
        &self,
        id: &ObjectId,
        meta_fields: Option<&[String]>,
    ) -> Result<Record, StoreError> {
        let _read = self.access.read().await;
        self.ensure_readable()?;
        let location = self
            .resolve(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.read_at(&location, meta_fields)
    }

    /// Content of `id` as of commit `version`.
    pub async fn read_version(
        &self,
        id: &ObjectId,
        version: &CommitId,
    ) -> Result<Record, StoreError> {
        let _read = self.access.read().await;
        self.ensure_readable()?;
        let mut candidates: Vec<Location> = self.known_location(id).into_iter().collect();
        candidates.extend(self.layout.candidates(id));

        for location in candidates {
            let found = match &location {
                Location::File(path) => self.read_file_version(path, version).await?,
                Location::FileSet(dir) => self.read_file_set_version(dir, version).await?,
            };
            if let Some(fields) = found {
                return Ok(Record::new(location.id()?, fields));
            }
        }
        Err(StoreError::NotFound(format!("{} at {}", id, version.short(8))))
    }

    async fn read_file_version(
        &self,
        path: &str,
        version: &CommitId,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        match self.engine.read_file_blob_at_commit(path, version).await {
            Ok(bytes) => Ok(Some(self.decode_file(path, &bytes)?)),
            Err(SyncError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_file_set_version(
        &self,
        dir: &str,
        version: &CommitId,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let names = match self.engine.list_files_at_commit(dir, version).await {
            Ok(names) => names,
            Err(SyncError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let meta_name = format!("{}.{}", META_STEM, self.layout.extension());
        if !names.contains(&meta_name) {
            return Ok(None);
        }

        let mut fields = Map::new();
        for name in names {
            let Some(field) = self.layout.field_of(&name) else {
                continue;
            };
            let path = self.layout.field_file(dir, &field);
            let bytes = self.engine.read_file_blob_at_commit(&path, version).await?;
            if field == META_STEM {
                fields.extend(self.decode_file(&path, &bytes)?);
            } else {
                let value = self
                    .codec
                    .decode_value(&bytes)
                    .map_err(|e| StoreError::codec(&path, e))?;
                fields.insert(field, value);
            }
        }
        Ok(Some(fields))
    }

    /// Absolute on-disk path of `id`.
    pub fn local_path(&self, id: &ObjectId) -> Result<PathBuf, StoreError> {
        self.resolve(id)
            .map(|location| self.fs.root().join(location.path()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn scan(&self, subdir: &str) -> Result<Vec<Location>, StoreError> {
        let subdir = normalize_relative(subdir);
        let mut out = Vec::new();
        for name in self.fs.list_dir(&subdir)? {
            let path = Layout::join(&subdir, &name);
            let is_dir = self.fs.is_dir(&path);
            if is_dir && !self.fs.exists(&self.layout.meta_file(&path)) {
                continue;
            }
            if let Some(location) = self.layout.entry_location(&subdir, &name, is_dir) {
                out.push(location);
            }
        }
        Ok(out)
    }

    /// Ids of the objects currently in `subdir`, sorted.
    pub async fn list_ids(&self, subdir: &str) -> Result<Vec<ObjectId>, StoreError> {
        let _read = self.access.read().await;
        self.ensure_readable()?;
        let mut ids = Vec::new();
        for location in self.scan(subdir)? {
            self.remember(&location);
            ids.push(location.id()?);
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Read every object of `subdir`, keyed by `id_field` when it holds a
    /// string or number, else by the object id.
    ///
    /// `only_ids` limits the read to the named objects. Objects that fail to
    /// read are reported in [`ObjectIndex::skipped`].
    pub async fn get_index(
        &self,
        subdir: &str,
        id_field: &str,
        only_ids: Option<&[ObjectId]>,
        meta_fields: Option<&[String]>,
    ) -> Result<ObjectIndex, StoreError> {
        let _read = self.access.read().await;
        self.ensure_readable()?;
        let mut index = ObjectIndex::default();
        for location in self.scan(subdir)? {
            let id = location.id()?;
            if let Some(only) = only_ids {
                if !only.iter().any(|wanted| wanted.name() == id.as_str()) {
                    continue;
                }
            }
            self.remember(&location);

            match self.read_at(&location, meta_fields) {
                Ok(record) => {
                    let key = record
                        .get(id_field)
                        .and_then(index_key)
                        .unwrap_or_else(|| id.to_string());
                    index.entries.insert(key, record);
                }
                Err(err) => {
                    tracing::warn!(path = location.path(), error = %err, "skipping unreadable object");
                    index.skipped.push(SkippedEntry {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(index)
    }

    /// Objects changed through the store and not yet committed, sorted.
    pub async fn list_uncommitted(&self) -> Result<Vec<ObjectId>, StoreError> {
        let _read = self.access.read().await;
        self.ensure_readable()?;
        let mut ids: Vec<ObjectId> = self
            .tracking()
            .keys()
            .filter_map(|location| location.id().ok())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a new object at `path`.
    ///
    /// Without `meta_fields` the object is one file and `path` must end in
    /// the codec extension. With them it is a file set in directory `path`:
    /// the named fields go to the meta file, every other field to its own
    /// file.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if a file or directory already exists there.
    pub async fn create(
        &self,
        record: Record,
        path: &str,
        meta_fields: Option<&[String]>,
    ) -> Result<(), StoreError> {
        let _write = self.begin_write().await?;
        let location = self
            .layout
            .location_for_create(path, meta_fields.is_some())
            .map_err(StoreError::Validation)?;

        let id = location.id()?;
        let parent = location.parent();
        let occupied = [
            Location::File(Layout::join(parent, &format!("{}.{}", id, self.layout.extension()))),
            Location::FileSet(Layout::join(parent, id.as_str())),
        ];
        if let Some(taken) = occupied.iter().find(|l| self.fs.exists(l.path())) {
            return Err(StoreError::Conflict(taken.path().to_string()));
        }

        let record = record.with_id(id);
        self.write_at(&location, record.fields(), meta_fields.unwrap_or_default())?;
        self.mark(&location, Change::Written);
        self.remember(&location);
        tracing::debug!(path = location.path(), "created object");
        Ok(())
    }

    /// Shallow-merge `new_data` into `id` and rewrite it.
    ///
    /// For a file set, `meta_fields` redefines which fields live in the meta
    /// file; by default the current split is kept.
    pub async fn update(
        &self,
        id: &ObjectId,
        new_data: Map<String, Value>,
        meta_fields: Option<&[String]>,
    ) -> Result<(), StoreError> {
        let _write = self.begin_write().await?;
        let location = self
            .resolve(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut record = self.read_at(&location, None)?;
        record.merge(new_data);

        let meta = match (&location, meta_fields) {
            (Location::FileSet(_), Some(meta)) => meta.to_vec(),
            (Location::FileSet(dir), None) => self.meta_keys(dir)?,
            (Location::File(_), _) => Vec::new(),
        };
        self.write_at(&location, record.fields(), &meta)?;
        self.mark(&location, Change::Written);
        self.remember(&location);
        tracing::debug!(path = location.path(), "updated object");
        Ok(())
    }

    /// Remove `id` from disk. The next commit of it stages the removal.
    pub async fn delete(&self, id: &ObjectId) -> Result<(), StoreError> {
        let _write = self.begin_write().await?;
        let location = self
            .resolve(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.fs.remove(location.path())?;
        self.mark(&location, Change::Removed);
        tracing::debug!(path = location.path(), "deleted object");
        Ok(())
    }

    /// Commit the given objects.
    ///
    /// Deleted objects are committed as removals; with `removing`, all of
    /// them are. Empty `ids` commits nothing.
    ///
    /// # Errors
    ///
    /// [`StoreError::PartialCommit`] if some ids matched nothing. The others
    /// are committed regardless.
    pub async fn commit(
        &self,
        ids: &[ObjectId],
        message: &str,
        removing: bool,
    ) -> Result<Option<CommitId>, StoreError> {
        if ids.is_empty() {
            return Ok(None);
        }
        let _write = self.begin_write().await?;

        let mut additions = BTreeSet::new();
        let mut removals = BTreeSet::new();
        let mut committed = Vec::new();
        let mut missing = Vec::new();

        for id in ids {
            let resolved = match self.tracked(id) {
                Some((location, Change::Removed)) => Some((location, true)),
                Some((location, Change::Written)) if self.exists(&location) => {
                    Some((location, removing))
                }
                _ => match self.resolve(id) {
                    Some(location) => Some((location, removing)),
                    None if removing => self.known_location(id).map(|location| (location, true)),
                    None => None,
                },
            };
            match resolved {
                Some((location, true)) => {
                    removals.insert(location.path().to_string());
                    committed.push(location);
                }
                Some((location, false)) => {
                    additions.insert(location.path().to_string());
                    committed.push(location);
                }
                None => missing.push(id.clone()),
            }
        }

        let commit = if committed.is_empty() {
            None
        } else {
            let additions: Vec<String> = additions.into_iter().collect();
            let removals: Vec<String> = removals.into_iter().collect();
            self.engine
                .commit_paths(&additions, &removals, message)
                .await
                .map_err(|e| self.vcs(e))?
                .commit
        };

        self.clear_marks(&committed);
        self.prune_known();

        if !missing.is_empty() {
            return Err(StoreError::PartialCommit { committed: commit, missing });
        }
        Ok(commit)
    }

    /// Drop uncommitted changes to the given objects.
    pub async fn discard(&self, ids: &[ObjectId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _write = self.begin_write().await?;

        let mut locations = Vec::new();
        for id in ids {
            let location = self
                .tracked(id)
                .map(|(location, _)| location)
                .or_else(|| self.resolve(id))
                .or_else(|| self.known_location(id));
            match location {
                Some(location) => locations.push(location),
                None => tracing::debug!(%id, "nothing to discard"),
            }
        }
        if locations.is_empty() {
            return Ok(());
        }

        let paths: Vec<String> = locations.iter().map(|l| l.path().to_string()).collect();
        self.engine
            .reset_files(Some(&paths))
            .await
            .map_err(|e| self.vcs(e))?;
        self.clear_marks(&locations);
        self.prune_known();
        Ok(())
    }

    /// Discard every working-tree change the store did not make.
    ///
    /// Returns the discarded paths.
    pub async fn reset_orphaned_file_changes(&self) -> Result<Vec<String>, StoreError> {
        let _write = self.begin_write().await?;
        self.reset_orphans().await
    }

    async fn reset_orphans(&self) -> Result<Vec<String>, StoreError> {
        let changed = self
            .engine
            .list_changed_files(None)
            .await
            .map_err(|e| self.vcs(e))?;
        let tracked: BTreeSet<Location> = self.tracking().keys().cloned().collect();

        let orphans: Vec<String> = changed
            .into_iter()
            .filter(|path| {
                match self
                    .layout
                    .owner_of(path, |dir: &str| self.is_file_set_dir(dir))
                {
                    Some(owner) => !tracked.contains(&owner),
                    None => true,
                }
            })
            .collect();
        if orphans.is_empty() {
            return Ok(orphans);
        }

        for path in &orphans {
            tracing::warn!(path = path.as_str(), "discarding change not made through the store");
        }
        self.engine
            .reset_files(Some(&orphans))
            .await
            .map_err(|e| self.vcs(e))?;
        self.prune_known();
        Ok(orphans)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Synchronize with the remote, then notify managers.
    pub async fn synchronize(&self) -> Result<SyncReport, StoreError> {
        let _write = self.begin_write().await?;
        let report = self.engine.synchronize().await.map_err(|e| self.vcs(e))?;
        self.prune_known();
        self.managers
            .synchronized_all(&self.context(), &report)
            .await;
        Ok(report)
    }
}

impl<B: VcsBackend, C: Codec, F: FilesystemWrapper> std::fmt::Debug for DocumentStore<B, C, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("root", &self.fs.root())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
