//! The handle-based engine surface.
//!
//! Every resource lives in a registry keyed by opaque [`NativeHandle`]s. Calls
//! resolve the handle under the registry lock, clone out what they need, and
//! do the actual work after the lock is released.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indexmap::IndexMap;
use native_handle_tree::{NativeHandle, StructuralVersion};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{
   EngineResult, busy, detached, durability_mismatch, invalid_handle, no_transaction, not_found,
   out_of_range, read_only, wrong_kind,
};
use crate::fault::{FaultPlan, FaultPoint};
use crate::schema::{ColumnSpec, TableData};
use crate::storage::{Durability, Snapshot, Storage};
use crate::value::{ColumnType, Value};

/// Kind of resource a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
   Session,
   Group,
   Table,
   View,
   Spec,
}

impl fmt::Display for ResourceKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         ResourceKind::Session => "session",
         ResourceKind::Group => "group",
         ResourceKind::Table => "table",
         ResourceKind::View => "view",
         ResourceKind::Spec => "spec",
      };
      f.write_str(name)
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
   /// Standalone group, always writable, never ends
   Free,
   Read,
   Write,
}

struct SessionRes {
   storage: Arc<Storage>,
   last_seen: AtomicU64,
}

struct GroupRes {
   kind: GroupKind,
   session: Option<Arc<SessionRes>>,
   tables: Mutex<IndexMap<String, Arc<RwLock<TableData>>>>,
   ended: AtomicBool,
}

impl GroupRes {
   fn new(kind: GroupKind, session: Option<Arc<SessionRes>>, snapshot: &Snapshot) -> Self {
      let tables = snapshot
         .tables
         .iter()
         .map(|(name, data)| (name.clone(), Arc::new(RwLock::new(data.clone()))))
         .collect();

      Self {
         kind,
         session,
         tables: Mutex::new(tables),
         ended: AtomicBool::new(false),
      }
   }

   fn is_writable(&self) -> bool {
      self.kind != GroupKind::Read
   }

   fn is_ended(&self) -> bool {
      self.ended.load(Ordering::Acquire)
   }

   /// Ends the group, giving up the storage's write slot if it held it.
   /// Returns whether the group was still open.
   fn end(&self) -> bool {
      if self.ended.swap(true, Ordering::AcqRel) {
         return false;
      }
      if self.kind == GroupKind::Write
         && let Some(session) = &self.session
      {
         session.storage.end_write();
      }
      true
   }

   fn freeze(&self) -> Snapshot {
      let tables = self
         .tables
         .lock()
         .iter()
         .map(|(name, data)| (name.clone(), data.read().clone()))
         .collect();
      Snapshot { tables }
   }
}

struct TableRes {
   group: Arc<GroupRes>,
   name: String,
   data: Arc<RwLock<TableData>>,
}

struct ViewRes {
   table: Arc<TableRes>,
   rows: Vec<usize>,
}

impl ViewRes {
   fn source_row(&self, index: usize) -> EngineResult<usize> {
      self
         .rows
         .get(index)
         .copied()
         .ok_or_else(|| out_of_range("view row", index, self.rows.len()))
   }
}

#[derive(Clone)]
enum Resource {
   Session(Arc<SessionRes>),
   Group(Arc<GroupRes>),
   Table(Arc<TableRes>),
   View(Arc<ViewRes>),
   Spec(Arc<TableRes>),
}

impl Resource {
   fn kind(&self) -> ResourceKind {
      match self {
         Resource::Session(_) => ResourceKind::Session,
         Resource::Group(_) => ResourceKind::Group,
         Resource::Table(_) => ResourceKind::Table,
         Resource::View(_) => ResourceKind::View,
         Resource::Spec(_) => ResourceKind::Spec,
      }
   }
}

struct Registry {
   entries: HashMap<usize, Resource>,
   next_id: usize,
}

impl Registry {
   fn new() -> Self {
      Self {
         entries: HashMap::new(),
         next_id: 1,
      }
   }

   fn insert(&mut self, resource: Resource) -> NativeHandle {
      let id = self.next_id;
      self.next_id += 1;
      self.entries.insert(id, resource);
      NativeHandle::from_raw(id)
   }
}

/// In-process table engine reached only through opaque handles.
///
/// Resources are created by `open_*`, `begin_*`, `group_table`,
/// `table_find_all` and `table_spec`, operated on through the other calls, and
/// freed exactly once through [`TableEngine::destroy`].
pub struct TableEngine {
   registry: Mutex<Registry>,
   storages: Mutex<HashMap<PathBuf, Arc<Storage>>>,
   faults: FaultPlan,
}

impl Default for TableEngine {
   fn default() -> Self {
      Self::new()
   }
}

impl TableEngine {
   pub fn new() -> Self {
      Self {
         registry: Mutex::new(Registry::new()),
         storages: Mutex::new(HashMap::new()),
         faults: FaultPlan::default(),
      }
   }

   // ------------------------------------------------------------------------
   // Create
   // ------------------------------------------------------------------------

   /// Opens a session on the storage at `path`, creating the storage unless
   /// `no_create` is set. Sessions on the same path share committed state.
   ///
   /// Once a storage is open, every later session on its path must ask for
   /// the same durability.
   pub fn open_session(
      &self,
      path: &Path,
      durability: Durability,
      no_create: bool,
   ) -> EngineResult<NativeHandle> {
      let storage = {
         let mut storages = self.storages.lock();
         match storages.get(path) {
            Some(storage) if storage.durability() != durability => {
               return Err(durability_mismatch(path, storage.durability(), durability));
            }
            Some(storage) => Arc::clone(storage),
            None => {
               let storage = Arc::new(Storage::open(path, durability, no_create)?);
               storages.insert(path.to_path_buf(), Arc::clone(&storage));
               storage
            }
         }
      };

      let session = SessionRes {
         last_seen: AtomicU64::new(storage.version()),
         storage,
      };
      let handle = self.insert(Resource::Session(Arc::new(session)));
      trace!(%handle, path = %path.display(), "Opened session");
      Ok(handle)
   }

   /// Creates a standalone, writable group with no backing storage.
   pub fn open_group(&self) -> EngineResult<NativeHandle> {
      let group = GroupRes::new(GroupKind::Free, None, &Snapshot::default());
      Ok(self.insert(Resource::Group(Arc::new(group))))
   }

   pub fn begin_read(&self, session: NativeHandle) -> EngineResult<NativeHandle> {
      self.faults.check(FaultPoint::BeginRead)?;
      let session = self.session(session)?;

      let (snapshot, version) = session.storage.snapshot();
      session.last_seen.store(version, Ordering::Release);

      let group = GroupRes::new(GroupKind::Read, Some(session), &snapshot);
      let handle = self.insert(Resource::Group(Arc::new(group)));
      debug!(%handle, version, "Began read group");
      Ok(handle)
   }

   pub fn begin_write(&self, session: NativeHandle) -> EngineResult<NativeHandle> {
      self.faults.check(FaultPoint::BeginWrite)?;
      let session = self.session(session)?;

      if !session.storage.try_begin_write() {
         return Err(busy());
      }

      let (snapshot, version) = session.storage.snapshot();
      session.last_seen.store(version, Ordering::Release);

      let group = GroupRes::new(GroupKind::Write, Some(session), &snapshot);
      let handle = self.insert(Resource::Group(Arc::new(group)));
      debug!(%handle, version, "Began write group");
      Ok(handle)
   }

   /// Returns a handle to the named table, creating it when `create` is set
   /// and the group is writable.
   pub fn group_table(
      &self,
      group: NativeHandle,
      name: &str,
      create: bool,
   ) -> EngineResult<NativeHandle> {
      let group_res = self.group(group)?;

      let data = {
         let mut tables = group_res.tables.lock();
         match tables.get(name) {
            Some(data) => Arc::clone(data),
            None if !create => return Err(not_found(format!("table '{name}'"))),
            None if !group_res.is_writable() => return Err(read_only("create a table")),
            None => {
               let data = Arc::new(RwLock::new(TableData::default()));
               tables.insert(name.to_string(), Arc::clone(&data));
               data
            }
         }
      };

      let table = TableRes {
         group: group_res,
         name: name.to_string(),
         data,
      };
      Ok(self.insert(Resource::Table(Arc::new(table))))
   }

   /// Creates a view over the rows of `table` whose `column` equals `value`.
   pub fn table_find_all(
      &self,
      table: NativeHandle,
      column: usize,
      value: &Value,
   ) -> EngineResult<NativeHandle> {
      let table_res = self.table(table)?;
      let rows = table_res.data.read().find_all(column, value)?;
      let view = ViewRes {
         table: table_res,
         rows,
      };
      Ok(self.insert(Resource::View(Arc::new(view))))
   }

   pub fn table_spec(&self, table: NativeHandle) -> EngineResult<NativeHandle> {
      let table_res = self.table(table)?;
      Ok(self.insert(Resource::Spec(table_res)))
   }

   // ------------------------------------------------------------------------
   // Destroy
   // ------------------------------------------------------------------------

   /// Frees a resource. An open write group gives up the storage's write
   /// slot without publishing anything.
   pub fn destroy(&self, handle: NativeHandle) -> EngineResult<()> {
      if self.faults.trip(FaultPoint::DestroyPanic) {
         panic!("injected panic while destroying {handle}");
      }
      self.faults.check(FaultPoint::Destroy)?;

      let resource = self
         .registry
         .lock()
         .entries
         .remove(&handle.as_raw())
         .ok_or_else(|| invalid_handle(handle))?;

      if let Resource::Group(group) = &resource
         && group.end()
      {
         debug!(%handle, "Destroyed open group, changes discarded");
      }

      trace!(%handle, kind = %resource.kind(), "Destroyed resource");
      Ok(())
   }

   // ------------------------------------------------------------------------
   // Operate: sessions and groups
   // ------------------------------------------------------------------------

   /// Publishes a write group's changes and ends the group.
   ///
   /// On failure the group stays open and keeps the write slot until it is
   /// rolled back or destroyed.
   pub fn commit(&self, group: NativeHandle) -> EngineResult<()> {
      let group_res = self.group(group)?;
      match group_res.kind {
         GroupKind::Write => {}
         GroupKind::Read => return Err(read_only("commit")),
         GroupKind::Free => return Err(no_transaction(group)),
      }
      self.faults.check(FaultPoint::Commit)?;

      let session = group_res
         .session
         .as_ref()
         .ok_or_else(|| invalid_handle(group))?;
      let version = session.storage.publish(group_res.freeze())?;
      session.last_seen.store(version, Ordering::Release);
      group_res.end();

      debug!(handle = %group, version, "Committed write group");
      Ok(())
   }

   /// Ends a read or write group without publishing anything.
   pub fn rollback(&self, group: NativeHandle) -> EngineResult<()> {
      let group_res = self.group(group)?;
      if group_res.kind == GroupKind::Free {
         return Err(no_transaction(group));
      }
      self.faults.check(FaultPoint::Rollback)?;

      group_res.end();
      debug!(handle = %group, kind = ?group_res.kind, "Rolled back group");
      Ok(())
   }

   /// Whether another session committed since this session last began or
   /// committed a transaction.
   pub fn has_changed(&self, session: NativeHandle) -> EngineResult<bool> {
      let session = self.session(session)?;
      Ok(session.storage.version() != session.last_seen.load(Ordering::Acquire))
   }

   pub fn group_has_table(&self, group: NativeHandle, name: &str) -> EngineResult<bool> {
      Ok(self.group(group)?.tables.lock().contains_key(name))
   }

   pub fn group_table_count(&self, group: NativeHandle) -> EngineResult<usize> {
      Ok(self.group(group)?.tables.lock().len())
   }

   pub fn group_table_names(&self, group: NativeHandle) -> EngineResult<Vec<String>> {
      Ok(self.group(group)?.tables.lock().keys().cloned().collect())
   }

   // ------------------------------------------------------------------------
   // Operate: tables
   // ------------------------------------------------------------------------

   pub fn table_name(&self, table: NativeHandle) -> EngineResult<String> {
      Ok(self.table(table)?.name.clone())
   }

   /// Shared structural version counter of the table.
   pub fn table_version(&self, table: NativeHandle) -> EngineResult<StructuralVersion> {
      Ok(self.table(table)?.data.read().version().clone())
   }

   pub fn table_column_count(&self, table: NativeHandle) -> EngineResult<usize> {
      Ok(self.table(table)?.data.read().columns().len())
   }

   pub fn table_column(&self, table: NativeHandle, column: usize) -> EngineResult<ColumnSpec> {
      self.table(table)?.data.read().column(column).cloned()
   }

   pub fn table_column_index(&self, table: NativeHandle, name: &str) -> EngineResult<usize> {
      self.table(table)?.data.read().column_index(name)
   }

   pub fn table_add_column(
      &self,
      table: NativeHandle,
      name: &str,
      column_type: ColumnType,
   ) -> EngineResult<usize> {
      let table_res = self.writable_table(table, "add a column")?;
      table_res.data.write().add_column(name, column_type)
   }

   pub fn table_size(&self, table: NativeHandle) -> EngineResult<usize> {
      Ok(self.table(table)?.data.read().len())
   }

   pub fn table_add_empty_row(&self, table: NativeHandle) -> EngineResult<usize> {
      let table_res = self.writable_table(table, "add a row")?;
      let row = table_res.data.write().add_empty_row();
      Ok(row)
   }

   pub fn table_remove_row(&self, table: NativeHandle, row: usize) -> EngineResult<()> {
      let table_res = self.writable_table(table, "remove a row")?;
      table_res.data.write().remove_row(row)
   }

   pub fn table_clear(&self, table: NativeHandle) -> EngineResult<()> {
      let table_res = self.writable_table(table, "clear a table")?;
      table_res.data.write().clear();
      Ok(())
   }

   pub fn table_get(&self, table: NativeHandle, row: usize, column: usize) -> EngineResult<Value> {
      self.table(table)?.data.read().get(row, column)
   }

   pub fn table_set(
      &self,
      table: NativeHandle,
      row: usize,
      column: usize,
      value: Value,
   ) -> EngineResult<()> {
      let table_res = self.writable_table(table, "set a value")?;
      table_res.data.write().set(row, column, value)
   }

   // ------------------------------------------------------------------------
   // Operate: views and specs
   // ------------------------------------------------------------------------

   pub fn view_size(&self, view: NativeHandle) -> EngineResult<usize> {
      Ok(self.view(view)?.rows.len())
   }

   /// Position in the source table of the view's `index`-th row.
   pub fn view_source_index(&self, view: NativeHandle, index: usize) -> EngineResult<usize> {
      self.view(view)?.source_row(index)
   }

   pub fn view_get(&self, view: NativeHandle, index: usize, column: usize) -> EngineResult<Value> {
      let view_res = self.view(view)?;
      let row = view_res.source_row(index)?;
      view_res.table.data.read().get(row, column)
   }

   pub fn view_set(
      &self,
      view: NativeHandle,
      index: usize,
      column: usize,
      value: Value,
   ) -> EngineResult<()> {
      let view_res = self.view(view)?;
      if !view_res.table.group.is_writable() {
         return Err(read_only("set a value"));
      }
      let row = view_res.source_row(index)?;
      view_res.table.data.write().set(row, column, value)
   }

   pub fn spec_column_count(&self, spec: NativeHandle) -> EngineResult<usize> {
      Ok(self.spec(spec)?.data.read().columns().len())
   }

   pub fn spec_column(&self, spec: NativeHandle, column: usize) -> EngineResult<ColumnSpec> {
      self.spec(spec)?.data.read().column(column).cloned()
   }

   // ------------------------------------------------------------------------
   // Introspection and fault injection
   // ------------------------------------------------------------------------

   /// Number of handles that have been created and not yet destroyed.
   pub fn live_handles(&self) -> usize {
      self.registry.lock().entries.len()
   }

   pub fn live_handles_of(&self, kind: ResourceKind) -> usize {
      self
         .registry
         .lock()
         .entries
         .values()
         .filter(|resource| resource.kind() == kind)
         .count()
   }

   /// Makes the next `times` calls at `point` fail. `times == 0` disarms.
   pub fn inject_fault(&self, point: FaultPoint, times: u32) {
      self.faults.arm(point, times);
   }

   pub fn clear_faults(&self) {
      self.faults.clear();
   }

   // ------------------------------------------------------------------------
   // Handle resolution
   // ------------------------------------------------------------------------

   fn insert(&self, resource: Resource) -> NativeHandle {
      self.registry.lock().insert(resource)
   }

   fn resolve(&self, handle: NativeHandle) -> EngineResult<Resource> {
      self
         .registry
         .lock()
         .entries
         .get(&handle.as_raw())
         .cloned()
         .ok_or_else(|| invalid_handle(handle))
   }

   fn session(&self, handle: NativeHandle) -> EngineResult<Arc<SessionRes>> {
      match self.resolve(handle)? {
         Resource::Session(session) => Ok(session),
         other => Err(wrong_kind(handle, ResourceKind::Session, other.kind())),
      }
   }

   fn group(&self, handle: NativeHandle) -> EngineResult<Arc<GroupRes>> {
      match self.resolve(handle)? {
         Resource::Group(group) if group.is_ended() => Err(detached(handle)),
         Resource::Group(group) => Ok(group),
         other => Err(wrong_kind(handle, ResourceKind::Group, other.kind())),
      }
   }

   fn table(&self, handle: NativeHandle) -> EngineResult<Arc<TableRes>> {
      match self.resolve(handle)? {
         Resource::Table(table) if table.group.is_ended() => Err(detached(handle)),
         Resource::Table(table) => Ok(table),
         other => Err(wrong_kind(handle, ResourceKind::Table, other.kind())),
      }
   }

   fn writable_table(&self, handle: NativeHandle, what: &str) -> EngineResult<Arc<TableRes>> {
      let table = self.table(handle)?;
      if !table.group.is_writable() {
         return Err(read_only(what));
      }
      Ok(table)
   }

   fn view(&self, handle: NativeHandle) -> EngineResult<Arc<ViewRes>> {
      match self.resolve(handle)? {
         Resource::View(view) if view.table.group.is_ended() => Err(detached(handle)),
         Resource::View(view) => Ok(view),
         other => Err(wrong_kind(handle, ResourceKind::View, other.kind())),
      }
   }

   fn spec(&self, handle: NativeHandle) -> EngineResult<Arc<TableRes>> {
      match self.resolve(handle)? {
         Resource::Spec(table) if table.group.is_ended() => Err(detached(handle)),
         Resource::Spec(table) => Ok(table),
         other => Err(wrong_kind(handle, ResourceKind::Spec, other.kind())),
      }
   }
}
