#![allow(dead_code)]

use rowcast_core::{
    ChangeBus, ChangeRecord, DbResult, Entity, MappingError, QueryDescriptor, RowSnapshot,
    Session, Store, StoreConfig,
};
use std::sync::{Arc, Mutex};

pub const SCHEMA: &str = "
CREATE TABLE files (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    size REAL NOT NULL,
    digest BLOB,
    folder TEXT
);
CREATE TABLE tags (
    file_name TEXT NOT NULL,
    label TEXT NOT NULL,
    PRIMARY KEY (file_name, label)
);
";

/// File metadata row; `id` is generated unless set explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub name: String,
    pub size: f64,
    pub digest: Option<Vec<u8>>,
    pub folder: Option<String>,
}

impl FileRecord {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(id: i64, name: &str) -> Self {
        Self {
            id: Some(id),
            ..Self::named(name)
        }
    }
}

/// Folder context handed to file hooks.
pub struct Folder {
    pub path: String,
}

impl Entity for FileRecord {
    type Parent = Folder;

    fn identity(&self) -> QueryDescriptor {
        match self.id {
            Some(id) => QueryDescriptor::new("files").filter("id = ?", [id.to_string()]),
            None => QueryDescriptor::new("files").filter("name = ?", [self.name.clone()]),
        }
    }

    fn values(&self) -> RowSnapshot {
        let mut row = RowSnapshot::new();
        if let Some(id) = self.id {
            row.put("id", id);
        }
        row.with("name", self.name.clone())
            .with("size", self.size)
            .with("digest", self.digest.clone())
            .with("folder", self.folder.clone())
    }

    fn reconstruct(&mut self, row: &RowSnapshot) -> Result<(), MappingError> {
        self.id = row.opt_i64("id")?;
        self.name = row.text("name")?.to_string();
        self.size = row.f64("size")?;
        self.digest = row.opt_blob("digest")?.map(<[u8]>::to_vec);
        self.folder = row.opt_text("folder")?.map(str::to_string);
        Ok(())
    }

    fn on_create(&mut self, _session: &Session<'_>, parent: Option<&Folder>) -> DbResult<()> {
        if let Some(folder) = parent {
            self.folder = Some(folder.path.clone());
        }
        Ok(())
    }

    fn on_remove(&mut self, session: &Session<'_>, _parent: Option<&Folder>) -> DbResult<()> {
        session.remove_rows(
            &QueryDescriptor::new("tags").filter("file_name = ?", [self.name.clone()]),
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub file_name: String,
    pub label: String,
}

impl Tag {
    pub fn new(file_name: &str, label: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    type Parent = ();

    fn identity(&self) -> QueryDescriptor {
        QueryDescriptor::new("tags").filter(
            "file_name = ? AND label = ?",
            [self.file_name.clone(), self.label.clone()],
        )
    }

    fn values(&self) -> RowSnapshot {
        RowSnapshot::new()
            .with("file_name", self.file_name.clone())
            .with("label", self.label.clone())
    }

    fn reconstruct(&mut self, row: &RowSnapshot) -> Result<(), MappingError> {
        self.file_name = row.text("file_name")?.to_string();
        self.label = row.text("label")?.to_string();
        Ok(())
    }
}

/// Collects every flushed record delivered through a bus.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<ChangeRecord>>>,
}

impl Recorder {
    pub fn attach(bus: &ChangeBus) -> Self {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.seen);
        bus.subscribe(Arc::new(move |record: &ChangeRecord| {
            sink.lock().unwrap().push(record.clone());
        }));
        recorder
    }

    pub fn records(&self) -> Vec<ChangeRecord> {
        self.seen.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

pub fn store_with(config: StoreConfig) -> (Store, Recorder) {
    let bus = ChangeBus::shared();
    let recorder = Recorder::attach(&bus);
    let store = Store::open(config, bus).expect("open test store");
    store.execute_batch(SCHEMA).expect("apply test schema");
    (store, recorder)
}

pub fn store() -> (Store, Recorder) {
    store_with(StoreConfig::in_memory())
}

pub fn count(store: &Store, table: &str) -> usize {
    store
        .query(&QueryDescriptor::new(table))
        .expect("count rows")
        .len()
}
