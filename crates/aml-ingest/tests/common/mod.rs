//! Shared doubles and fixtures for the pipeline integration tests.
#![allow(dead_code)]

use aml_common::MediaFile;
use aml_ingest::config::IngestConfig;
use aml_ingest::db::{Database, UnitOfWork};
use aml_ingest::error::{IngestError, Result};
use aml_ingest::ingest::Pipeline;
use aml_ingest::models::{
    Content, EntityBatch, EntryKind, Failure, NewStagedRow, Process, ProcessStatus, Question,
    ReferenceData, ReferenceItem, RowStatus, StageFilter, StagedRow,
};
use aml_ingest::storage::{BlobTransport, ObjectStore};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use zip::write::SimpleFileOptions;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("aml_ingest=debug")
        .with_test_writer()
        .try_init();
}

// ============================================================================
// In-memory database
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DbState {
    pub processes: Vec<Process>,
    pub staged: BTreeMap<EntryKind, Vec<StagedRow>>,
    pub entities: Vec<EntityBatch>,
    pub reference: ReferenceData,
    /// Every status each process has been in, in order.
    pub history: BTreeMap<String, Vec<ProcessStatus>>,
    pub fail_stage_inserts: bool,
    pub fail_entity_inserts: bool,
}

/// A `Database` whose units of work copy the state on `begin` and write
/// back the rows of the processes they touched on `commit`.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DbState>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        let db = Self::default();
        db.state().reference = reference_data();
        db
    }

    fn state(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap()
    }

    pub fn add_process(&self, process_id: &str, file_name: &str) -> Process {
        let mut state = self.state();
        let offset = state.processes.len() as i64;
        let created_at = Utc::now() + ChronoDuration::milliseconds(offset);
        let process = Process {
            id: offset + 1,
            process_id: process_id.to_string(),
            file_name: file_name.to_string(),
            description: None,
            status: ProcessStatus::Open,
            error_status: None,
            error_message: None,
            is_active: true,
            created_by: "tester".to_string(),
            updated_by: None,
            created_at,
            updated_at: created_at,
        };
        state.processes.push(process.clone());
        state
            .history
            .insert(process_id.to_string(), vec![ProcessStatus::Open]);
        process
    }

    pub fn process(&self, process_id: &str) -> Process {
        self.state()
            .processes
            .iter()
            .find(|p| p.process_id == process_id)
            .cloned()
            .unwrap()
    }

    pub fn history(&self, process_id: &str) -> Vec<ProcessStatus> {
        self.state().history.get(process_id).cloned().unwrap_or_default()
    }

    pub fn staged(&self, kind: EntryKind) -> Vec<StagedRow> {
        self.state().staged.get(&kind).cloned().unwrap_or_default()
    }

    pub fn entities(&self) -> Vec<EntityBatch> {
        self.state().entities.clone()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.entities()
            .into_iter()
            .flat_map(|batch| match batch {
                EntityBatch::Questions(questions) => questions,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn contents(&self) -> Vec<Content> {
        self.entities()
            .into_iter()
            .flat_map(|batch| match batch {
                EntityBatch::Contents(contents) => contents,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn fail_stage_inserts(&self) {
        self.state().fail_stage_inserts = true;
    }

    pub fn fail_entity_inserts(&self) {
        self.state().fail_entity_inserts = true;
    }

    /// Write staged rows directly, outside any process run.
    pub fn seed_staged(&self, kind: EntryKind, rows: Vec<NewStagedRow>) -> Vec<StagedRow> {
        let staged: Vec<StagedRow> = rows
            .into_iter()
            .map(|row| row.into_staged(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
            .collect();
        self.state()
            .staged
            .entry(kind)
            .or_default()
            .extend(staged.iter().cloned());
        staged
    }
}

fn reference_data() -> ReferenceData {
    let mut data = ReferenceData::default();
    data.tenants.push(ReferenceItem::new("tenant-1", "Ekstep"));
    data.boards.push(ReferenceItem::new("board-1", "CBSE"));
    data.classes.push(ReferenceItem::new("class-3", "Class 3"));
    data.skills.push(ReferenceItem::new("skill-add", "Addition"));
    data.skills.push(ReferenceItem::new("skill-div", "Division"));
    data.skills.push(ReferenceItem::new("skill-carry", "Carry over"));
    data.sub_skills.push(ReferenceItem::new("sub-1", "Two digit"));
    data.repositories.push(ReferenceItem::new("repo-1", "Core"));
    data
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let working = self.state().clone();
        Ok(Box::new(MemoryUnitOfWork {
            shared: self.state.clone(),
            next_id: self.next_id.clone(),
            working: Some(working),
            touched: BTreeSet::new(),
            new_entities: Vec::new(),
        }))
    }

    async fn open_processes(&self) -> Result<Vec<Process>> {
        let mut open: Vec<Process> = self
            .state()
            .processes
            .iter()
            .filter(|p| p.is_active && p.status == ProcessStatus::Open)
            .cloned()
            .collect();
        open.sort_by_key(|p| p.created_at);
        Ok(open)
    }

    async fn find_process(&self, process_id: &str) -> Result<Option<Process>> {
        Ok(self
            .state()
            .processes
            .iter()
            .find(|p| p.process_id == process_id)
            .cloned())
    }

    async fn transition_process(
        &self,
        process_id: &str,
        from: &[ProcessStatus],
        to: ProcessStatus,
        failure: Option<&Failure>,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(process) = state
            .processes
            .iter_mut()
            .find(|p| p.process_id == process_id && from.contains(&p.status))
        else {
            return Ok(false);
        };

        process.status = to;
        if let Some(failure) = failure {
            process.error_status = Some(failure.status.as_str().to_string());
            process.error_message = Some(failure.message.clone());
        }
        process.updated_by = Some("system".to_string());
        process.updated_at = Utc::now();

        state
            .history
            .entry(process_id.to_string())
            .or_default()
            .push(to);
        Ok(true)
    }

    async fn reference_data(&self) -> Result<ReferenceData> {
        Ok(self.state().reference.clone())
    }
}

pub struct MemoryUnitOfWork {
    shared: Arc<Mutex<DbState>>,
    next_id: Arc<AtomicI64>,
    working: Option<DbState>,
    touched: BTreeSet<String>,
    new_entities: Vec<EntityBatch>,
}

impl MemoryUnitOfWork {
    fn working(&mut self) -> Result<&mut DbState> {
        self.working.as_mut().ok_or(IngestError::TransactionClosed)
    }

    fn find_row(&mut self, kind: EntryKind, id: i64) -> Result<Option<&mut StagedRow>> {
        Ok(self
            .working()?
            .staged
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|row| row.id == id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_staged(&mut self, kind: EntryKind, rows: &[NewStagedRow]) -> Result<Vec<StagedRow>> {
        if self.working()?.fail_stage_inserts {
            return Err(IngestError::Storage("simulated staging failure".to_string()));
        }

        let staged: Vec<StagedRow> = rows
            .iter()
            .cloned()
            .map(|row| row.into_staged(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
            .collect();
        for row in &staged {
            self.touched.insert(row.process_id.clone());
        }
        self.working()?
            .staged
            .entry(kind)
            .or_default()
            .extend(staged.iter().cloned());
        Ok(staged)
    }

    async fn staged_rows(&mut self, kind: EntryKind, filter: &StageFilter) -> Result<Vec<StagedRow>> {
        let mut rows: Vec<StagedRow> = self
            .working()?
            .staged
            .get(&kind)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by_key(|row| row.row_index);
        Ok(rows)
    }

    async fn mark_staged(
        &mut self,
        kind: EntryKind,
        ids: &[i64],
        status: RowStatus,
        error_info: Option<&str>,
    ) -> Result<u64> {
        let mut updated = 0;
        for id in ids {
            let process_id = match self.find_row(kind, *id)? {
                Some(row) => {
                    row.status = status;
                    row.error_info = error_info.map(str::to_string);
                    row.process_id.clone()
                },
                None => continue,
            };
            self.touched.insert(process_id);
            updated += 1;
        }
        Ok(updated)
    }

    async fn set_staged_media(&mut self, kind: EntryKind, id: i64, media: &[MediaFile]) -> Result<()> {
        let process_id = match self.find_row(kind, id)? {
            Some(row) => {
                row.media_files = media.to_vec();
                row.process_id.clone()
            },
            None => return Ok(()),
        };
        self.touched.insert(process_id);
        Ok(())
    }

    async fn delete_staged(&mut self, kind: EntryKind, process_id: &str) -> Result<u64> {
        let rows = self.working()?.staged.entry(kind).or_default();
        let before = rows.len();
        rows.retain(|row| row.process_id != process_id);
        let deleted = (before - rows.len()) as u64;
        self.touched.insert(process_id.to_string());
        Ok(deleted)
    }

    async fn insert_entities(&mut self, batch: &EntityBatch) -> Result<u64> {
        if self.working()?.fail_entity_inserts {
            return Err(IngestError::Storage("simulated entity failure".to_string()));
        }
        self.new_entities.push(batch.clone());
        Ok(batch.len() as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        let working = self.working.take().ok_or(IngestError::TransactionClosed)?;
        let mut shared = self.shared.lock().unwrap();

        for kind in EntryKind::ALL {
            let rows = shared.staged.entry(kind).or_default();
            rows.retain(|row| !self.touched.contains(&row.process_id));
            if let Some(written) = working.staged.get(&kind) {
                rows.extend(
                    written
                        .iter()
                        .filter(|row| self.touched.contains(&row.process_id))
                        .cloned(),
                );
            }
            rows.sort_by_key(|row| row.id);
        }
        shared.entities.append(&mut self.new_entities);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working.take().ok_or(IngestError::TransactionClosed)?;
        self.new_entities.clear();
        Ok(())
    }
}

// ============================================================================
// In-memory object store and transport
// ============================================================================

const GET_SCHEME: &str = "memory://get/";
const PUT_SCHEME: &str = "memory://put/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub key: String,
    pub content_type: String,
    pub bytes: usize,
}

/// Object store and blob transport over one map of keys to bytes.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<StoredUpload>>,
    /// Delay applied to every download.
    get_delay: Mutex<Option<Duration>>,
    /// Panic while downloading keys containing this text.
    panic_on: Mutex<Option<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn uploads(&self) -> Vec<StoredUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// Uploads whose key starts with `prefix`.
    pub fn uploads_under(&self, prefix: &str) -> Vec<StoredUpload> {
        self.uploads()
            .into_iter()
            .filter(|upload| upload.key.starts_with(prefix))
            .collect()
    }

    /// Stored object at `key` as text.
    pub fn object_text(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    pub fn panic_on(&self, key_fragment: &str) {
        *self.panic_on.lock().unwrap() = Some(key_fragment.to_string());
    }

    /// Highest number of downloads running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_folder(&self, prefix: &str) -> Result<Vec<String>> {
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(&folder))
            .cloned()
            .collect())
    }

    async fn signed_retrieval_url(&self, key: &str, _ttl: Duration) -> Result<String> {
        Ok(format!("{}{}", GET_SCHEME, key))
    }

    async fn signed_upload_url(&self, key: &str, _ttl: Duration) -> Result<String> {
        Ok(format!("{}{}", PUT_SCHEME, key))
    }
}

#[async_trait]
impl BlobTransport for MemoryStore {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let key = url
            .strip_prefix(GET_SCHEME)
            .ok_or_else(|| IngestError::Storage(format!("not a retrieval url: {}", url)))?;

        let panic_on = self.panic_on.lock().unwrap().clone();
        if let Some(fragment) = panic_on {
            if key.contains(&fragment) {
                panic!("simulated transport panic for {}", key);
            }
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| IngestError::Storage(format!("no object at {}", key)))
    }

    async fn put(&self, url: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let key = url
            .strip_prefix(PUT_SCHEME)
            .ok_or_else(|| IngestError::Storage(format!("not an upload url: {}", url)))?;
        self.uploads.lock().unwrap().push(StoredUpload {
            key: key.to_string(),
            content_type: content_type.to_string(),
            bytes: data.len(),
        });
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const QUESTION_HEADER: &str = "QID,question_set_id,question_type,L1_skill,L2_skill,board,class,title,n1,n2,grid1_pre_fills_top,grid1_pre_fills_result,media_file,benchmark_time";

pub const QUESTION_SET_HEADER: &str = "question_set_id,title,board,class,L1_skill,sequence";

pub const CONTENT_HEADER: &str = "content_id,title,L1_skill,media_file";

pub fn question_set(set: &str) -> String {
    format!("{},Set {},CBSE,Class 3,Addition,1", set, set)
}

/// A content row matching [`CONTENT_HEADER`].
pub fn content(content_id: &str, media: &str) -> String {
    format!("{},Intro {},Addition,{}", content_id, content_id, media)
}

/// A `Grid-1` addition row matching [`QUESTION_HEADER`].
pub fn add_question(qid: &str, set: &str, media: &str) -> String {
    format!(
        "{},{},Grid-1,Addition,Carry over,CBSE,Class 3,Add {},12,34,1,46,{},60",
        qid, set, qid, media
    )
}

pub fn sheet(header: &str, rows: &[String]) -> Vec<u8> {
    let mut text = header.to_string();
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text.into_bytes()
}

/// Build a ZIP archive. A `None` body adds a directory entry.
pub fn zip_archive(entries: &[(&str, Option<Vec<u8>>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (name, body) in entries {
        match body {
            Some(body) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body).unwrap();
            },
            None => {
                writer.add_directory(*name, options).unwrap();
            },
        }
    }

    writer.finish().unwrap().into_inner()
}

pub fn template_archive() -> Vec<u8> {
    zip_archive(&[
        ("questions.csv", Some(sheet(QUESTION_HEADER, &[]))),
        ("question_sets.csv", Some(sheet(QUESTION_SET_HEADER, &[]))),
        ("contents.csv", Some(sheet(CONTENT_HEADER, &[]))),
    ])
}

pub fn test_config() -> IngestConfig {
    IngestConfig {
        poll_interval_secs: 1,
        max_concurrent_processes: 2,
        process_timeout_secs: 5,
        ..IngestConfig::default()
    }
}

/// A pipeline over fresh in-memory doubles with the template uploaded.
pub struct Harness {
    pub db: MemoryDatabase,
    pub store: Arc<MemoryStore>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: IngestConfig) -> Self {
        let template_key = format!("{}/{}", config.template_folder, config.template_file_name);
        let harness = Self::without_template(config);
        harness.store.put_object(&template_key, template_archive());
        harness
    }

    pub fn without_template(config: IngestConfig) -> Self {
        let db = MemoryDatabase::new();
        let store = Arc::new(MemoryStore::new());

        let pipeline = Arc::new(Pipeline::new(
            Arc::new(db.clone()),
            store.clone(),
            store.clone(),
            Arc::new(config),
        ));

        Self { db, store, pipeline }
    }

    /// Register an open process and upload its archive.
    pub fn upload(&self, process_id: &str, file_name: &str, archive: Vec<u8>) -> Process {
        self.store
            .put_object(&format!("upload/{}/{}", process_id, file_name), archive);
        self.db.add_process(process_id, file_name)
    }
}
