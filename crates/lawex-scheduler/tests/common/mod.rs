//! In-memory collaborators shared by the scheduler integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::json;

use lawex_scheduler::{
    BoxError, CHECKPOINT_BLOB, CheckpointMarker, CheckpointStore, Destination, ExportScheduler,
    ExportStorage, QueryExecutor, QueryFailure, QueryResult, ResultColumn, ResultTable,
    SchedulerSettings, StagingArea, WindowPolicy, reference_offset,
};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
    reference_offset()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
}

pub fn dest(account: &str, container: &str) -> Destination {
    Destination {
        account: account.to_string(),
        container: container.to_string(),
    }
}

/// Blob storage kept in a map, with injectable failures.
#[derive(Default)]
pub struct MemoryStorage {
    containers: Mutex<HashSet<Destination>>,
    blobs: Mutex<HashMap<(Destination, String), Vec<u8>>>,
    creates: Mutex<usize>,
    fail_provisioning: Mutex<HashSet<String>>,
    fail_uploads: Mutex<HashSet<String>>,
    fail_checkpoint_reads: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_marker(&self, destination: &Destination, raw: &str) {
        self.blobs.lock().unwrap().insert(
            (destination.clone(), CHECKPOINT_BLOB.to_string()),
            raw.as_bytes().to_vec(),
        );
    }

    pub fn marker(&self, destination: &Destination) -> Option<String> {
        self.blob(destination, CHECKPOINT_BLOB)
            .map(|b| String::from_utf8(b).unwrap())
    }

    pub fn blob(&self, destination: &Destination, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(destination.clone(), name.to_string()))
            .cloned()
    }

    /// Names of all non-checkpoint blobs in a container.
    pub fn export_blobs(&self, destination: &Destination) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|(d, name)| d == destination && name != CHECKPOINT_BLOB)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_container(&self, destination: &Destination) -> bool {
        self.containers.lock().unwrap().contains(destination)
    }

    pub fn creates(&self) -> usize {
        *self.creates.lock().unwrap()
    }

    pub fn fail_provisioning_of(&self, container: &str) {
        self.fail_provisioning
            .lock()
            .unwrap()
            .insert(container.to_string());
    }

    pub fn fail_uploads_to(&self, container: &str) {
        self.fail_uploads.lock().unwrap().insert(container.to_string());
    }

    pub fn fail_checkpoint_reads_of(&self, container: &str) {
        self.fail_checkpoint_reads
            .lock()
            .unwrap()
            .insert(container.to_string());
    }
}

#[async_trait]
impl ExportStorage for MemoryStorage {
    async fn ensure_container(&self, destination: &Destination) -> Result<(), BoxError> {
        if self
            .fail_provisioning
            .lock()
            .unwrap()
            .contains(&destination.container)
        {
            return Err("storage account unreachable".into());
        }

        let mut containers = self.containers.lock().unwrap();
        if !containers.contains(destination) {
            containers.insert(destination.clone());
            *self.creates.lock().unwrap() += 1;
        }
        Ok(())
    }

    async fn upload(
        &self,
        destination: &Destination,
        blob: &str,
        data: Vec<u8>,
    ) -> Result<(), BoxError> {
        if self
            .fail_uploads
            .lock()
            .unwrap()
            .contains(&destination.container)
        {
            return Err("upload rejected".into());
        }
        if !self.has_container(destination) {
            return Err(format!("container {} does not exist", destination).into());
        }

        self.blobs
            .lock()
            .unwrap()
            .insert((destination.clone(), blob.to_string()), data);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStorage {
    async fn read(&self, destination: &Destination) -> Result<Option<String>, BoxError> {
        if self
            .fail_checkpoint_reads
            .lock()
            .unwrap()
            .contains(&destination.container)
        {
            return Err("checkpoint read timed out".into());
        }
        Ok(self.marker(destination))
    }

    async fn write(
        &self,
        destination: &Destination,
        marker: &CheckpointMarker,
    ) -> Result<(), BoxError> {
        self.put_marker(destination, &marker.render());
        Ok(())
    }
}

/// What the fake executor answers for a query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Rows(usize),
    Empty,
    Partial,
    Fail,
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub query: String,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: DateTime<FixedOffset>,
}

/// Executor answering from a script keyed by query text.
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, query: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(query.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn rows(n: usize) -> QueryResult {
    QueryResult {
        tables: vec![ResultTable {
            name: "PrimaryResult".to_string(),
            columns: vec![
                ResultColumn {
                    name: "TimeGenerated".to_string(),
                    column_type: "datetime".to_string(),
                },
                ResultColumn {
                    name: "Count".to_string(),
                    column_type: "long".to_string(),
                },
            ],
            rows: (0..n)
                .map(|i| vec![json!(format!("2024-01-01T09:{:02}:00Z", i)), json!(i)])
                .collect(),
        }],
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        query: &str,
        start: Option<DateTime<FixedOffset>>,
        end: DateTime<FixedOffset>,
    ) -> Result<QueryResult, QueryFailure> {
        self.calls.lock().unwrap().push(Call {
            query: query.to_string(),
            start,
            end,
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or(Reply::Rows(1));

        match reply {
            Reply::Rows(n) => Ok(rows(n)),
            Reply::Empty => Ok(QueryResult::default()),
            Reply::Partial => Err(QueryFailure::Partial {
                message: "query exceeded result size limit".to_string(),
            }),
            Reply::Fail => Err(QueryFailure::failed("workspace returned 500")),
        }
    }
}

/// A scheduler wired to fresh fakes.
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub executor: Arc<ScriptedExecutor>,
    pub scheduler: ExportScheduler,
    _staging: tempfile::TempDir,
}

impl Harness {
    pub fn new(policy: WindowPolicy) -> Self {
        let storage = MemoryStorage::new();
        let executor = ScriptedExecutor::new();
        let staging = tempfile::tempdir().unwrap();

        let scheduler = ExportScheduler::new(
            SchedulerSettings {
                default_account: "sadatat".to_string(),
                subscription_id: "0000-sub".to_string(),
                resource_group: "rg-logs-t".to_string(),
                window_policy: policy,
            },
            storage.clone(),
            storage.clone(),
            executor.clone(),
            StagingArea::new(staging.path()),
        );

        Self {
            storage,
            executor,
            scheduler,
            _staging: staging,
        }
    }

    pub fn incremental() -> Self {
        Self::new(WindowPolicy::incremental())
    }
}
