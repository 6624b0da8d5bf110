//! # Durable request store.
//!
//! Maps `(requester, request_id)` to the requester's [`ScheduleRequest`],
//! partitioned by probe identity on query, and tracks the per-identity
//! last-run timestamps the resolver needs. The whole store survives process
//! restarts.
//!
//! ## Persistence
//! Every mutation rewrites the backing JSON file atomically: serialize,
//! write to a sibling temp file, rename over the target. The request set is
//! small (one row per live request), so whole-file rewrites are cheaper than
//! they look and keep recovery trivial — any file ever observed on disk is a
//! complete, consistent snapshot.
//!
//! ## Rules
//! - Writers are serialized by the store's own mutex, not by callers.
//! - Reads return snapshot copies; no lock is held during resolver work.
//! - A failed write rolls the in-memory view back to the last durable state
//!   and surfaces the error — a request is never silently dropped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::identity::ProbeIdentity;
use crate::requests::request::{RequestKey, ScheduleRequest};

/// In-memory view of the store.
#[derive(Default)]
struct StoreState {
    requests: HashMap<RequestKey, ScheduleRequest>,
    last_runs: HashMap<String, SystemTime>,
}

/// On-disk representation: a flat list plus the last-run table.
#[derive(Default, Serialize, Deserialize)]
struct StoreFile {
    requests: Vec<ScheduleRequest>,
    last_runs: HashMap<String, SystemTime>,
}

/// Durable per-requester schedule request store.
pub struct RequestStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl RequestStore {
    /// Creates a store with no backing file (tests, embedded use).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Opens a store backed by the given file, loading it when present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => {
                let file: StoreFile =
                    serde_json::from_slice(&bytes).map_err(|e| RuntimeError::Persistence {
                        error: format!("{}: {e}", path.display()),
                    })?;
                let mut requests = HashMap::with_capacity(file.requests.len());
                for req in file.requests {
                    requests.insert(req.key(), req);
                }
                StoreState {
                    requests,
                    last_runs: file.last_runs,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(RuntimeError::Persistence {
                    error: format!("{}: {e}", path.display()),
                })
            }
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Inserts or replaces the request under its `(requester, request_id)`
    /// key (last-write-wins) and stamps its submission time.
    pub fn put(&self, mut request: ScheduleRequest) -> Result<(), RuntimeError> {
        request.submitted = Some(SystemTime::now());
        let key = request.key();

        let mut state = self.state.lock().expect("request store poisoned");
        let prev = state.requests.insert(key.clone(), request);
        if let Err(e) = self.persist(&state) {
            match prev {
                Some(prev) => {
                    state.requests.insert(key, prev);
                }
                None => {
                    state.requests.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Removes one request. Returns the removed value, `None` when the key
    /// was not present (nothing is persisted in that case).
    pub fn remove(&self, key: &RequestKey) -> Result<Option<ScheduleRequest>, RuntimeError> {
        let mut state = self.state.lock().expect("request store poisoned");
        let Some(removed) = state.requests.remove(key) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&state) {
            state.requests.insert(key.clone(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Removes every request held by one requester. Returns the removed
    /// requests (their probe identities need rescheduling).
    pub fn remove_requester(
        &self,
        requester: &str,
    ) -> Result<Vec<ScheduleRequest>, RuntimeError> {
        let mut state = self.state.lock().expect("request store poisoned");
        let keys: Vec<RequestKey> = state
            .requests
            .keys()
            .filter(|k| k.requester == requester)
            .cloned()
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(req) = state.requests.remove(key) {
                removed.push(req);
            }
        }
        if let Err(e) = self.persist(&state) {
            for req in removed {
                state.requests.insert(req.key(), req);
            }
            return Err(e);
        }
        Ok(removed)
    }

    /// Returns a snapshot of all outstanding requests for one probe.
    pub fn requests_for(&self, identity: &ProbeIdentity) -> Vec<ScheduleRequest> {
        let state = self.state.lock().expect("request store poisoned");
        state
            .requests
            .values()
            .filter(|r| &r.probe == identity)
            .cloned()
            .collect()
    }

    /// Returns the distinct probe identities with outstanding requests.
    pub fn identities(&self) -> Vec<ProbeIdentity> {
        let state = self.state.lock().expect("request store poisoned");
        let mut out: Vec<ProbeIdentity> = Vec::new();
        for req in state.requests.values() {
            if !out.contains(&req.probe) {
                out.push(req.probe.clone());
            }
        }
        out
    }

    /// Records a run start for one probe identity.
    pub fn record_run(
        &self,
        identity: &ProbeIdentity,
        at: SystemTime,
    ) -> Result<(), RuntimeError> {
        let uri = identity.uri();
        let mut state = self.state.lock().expect("request store poisoned");
        let prev = state.last_runs.insert(uri.clone(), at);
        if let Err(e) = self.persist(&state) {
            match prev {
                Some(prev) => {
                    state.last_runs.insert(uri, prev);
                }
                None => {
                    state.last_runs.remove(&uri);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Returns the last recorded run start for one probe identity.
    pub fn last_run(&self, identity: &ProbeIdentity) -> Option<SystemTime> {
        let state = self.state.lock().expect("request store poisoned");
        state.last_runs.get(&identity.uri()).copied()
    }

    /// Number of live requests across all probes.
    pub fn len(&self) -> usize {
        self.state.lock().expect("request store poisoned").requests.len()
    }

    /// True when no requests are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the current state to the backing file, atomically.
    fn persist(&self, state: &StoreState) -> Result<(), RuntimeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = StoreFile {
            requests: state.requests.values().cloned().collect(),
            last_runs: state.last_runs.clone(),
        };
        match write_atomic(path, &file) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "request store write failed; rolling back");
                Err(e)
            }
        }
    }
}

/// Serialize + write-temp-then-rename. Any file observed on disk is a
/// complete snapshot.
fn write_atomic(path: &Path, file: &StoreFile) -> Result<(), RuntimeError> {
    let bytes = serde_json::to_vec_pretty(file).map_err(|e| RuntimeError::Persistence {
        error: e.to_string(),
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| RuntimeError::Persistence {
        error: format!("{}: {e}", tmp.display()),
    })?;
    fs::rename(&tmp, path).map_err(|e| RuntimeError::Persistence {
        error: format!("{}: {e}", path.display()),
    })
}
