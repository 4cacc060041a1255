//! SCCP network resource registry
//!
//! Remote signaling points, remote subsystems and concerned signaling points,
//! each keyed by a numeric id. The tables are persisted as JSON in
//! `<persist_dir>/<name>_sccpresource.json` after every mutation and reloaded
//! on `start()`.

use crate::errors::RegistryError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

const PERSIST_FILE_SUFFIX: &str = "_sccpresource.json";

/// Remote signaling point (adjacent or distant SP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSignalingPointCode {
    pub remote_spc: u32,
    pub remote_spc_flag: u32,
    pub mask: u32,
}

impl RemoteSignalingPointCode {
    pub fn new(remote_spc: u32, remote_spc_flag: u32, mask: u32) -> Self {
        Self {
            remote_spc,
            remote_spc_flag,
            mask,
        }
    }
}

/// Remote subsystem hosted on a remote signaling point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubSystem {
    pub remote_spc: u32,
    pub remote_ssn: u32,
    pub remote_ssn_flag: u32,
    /// Subsystem is kept prohibited when its signaling point resumes
    pub marked_prohibited: bool,
}

impl RemoteSubSystem {
    pub fn new(remote_spc: u32, remote_ssn: u32, remote_ssn_flag: u32, marked_prohibited: bool) -> Self {
        Self {
            remote_spc,
            remote_ssn,
            remote_ssn_flag,
            marked_prohibited,
        }
    }
}

/// Signaling point informed of local subsystem status changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcernedSignalingPointCode {
    pub remote_spc: u32,
}

impl ConcernedSignalingPointCode {
    pub fn new(remote_spc: u32) -> Self {
        Self { remote_spc }
    }
}

/// Persisted layout, one ordered map per collection
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ResourceTables {
    #[serde(default)]
    remote_spcs: BTreeMap<u32, RemoteSignalingPointCode>,
    #[serde(default)]
    remote_ssns: BTreeMap<u32, RemoteSubSystem>,
    #[serde(default)]
    concerned_spcs: BTreeMap<u32, ConcernedSignalingPointCode>,
}

impl ResourceTables {
    fn is_empty(&self) -> bool {
        self.remote_spcs.is_empty() && self.remote_ssns.is_empty() && self.concerned_spcs.is_empty()
    }
}

/// Named SCCP resource registry
pub struct SccpResource {
    name: String,
    persist_dir: Option<PathBuf>,
    started: AtomicBool,
    tables: RwLock<ResourceTables>,
}

impl SccpResource {
    /// Create a registry persisted under `persist_dir`
    pub fn new(name: &str, persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            persist_dir: Some(persist_dir.into()),
            started: AtomicBool::new(false),
            tables: RwLock::new(ResourceTables::default()),
        }
    }

    /// Create a registry that is never written to disk
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            persist_dir: None,
            started: AtomicBool::new(false),
            tables: RwLock::new(ResourceTables::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Path of the persisted state file, if any
    pub fn persist_file(&self) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}{}", self.name, PERSIST_FILE_SUFFIX)))
    }

    /// Load persisted state and accept lookups
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn start(&self) -> Result<(), RegistryError> {
        if let Some(path) = self.persist_file() {
            if path.exists() {
                let loaded = load_tables(&path)?;
                info!(
                    remote_spcs = loaded.remote_spcs.len(),
                    remote_ssns = loaded.remote_ssns.len(),
                    concerned_spcs = loaded.concerned_spcs.len(),
                    "Loaded SCCP resources"
                );
                *self.tables.write() = loaded;
            } else {
                debug!(path = %path.display(), "No persisted SCCP resources");
            }
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Persist state and stop accepting lookups
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn stop(&self) -> Result<(), RegistryError> {
        if !self.is_started() {
            return Ok(());
        }
        self.persist()?;
        self.started.store(false, Ordering::Release);
        info!("SCCP resources stopped");
        Ok(())
    }

    /// Write the current tables to the persisted state file
    pub fn persist(&self) -> Result<(), RegistryError> {
        let tables = self.tables.read();
        self.write_tables(&tables)
    }

    fn write_tables(&self, tables: &ResourceTables) -> Result<(), RegistryError> {
        let Some(path) = self.persist_file() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(tables)
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "Persisted SCCP resources");
        Ok(())
    }

    fn ensure_started(&self) -> Result<(), RegistryError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(RegistryError::NotStarted(self.name.clone()))
        }
    }

    /// Apply a mutation to a copy of the tables under the write lock. The
    /// copy replaces the live tables only once it has been persisted.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ResourceTables) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        self.ensure_started()?;
        let mut tables = self.tables.write();
        let mut next = tables.clone();
        let out = f(&mut next)?;
        if let Err(e) = self.write_tables(&next) {
            warn!(error = %e, "Failed to persist SCCP resources");
            return Err(e);
        }
        *tables = next;
        Ok(out)
    }

    // Remote signaling points

    pub fn add_remote_spc(&self, id: u32, spc: RemoteSignalingPointCode) -> Result<(), RegistryError> {
        self.mutate(|t| insert_new(&mut t.remote_spcs, "remote SPC", id, spc))?;
        info!(id, remote_spc = spc.remote_spc, "Added remote SPC");
        Ok(())
    }

    pub fn get_remote_spc(&self, id: u32) -> Result<RemoteSignalingPointCode, RegistryError> {
        self.ensure_started()?;
        lookup(&self.tables.read().remote_spcs, "remote SPC", id)
    }

    pub fn remove_remote_spc(&self, id: u32) -> Result<RemoteSignalingPointCode, RegistryError> {
        self.mutate(|t| take(&mut t.remote_spcs, "remote SPC", id))
    }

    pub fn remote_spcs(&self) -> Result<BTreeMap<u32, RemoteSignalingPointCode>, RegistryError> {
        self.ensure_started()?;
        Ok(self.tables.read().remote_spcs.clone())
    }

    // Remote subsystems

    pub fn add_remote_ssn(&self, id: u32, ssn: RemoteSubSystem) -> Result<(), RegistryError> {
        self.mutate(|t| insert_new(&mut t.remote_ssns, "remote SSN", id, ssn))?;
        info!(id, remote_spc = ssn.remote_spc, remote_ssn = ssn.remote_ssn, "Added remote SSN");
        Ok(())
    }

    pub fn get_remote_ssn(&self, id: u32) -> Result<RemoteSubSystem, RegistryError> {
        self.ensure_started()?;
        lookup(&self.tables.read().remote_ssns, "remote SSN", id)
    }

    pub fn remove_remote_ssn(&self, id: u32) -> Result<RemoteSubSystem, RegistryError> {
        self.mutate(|t| take(&mut t.remote_ssns, "remote SSN", id))
    }

    pub fn remote_ssns(&self) -> Result<BTreeMap<u32, RemoteSubSystem>, RegistryError> {
        self.ensure_started()?;
        Ok(self.tables.read().remote_ssns.clone())
    }

    // Concerned signaling points

    pub fn add_concerned_spc(&self, id: u32, spc: ConcernedSignalingPointCode) -> Result<(), RegistryError> {
        self.mutate(|t| insert_new(&mut t.concerned_spcs, "concerned SPC", id, spc))?;
        info!(id, remote_spc = spc.remote_spc, "Added concerned SPC");
        Ok(())
    }

    pub fn get_concerned_spc(&self, id: u32) -> Result<ConcernedSignalingPointCode, RegistryError> {
        self.ensure_started()?;
        lookup(&self.tables.read().concerned_spcs, "concerned SPC", id)
    }

    pub fn remove_concerned_spc(&self, id: u32) -> Result<ConcernedSignalingPointCode, RegistryError> {
        self.mutate(|t| take(&mut t.concerned_spcs, "concerned SPC", id))
    }

    pub fn concerned_spcs(&self) -> Result<BTreeMap<u32, ConcernedSignalingPointCode>, RegistryError> {
        self.ensure_started()?;
        Ok(self.tables.read().concerned_spcs.clone())
    }

    /// Clear all three collections in one step
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn remove_all(&self) -> Result<(), RegistryError> {
        self.mutate(|t| {
            *t = ResourceTables::default();
            Ok(())
        })?;
        info!("Removed all SCCP resources");
        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        self.ensure_started()?;
        Ok(self.tables.read().is_empty())
    }
}

fn load_tables(path: &Path) -> Result<ResourceTables, RegistryError> {
    let content = std::fs::read(path)?;
    serde_json::from_slice(&content).map_err(|e| {
        RegistryError::Persistence(format!("{}: {}", path.display(), e))
    })
}

fn insert_new<T>(
    map: &mut BTreeMap<u32, T>,
    collection: &'static str,
    id: u32,
    value: T,
) -> Result<(), RegistryError> {
    if map.contains_key(&id) {
        return Err(RegistryError::AlreadyExists { collection, id });
    }
    map.insert(id, value);
    Ok(())
}

fn lookup<T: Copy>(map: &BTreeMap<u32, T>, collection: &'static str, id: u32) -> Result<T, RegistryError> {
    map.get(&id)
        .copied()
        .ok_or(RegistryError::NotFound { collection, id })
}

fn take<T>(map: &mut BTreeMap<u32, T>, collection: &'static str, id: u32) -> Result<T, RegistryError> {
    map.remove(&id).ok_or(RegistryError::NotFound { collection, id })
}
