//! Keyed load state per model path
//!
//! One entry per distinct path, created on first reference and kept for the
//! life of the process. An entry moves `Loading -> Loaded | Failed` and
//! only a failed entry may start loading again, so at most one load is in
//! flight per path.

use super::{LoadError, LoadResult};
use crate::rendering::scene::SceneGraph;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load state as reported to the UI boundary
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    Failed(String),
}

impl LoadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::NotLoaded => write!(f, "NotLoaded"),
            LoadState::Loading => write!(f, "Loading"),
            LoadState::Loaded => write!(f, "Loaded"),
            LoadState::Failed(message) => write!(f, "Failed: {}", message),
        }
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Loading { attempt: u64 },
    /// Never mutated; attachments graft a copy
    Loaded { fragment: Arc<SceneGraph> },
    Failed { error: LoadError },
}

/// What the caller of [`AssetLoadCache::ensure`] has to do next
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    /// Entry moved to `Loading`; the caller must start a load tagged `attempt`
    Started { attempt: u64 },
    /// A load for this path is already running
    InFlight,
    Ready(Arc<SceneGraph>),
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Loaded(Arc<SceneGraph>),
    Failed(LoadError),
    /// The result does not belong to the load the entry is waiting for
    Stale,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub loads_started: u64,
    pub deduplicated: u64,
    pub failures: u64,
    pub stale_results: u64,
}

#[derive(Debug, Default)]
pub struct AssetLoadCache {
    entries: HashMap<String, CacheEntry>,
    next_attempt: u64,
    stats: CacheStats,
}

impl AssetLoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse a loaded or loading entry; start a load for a missing or
    /// failed one
    pub fn ensure(&mut self, path: &str) -> EnsureOutcome {
        match self.entries.get(path) {
            Some(CacheEntry::Loaded { fragment }) => {
                self.stats.hits += 1;
                debug!("Cache hit for {}", path);
                EnsureOutcome::Ready(Arc::clone(fragment))
            }
            Some(CacheEntry::Loading { .. }) => {
                self.stats.deduplicated += 1;
                debug!("Load already in flight for {}", path);
                EnsureOutcome::InFlight
            }
            Some(CacheEntry::Failed { .. }) | None => EnsureOutcome::Started {
                attempt: self.start(path),
            },
        }
    }

    /// Restart a failed entry. Returns the new attempt, or `None` when the
    /// entry is not in `Failed`.
    pub fn retry(&mut self, path: &str) -> Option<u64> {
        match self.entries.get(path) {
            Some(CacheEntry::Failed { .. }) => {
                info!("Retrying load of {}", path);
                Some(self.start(path))
            }
            _ => None,
        }
    }

    fn start(&mut self, path: &str) -> u64 {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        self.entries
            .insert(path.to_string(), CacheEntry::Loading { attempt });
        self.stats.loads_started += 1;
        debug!("Loading {} (attempt {})", path, attempt);
        attempt
    }

    /// Record the result of load `attempt` for `path`
    pub fn complete(&mut self, path: &str, attempt: u64, result: LoadResult) -> CompletionOutcome {
        match self.entries.get(path) {
            Some(CacheEntry::Loading { attempt: expected }) if *expected == attempt => {}
            _ => {
                self.stats.stale_results += 1;
                warn!("Ignoring result of load attempt {} for {}", attempt, path);
                return CompletionOutcome::Stale;
            }
        }

        match result {
            Ok(fragment) => {
                let fragment = Arc::new(fragment);
                info!("Loaded {} ({} nodes)", path, fragment.node_count());
                self.entries.insert(
                    path.to_string(),
                    CacheEntry::Loaded { fragment: Arc::clone(&fragment) },
                );
                CompletionOutcome::Loaded(fragment)
            }
            Err(error) => {
                self.stats.failures += 1;
                warn!("Failed to load {}: {}", path, error);
                self.entries.insert(
                    path.to_string(),
                    CacheEntry::Failed { error: error.clone() },
                );
                CompletionOutcome::Failed(error)
            }
        }
    }

    pub fn state(&self, path: &str) -> LoadState {
        match self.entries.get(path) {
            None => LoadState::NotLoaded,
            Some(CacheEntry::Loading { .. }) => LoadState::Loading,
            Some(CacheEntry::Loaded { .. }) => LoadState::Loaded,
            Some(CacheEntry::Failed { error }) => LoadState::Failed(error.to_string()),
        }
    }

    pub fn fragment(&self, path: &str) -> Option<Arc<SceneGraph>> {
        match self.entries.get(path) {
            Some(CacheEntry::Loaded { fragment }) => Some(Arc::clone(fragment)),
            _ => None,
        }
    }

    pub fn error(&self, path: &str) -> Option<&LoadError> {
        match self.entries.get(path) {
            Some(CacheEntry::Failed { error }) => Some(error),
            _ => None,
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
