//! Run-scoped state and the in-process run registry.
//!
//! `GenerationRun` is owned exclusively by one orchestrator invocation and
//! discarded when its stream ends — there is no global generation status.
//! The registry only guards against two concurrent runs fighting over the
//! same (family, language-set); runs across different families proceed
//! independently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::generation::events::TaskFailure;
use crate::models::family::CacheFamily;

/// In-flight progress counters for one run. Never persisted; the errors
/// summary leaves through the `complete` event and nothing else.
#[derive(Debug)]
pub struct GenerationRun {
    pub total_items: usize,
    pub total_tasks: usize,
    /// Tasks attempted so far, success or failure. Drives `percent`, which
    /// stays monotone because task order is deterministic.
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<TaskFailure>,
}

impl GenerationRun {
    pub fn new(total_items: usize, total_tasks: usize) -> Self {
        Self {
            total_items,
            total_tasks,
            attempted: 0,
            succeeded: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, item_id: &str, language: &str, message: String) {
        self.attempted += 1;
        self.errors.push(TaskFailure {
            item_id: item_id.to_string(),
            language: language.to_string(),
            message,
        });
    }

    pub fn percent(&self) -> u32 {
        if self.total_tasks == 0 {
            return 100;
        }
        (self.attempted * 100 / self.total_tasks) as u32
    }
}

/// The lock key: family plus the sorted requested-language set.
pub fn run_key(family: CacheFamily, languages: &[String]) -> String {
    let mut langs: Vec<&str> = languages.iter().map(String::as_str).collect();
    langs.sort_unstable();
    format!("{}:{}", family.as_str(), langs.join(","))
}

/// Tracks which (family, language-set) keys have a run in flight.
#[derive(Clone, Default)]
pub struct RunRegistry {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a key, or `None` when a run already holds it. The claim is
    /// released when the returned guard drops.
    pub fn try_acquire(&self, key: String) -> Option<RunGuard> {
        let mut keys = self.keys.lock().expect("run registry poisoned");
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(RunGuard {
            key,
            keys: Arc::clone(&self.keys),
        })
    }
}

pub struct RunGuard {
    key: String,
    keys: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&self.key);
        }
    }
}
