//! Worker-unique fixture names
//!
//! Parallel workers share one backend, so every entity a test creates gets a
//! `-w<worker>-<seq>` suffix. The name matcher treats the suffixed and bare
//! forms as the same entity.

use std::sync::atomic::{AtomicU32, Ordering};

use regex::Regex;
use once_cell::sync::Lazy;

/// Environment variable carrying the worker index
pub const WORKER_ENV: &str = "CAMPAIGN_E2E_WORKER";

static SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<base>.+?)-w\d+-\d+$").expect("suffix pattern is valid")
});

/// Name generator for one worker
#[derive(Debug)]
pub struct WorkerNamespace {
    worker: u32,
    counter: AtomicU32,
}

impl WorkerNamespace {
    pub fn new(worker: u32) -> Self {
        Self {
            worker,
            counter: AtomicU32::new(0),
        }
    }

    /// Namespace for the worker index in `CAMPAIGN_E2E_WORKER` (0 when unset or invalid)
    pub fn from_env() -> Self {
        let worker = std::env::var(WORKER_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        Self::new(worker)
    }

    pub fn worker(&self) -> u32 {
        self.worker
    }

    /// `"<base>-w<worker>-<seq>"`, with a fresh sequence number per call
    pub fn unique(&self, base: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-w{}-{}", base.trim(), self.worker, seq)
    }

    /// Strip a suffix produced by [`WorkerNamespace::unique`]
    pub fn base_of(name: &str) -> &str {
        match SUFFIX.captures(name).and_then(|c| c.name("base")) {
            Some(base) => base.as_str(),
            None => name,
        }
    }
}
