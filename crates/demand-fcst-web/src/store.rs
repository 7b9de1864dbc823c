//! Short-lived cache of generated reports, keyed by random download id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use demand_fcst_core::ForecastReport;

use crate::config::DownloadsConfig;

#[derive(Debug)]
struct Entry {
    report: Arc<ForecastReport>,
    created: Instant,
}

#[derive(Debug, Clone)]
pub struct DownloadStore {
    entries: Arc<DashMap<Uuid, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl DownloadStore {
    pub fn new(config: &DownloadsConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
        }
    }

    /// Keep `report` and return the id it can be fetched with.
    pub fn insert(&self, report: Arc<ForecastReport>) -> Uuid {
        self.purge_expired();
        while self.entries.len() >= self.max_entries {
            // iterator guards must be dropped before `remove`
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().created)
                .map(|e| *e.key());
            match oldest {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        self.entries.insert(
            id,
            Entry {
                report,
                created: Instant::now(),
            },
        );
        id
    }

    /// The report stored under `id`, unless it has expired.
    pub fn get(&self, id: &Uuid) -> Option<Arc<ForecastReport>> {
        {
            let entry = self.entries.get(id)?;
            if entry.created.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.report));
            }
        }
        self.entries.remove(id);
        None
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.created.elapsed() < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
