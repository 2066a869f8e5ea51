use crate::content::SegmentId;
use crate::timing::source::TimingSource;
use crate::timing::table::TimingTable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bounded wait for a single timing table
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Availability of one segment's timing table
#[derive(Debug, Clone)]
pub enum TableStatus {
    /// Nobody has asked for it yet
    NotRequested,
    /// A fetch is in flight
    Loading,
    /// Loaded; an empty table means no timing is available for the segment
    Ready(Arc<TimingTable>),
}

impl TableStatus {
    pub fn table(&self) -> Option<&Arc<TimingTable>> {
        match self {
            TableStatus::Ready(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TableStatus::Ready(_))
    }
}

/// Session cache of timing tables
///
/// Tables are fetched lazily and one at a time. A fetch that fails or does
/// not finish within the bounded wait is cached as an empty table, so callers
/// never stay in the loading state forever.
#[derive(Clone)]
pub struct TimingIndex {
    tables: Arc<RwLock<HashMap<SegmentId, TableStatus>>>,
    source: Arc<dyn TimingSource>,
    fetch_timeout: Duration,
    /// Woken whenever a table becomes ready
    ready: Arc<Notify>,
}

impl TimingIndex {
    pub fn new(source: Arc<dyn TimingSource>) -> Self {
        Self::with_timeout(source, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(source: Arc<dyn TimingSource>, fetch_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            source,
            fetch_timeout,
            ready: Arc::new(Notify::new()),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn status(&self, segment: &SegmentId) -> TableStatus {
        self.tables
            .read()
            .get(segment)
            .cloned()
            .unwrap_or(TableStatus::NotRequested)
    }

    pub fn table(&self, segment: &SegmentId) -> Option<Arc<TimingTable>> {
        self.status(segment).table().cloned()
    }

    /// Store a loaded table. Loaded tables are never replaced.
    pub fn insert(&self, segment: SegmentId, table: TimingTable) -> Arc<TimingTable> {
        let mut tables = self.tables.write();
        if let Some(TableStatus::Ready(existing)) = tables.get(&segment) {
            return Arc::clone(existing);
        }
        let table = Arc::new(table);
        tables.insert(segment, TableStatus::Ready(Arc::clone(&table)));
        drop(tables);
        self.ready.notify_waiters();
        table
    }

    /// Load one table, waiting at most the configured timeout
    pub async fn load(&self, segment: &SegmentId) -> Arc<TimingTable> {
        {
            let mut tables = self.tables.write();
            match tables.get(segment) {
                Some(TableStatus::Ready(table)) => return Arc::clone(table),
                _ => {
                    tables.insert(segment.clone(), TableStatus::Loading);
                }
            }
        }

        let table = match tokio::time::timeout(self.fetch_timeout, self.source.fetch(segment)).await
        {
            Ok(Ok(words)) => match TimingTable::new(words) {
                Ok(table) => {
                    debug!("Timing for {}: {} words", segment, table.len());
                    table
                }
                Err(e) => {
                    warn!("Discarding timing for {}: {}", segment, e);
                    TimingTable::empty()
                }
            },
            Ok(Err(e)) => {
                warn!("No timing for {}: {}", segment, e);
                TimingTable::empty()
            }
            Err(_) => {
                warn!(
                    "Timing for {} not loaded within {:?}, continuing without it",
                    segment, self.fetch_timeout
                );
                TimingTable::empty()
            }
        };

        self.insert(segment.clone(), table)
    }

    /// Wait until a segment's table is ready
    ///
    /// Joins a fetch already in flight instead of starting another one, and
    /// starts one if nobody asked yet. A fetch that stays in flight past the
    /// bounded wait is treated as having no timing.
    pub async fn wait_ready(&self, segment: &SegmentId) -> Arc<TimingTable> {
        loop {
            let notified = self.ready.notified();
            match self.status(segment) {
                TableStatus::Ready(table) => return table,
                TableStatus::NotRequested => return self.load(segment).await,
                TableStatus::Loading => {
                    if tokio::time::timeout(self.fetch_timeout, notified).await.is_err()
                        && !self.status(segment).is_ready()
                    {
                        warn!("Timing for {} still loading, continuing without it", segment);
                        return self.insert(segment.clone(), TimingTable::empty());
                    }
                }
            }
        }
    }

    /// Await the first segment, then load the rest one at a time in the background
    pub async fn preload(&self, segments: Vec<SegmentId>) -> Option<JoinHandle<()>> {
        let mut iter = segments.into_iter();
        let first = iter.next()?;
        self.load(&first).await;
        info!("First timing table ready ({})", first);

        let rest: Vec<SegmentId> = iter.collect();
        if rest.is_empty() {
            return None;
        }

        let index = self.clone();
        Some(tokio::spawn(async move {
            for segment in rest {
                index.load(&segment).await;
            }
            debug!("Background timing load finished");
        }))
    }

    /// Start loading a segment nobody has requested yet
    pub fn spawn_load(&self, runtime: &tokio::runtime::Handle, segment: SegmentId) {
        if !matches!(self.status(&segment), TableStatus::NotRequested) {
            return;
        }
        let index = self.clone();
        runtime.spawn(async move {
            index.load(&segment).await;
        });
    }
}
