//! File monitor - polling change notification
//!
//! A [`FileMonitor`] samples a set of attributes of one file at a fixed
//! period on a background task and notifies registered listeners of the
//! attributes whose value differs from the previous sample.
//!
//! Polling is used because it works on every backend. The lower the period,
//! the faster changes are reported and the higher the I/O cost; the time
//! spent sampling is deducted from the period (1000ms period, 50ms of
//! sampling: the next poll happens 950ms later).
//!
//! Monitoring goes on until [`FileMonitor::stop_monitoring`] is called (or
//! the monitor is dropped), even if the file stops existing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, SystemTime};

use bitflags::bitflags;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::backend::FileAdapter;
use crate::config::MonitorConfig;
use crate::error::{Result, VfsError};
use crate::permissions::PermissionBits;

bitflags! {
    /// File attributes a monitor can watch
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        /// As returned by [`FileAdapter::modified_time`]
        const MODIFIED_TIME = 1;
        /// As returned by [`FileAdapter::size`]
        const SIZE = 1 << 1;
        /// As returned by [`FileAdapter::permissions`]
        const PERMISSIONS = 1 << 2;
        /// As returned by [`FileAdapter::is_directory`]
        const IS_DIRECTORY = 1 << 3;
        /// As returned by [`FileAdapter::exists`]
        const EXISTS = 1 << 4;
    }
}

impl FileAttributes {
    pub const DEFAULT: Self = Self::MODIFIED_TIME;

    /// Parse a configuration name (`modified`, `size`, `permissions`,
    /// `directory`, `exists`)
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "modified" | "modified_time" | "date" => Some(Self::MODIFIED_TIME),
            "size" => Some(Self::SIZE),
            "permissions" => Some(Self::PERMISSIONS),
            "directory" | "is_directory" => Some(Self::IS_DIRECTORY),
            "exists" => Some(Self::EXISTS),
            _ => None,
        }
    }
}

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Receives change notifications from a [`FileMonitor`]
pub trait FileChangeListener: Send + Sync {
    /// Called once per poll cycle in which at least one attribute changed
    fn file_changed(&self, file: &Arc<dyn FileAdapter>, changed: FileAttributes);
}

impl<F> FileChangeListener for F
where
    F: Fn(&Arc<dyn FileAdapter>, FileAttributes) + Send + Sync,
{
    fn file_changed(&self, file: &Arc<dyn FileAdapter>, changed: FileAttributes) {
        self(file, changed);
    }
}

/// Weakly held listeners: registration does not keep a listener alive
type ListenerSet = RwLock<Vec<Weak<dyn FileChangeListener>>>;

/// Stop request of one polling run
///
/// Each start creates a new token, so a loop that has not noticed its stop
/// yet can never be revived by a later start.
struct RunToken {
    active: AtomicBool,
    wake: Notify,
}

impl RunToken {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::Release);
        self.wake.notify_one();
    }
}

/// Polls one file for attribute changes
pub struct FileMonitor {
    file: Arc<dyn FileAdapter>,
    attributes: FileAttributes,
    poll_interval: Duration,
    listeners: Arc<ListenerSet>,
    run: Mutex<Option<Arc<RunToken>>>,
}

impl FileMonitor {
    /// Monitor the default attributes at the default period
    pub fn new(file: Arc<dyn FileAdapter>) -> Self {
        Self::with_options(file, FileAttributes::DEFAULT, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_attributes(file: Arc<dyn FileAdapter>, attributes: FileAttributes) -> Self {
        Self::with_options(file, attributes, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(file: Arc<dyn FileAdapter>, poll_interval: Duration) -> Self {
        Self::with_options(file, FileAttributes::DEFAULT, poll_interval)
    }

    /// Monitoring only begins once [`start_monitoring`](Self::start_monitoring)
    /// is called.
    pub fn with_options(
        file: Arc<dyn FileAdapter>,
        attributes: FileAttributes,
        poll_interval: Duration,
    ) -> Self {
        Self {
            file,
            attributes,
            poll_interval,
            listeners: Arc::new(RwLock::new(Vec::new())),
            run: Mutex::new(None),
        }
    }

    pub fn from_config(file: Arc<dyn FileAdapter>, config: &MonitorConfig) -> Self {
        Self::with_options(file, config.attribute_mask(), config.poll_interval())
    }

    pub fn file(&self) -> &Arc<dyn FileAdapter> {
        &self.file
    }

    pub const fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a listener; only a weak reference is kept
    pub fn add_listener<L: FileChangeListener + 'static>(&self, listener: &Arc<L>) {
        let ptr = Arc::as_ptr(listener).cast::<()>();
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|w| w.strong_count() > 0);
        if listeners.iter().any(|w| w.as_ptr().cast::<()>() == ptr) {
            return;
        }
        let weak = Arc::downgrade(listener);
        listeners.push(weak);
    }

    pub fn remove_listener<L: FileChangeListener + 'static>(&self, listener: &Arc<L>) {
        let ptr = Arc::as_ptr(listener).cast::<()>();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|w| w.strong_count() > 0 && w.as_ptr().cast::<()>() != ptr);
    }

    /// Number of registered listeners still alive
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start polling on a background task; no-op when already monitoring
    ///
    /// Calling it after [`stop_monitoring`](Self::stop_monitoring) resumes
    /// monitoring from a fresh baseline.
    pub fn start_monitoring(&self) -> Result<()> {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| VfsError::NoRuntime)?;
        let token = Arc::new(RunToken::new());
        runtime.spawn(poll_loop(
            self.file.clone(),
            self.attributes,
            self.poll_interval,
            self.listeners.clone(),
            token.clone(),
        ));
        *run = Some(token);

        info!(
            file = %self.file.absolute_path(),
            attributes = ?self.attributes,
            interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "file monitoring started"
        );
        Ok(())
    }

    /// Request the polling task to stop; no-op when not monitoring
    ///
    /// The task notices the request at its next checkpoint.
    pub fn stop_monitoring(&self) {
        let token = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            info!(file = %self.file.absolute_path(), "file monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

/// Attribute values of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Snapshot {
    modified: Option<SystemTime>,
    size: u64,
    permissions: PermissionBits,
    is_directory: bool,
    exists: bool,
}

impl Snapshot {
    /// Sample the enabled attributes; `None` when a stop was requested midway
    async fn take(
        file: &dyn FileAdapter,
        attributes: FileAttributes,
        token: &RunToken,
    ) -> Result<Option<Self>> {
        let mut snapshot = Self::default();

        if attributes.contains(FileAttributes::MODIFIED_TIME) {
            if !token.is_active() {
                return Ok(None);
            }
            snapshot.modified = file.modified_time().await?;
        }
        if attributes.contains(FileAttributes::SIZE) {
            if !token.is_active() {
                return Ok(None);
            }
            snapshot.size = file.size().await?;
        }
        if attributes.contains(FileAttributes::PERMISSIONS) {
            if !token.is_active() {
                return Ok(None);
            }
            snapshot.permissions = file.permissions().await?;
        }
        if attributes.contains(FileAttributes::IS_DIRECTORY) {
            if !token.is_active() {
                return Ok(None);
            }
            snapshot.is_directory = file.is_directory().await?;
        }
        if attributes.contains(FileAttributes::EXISTS) {
            if !token.is_active() {
                return Ok(None);
            }
            snapshot.exists = file.exists().await?;
        }

        Ok(Some(snapshot))
    }

    fn changes(&self, newer: &Self) -> FileAttributes {
        let mut changed = FileAttributes::empty();
        changed.set(FileAttributes::MODIFIED_TIME, self.modified != newer.modified);
        changed.set(FileAttributes::SIZE, self.size != newer.size);
        changed.set(FileAttributes::PERMISSIONS, self.permissions != newer.permissions);
        changed.set(FileAttributes::IS_DIRECTORY, self.is_directory != newer.is_directory);
        changed.set(FileAttributes::EXISTS, self.exists != newer.exists);
        changed
    }
}

/// Body of the background task
///
/// A cycle whose sampling fails is skipped: nothing is notified and the
/// previous snapshot stays the reference for the next cycle.
async fn poll_loop(
    file: Arc<dyn FileAdapter>,
    attributes: FileAttributes,
    poll_interval: Duration,
    listeners: Arc<ListenerSet>,
    token: Arc<RunToken>,
) {
    let mut recorded = match Snapshot::take(file.as_ref(), attributes, &token).await {
        Ok(Some(baseline)) => Some(baseline),
        Ok(None) => return,
        Err(e) => {
            warn!(file = %file.absolute_path(), error = %e, "baseline sampling failed");
            None
        }
    };

    while token.is_active() {
        let cycle_start = Instant::now();

        match Snapshot::take(file.as_ref(), attributes, &token).await {
            Ok(Some(sample)) => {
                // Attributes that are not monitored keep their default value
                // on both sides, so they never show up as changed
                let changed = recorded
                    .as_ref()
                    .map_or(FileAttributes::empty(), |previous| previous.changes(&sample));
                recorded = Some(sample);
                if !changed.is_empty() {
                    notify(&listeners, &file, changed);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(file = %file.absolute_path(), error = %e, "sampling failed, skipping cycle");
            }
        }

        let remaining = poll_interval.saturating_sub(cycle_start.elapsed());
        tokio::select! {
            () = tokio::time::sleep(remaining) => {}
            () = token.wake.notified() => {}
        }
    }
}

fn notify(listeners: &ListenerSet, file: &Arc<dyn FileAdapter>, changed: FileAttributes) {
    let live: Vec<Arc<dyn FileChangeListener>> = {
        let mut listeners = listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|w| w.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    };

    trace!(
        file = %file.absolute_path(),
        changed = ?changed,
        listeners = live.len(),
        "notifying file change"
    );
    for listener in live {
        listener.file_changed(file, changed);
    }
}
