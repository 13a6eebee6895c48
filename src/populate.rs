//! One-shot bulk population of a metadata store from a catalog dump.
//!
//! Population is explicit and heavyweight by design: it streams the full
//! catalog once, writes triples in bounded atomic batches, and moves the
//! store through the `empty → populating → populated | failed` lifecycle.
//! There is no incremental update and no resume; recovery from any failure
//! or cancellation is a fresh run from the start of the dump.
//!
//! A lock file next to the store enforces single-writer discipline across
//! processes. Readers are unaffected; only a second populator is refused.

use std::io::Write;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::catalog::{CatalogDump, ParseStats};
use crate::error::{PopulateError, StoreError};
use crate::model::{CacheState, Triple};
use crate::store::MetadataStore;

/// Default number of triples persisted per atomic batch.
///
/// Large enough to amortize transaction overhead over a corpus of tens of
/// thousands of records, small enough that memory stays flat and a
/// cancellation signal is honored promptly.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Tuning knobs for a population run.
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Triples per atomic batch. Zero is coerced to one.
    pub batch_size: usize,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Cooperative cancellation handle, checked between batches.
///
/// Cheap to clone; hand a clone to a signal handler or another thread and
/// call [`CancelToken::cancel`] to stop the run at the next batch boundary.
/// Batches already committed stay committed, but the run ends in the
/// `failed` state and must be restarted from scratch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Exclusive population lock, released on drop.
///
/// Created with `create_new` so existence is the lock; the file body carries
/// the holder's pid for stale-lock forensics.
struct PopulateLock {
    path: PathBuf,
}

impl PopulateLock {
    fn acquire(path: &Path) -> Result<Self, PopulateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PopulateError::LockIo {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => PopulateError::InProgress {
                    lock_path: path.display().to_string(),
                },
                _ => PopulateError::LockIo {
                    path: path.display().to_string(),
                    source: e,
                },
            })?;
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PopulateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove population lock");
        }
    }
}

/// Populate `store` from `dump` in one pass.
///
/// Refuses to run against an already populated store and against a store
/// another run currently holds the lock for. A store left in `failed` (or a
/// stale `populating` from a crashed run) is cleared first, so every run
/// starts from a clean slate.
pub fn populate(
    store: &dyn MetadataStore,
    dump: &CatalogDump,
    lock_path: &Path,
    options: &PopulateOptions,
    token: &CancelToken,
) -> Result<ParseStats, PopulateError> {
    // The lock must come first: only once no other run can be live is a
    // `populating` marker known to be an orphan, and only then is clearing
    // the store safe.
    let _lock = PopulateLock::acquire(lock_path)?;

    match store.state()? {
        CacheState::Populated => {
            let location = lock_path.parent().unwrap_or(lock_path);
            return Err(PopulateError::AlreadyPopulated {
                location: location.display().to_string(),
            });
        }
        CacheState::Empty => {}
        // A failed run, or a populating marker orphaned by a crash. Rebuild
        // from scratch.
        state @ (CacheState::Failed | CacheState::Populating) => {
            tracing::info!(%state, "clearing remnants of a previous population run");
            store.clear()?;
        }
    }

    store.set_state(CacheState::Populating)?;
    tracing::info!(dump = %dump.path().display(), batch_size = options.batch_size, "population started");

    match ingest(store, dump, options, token) {
        Ok(stats) => {
            store.set_state(CacheState::Populated)?;
            tracing::info!(
                records = stats.records,
                triples = stats.triples,
                skipped_records = stats.skipped_records,
                skipped_facts = stats.skipped_facts,
                "population complete"
            );
            Ok(stats)
        }
        Err(e) => {
            // Best effort: the run already failed, a second failure while
            // recording the state must not mask the first.
            if let Err(mark) = store.set_state(CacheState::Failed) {
                tracing::error!(error = %mark, "could not record failed state");
            }
            tracing::warn!(error = %e, "population failed");
            Err(e)
        }
    }
}

/// The streaming core: buffer triples, flush full batches, honor the token.
fn ingest(
    store: &dyn MetadataStore,
    dump: &CatalogDump,
    options: &PopulateOptions,
    token: &CancelToken,
) -> Result<ParseStats, PopulateError> {
    let batch_size = options.batch_size.max(1);
    let mut buffer: Vec<Triple> = Vec::with_capacity(batch_size);
    let mut batches = 0u64;
    let mut store_error: Option<StoreError> = None;
    let mut cancelled = false;

    let stats = dump.stream(|triple| {
        buffer.push(triple);
        if buffer.len() < batch_size {
            return ControlFlow::Continue(());
        }
        if let Err(e) = store.put_batch(&buffer) {
            store_error = Some(e);
            return ControlFlow::Break(());
        }
        buffer.clear();
        batches += 1;
        if batches % 10 == 0 {
            tracing::debug!(batches, "population progress");
        }
        if token.is_cancelled() {
            cancelled = true;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })?;

    if let Some(e) = store_error {
        return Err(e.into());
    }
    if cancelled || token.is_cancelled() {
        return Err(PopulateError::Cancelled);
    }
    if !buffer.is_empty() {
        store.put_batch(&buffer)?;
    }
    Ok(stats)
}
