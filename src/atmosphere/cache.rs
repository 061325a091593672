//! Process-wide interpolator cache.
//!
//! Building a surface is the expensive step of a fit, so every built
//! [`Interpolator`] is kept behind an `Arc` and handed out again for the same
//! key. The map lock only guards lookup/insertion of a per-key cell; the build
//! itself runs inside that cell's `OnceLock`, which gives:
//!
//! - at most one build in flight per key (other requesters block on the cell)
//! - builds for different keys proceed in parallel
//! - every requester of a key receives the same `Arc`
//!
//! A failed build is returned to everyone waiting on it and then evicted, so a
//! later request may retry.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, OnceLock};

use crate::domain::{Axis, Family, InterpolationMethod};
use crate::error::FitError;
use crate::interp::Interpolator;

/// Identity of one cached surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterpolatorKey {
    /// Content hash of the source table.
    pub fingerprint: u64,
    pub family: Family,
    /// Filter or quantity column being interpolated.
    pub column: String,
    pub method: InterpolationMethod,
    pub x_axis: Axis,
    pub y_axis: Axis,
}

impl fmt::Display for InterpolatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} on ({}, {}) via {:?}",
            self.family,
            self.column,
            self.x_axis.column_name(),
            self.y_axis.column_name(),
            self.method
        )
    }
}

type Cell = Arc<OnceLock<Result<Arc<Interpolator>, FitError>>>;

static GLOBAL: LazyLock<Arc<InterpolatorCache>> = LazyLock::new(|| Arc::new(InterpolatorCache::new()));

#[derive(Debug, Default)]
pub struct InterpolatorCache {
    cells: Mutex<HashMap<InterpolatorKey, Cell>>,
    builds: AtomicUsize,
}

impl InterpolatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared cache used by grids that were not given their own.
    pub fn global() -> Arc<InterpolatorCache> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InterpolatorKey, Cell>> {
        // A panic while holding the map lock cannot leave the map half-updated.
        self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached interpolator for `key`, running `build` on first use.
    pub fn get_or_build<F>(&self, key: &InterpolatorKey, build: F) -> Result<Arc<Interpolator>, FitError>
    where
        F: FnOnce() -> Result<Interpolator, FitError>,
    {
        let cell = Arc::clone(self.lock().entry(key.clone()).or_default());

        let mut built_here = false;
        let result = cell
            .get_or_init(|| {
                built_here = true;
                self.builds.fetch_add(1, Ordering::Relaxed);
                log::debug!("building interpolator {key}");
                build().map(Arc::new)
            })
            .clone();

        if !built_here {
            log::debug!("interpolator cache hit {key}");
        }

        if result.is_err() {
            let mut cells = self.lock();
            if cells.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                cells.remove(key);
            }
        }
        result
    }

    /// Already-built interpolator for `key`, without building.
    pub fn get(&self, key: &InterpolatorKey) -> Option<Arc<Interpolator>> {
        let cell = self.lock().get(key).cloned()?;
        cell.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Drop one entry; the next request rebuilds it.
    pub fn invalidate(&self, key: &InterpolatorKey) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of builds started over the cache's lifetime.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}
