//! Loaded atmosphere tables and the surfaces built from them.
//!
//! Surfaces are keyed by table fingerprint, so two grids sharing a cache only
//! share interpolators for identical tables.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::atmosphere::{AtmosphereTable, InterpolatorCache, InterpolatorKey};
use crate::domain::{Axis, Family, InterpolationMethod};
use crate::error::FitError;
use crate::interp::Interpolator;

/// Atmosphere tables for every loaded family, plus the cache their surfaces live in.
#[derive(Debug, Clone)]
pub struct AtmosphereGrid {
    tables: BTreeMap<Family, AtmosphereTable>,
    cache: Arc<InterpolatorCache>,
}

impl Default for AtmosphereGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl AtmosphereGrid {
    /// Empty grid backed by the process-wide cache.
    pub fn new() -> Self {
        Self::with_cache(InterpolatorCache::global())
    }

    pub fn with_cache(cache: Arc<InterpolatorCache>) -> Self {
        Self {
            tables: BTreeMap::new(),
            cache,
        }
    }

    /// Add or replace a family's table.
    pub fn insert(&mut self, table: AtmosphereTable) {
        self.tables.insert(table.family(), table);
    }

    pub fn with_table(mut self, table: AtmosphereTable) -> Self {
        self.insert(table);
        self
    }

    pub fn table(&self, family: Family) -> Result<&AtmosphereTable, FitError> {
        self.tables
            .get(&family)
            .ok_or_else(|| FitError::configuration(format!("no {family} atmosphere table loaded")))
    }

    pub fn families(&self) -> impl Iterator<Item = Family> + '_ {
        self.tables.keys().copied()
    }

    pub fn cache(&self) -> &Arc<InterpolatorCache> {
        &self.cache
    }

    pub fn key(
        &self,
        family: Family,
        column: &str,
        method: InterpolationMethod,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Result<InterpolatorKey, FitError> {
        let table = self.table(family)?;
        if x_axis == y_axis {
            return Err(FitError::configuration(format!(
                "interpolation axes must differ (both {})",
                x_axis.column_name()
            )));
        }
        if table.column(column).is_none() {
            return Err(FitError::configuration(format!(
                "unknown column '{column}' in {family} atmosphere table"
            )));
        }
        Ok(InterpolatorKey {
            fingerprint: table.fingerprint(),
            family,
            column: column.to_string(),
            method,
            x_axis,
            y_axis,
        })
    }

    /// Build a fresh surface for `column` over `(x_axis, y_axis)`, bypassing the cache.
    pub fn build_interpolator(
        &self,
        family: Family,
        column: &str,
        method: InterpolationMethod,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Result<Interpolator, FitError> {
        let key = self.key(family, column, method, x_axis, y_axis)?;
        self.build_for_key(key)
    }

    fn build_for_key(&self, key: InterpolatorKey) -> Result<Interpolator, FitError> {
        let table = self.table(key.family)?;
        let zs = table
            .column(&key.column)
            .ok_or_else(|| FitError::configuration(format!("unknown column '{}'", key.column)))?;
        Interpolator::build(key.clone(), table.axis(key.x_axis), table.axis(key.y_axis), zs)
    }

    /// Cached surface; built on first request and shared afterwards.
    pub fn interpolator(
        &self,
        family: Family,
        column: &str,
        method: InterpolationMethod,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Result<Arc<Interpolator>, FitError> {
        let key = self.key(family, column, method, x_axis, y_axis)?;
        self.cache
            .get_or_build(&key, || self.build_for_key(key.clone()))
    }

    /// Drop any cached surface for the key, then build and cache a new one.
    pub fn interpolator_rebuilt(
        &self,
        family: Family,
        column: &str,
        method: InterpolationMethod,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Result<Arc<Interpolator>, FitError> {
        let key = self.key(family, column, method, x_axis, y_axis)?;
        self.cache.invalidate(&key);
        self.cache
            .get_or_build(&key, || self.build_for_key(key.clone()))
    }
}
