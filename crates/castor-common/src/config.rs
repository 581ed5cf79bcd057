//! Configuration structures for the record store.

use crate::error::{CasError, Result};
use serde::{Deserialize, Serialize};

/// Default primary heap page size in cells (2 MB of i32 cells).
pub const DEFAULT_HEAP_PAGE_SIZE: usize = 500_000;

/// Smallest page size the primary heap accepts.
pub const MIN_HEAP_PAGE_SIZE: usize = 1_000;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// Primary heap page size in cells.
    pub heap_page_size: usize,
    /// Heap capacity in cells above which a reset discards all pages
    /// instead of zeroing and reusing them.
    pub reset_heap_threshold: usize,
    /// Initial capacity of the string character buffer.
    pub initial_string_heap_size: usize,
    /// Initial capacity of the byte, short, and long heaps.
    pub initial_aux_heap_size: usize,
    /// Whether reset is permitted.
    pub flush_enabled: bool,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            heap_page_size: DEFAULT_HEAP_PAGE_SIZE,
            reset_heap_threshold: 5 * DEFAULT_HEAP_PAGE_SIZE,
            initial_string_heap_size: 4096,
            initial_aux_heap_size: 1024,
            flush_enabled: true,
        }
    }
}

impl CasConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CasError::ConfigError(e.to_string()))
    }

    /// Returns the page size actually used by the heap.
    pub fn effective_page_size(&self) -> usize {
        self.heap_page_size.max(MIN_HEAP_PAGE_SIZE)
    }

    /// Returns a copy with a different page size.
    pub fn with_page_size(mut self, heap_page_size: usize) -> Self {
        self.heap_page_size = heap_page_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_config_defaults() {
        let config = CasConfig::default();
        assert_eq!(config.heap_page_size, 500_000);
        assert_eq!(config.reset_heap_threshold, 2_500_000);
        assert!(config.flush_enabled);
    }

    #[test]
    fn test_effective_page_size_clamps() {
        let config = CasConfig::default().with_page_size(10);
        assert_eq!(config.effective_page_size(), MIN_HEAP_PAGE_SIZE);

        let config = CasConfig::default().with_page_size(4096);
        assert_eq!(config.effective_page_size(), 4096);
    }

    #[test]
    fn test_config_serialization() {
        let config = CasConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CasConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            CasConfig::from_json_str(r#"{"heap_page_size": 2000, "flush_enabled": false}"#)
                .unwrap();
        assert_eq!(config.heap_page_size, 2000);
        assert!(!config.flush_enabled);
        assert_eq!(config.initial_aux_heap_size, 1024);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = CasConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, CasError::ConfigError(_)));
    }
}
