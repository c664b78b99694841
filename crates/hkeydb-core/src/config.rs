//! Module: config
//! Responsibility: adapter tuning knobs and their TOML loading.
//! Does not own: per-call encoding flags, which callers still thread through
//! every read and write.

use crate::error::InternalError;
use serde::{Deserialize, Serialize};

///
/// AdapterConfig
///
/// Per-session storage adapter configuration.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// When false, `enter_update_step` never advances the step.
    pub with_step_changing: bool,

    /// Encoding used by callers that do not pick one explicitly.
    pub use_current_encoding: bool,

    /// Rows buffered per sorted run before the sorter starts a new run.
    pub sort_run_rows: usize,

    /// Pooled index rows retained per (adapter, index row type).
    pub index_row_pool_capacity: usize,

    pub max_record_bytes: usize,
}

impl AdapterConfig {
    pub const DEFAULT_SORT_RUN_ROWS: usize = 4096;
    pub const DEFAULT_INDEX_ROW_POOL_CAPACITY: usize = 16;
    pub const DEFAULT_MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, InternalError> {
        let config: Self = toml::from_str(source)
            .map_err(|err| InternalError::config_invariant(format!("invalid config: {err}")))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InternalError> {
        if self.sort_run_rows == 0 {
            return Err(InternalError::config_invariant(
                "sort_run_rows must be greater than zero",
            ));
        }
        if self.max_record_bytes == 0 {
            return Err(InternalError::config_invariant(
                "max_record_bytes must be greater than zero",
            ));
        }

        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            with_step_changing: true,
            use_current_encoding: true,
            sort_run_rows: Self::DEFAULT_SORT_RUN_ROWS,
            index_row_pool_capacity: Self::DEFAULT_INDEX_ROW_POOL_CAPACITY,
            max_record_bytes: Self::DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, ErrorOrigin};

    #[test]
    fn empty_document_yields_defaults() {
        let config = AdapterConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config, AdapterConfig::default());
        assert!(config.with_step_changing);
    }

    #[test]
    fn partial_document_overrides_named_fields_only() {
        let config = AdapterConfig::from_toml_str(
            "with_step_changing = false\nsort_run_rows = 2\n",
        )
        .expect("partial config should parse");

        assert!(!config.with_step_changing);
        assert_eq!(config.sort_run_rows, 2);
        assert_eq!(
            config.index_row_pool_capacity,
            AdapterConfig::DEFAULT_INDEX_ROW_POOL_CAPACITY
        );
    }

    #[test]
    fn zero_sort_run_is_rejected() {
        let err = AdapterConfig::from_toml_str("sort_run_rows = 0")
            .expect_err("zero-sized sort runs must be rejected");

        assert_eq!(err.class, ErrorClass::InvariantViolation);
        assert_eq!(err.origin, ErrorOrigin::Config);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        AdapterConfig::from_toml_str("sort_rows = 4").expect_err("unknown key must fail");
    }
}
