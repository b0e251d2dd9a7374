//! Pipeline configuration.
//!
//! Every knob has a default and can be overridden from the environment
//! (a `.env` file is honoured by the binary via `dotenvy`).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ROWCLEAN_BATCH_SIZE` | 1000 |
//! | `ROWCLEAN_PROGRESS_EVERY_ROWS` | 500 |
//! | `ROWCLEAN_PROGRESS_INTERVAL_MS` | 2000 |
//! | `ROWCLEAN_SAMPLE_ROWS` | 1000 |
//! | `ROWCLEAN_PHONE_THRESHOLD` | 0.6 |
//! | `ROWCLEAN_DATE_THRESHOLD` | 0.6 |
//! | `ROWCLEAN_ADDRESS_THRESHOLD` | 0.8 |
//! | `ROWCLEAN_NUMBER_THRESHOLD` | 0.8 |
//! | `ROWCLEAN_REQUIRE_HEADER_MATCH` | true |
//! | `ROWCLEAN_SINK_MAX_ATTEMPTS` | 3 |
//! | `ROWCLEAN_SINK_RETRY_DELAY_MS` | 200 |
//! | `ROWCLEAN_ABORT_ON_SINK_FAILURE` | false |
//! | `ROWCLEAN_AVG_ROW_BYTES` | 120 |
//! | `ROWCLEAN_ESTIMATE_BUFFER` | 1.1 |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::models::ColumnType;

/// Column type inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Rows buffered before inference runs.
    pub sample_rows: usize,
    pub phone_threshold: f64,
    pub date_threshold: f64,
    pub address_threshold: f64,
    pub number_threshold: f64,
    /// A type is only assigned when the header also names it.
    pub require_header_match: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            sample_rows: 1000,
            phone_threshold: 0.6,
            date_threshold: 0.6,
            address_threshold: 0.8,
            number_threshold: 0.8,
            require_header_match: true,
        }
    }
}

impl InferenceConfig {
    /// Minimum fraction of sampled values that must match `column_type`.
    pub fn threshold(&self, column_type: ColumnType) -> f64 {
        match column_type {
            ColumnType::Phone => self.phone_threshold,
            ColumnType::Date => self.date_threshold,
            ColumnType::Address => self.address_threshold,
            ColumnType::Number => self.number_threshold,
            ColumnType::Text => 0.0,
        }
    }
}

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows per flushed batch, applied to each batch independently.
    pub batch_size: usize,
    pub progress_every_rows: u64,
    pub progress_interval_ms: u64,
    pub inference: InferenceConfig,
    pub sink_max_attempts: u32,
    pub sink_retry_delay_ms: u64,
    pub abort_on_sink_failure: bool,
    /// Assumed bytes per row for the pre-read estimate.
    pub avg_row_bytes: u64,
    pub estimate_buffer: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            progress_every_rows: 500,
            progress_interval_ms: 2000,
            inference: InferenceConfig::default(),
            sink_max_attempts: 3,
            sink_retry_delay_ms: 200,
            abort_on_sink_failure: false,
            avg_row_bytes: 120,
            estimate_buffer: 1.1,
        }
    }
}

impl PipelineConfig {
    /// Load from `ROWCLEAN_*` environment variables on top of the defaults.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        override_with(&get, "ROWCLEAN_BATCH_SIZE", &mut config.batch_size)?;
        override_with(&get, "ROWCLEAN_PROGRESS_EVERY_ROWS", &mut config.progress_every_rows)?;
        override_with(&get, "ROWCLEAN_PROGRESS_INTERVAL_MS", &mut config.progress_interval_ms)?;
        override_with(&get, "ROWCLEAN_SAMPLE_ROWS", &mut config.inference.sample_rows)?;
        override_with(&get, "ROWCLEAN_PHONE_THRESHOLD", &mut config.inference.phone_threshold)?;
        override_with(&get, "ROWCLEAN_DATE_THRESHOLD", &mut config.inference.date_threshold)?;
        override_with(&get, "ROWCLEAN_ADDRESS_THRESHOLD", &mut config.inference.address_threshold)?;
        override_with(&get, "ROWCLEAN_NUMBER_THRESHOLD", &mut config.inference.number_threshold)?;
        override_with(&get, "ROWCLEAN_REQUIRE_HEADER_MATCH", &mut config.inference.require_header_match)?;
        override_with(&get, "ROWCLEAN_SINK_MAX_ATTEMPTS", &mut config.sink_max_attempts)?;
        override_with(&get, "ROWCLEAN_SINK_RETRY_DELAY_MS", &mut config.sink_retry_delay_ms)?;
        override_with(&get, "ROWCLEAN_ABORT_ON_SINK_FAILURE", &mut config.abort_on_sink_failure)?;
        override_with(&get, "ROWCLEAN_AVG_ROW_BYTES", &mut config.avg_row_bytes)?;
        override_with(&get, "ROWCLEAN_ESTIMATE_BUFFER", &mut config.estimate_buffer)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        positive("ROWCLEAN_BATCH_SIZE", self.batch_size as u64)?;
        positive("ROWCLEAN_PROGRESS_EVERY_ROWS", self.progress_every_rows)?;
        positive("ROWCLEAN_SAMPLE_ROWS", self.inference.sample_rows as u64)?;
        positive("ROWCLEAN_SINK_MAX_ATTEMPTS", u64::from(self.sink_max_attempts))?;
        positive("ROWCLEAN_AVG_ROW_BYTES", self.avg_row_bytes)?;

        for (key, value) in [
            ("ROWCLEAN_PHONE_THRESHOLD", self.inference.phone_threshold),
            ("ROWCLEAN_DATE_THRESHOLD", self.inference.date_threshold),
            ("ROWCLEAN_ADDRESS_THRESHOLD", self.inference.address_threshold),
            ("ROWCLEAN_NUMBER_THRESHOLD", self.inference.number_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::OutOfRange {
                    key: key.to_string(),
                    message: format!("{} is not in (0, 1]", value),
                });
            }
        }
        if !(self.estimate_buffer >= 1.0) {
            return Err(ConfigError::OutOfRange {
                key: "ROWCLEAN_ESTIMATE_BUFFER".to_string(),
                message: format!("{} is below 1.0", self.estimate_buffer),
            });
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn sink_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sink_retry_delay_ms)
    }
}

fn override_with<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> ConfigResult<()> {
    if let Some(raw) = get(key) {
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn positive(key: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
