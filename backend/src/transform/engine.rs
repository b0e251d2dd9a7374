//! Row cleaning engine.
//!
//! Applies the cleaner selected for each column's type to every field of a
//! row, against a frozen [`ColumnTypeMap`]. Failed fields keep their
//! original value in `cleaned_data` and produce a [`FieldError`].

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::clean::{is_blank, FieldCleaner, PassThrough, StandardCleaner};
use crate::models::{
    CleanResult, CleanedRow, ColumnType, ColumnTypeMap, ExceptionRow, FieldError, RawRow, RowFields, RowOutcome,
    PROCESSING_ERROR,
};

/// Which cleaner runs for each column type.
///
/// Types without an explicit entry use the built-in cleaner.
#[derive(Clone, Default)]
pub struct CleaningStrategy {
    cleaners: HashMap<ColumnType, Arc<dyn FieldCleaner>>,
    empty_is_error: bool,
}

impl CleaningStrategy {
    /// Built-in cleaners everywhere, empty cells accepted.
    pub fn standard() -> Self {
        Self::default()
    }

    pub fn with_cleaner(mut self, column_type: ColumnType, cleaner: Arc<dyn FieldCleaner>) -> Self {
        self.cleaners.insert(column_type, cleaner);
        self
    }

    /// Stop validating `column_type`; values are only trimmed.
    pub fn pass_through(self, column_type: ColumnType) -> Self {
        self.with_cleaner(column_type, Arc::new(PassThrough))
    }

    /// Report blank cells as field errors.
    pub fn empty_is_error(mut self, enabled: bool) -> Self {
        self.empty_is_error = enabled;
        self
    }

    fn cleaner(&self, column_type: ColumnType) -> Arc<dyn FieldCleaner> {
        self.cleaners
            .get(&column_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(StandardCleaner(column_type)))
    }
}

impl fmt::Debug for CleaningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut overridden: Vec<_> = self.cleaners.keys().collect();
        overridden.sort();
        f.debug_struct("CleaningStrategy")
            .field("overridden", &overridden)
            .field("empty_is_error", &self.empty_is_error)
            .finish()
    }
}

/// Cleans rows one at a time with a fixed type map and strategy.
pub struct RowCleaner {
    type_map: ColumnTypeMap,
    strategy: CleaningStrategy,
    // Resolved once so the per-field path is a map lookup.
    resolved: HashMap<ColumnType, Arc<dyn FieldCleaner>>,
}

impl RowCleaner {
    pub fn new(type_map: ColumnTypeMap, strategy: CleaningStrategy) -> Self {
        let resolved = ColumnType::SCORED
            .iter()
            .chain(std::iter::once(&ColumnType::Text))
            .map(|ty| (*ty, strategy.cleaner(*ty)))
            .collect();
        Self {
            type_map,
            strategy,
            resolved,
        }
    }

    pub fn type_map(&self) -> &ColumnTypeMap {
        &self.type_map
    }

    /// Clean every field of `row`. Never fails: problems become field errors.
    pub fn clean_row(&self, row: &RawRow) -> RowOutcome {
        let mut cleaned_data = RowFields::new();
        let mut errors = Vec::new();

        for (field, original) in &row.fields {
            let column_type = self.type_map.type_of(field);
            match self.clean_field(column_type, original) {
                Ok(value) => {
                    cleaned_data.insert(field.clone(), value);
                }
                Err((error_type, error_message)) => {
                    cleaned_data.insert(field.clone(), original.clone());
                    errors.push(FieldError {
                        field: field.clone(),
                        original_value: original.clone(),
                        error_type,
                        error_message,
                    });
                }
            }
        }

        if errors.is_empty() {
            RowOutcome::Clean(CleanedRow {
                row_number: row.row_number,
                original_data: row.fields.clone(),
                cleaned_data,
            })
        } else {
            RowOutcome::Exception(ExceptionRow {
                row_number: row.row_number,
                original_data: row.fields.clone(),
                cleaned_data,
                errors,
            })
        }
    }

    /// `Err((error_type, message))` on failure.
    fn clean_field(&self, column_type: ColumnType, value: &Value) -> Result<Value, (String, String)> {
        if self.strategy.empty_is_error && is_blank(value) {
            return Err((column_type.to_string(), "value is required but empty".to_string()));
        }

        let cleaner = match self.resolved.get(&column_type) {
            Some(cleaner) => cleaner,
            None => return Err((PROCESSING_ERROR.to_string(), format!("no cleaner for {}", column_type))),
        };

        match catch_unwind(AssertUnwindSafe(|| cleaner.clean(value))) {
            Ok(CleanResult::Success { value }) => Ok(value),
            Ok(CleanResult::Failure { error }) => Err((column_type.to_string(), error)),
            Err(panic) => Err((PROCESSING_ERROR.to_string(), panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("cleaner failed unexpectedly: {}", detail)
}
