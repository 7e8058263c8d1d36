//! Grid aggregation and reconciliation for the monitoring sheet, plus the
//! summary projection built on top of a reconciled grid.

mod aggregate;
mod display;
mod reconcile;
mod summary;

use serde_json::Value;
use sheet_core::{Measurement, SheetError};

pub use aggregate::{aggregate_grid, aggregate_groups, parse_boolean, MeasurementGroup};
pub use display::{
    display_value, format_column_label, format_number, from_twelve_hour, match_option,
    to_twelve_hour, PLACEHOLDER,
};
pub use reconcile::{reconcile_grid, unlock_columns, Reconciliation};
pub use summary::build_summary;

/// Parses a measurement listing from a JSON string.
pub fn measurements_from_str(json: &str) -> Result<Vec<Measurement>, SheetError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| SheetError::Parse(err.to_string()))?;
    measurements_from_value(value)
}

/// Accepts a bare array or a paginated `{"results": [...]}` envelope.
pub fn measurements_from_value(value: Value) -> Result<Vec<Measurement>, SheetError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("results") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SheetError::Parse(
                    "expected a list of measurements".to_string(),
                ))
            }
        },
        Value::Null => return Ok(Vec::new()),
        _ => {
            return Err(SheetError::Parse(
                "expected a list of measurements".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|err| SheetError::Parse(err.to_string())))
        .collect()
}
