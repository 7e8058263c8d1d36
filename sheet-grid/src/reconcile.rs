//! Redistributes stored measurements back into grid cells.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use sheet_core::{CellKey, Control, FieldRegistry, GridState, Measurement, SheetConfig, SheetError};
use tracing::debug;

use crate::display::{display_value, match_option};

/// Result of loading stored measurements into a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub grid: GridState,
    /// Local wall-clock time of every bound column, in column order.
    pub columns: Vec<NaiveDateTime>,
    pub locked_columns: BTreeSet<usize>,
    /// Measurements whose timestamp fell past the last column.
    pub skipped_measurements: usize,
    /// Values with no matching cell, or with every slot empty.
    pub skipped_values: usize,
}

/// Rebuilds the grid from stored measurements.
///
/// Distinct timestamps are sorted and bound to columns 0..N. The grid is
/// cleared first, so running this twice on the same input yields the same
/// grid. Every column that received a value ends up locked.
pub fn reconcile_grid(
    grid: GridState,
    registry: &FieldRegistry,
    config: &SheetConfig,
    measurements: &[Measurement],
) -> Result<Reconciliation, SheetError> {
    let offset = config.offset()?;
    let mut grid = grid.cleared();

    let distinct: BTreeSet<DateTime<Utc>> =
        measurements.iter().map(|measurement| measurement.taken_at).collect();
    let column_of: BTreeMap<DateTime<Utc>, usize> = distinct
        .into_iter()
        .take(grid.column_count())
        .enumerate()
        .map(|(column, taken_at)| (taken_at, column))
        .collect();

    // Map order is timestamp order, which is also column order.
    let mut columns = Vec::with_capacity(column_of.len());
    for (taken_at, &column) in &column_of {
        let local = taken_at.with_timezone(&offset).naive_local();
        grid.fill_column_time(column, local);
        columns.push(local);
    }

    let mut populated = BTreeSet::new();
    let mut skipped_measurements = 0;
    let mut skipped_values = 0;

    for measurement in measurements {
        let Some(&column) = column_of.get(&measurement.taken_at) else {
            skipped_measurements += 1;
            continue;
        };
        let parameter_id = measurement.parameter.id;

        for value in &measurement.values {
            let field_id = value.field.id;
            let Some(row) = registry.row(parameter_id, field_id) else {
                skipped_values += 1;
                continue;
            };
            let Some(text) = display_value(value, config.is_time_of_day(parameter_id, field_id))
            else {
                skipped_values += 1;
                continue;
            };

            let text = match &row.control {
                Control::Select { options } => match_option(options, &text, value.boolean)
                    .map(|option| option.value.clone())
                    .unwrap_or(text),
                Control::Input => text,
            };

            if grid.fill_cell(CellKey::new(parameter_id, field_id, column), text) {
                populated.insert(column);
            } else {
                skipped_values += 1;
            }
        }
    }

    for &column in &populated {
        grid.lock_column(column);
    }

    debug!(
        measurements = measurements.len(),
        columns = columns.len(),
        locked = populated.len(),
        skipped_measurements,
        skipped_values,
        "reconciled grid"
    );

    Ok(Reconciliation {
        grid,
        columns,
        locked_columns: populated,
        skipped_measurements,
        skipped_values,
    })
}

/// Drops every column lock so stored columns can be edited again.
pub fn unlock_columns(mut grid: GridState) -> GridState {
    grid.unlock_all();
    grid
}
