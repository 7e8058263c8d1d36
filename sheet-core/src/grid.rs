//! Client-side time-series grid: one cell per (parameter, field, column),
//! one shared timestamp per column.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{FieldRegistry, SheetError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub parameter_id: i64,
    pub field_id: i64,
    pub column: usize,
}

impl CellKey {
    pub const fn new(parameter_id: i64, field_id: i64, column: usize) -> Self {
        Self {
            parameter_id,
            field_id,
            column,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellState {
    pub value: String,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridColumn {
    pub taken_at: Option<NaiveDateTime>,
    pub locked: bool,
}

/// Grid contents for every cell the registry declares.
#[derive(Debug, Clone, PartialEq)]
pub struct GridState {
    columns: Vec<GridColumn>,
    cells: BTreeMap<CellKey, CellState>,
}

impl GridState {
    pub fn for_registry(registry: &FieldRegistry) -> Self {
        let cells = registry
            .cell_keys()
            .map(|key| (key, CellState::default()))
            .collect();
        Self {
            columns: vec![GridColumn::default(); registry.column_count()],
            cells,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, column: usize) -> Option<&GridColumn> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &[GridColumn] {
        &self.columns
    }

    pub fn cell(&self, key: &CellKey) -> Option<&CellState> {
        self.cells.get(key)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellKey, &CellState)> {
        self.cells.iter()
    }

    /// Writes user input into a cell. Locked columns reject edits.
    pub fn set_cell(&mut self, key: CellKey, value: impl Into<String>) -> Result<(), SheetError> {
        let cell = self
            .cells
            .get_mut(&key)
            .ok_or(SheetError::UnknownCell(key))?;
        if cell.locked {
            return Err(SheetError::ColumnLocked(key.column));
        }
        cell.value = value.into();
        Ok(())
    }

    pub fn set_column_time(
        &mut self,
        column: usize,
        taken_at: Option<NaiveDateTime>,
    ) -> Result<(), SheetError> {
        let slot = self
            .columns
            .get_mut(column)
            .ok_or(SheetError::UnknownColumn(column))?;
        if slot.locked {
            return Err(SheetError::ColumnLocked(column));
        }
        slot.taken_at = taken_at;
        Ok(())
    }

    /// Empties every cell and timestamp and drops all locks.
    pub fn cleared(mut self) -> Self {
        for column in &mut self.columns {
            *column = GridColumn::default();
        }
        for cell in self.cells.values_mut() {
            *cell = CellState::default();
        }
        self
    }

    /// Marks a column and all of its cells read-only.
    pub fn lock_column(&mut self, column: usize) {
        self.set_column_lock(column, true);
    }

    pub fn unlock_all(&mut self) {
        for column in 0..self.columns.len() {
            self.set_column_lock(column, false);
        }
    }

    fn set_column_lock(&mut self, column: usize, locked: bool) {
        let Some(slot) = self.columns.get_mut(column) else {
            return;
        };
        slot.locked = locked;
        for (_, cell) in self.cells.iter_mut().filter(|(key, _)| key.column == column) {
            cell.locked = locked;
        }
    }

    pub fn locked_columns(&self) -> BTreeSet<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.locked)
            .map(|(index, _)| index)
            .collect()
    }

    /// Loads a stored value, ignoring locks. Returns `false` for unknown cells.
    pub fn fill_cell(&mut self, key: CellKey, value: String) -> bool {
        match self.cells.get_mut(&key) {
            Some(cell) => {
                cell.value = value;
                true
            }
            None => false,
        }
    }

    pub fn fill_column_time(&mut self, column: usize, taken_at: NaiveDateTime) {
        if let Some(slot) = self.columns.get_mut(column) {
            slot.taken_at = Some(taken_at);
        }
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            columns: self
                .columns
                .iter()
                .map(|column| column.taken_at.map(format_column_time))
                .collect(),
            cells: self
                .cells
                .iter()
                .filter(|(_, cell)| !cell.value.is_empty())
                .map(|(key, cell)| CellSnapshot {
                    parameter_id: key.parameter_id,
                    field_id: key.field_id,
                    column: key.column,
                    value: cell.value.clone(),
                })
                .collect(),
            locked_columns: self.locked_columns().into_iter().collect(),
        }
    }

    /// Rebuilds a grid from a snapshot, validating every cell against the registry.
    pub fn from_snapshot(
        registry: &FieldRegistry,
        snapshot: &GridSnapshot,
    ) -> Result<Self, SheetError> {
        let mut grid = Self::for_registry(registry);
        for (column, raw) in snapshot.columns.iter().enumerate() {
            let taken_at = match raw.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(text) => Some(parse_column_time(text).ok_or_else(|| {
                    SheetError::Parse(format!("column {column} timestamp '{text}'"))
                })?),
            };
            grid.set_column_time(column, taken_at)?;
        }
        for cell in &snapshot.cells {
            grid.set_cell(
                CellKey::new(cell.parameter_id, cell.field_id, cell.column),
                cell.value.clone(),
            )?;
        }
        for &column in &snapshot.locked_columns {
            if column >= grid.column_count() {
                return Err(SheetError::UnknownColumn(column));
            }
            grid.lock_column(column);
        }
        Ok(grid)
    }
}

/// Serializable view of a grid, as exchanged with JS and files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GridSnapshot {
    /// Column timestamps in local wall-clock time (`YYYY-MM-DDTHH:MM`).
    #[serde(default)]
    pub columns: Vec<Option<String>>,
    #[serde(default)]
    pub cells: Vec<CellSnapshot>,
    #[serde(default)]
    pub locked_columns: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellSnapshot {
    pub parameter_id: i64,
    pub field_id: i64,
    pub column: usize,
    pub value: String,
}

fn format_column_time(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M").to_string()
}

/// Accepts datetime-local input values, with or without seconds.
pub fn parse_column_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}
