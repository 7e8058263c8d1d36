//! Domain model for the obstetric monitoring sheet: backend records, the
//! field registry, the time-series grid and the page-lifetime form session.

mod age;
mod config;
mod grid;
mod records;
mod registry;
mod session;
mod summary;

pub use age::{age_on, local_today, parse_date};
pub use config::{FieldRef, SheetConfig};
pub use grid::{
    parse_column_time, CellKey, CellSnapshot, CellState, GridColumn, GridSnapshot, GridState,
};
pub use records::{
    BloodType, FieldSummary, Form, FormPayload, FormStatus, Insurer, Measurement,
    MeasurementPayload, MeasurementValue, ParameterSummary, Patient, PatientPayload,
    PatientSummary, StoredForm, StoredValue, ValueData, ValuePayload, ValueType,
};
pub use registry::{Control, FieldRegistry, GridRow, HeaderField, SelectOption, SheetLayout};
pub use session::{FormSession, HeaderValues};
pub use summary::{SummaryCell, SummaryColumn, SummaryField, SummaryRow, SummaryView};

/// Errors raised by local validation, before anything reaches the backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SheetError {
    #[error("Campos requeridos faltantes: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Invalid sheet layout: {0}")]
    InvalidLayout(String),
    #[error("No grid cell for parameter {} field {} column {}", .0.parameter_id, .0.field_id, .0.column)]
    UnknownCell(CellKey),
    #[error("Column {0} is locked")]
    ColumnLocked(usize),
    #[error("Column {0} is outside the grid")]
    UnknownColumn(usize),
    #[error("Invalid value in parameter {} field {} column {}: {reason}", .key.parameter_id, .key.field_id, .key.column)]
    InvalidCell { key: CellKey, reason: String },
    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: String, value: String },
    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
    #[error("Could not read data: {0}")]
    Parse(String),
}
