//! Read-only summary view handed to the panel renderer.

use serde::{Deserialize, Serialize};

/// Read-only projection of the sheet, ready for rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummaryView {
    pub fields: Vec<SummaryField>,
    pub columns: Vec<SummaryColumn>,
    pub rows: Vec<SummaryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryField {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryColumn {
    pub index: usize,
    /// `dd/mm/yyyy, hh:mm a. m.`, or `-` when the column has no time.
    pub taken_at: String,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRow {
    pub parameter_id: i64,
    pub field_id: i64,
    pub label: String,
    pub unit: Option<String>,
    pub cells: Vec<SummaryCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryCell {
    pub column: usize,
    pub text: String,
}

impl SummaryView {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.label == label)
            .map(|field| field.value.as_str())
    }

    pub fn row(&self, parameter_id: i64, field_id: i64) -> Option<&SummaryRow> {
        self.rows
            .iter()
            .find(|row| row.parameter_id == parameter_id && row.field_id == field_id)
    }
}
