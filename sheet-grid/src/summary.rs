//! Read-only projection of form, patient and grid for the summary panel.

use chrono::NaiveDate;
use sheet_core::{
    age_on, CellKey, Control, FieldRegistry, Form, GridState, HeaderField, Patient, SummaryCell,
    SummaryColumn, SummaryField, SummaryRow, SummaryView,
};

use crate::display::{format_column_label, PLACEHOLDER};

/// Builds the summary view. Missing values render as `-`; select cells show
/// the option label instead of the stored value.
pub fn build_summary(
    form: Option<&Form>,
    patient: Option<&Patient>,
    grid: &GridState,
    registry: &FieldRegistry,
    today: NaiveDate,
) -> SummaryView {
    let birth_date = patient.and_then(|patient| patient.birth_date);
    let shown_date = form.map(|form| form.prepared_on).or(birth_date);

    let clinical_record = patient
        .map(|patient| patient.clinical_record_number.as_str())
        .or_else(|| form.map(|form| form.patient.clinical_record_number.as_str()));
    let identifier = patient
        .map(|patient| patient.identifier.as_str())
        .or_else(|| form.map(|form| form.patient.identifier.as_str()));
    let names = patient
        .map(|patient| patient.names.as_str())
        .or_else(|| form.map(|form| form.patient.names.as_str()));
    let age = form
        .and_then(|form| form.age_snapshot)
        .or_else(|| birth_date.and_then(|birth| age_on(birth, today)));

    let fields = vec![
        field(
            HeaderField::PreparedOn,
            shown_date.map(|date| date.format("%d/%m/%Y").to_string()),
        ),
        field(
            HeaderField::Insurer,
            form.and_then(|form| form.insurer.as_ref())
                .map(|insurer| insurer.name.clone()),
        ),
        field(HeaderField::ClinicalRecordNumber, clinical_record.map(str::to_string)),
        field(HeaderField::Identifier, identifier.map(str::to_string)),
        field(HeaderField::Names, names.map(str::to_string)),
        field(
            HeaderField::Diagnosis,
            form.and_then(|form| form.diagnosis.clone()),
        ),
        field(HeaderField::AgeSnapshot, age.map(|age| age.to_string())),
        field(
            HeaderField::BloodType,
            patient
                .and_then(|patient| patient.blood_type)
                .map(|blood| blood.code().to_string()),
        ),
        field(
            HeaderField::GestationalAge,
            form.and_then(|form| form.gestational_age)
                .map(|weeks| weeks.to_string()),
        ),
        field(
            HeaderField::Status,
            form.map(|form| {
                form.status_display
                    .clone()
                    .unwrap_or_else(|| form.status.code().to_string())
            }),
        ),
        field(
            HeaderField::PrenatalVisits,
            form.and_then(|form| form.prenatal_visits)
                .map(|visits| visits.to_string()),
        ),
        field(
            HeaderField::Responsible,
            form.map(|form| form.responsible.clone()),
        ),
    ];

    let columns = grid
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| SummaryColumn {
            index,
            taken_at: column
                .taken_at
                .map(format_column_label)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            locked: column.locked,
        })
        .collect();

    let rows = registry
        .rows()
        .iter()
        .map(|row| SummaryRow {
            parameter_id: row.parameter_id,
            field_id: row.field_id,
            label: row.label.clone(),
            unit: row.unit.clone(),
            cells: (0..grid.column_count())
                .map(|column| {
                    let raw = grid
                        .cell(&CellKey::new(row.parameter_id, row.field_id, column))
                        .map(|cell| cell.value.trim())
                        .unwrap_or_default();
                    SummaryCell {
                        column,
                        text: cell_text(&row.control, raw),
                    }
                })
                .collect(),
        })
        .collect();

    SummaryView {
        fields,
        columns,
        rows,
    }
}

fn field(header: HeaderField, value: Option<String>) -> SummaryField {
    SummaryField {
        label: header.label().to_string(),
        value: value
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER.to_string()),
    }
}

fn cell_text(control: &Control, raw: &str) -> String {
    if raw.is_empty() {
        return PLACEHOLDER.to_string();
    }
    control
        .options()
        .iter()
        .find(|option| option.value == raw)
        .map(|option| option.label.clone())
        .unwrap_or_else(|| raw.to_string())
}
