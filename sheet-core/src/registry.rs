//! Typed mapping between on-screen controls and record fields.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{CellKey, SheetConfig, SheetError, ValueType};

/// Header controls of the sheet, outside the measurement grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HeaderField {
    Code,
    Version,
    PreparedOn,
    SheetNumber,
    Status,
    Diagnosis,
    AgeSnapshot,
    GestationalAge,
    PrenatalVisits,
    Responsible,
    Insurer,
    ClinicalRecordNumber,
    Identifier,
    Names,
    BloodType,
    BirthDate,
}

impl HeaderField {
    pub const ALL: [HeaderField; 16] = [
        HeaderField::Code,
        HeaderField::Version,
        HeaderField::PreparedOn,
        HeaderField::SheetNumber,
        HeaderField::Status,
        HeaderField::Diagnosis,
        HeaderField::AgeSnapshot,
        HeaderField::GestationalAge,
        HeaderField::PrenatalVisits,
        HeaderField::Responsible,
        HeaderField::Insurer,
        HeaderField::ClinicalRecordNumber,
        HeaderField::Identifier,
        HeaderField::Names,
        HeaderField::BloodType,
        HeaderField::BirthDate,
    ];

    /// Label shown to the user, also used in validation messages.
    pub fn label(self) -> &'static str {
        match self {
            HeaderField::Code => "Código",
            HeaderField::Version => "Versión",
            HeaderField::PreparedOn => "Fecha de elaboración",
            HeaderField::SheetNumber => "N° Hoja",
            HeaderField::Status => "Estado",
            HeaderField::Diagnosis => "Diagnóstico",
            HeaderField::AgeSnapshot => "Edad",
            HeaderField::GestationalAge => "Edad gestacional",
            HeaderField::PrenatalVisits => "N° Controles prenatales",
            HeaderField::Responsible => "Responsable",
            HeaderField::Insurer => "Aseguradora",
            HeaderField::ClinicalRecordNumber => "N° Historia Clínica",
            HeaderField::Identifier => "Identificación",
            HeaderField::Names => "Nombre",
            HeaderField::BloodType => "Grupo sanguíneo",
            HeaderField::BirthDate => "Fecha de nacimiento",
        }
    }

    /// Control id used by the stock page template.
    pub fn default_control_id(self) -> &'static str {
        match self {
            HeaderField::Code => "codigo",
            HeaderField::Version => "version",
            HeaderField::PreparedOn => "fecha_elabora",
            HeaderField::SheetNumber => "num_hoja",
            HeaderField::Status => "estado",
            HeaderField::Diagnosis => "diagnostico",
            HeaderField::AgeSnapshot => "edad_snapshot",
            HeaderField::GestationalAge => "edad_gestion",
            HeaderField::PrenatalVisits => "n_controles_prenatales",
            HeaderField::Responsible => "responsable",
            HeaderField::Insurer => "aseguradora_id",
            HeaderField::ClinicalRecordNumber => "num_historia_clinica",
            HeaderField::Identifier => "num_identificacion",
            HeaderField::Names => "nombres",
            HeaderField::BloodType => "tipo_sangre",
            HeaderField::BirthDate => "fecha_elabora_paciente",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    #[default]
    Input,
    Select { options: Vec<SelectOption> },
}

impl Control {
    pub fn options(&self) -> &[SelectOption] {
        match self {
            Control::Input => &[],
            Control::Select { options } => options,
        }
    }
}

/// One grid row: a parameter field repeated across every column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridRow {
    pub parameter_id: i64,
    pub field_id: i64,
    pub label: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub control: Control,
}

impl GridRow {
    pub fn input(parameter_id: i64, field_id: i64, label: &str, value_type: ValueType) -> Self {
        Self {
            parameter_id,
            field_id,
            label: label.to_string(),
            unit: None,
            value_type,
            control: Control::Input,
        }
    }

    pub fn select(
        parameter_id: i64,
        field_id: i64,
        label: &str,
        value_type: ValueType,
        options: &[(&str, &str)],
    ) -> Self {
        Self {
            control: Control::Select {
                options: options
                    .iter()
                    .map(|(value, label)| SelectOption {
                        value: value.to_string(),
                        label: label.to_string(),
                    })
                    .collect(),
            },
            ..Self::input(parameter_id, field_id, label, value_type)
        }
    }
}

/// Declarative description of a sheet page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SheetLayout {
    /// Control id bound to each header field.
    #[serde(default)]
    pub header: BTreeMap<HeaderField, String>,
    #[serde(default)]
    pub rows: Vec<GridRow>,
    /// Columns on this page; `None` uses the configured count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_count: Option<usize>,
}

impl SheetLayout {
    /// Layout with the stock header bindings and no grid rows.
    pub fn with_default_header() -> Self {
        Self {
            header: HeaderField::ALL
                .into_iter()
                .map(|field| (field, field.default_control_id().to_string()))
                .collect(),
            rows: Vec::new(),
            column_count: None,
        }
    }
}

/// Validated registry built once per page.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    header: BTreeMap<HeaderField, String>,
    rows: Vec<GridRow>,
    row_index: HashMap<(i64, i64), usize>,
    column_count: usize,
}

impl FieldRegistry {
    pub fn from_layout(layout: SheetLayout, config: &SheetConfig) -> Result<Self, SheetError> {
        let column_count = layout.column_count.unwrap_or(config.column_count);
        if column_count == 0 {
            return Err(SheetError::InvalidLayout(
                "the grid needs at least one column".to_string(),
            ));
        }

        let unbound: Vec<&str> = HeaderField::ALL
            .into_iter()
            .filter(|field| {
                layout
                    .header
                    .get(field)
                    .map_or(true, |id| id.trim().is_empty())
            })
            .map(HeaderField::label)
            .collect();
        if !unbound.is_empty() {
            return Err(SheetError::InvalidLayout(format!(
                "header fields without a control: {}",
                unbound.join(", ")
            )));
        }

        let mut seen_controls = HashSet::new();
        for id in layout.header.values() {
            if !seen_controls.insert(id.trim()) {
                return Err(SheetError::InvalidLayout(format!(
                    "control '{id}' is bound twice"
                )));
            }
        }

        let mut row_index = HashMap::new();
        for (index, row) in layout.rows.iter().enumerate() {
            if row_index
                .insert((row.parameter_id, row.field_id), index)
                .is_some()
            {
                return Err(SheetError::InvalidLayout(format!(
                    "duplicate row for parameter {} field {}",
                    row.parameter_id, row.field_id
                )));
            }
            if matches!(&row.control, Control::Select { options } if options.is_empty()) {
                return Err(SheetError::InvalidLayout(format!(
                    "select '{}' has no options",
                    row.label
                )));
            }
        }

        // Time-of-day fields only exist on pages that show those parameters.
        for field in &config.time_of_day_fields {
            if let Some(&index) = row_index.get(&(field.parameter_id, field.field_id)) {
                if layout.rows[index].value_type != ValueType::Text {
                    return Err(SheetError::InvalidLayout(format!(
                        "time-of-day field '{}' must be a text field",
                        layout.rows[index].label
                    )));
                }
            }
        }

        Ok(Self {
            header: layout.header,
            rows: layout.rows,
            row_index,
            column_count,
        })
    }

    pub fn control_id(&self, field: HeaderField) -> &str {
        self.header
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.default_control_id())
    }

    /// Reverse lookup from a page control id.
    pub fn header_field(&self, control_id: &str) -> Option<HeaderField> {
        self.header
            .iter()
            .find(|(_, id)| id.as_str() == control_id)
            .map(|(field, _)| *field)
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn row(&self, parameter_id: i64, field_id: i64) -> Option<&GridRow> {
        self.row_index
            .get(&(parameter_id, field_id))
            .map(|&index| &self.rows[index])
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Every cell key, row by row.
    pub fn cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.rows.iter().flat_map(move |row| {
            (0..self.column_count)
                .map(move |column| CellKey::new(row.parameter_id, row.field_id, column))
        })
    }
}
