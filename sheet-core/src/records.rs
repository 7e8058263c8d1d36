//! Records exchanged with the clinical backend.
//!
//! Field names on the wire follow the backend's serializers; the Rust side
//! uses English names and `serde(rename)` to bridge them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BloodType {
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::OPositive,
        BloodType::ONegative,
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
    ];

    pub fn code(self) -> &'static str {
        match self {
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(code))
    }
}

/// Obstetric status of the encounter (G/P/C/A/V/M).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    G,
    P,
    C,
    A,
    V,
    M,
}

impl FormStatus {
    pub fn code(self) -> &'static str {
        match self {
            FormStatus::G => "g",
            FormStatus::P => "p",
            FormStatus::C => "c",
            FormStatus::A => "a",
            FormStatus::V => "v",
            FormStatus::M => "m",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FormStatus::G => "G",
            FormStatus::P => "P",
            FormStatus::C => "C",
            FormStatus::A => "A",
            FormStatus::V => "V",
            FormStatus::M => "M",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "g" => Some(FormStatus::G),
            "p" => Some(FormStatus::P),
            "c" => Some(FormStatus::C),
            "a" => Some(FormStatus::A),
            "v" => Some(FormStatus::V),
            "m" => Some(FormStatus::M),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insurer {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: i64,
    #[serde(rename = "num_historia_clinica")]
    pub clinical_record_number: String,
    #[serde(rename = "num_identificacion")]
    pub identifier: String,
    #[serde(rename = "nombres")]
    pub names: String,
    #[serde(rename = "fecha_nacimiento", default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(rename = "tipo_sangre", default)]
    pub blood_type: Option<BloodType>,
}

/// Short patient record nested inside forms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub id: i64,
    #[serde(rename = "num_historia_clinica", default)]
    pub clinical_record_number: String,
    #[serde(rename = "num_identificacion", default)]
    pub identifier: String,
    #[serde(rename = "nombres", default)]
    pub names: String,
}

impl From<&Patient> for PatientSummary {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            clinical_record_number: patient.clinical_record_number.clone(),
            identifier: patient.identifier.clone(),
            names: patient.names.clone(),
        }
    }
}

/// Body for patient create/update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientPayload {
    #[serde(rename = "num_historia_clinica")]
    pub clinical_record_number: String,
    #[serde(rename = "num_identificacion")]
    pub identifier: String,
    #[serde(rename = "nombres")]
    pub names: String,
    #[serde(rename = "tipo_sangre")]
    pub blood_type: Option<BloodType>,
    #[serde(rename = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Form {
    pub id: i64,
    #[serde(rename = "codigo")]
    pub code: String,
    pub version: String,
    #[serde(rename = "fecha_elabora")]
    pub prepared_on: NaiveDate,
    #[serde(rename = "fecha_actualizacion", default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "num_hoja")]
    pub sheet_number: u32,
    #[serde(rename = "paciente")]
    pub patient: PatientSummary,
    #[serde(rename = "aseguradora", default)]
    pub insurer: Option<Insurer>,
    #[serde(rename = "diagnostico", default)]
    pub diagnosis: Option<String>,
    #[serde(rename = "edad_snapshot", default)]
    pub age_snapshot: Option<u32>,
    #[serde(rename = "edad_gestion", default)]
    pub gestational_age: Option<u32>,
    #[serde(rename = "estado")]
    pub status: FormStatus,
    #[serde(rename = "estado_display", default)]
    pub status_display: Option<String>,
    #[serde(rename = "n_controles_prenatales", default)]
    pub prenatal_visits: Option<u32>,
    #[serde(rename = "responsable")]
    pub responsible: String,
}

/// Body for form create/update; relations travel as ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormPayload {
    #[serde(rename = "codigo")]
    pub code: String,
    pub version: String,
    #[serde(rename = "fecha_elabora")]
    pub prepared_on: NaiveDate,
    #[serde(rename = "num_hoja")]
    pub sheet_number: u32,
    #[serde(rename = "paciente")]
    pub patient_id: i64,
    #[serde(rename = "aseguradora")]
    pub insurer_id: Option<i64>,
    #[serde(rename = "diagnostico")]
    pub diagnosis: Option<String>,
    #[serde(rename = "edad_snapshot")]
    pub age_snapshot: Option<u32>,
    #[serde(rename = "edad_gestion")]
    pub gestational_age: Option<u32>,
    #[serde(rename = "estado")]
    pub status: FormStatus,
    #[serde(rename = "n_controles_prenatales")]
    pub prenatal_visits: Option<u32>,
    #[serde(rename = "responsable")]
    pub responsible: String,
}

/// Form as echoed by create/update, with relations still as ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredForm {
    pub id: i64,
    #[serde(flatten)]
    pub fields: FormPayload,
}

/// Declared type of a parameter field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    #[default]
    Text,
    Boolean,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSummary {
    pub id: i64,
    #[serde(rename = "codigo", default)]
    pub code: Option<String>,
    #[serde(rename = "nombre", default)]
    pub name: Option<String>,
    #[serde(rename = "unidad", default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSummary {
    pub id: i64,
    #[serde(rename = "codigo", default)]
    pub code: Option<String>,
    #[serde(rename = "tipo_valor", default)]
    pub value_type: Option<ValueType>,
}

/// Measurement as listed by the backend, values nested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "parametro")]
    pub parameter: ParameterSummary,
    #[serde(rename = "tomada_en")]
    pub taken_at: DateTime<Utc>,
    #[serde(rename = "observacion", default)]
    pub observation: Option<String>,
    #[serde(rename = "valores", default)]
    pub values: Vec<MeasurementValue>,
}

/// One stored datum. The backend keeps exactly one slot populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementValue {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "campo")]
    pub field: FieldSummary,
    #[serde(
        rename = "valor_number",
        default,
        deserialize_with = "deserialize_decimal"
    )]
    pub number: Option<f64>,
    #[serde(rename = "valor_text", default)]
    pub text: Option<String>,
    #[serde(rename = "valor_boolean", default)]
    pub boolean: Option<bool>,
    #[serde(rename = "valor_json", default)]
    pub json: Option<Value>,
}

/// Populated slot of a stored value, in display precedence order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoredValue<'a> {
    Text(&'a str),
    Number(f64),
    Boolean(bool),
    Json(&'a Value),
    Empty,
}

impl MeasurementValue {
    pub fn stored(&self) -> StoredValue<'_> {
        if let Some(text) = &self.text {
            StoredValue::Text(text)
        } else if let Some(number) = self.number {
            StoredValue::Number(number)
        } else if let Some(flag) = self.boolean {
            StoredValue::Boolean(flag)
        } else if let Some(json) = &self.json {
            StoredValue::Json(json)
        } else {
            StoredValue::Empty
        }
    }
}

/// Decimal columns arrive as strings ("36.500000") or as plain numbers.
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Number(f64),
        Text(String),
    }

    match Option::<Decimal>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Decimal::Number(value)) => Ok(Some(value)),
        Some(Decimal::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Typed slot of a submitted value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValueData {
    #[serde(rename = "valor_text")]
    Text(String),
    #[serde(rename = "valor_boolean")]
    Boolean(bool),
    #[serde(rename = "valor_json")]
    Json(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuePayload {
    #[serde(rename = "campo_id")]
    pub field_id: i64,
    #[serde(flatten)]
    pub data: ValueData,
}

/// Body for measurement creation with nested values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasurementPayload {
    #[serde(rename = "formulario")]
    pub form_id: i64,
    #[serde(rename = "parametro")]
    pub parameter_id: i64,
    #[serde(rename = "tomada_en")]
    pub taken_at: DateTime<Utc>,
    #[serde(rename = "valores")]
    pub values: Vec<ValuePayload>,
}
