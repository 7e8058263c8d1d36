//! Page-lifetime form state, passed into and returned from each workflow.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    age_on, parse_date, BloodType, FieldRegistry, Form, FormPayload, FormStatus, GridState,
    HeaderField, Patient, PatientPayload, SheetConfig, SheetError,
};

/// Raw text of the header controls, keyed by semantic field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderValues(BTreeMap<HeaderField, String>);

impl HeaderValues {
    /// Trimmed value, `None` when blank.
    pub fn get(&self, field: HeaderField) -> Option<&str> {
        self.0
            .get(&field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, field: HeaderField, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.0.remove(&field);
        } else {
            self.0.insert(field, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HeaderField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Reads page controls through the registry; unknown control ids are ignored.
    pub fn from_controls<'a>(
        registry: &FieldRegistry,
        controls: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut values = Self::default();
        for (control_id, value) in controls {
            if let Some(field) = registry.header_field(control_id) {
                values.set(field, value);
            }
        }
        values
    }

    /// Control id to value, ready to write back into the page.
    pub fn to_controls(&self, registry: &FieldRegistry) -> BTreeMap<String, String> {
        HeaderField::ALL
            .into_iter()
            .map(|field| {
                (
                    registry.control_id(field).to_string(),
                    self.0.get(&field).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    fn parse<T: FromStr>(&self, field: HeaderField) -> Result<Option<T>, SheetError> {
        match self.get(field) {
            None => Ok(None),
            Some(text) => text.parse::<T>().map(Some).map_err(|_| SheetError::InvalidField {
                field: field.label().to_string(),
                value: text.to_string(),
            }),
        }
    }

    fn date(&self, field: HeaderField) -> Result<Option<NaiveDate>, SheetError> {
        match self.get(field) {
            None => Ok(None),
            Some(text) => parse_date(text).map(Some).ok_or_else(|| SheetError::InvalidField {
                field: field.label().to_string(),
                value: text.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormSession {
    header: HeaderValues,
    grid: GridState,
    patient_id: Option<i64>,
    form_id: Option<i64>,
    update_mode: bool,
}

impl FormSession {
    pub fn new(registry: &FieldRegistry) -> Self {
        Self {
            header: HeaderValues::default(),
            grid: GridState::for_registry(registry),
            patient_id: None,
            form_id: None,
            update_mode: false,
        }
    }

    /// Cleared session: no ids, empty header, empty and unlocked grid.
    pub fn reset(self) -> Self {
        Self {
            header: HeaderValues::default(),
            grid: self.grid.cleared(),
            patient_id: None,
            form_id: None,
            update_mode: false,
        }
    }

    /// Cleared session that keeps one searched value.
    pub fn reset_keeping(self, field: HeaderField) -> Self {
        let kept = self.header.get(field).map(str::to_string);
        let mut session = self.reset();
        if let Some(value) = kept {
            session.header.set(field, value);
        }
        session
    }

    pub fn header(&self) -> &HeaderValues {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut HeaderValues {
        &mut self.header
    }

    pub fn with_value(mut self, field: HeaderField, value: impl Into<String>) -> Self {
        self.header.set(field, value);
        self
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut GridState {
        &mut self.grid
    }

    pub fn with_grid(mut self, grid: GridState) -> Self {
        self.grid = grid;
        self
    }

    pub fn patient_id(&self) -> Option<i64> {
        self.patient_id
    }

    pub fn form_id(&self) -> Option<i64> {
        self.form_id
    }

    /// True while editing a form that already exists on the backend.
    pub fn is_update(&self) -> bool {
        self.update_mode || self.form_id.is_some()
    }

    pub fn with_patient_id(mut self, patient_id: i64) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_form_id(mut self, form_id: i64) -> Self {
        self.form_id = Some(form_id);
        self
    }

    /// Copies a patient record into the header and derives the age.
    pub fn with_patient(mut self, patient: &Patient, today: NaiveDate) -> Self {
        self.patient_id = Some(patient.id);
        self.header
            .set(HeaderField::ClinicalRecordNumber, patient.clinical_record_number.clone());
        self.header.set(HeaderField::Identifier, patient.identifier.clone());
        self.header.set(HeaderField::Names, patient.names.clone());
        self.header.set(
            HeaderField::BloodType,
            patient.blood_type.map(BloodType::code).unwrap_or_default(),
        );
        self.header.set(
            HeaderField::BirthDate,
            patient
                .birth_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        );
        self.refresh_age(today)
    }

    /// Copies a stored form into the header and switches to update mode.
    pub fn with_form(mut self, form: &Form) -> Self {
        self.form_id = Some(form.id);
        self.patient_id = Some(form.patient.id);
        self.update_mode = true;

        let header = &mut self.header;
        header.set(
            HeaderField::ClinicalRecordNumber,
            form.patient.clinical_record_number.clone(),
        );
        header.set(HeaderField::Identifier, form.patient.identifier.clone());
        header.set(HeaderField::Names, form.patient.names.clone());
        header.set(HeaderField::Code, form.code.clone());
        header.set(HeaderField::Version, form.version.clone());
        header.set(
            HeaderField::PreparedOn,
            form.prepared_on.format("%Y-%m-%d").to_string(),
        );
        header.set(HeaderField::SheetNumber, form.sheet_number.to_string());
        header.set(HeaderField::Status, form.status.code());
        header.set(HeaderField::Diagnosis, form.diagnosis.clone().unwrap_or_default());
        header.set(HeaderField::AgeSnapshot, optional_number(form.age_snapshot));
        header.set(HeaderField::GestationalAge, optional_number(form.gestational_age));
        header.set(HeaderField::PrenatalVisits, optional_number(form.prenatal_visits));
        header.set(HeaderField::Responsible, form.responsible.clone());
        header.set(
            HeaderField::Insurer,
            form.insurer
                .as_ref()
                .map(|insurer| insurer.id.to_string())
                .unwrap_or_default(),
        );
        self
    }

    /// Recomputes the age field from the birth date, when one is set.
    pub fn refresh_age(mut self, today: NaiveDate) -> Self {
        let age = self
            .header
            .get(HeaderField::BirthDate)
            .and_then(parse_date)
            .and_then(|birth| age_on(birth, today));
        if let Some(age) = age {
            self.header.set(HeaderField::AgeSnapshot, age.to_string());
        }
        self
    }

    pub fn patient_payload(&self) -> Result<PatientPayload, SheetError> {
        let header = &self.header;
        require(
            header,
            &[
                HeaderField::ClinicalRecordNumber,
                HeaderField::Identifier,
                HeaderField::Names,
            ],
        )?;

        let blood_type = match header.get(HeaderField::BloodType) {
            None => None,
            Some(code) => Some(BloodType::from_code(code).ok_or_else(|| {
                SheetError::InvalidField {
                    field: HeaderField::BloodType.label().to_string(),
                    value: code.to_string(),
                }
            })?),
        };

        Ok(PatientPayload {
            clinical_record_number: text(header, HeaderField::ClinicalRecordNumber),
            identifier: text(header, HeaderField::Identifier),
            names: text(header, HeaderField::Names),
            blood_type,
            birth_date: header.date(HeaderField::BirthDate)?,
        })
    }

    /// Form body for the given patient. Code, prepared date and sheet number
    /// fall back to defaults when blank.
    pub fn form_payload(
        &self,
        patient_id: i64,
        config: &SheetConfig,
        today: NaiveDate,
    ) -> Result<FormPayload, SheetError> {
        let header = &self.header;
        require(
            header,
            &[
                HeaderField::Version,
                HeaderField::Status,
                HeaderField::Responsible,
            ],
        )?;

        let status_text = text(header, HeaderField::Status);
        let status =
            FormStatus::from_code(&status_text).ok_or_else(|| SheetError::InvalidField {
                field: HeaderField::Status.label().to_string(),
                value: status_text.clone(),
            })?;

        let sheet_number = header.parse::<u32>(HeaderField::SheetNumber)?.unwrap_or(1);
        if sheet_number == 0 {
            return Err(SheetError::InvalidField {
                field: HeaderField::SheetNumber.label().to_string(),
                value: "0".to_string(),
            });
        }

        Ok(FormPayload {
            code: header
                .get(HeaderField::Code)
                .unwrap_or(config.default_form_code.as_str())
                .to_string(),
            version: text(header, HeaderField::Version),
            prepared_on: header.date(HeaderField::PreparedOn)?.unwrap_or(today),
            sheet_number,
            patient_id,
            insurer_id: header.parse::<i64>(HeaderField::Insurer)?,
            diagnosis: header.get(HeaderField::Diagnosis).map(str::to_string),
            age_snapshot: header.parse::<u32>(HeaderField::AgeSnapshot)?,
            gestational_age: header.parse::<u32>(HeaderField::GestationalAge)?,
            status,
            prenatal_visits: header.parse::<u32>(HeaderField::PrenatalVisits)?,
            responsible: text(header, HeaderField::Responsible),
        })
    }
}

fn require(header: &HeaderValues, fields: &[HeaderField]) -> Result<(), SheetError> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| header.get(**field).is_none())
        .map(|field| field.label().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SheetError::MissingFields(missing))
    }
}

fn text(header: &HeaderValues, field: HeaderField) -> String {
    header.get(field).unwrap_or_default().to_string()
}

fn optional_number(value: Option<u32>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellKey, GridRow, PatientSummary, SheetLayout, ValueType};

    fn registry() -> FieldRegistry {
        let layout = SheetLayout {
            column_count: Some(2),
            rows: vec![GridRow::input(1, 1, "Sistólica", ValueType::Number)],
            ..SheetLayout::with_default_header()
        };
        FieldRegistry::from_layout(layout, &SheetConfig::default()).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn patient() -> Patient {
        Patient {
            id: 11,
            clinical_record_number: "HC-77".to_string(),
            identifier: "1020304050".to_string(),
            names: "Laura Gómez".to_string(),
            birth_date: Some(date(2000, 6, 15)),
            blood_type: Some(BloodType::APositive),
        }
    }

    #[test]
    fn patient_fields_are_required() {
        let session = FormSession::new(&registry()).with_value(HeaderField::Names, "Laura");
        assert_eq!(
            session.patient_payload(),
            Err(SheetError::MissingFields(vec![
                "N° Historia Clínica".to_string(),
                "Identificación".to_string(),
            ]))
        );
    }

    #[test]
    fn patient_copy_in_derives_age() {
        let session = FormSession::new(&registry()).with_patient(&patient(), date(2024, 6, 14));
        assert_eq!(session.patient_id(), Some(11));
        assert_eq!(session.header().get(HeaderField::AgeSnapshot), Some("23"));
        assert_eq!(session.header().get(HeaderField::BloodType), Some("A+"));

        let payload = session.patient_payload().unwrap();
        assert_eq!(payload.identifier, "1020304050");
        assert_eq!(payload.birth_date, Some(date(2000, 6, 15)));
    }

    #[test]
    fn form_payload_applies_defaults() {
        let session = FormSession::new(&registry())
            .with_value(HeaderField::Version, "2")
            .with_value(HeaderField::Status, "g")
            .with_value(HeaderField::Responsible, "Dra. Ruiz")
            .with_value(HeaderField::GestationalAge, "38");

        let payload = session
            .form_payload(11, &SheetConfig::default(), date(2024, 6, 15))
            .unwrap();
        assert_eq!(payload.code, "FRSPA-022");
        assert_eq!(payload.sheet_number, 1);
        assert_eq!(payload.prepared_on, date(2024, 6, 15));
        assert_eq!(payload.gestational_age, Some(38));
        assert_eq!(payload.insurer_id, None);
    }

    #[test]
    fn form_payload_reports_missing_and_invalid() {
        let session = FormSession::new(&registry()).with_value(HeaderField::Version, "2");
        assert_eq!(
            session.form_payload(1, &SheetConfig::default(), date(2024, 1, 1)),
            Err(SheetError::MissingFields(vec![
                "Estado".to_string(),
                "Responsable".to_string(),
            ]))
        );

        let session = session
            .with_value(HeaderField::Status, "g")
            .with_value(HeaderField::Responsible, "X")
            .with_value(HeaderField::PrenatalVisits, "cinco");
        assert!(matches!(
            session.form_payload(1, &SheetConfig::default(), date(2024, 1, 1)),
            Err(SheetError::InvalidField { .. })
        ));
    }

    #[test]
    fn reset_clears_ids_and_grid() {
        let mut session = FormSession::new(&registry())
            .with_patient(&patient(), date(2024, 1, 1))
            .with_form_id(3);
        session
            .grid_mut()
            .set_cell(CellKey::new(1, 1, 0), "120")
            .unwrap();
        session.grid_mut().lock_column(0);

        let session = session.reset_keeping(HeaderField::Identifier);
        assert_eq!(session.patient_id(), None);
        assert!(!session.is_update());
        assert_eq!(session.header().get(HeaderField::Identifier), Some("1020304050"));
        assert_eq!(session.header().get(HeaderField::Names), None);
        assert!(session.grid().locked_columns().is_empty());
        assert_eq!(session.grid().cell(&CellKey::new(1, 1, 0)).unwrap().value, "");
    }

    #[test]
    fn form_copy_in_enters_update_mode() {
        let form = Form {
            id: 5,
            code: "FRSPA-022".to_string(),
            version: "1".to_string(),
            prepared_on: date(2024, 6, 15),
            updated_at: None,
            sheet_number: 2,
            patient: PatientSummary::from(&patient()),
            insurer: None,
            diagnosis: Some("Trabajo de parto".to_string()),
            age_snapshot: Some(24),
            gestational_age: None,
            status: FormStatus::P,
            status_display: None,
            prenatal_visits: Some(6),
            responsible: "Enf. Torres".to_string(),
        };
        let session = FormSession::new(&registry()).with_form(&form);
        assert!(session.is_update());
        assert_eq!(session.form_id(), Some(5));
        assert_eq!(session.patient_id(), Some(11));
        assert_eq!(session.header().get(HeaderField::SheetNumber), Some("2"));
        assert_eq!(session.header().get(HeaderField::GestationalAge), None);
        assert_eq!(session.header().get(HeaderField::Status), Some("p"));
    }

    #[test]
    fn controls_round_trip_through_registry() {
        let registry = registry();
        let header =
            HeaderValues::from_controls(&registry, [("nombres", "Ana"), ("otro", "x")]);
        assert_eq!(header.get(HeaderField::Names), Some("Ana"));

        let controls = header.to_controls(&registry);
        assert_eq!(controls.get("nombres").map(String::as_str), Some("Ana"));
        assert_eq!(controls.get("version").map(String::as_str), Some(""));
        assert_eq!(controls.len(), HeaderField::ALL.len());
    }
}
