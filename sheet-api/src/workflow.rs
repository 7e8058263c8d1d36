//! Page workflows: save, lookup by document, patient search and printing.
//!
//! Each workflow takes the session by value and hands it back, in the
//! report on success or inside [`WorkflowError`] on failure.

use chrono::NaiveDate;
use sheet_core::{
    FieldRegistry, FormSession, GridState, HeaderField, Insurer, Patient, SheetConfig,
    SheetError, StoredForm, SummaryView,
};
use sheet_grid::{aggregate_groups, build_summary, reconcile_grid};
use tracing::{info, warn};

use crate::{
    ApiError, FormQuery, Gateway, NoticeLevel, Notifier, PatientQuery, PrintTarget, Transport,
};

const SAVED: &str = "Datos guardados correctamente";
const UPDATED: &str = "Datos actualizados correctamente";
const SAVE_FAILED: &str = "Error al guardar formulario";
const PATIENT_SAVE_FAILED: &str = "Error al guardar paciente";
const REQUIRED_MISSING: &str = "Complete los campos requeridos";
const MEASUREMENTS_LOAD_FAILED: &str = "Error al cargar mediciones guardadas";

/// A failed workflow, with the session as it was when it failed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct WorkflowError {
    pub session: FormSession,
    #[source]
    pub error: ApiError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    /// Cleared session, ready for the next patient.
    pub session: FormSession,
    pub patient: Patient,
    pub form: StoredForm,
    pub submitted_groups: usize,
    /// `None` when refreshing the summary failed; the save itself stood.
    pub summary: Option<SummaryView>,
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// A form exists; the session is now in update mode.
    Form { form_id: i64 },
    /// Only the patient exists; a new form can be filled in.
    PatientOnly { patient_id: i64 },
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupReport {
    pub session: FormSession,
    pub outcome: LookupOutcome,
    pub summary: Option<SummaryView>,
}

struct SaveFailure {
    error: ApiError,
    patient_id: Option<i64>,
    form_id: Option<i64>,
}

impl SaveFailure {
    fn at<E>(patient_id: Option<i64>, form_id: Option<i64>) -> impl Fn(E) -> SaveFailure
    where
        ApiError: From<E>,
    {
        move |err| SaveFailure {
            error: ApiError::from(err),
            patient_id,
            form_id,
        }
    }
}

pub struct SheetClient<T, N> {
    gateway: Gateway<T, N>,
    registry: FieldRegistry,
    config: SheetConfig,
}

impl<T: Transport, N: Notifier> SheetClient<T, N> {
    pub fn new(gateway: Gateway<T, N>, registry: FieldRegistry, config: SheetConfig) -> Self {
        Self {
            gateway,
            registry,
            config,
        }
    }

    pub fn gateway(&self) -> &Gateway<T, N> {
        &self.gateway
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    pub fn new_session(&self) -> FormSession {
        FormSession::new(&self.registry)
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        self.gateway.notifier().notify(level, message);
    }

    pub async fn load_insurers(&self) -> Result<Vec<Insurer>, ApiError> {
        self.gateway.list_insurers().await.inspect_err(|_| {
            self.notify(NoticeLevel::Error, "Error al cargar aseguradoras");
        })
    }

    /// Saves patient, form and measurements, in that order.
    ///
    /// Editing an existing form requires `confirmed`. On success the
    /// returned session is cleared.
    pub async fn save(
        &self,
        session: FormSession,
        confirmed: bool,
        today: NaiveDate,
    ) -> Result<SaveReport, WorkflowError> {
        let updated = session.is_update();
        if updated && !confirmed {
            return Err(WorkflowError {
                session,
                error: ApiError::ConfirmationRequired,
            });
        }

        match self.save_steps(&session, today).await {
            Ok((patient, form, submitted_groups)) => {
                let summary = self.refresh_summary(form.id, today).await;
                self.notify(NoticeLevel::Success, if updated { UPDATED } else { SAVED });
                info!(
                    form_id = form.id,
                    patient_id = patient.id,
                    submitted_groups,
                    updated,
                    "sheet saved"
                );
                Ok(SaveReport {
                    session: session.reset(),
                    patient,
                    form,
                    submitted_groups,
                    summary,
                    updated,
                })
            }
            Err(SaveFailure {
                error,
                patient_id,
                form_id,
            }) => {
                let message = match &error {
                    ApiError::Validation(SheetError::MissingFields(_)) => REQUIRED_MISSING,
                    _ => SAVE_FAILED,
                };
                self.notify(NoticeLevel::Error, message);
                warn!(%error, "save failed");

                let mut session = session;
                if let Some(id) = patient_id {
                    session = session.with_patient_id(id);
                }
                if let Some(id) = form_id {
                    session = session.with_form_id(id);
                }
                Err(WorkflowError { session, error })
            }
        }
    }

    /// On failure, reports the ids already assigned so a retry updates
    /// instead of creating twice.
    async fn save_steps(
        &self,
        session: &FormSession,
        today: NaiveDate,
    ) -> Result<(Patient, StoredForm, usize), SaveFailure> {
        let patient_payload = session
            .patient_payload()
            .map_err(SaveFailure::at(None, None))?;
        let patient = self
            .gateway
            .save_patient(session.patient_id(), &patient_payload)
            .await
            .map_err(|err| {
                self.notify(NoticeLevel::Error, PATIENT_SAVE_FAILED);
                SaveFailure::at(None, None)(err)
            })?;
        let patient_id = Some(patient.id);

        let form_payload = session
            .form_payload(patient.id, &self.config, today)
            .map_err(SaveFailure::at(patient_id, None))?;
        let form = self
            .gateway
            .save_form(session.form_id(), &form_payload)
            .await
            .map_err(SaveFailure::at(patient_id, None))?;
        let form_id = Some(form.id);

        let groups = aggregate_groups(session.grid(), &self.registry, &self.config, form.id)
            .map_err(SaveFailure::at(patient_id, form_id))?;
        let submitted = self
            .gateway
            .submit_measurements(&groups)
            .await
            .map_err(SaveFailure::at(patient_id, form_id))?;

        Ok((patient, form, submitted))
    }

    /// Rebuilds the summary from what the backend stored. Failures are
    /// logged and yield `None`.
    pub async fn refresh_summary(&self, form_id: i64, today: NaiveDate) -> Option<SummaryView> {
        match self.load_summary(form_id, today).await {
            Ok(view) => Some(view),
            Err(error) => {
                warn!(form_id, %error, "could not refresh summary");
                None
            }
        }
    }

    async fn load_summary(&self, form_id: i64, today: NaiveDate) -> Result<SummaryView, ApiError> {
        let form = self.gateway.fetch_form(form_id).await?;
        let patient = self.gateway.fetch_patient(form.patient.id).await?;
        let measurements = self.gateway.list_measurements(form_id).await?;
        let reconciled = reconcile_grid(
            GridState::for_registry(&self.registry),
            &self.registry,
            &self.config,
            &measurements,
        )?;
        Ok(build_summary(
            Some(&form),
            Some(&patient),
            &reconciled.grid,
            &self.registry,
            today,
        ))
    }

    /// Finds the latest form for a patient document, falling back to the
    /// patient record alone.
    pub async fn lookup_by_document(
        &self,
        session: FormSession,
        document: &str,
        today: NaiveDate,
    ) -> Result<LookupReport, WorkflowError> {
        let document = document.trim();
        if document.is_empty() {
            self.notify(NoticeLevel::Error, "Ingrese el documento del paciente");
            return Err(WorkflowError {
                session,
                error: SheetError::MissingFields(vec![HeaderField::Identifier.label().to_string()])
                    .into(),
            });
        }

        let session = session
            .reset()
            .with_value(HeaderField::Identifier, document);

        match self.lookup_steps(session.clone(), document, today).await {
            Ok(report) => Ok(report),
            Err(error) => {
                self.notify(NoticeLevel::Error, "Error al buscar datos");
                Err(WorkflowError { session, error })
            }
        }
    }

    async fn lookup_steps(
        &self,
        session: FormSession,
        document: &str,
        today: NaiveDate,
    ) -> Result<LookupReport, ApiError> {
        let forms = self
            .gateway
            .search_forms(&FormQuery::PatientIdentifier(document.to_string()))
            .await?;

        if let Some(form) = forms.into_iter().next() {
            let patient = self.gateway.fetch_patient(form.patient.id).await?;
            let mut session = session
                .with_patient(&patient, today)
                .with_form(&form)
                .refresh_age(today);

            session = self.load_grid(session, form.id).await;
            let summary = build_summary(
                Some(&form),
                Some(&patient),
                session.grid(),
                &self.registry,
                today,
            );
            self.notify(NoticeLevel::Success, "Datos encontrados");
            return Ok(LookupReport {
                session,
                outcome: LookupOutcome::Form { form_id: form.id },
                summary: Some(summary),
            });
        }

        let patients = self
            .gateway
            .search_patients(&PatientQuery::Identifier(document.to_string()))
            .await?;
        match patients.into_iter().next() {
            Some(patient) => {
                let session = session.with_patient(&patient, today);
                let summary = build_summary(
                    None,
                    Some(&patient),
                    session.grid(),
                    &self.registry,
                    today,
                );
                self.notify(
                    NoticeLevel::Info,
                    "Paciente encontrado. No se encontró formulario existente. Puede crear uno nuevo.",
                );
                Ok(LookupReport {
                    session,
                    outcome: LookupOutcome::PatientOnly {
                        patient_id: patient.id,
                    },
                    summary: Some(summary),
                })
            }
            None => {
                self.notify(
                    NoticeLevel::Info,
                    "No se encontró ningún formulario ni paciente para este documento. Puede crear uno nuevo.",
                );
                Ok(LookupReport {
                    session,
                    outcome: LookupOutcome::NotFound,
                    summary: None,
                })
            }
        }
    }

    /// Loads stored measurements into the session grid. A failure leaves the
    /// grid as it was and is only notified.
    async fn load_grid(&self, session: FormSession, form_id: i64) -> FormSession {
        let loaded = match self.gateway.list_measurements(form_id).await {
            Ok(measurements) => reconcile_grid(
                session.grid().clone(),
                &self.registry,
                &self.config,
                &measurements,
            )
            .map_err(ApiError::from),
            Err(error) => Err(error),
        };

        match loaded {
            Ok(reconciled) => {
                info!(
                    form_id,
                    locked = ?reconciled.locked_columns,
                    "stored measurements loaded"
                );
                session.with_grid(reconciled.grid)
            }
            Err(error) => {
                warn!(form_id, %error, "could not load measurements");
                self.notify(NoticeLevel::Error, MEASUREMENTS_LOAD_FAILED);
                session
            }
        }
    }

    /// Looks a patient up by identifier, else by clinical-record number.
    pub async fn search_patient(
        &self,
        session: FormSession,
        today: NaiveDate,
    ) -> Result<LookupReport, WorkflowError> {
        let identifier = session.header().get(HeaderField::Identifier).map(str::to_string);
        let record = session
            .header()
            .get(HeaderField::ClinicalRecordNumber)
            .map(str::to_string);

        let query = match (&identifier, &record) {
            (Some(value), _) => PatientQuery::Identifier(value.clone()),
            (None, Some(value)) => PatientQuery::ClinicalRecord(value.clone()),
            (None, None) => {
                self.notify(
                    NoticeLevel::Error,
                    "Ingrese número de identificación o historia clínica",
                );
                return Err(WorkflowError {
                    session,
                    error: SheetError::MissingFields(vec![
                        HeaderField::Identifier.label().to_string(),
                        HeaderField::ClinicalRecordNumber.label().to_string(),
                    ])
                    .into(),
                });
            }
        };

        let patients = match self.gateway.search_patients(&query).await {
            Ok(patients) => patients,
            Err(error) => {
                self.notify(NoticeLevel::Error, "Error al buscar paciente");
                return Err(WorkflowError { session, error });
            }
        };

        match patients.into_iter().next() {
            Some(patient) => {
                self.notify(NoticeLevel::Success, "Paciente encontrado");
                Ok(LookupReport {
                    session: session.with_patient(&patient, today),
                    outcome: LookupOutcome::PatientOnly {
                        patient_id: patient.id,
                    },
                    summary: None,
                })
            }
            None => {
                self.notify(NoticeLevel::Info, "Paciente no encontrado");
                let mut session = session.reset();
                if let Some(value) = identifier {
                    session.header_mut().set(HeaderField::Identifier, value);
                }
                if let Some(value) = record {
                    session.header_mut().set(HeaderField::ClinicalRecordNumber, value);
                }
                Ok(LookupReport {
                    session,
                    outcome: LookupOutcome::NotFound,
                    summary: None,
                })
            }
        }
    }

    /// Printable page for the session: the form when known, else the patient.
    pub fn print_target(&self, session: &FormSession) -> Result<String, ApiError> {
        let target = match (session.form_id(), session.patient_id()) {
            (Some(form_id), _) => PrintTarget::Form(form_id),
            (None, Some(patient_id)) => PrintTarget::Patient(patient_id),
            (None, None) => {
                let error = ApiError::NothingToPrint;
                self.notify(NoticeLevel::Error, &error.to_string());
                return Err(error);
            }
        };
        Ok(self.gateway.print_url(target))
    }
}
