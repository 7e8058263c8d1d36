//! Typed access to the sheet backend's REST collections.

use chrono::Utc;
use futures_util::future::try_join_all;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sheet_core::{
    Form, FormPayload, Insurer, Measurement, MeasurementPayload, Patient, PatientPayload,
    SheetConfig, StoredForm,
};
use sheet_grid::{measurements_from_value, MeasurementGroup};
use tracing::{debug, warn};

use crate::{ApiError, ErrorBody, HttpRequest, Method, NoticeLevel, Notifier, Transport};

/// Patient search filters; the identifier takes precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientQuery {
    Identifier(String),
    ClinicalRecord(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormQuery {
    Patient(i64),
    PatientIdentifier(String),
}

/// Server-rendered printable page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTarget {
    Form(i64),
    Patient(i64),
}

pub struct Gateway<T, N> {
    transport: T,
    notifier: N,
    api_base: String,
    site_base: String,
    csrf_token: Option<String>,
    cookie_header: Option<String>,
}

impl<T: Transport, N: Notifier> Gateway<T, N> {
    pub fn new(transport: T, notifier: N, config: &SheetConfig) -> Self {
        Self {
            transport,
            notifier,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            site_base: config.site_base_url.trim_end_matches('/').to_string(),
            csrf_token: None,
            cookie_header: None,
        }
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// Sends these cookies with every request and takes the CSRF token from them.
    ///
    /// Only useful outside the browser, where cookies are not attached for us.
    pub fn with_cookie_header(mut self, cookies: impl Into<String>) -> Self {
        let cookies = cookies.into();
        if let Some(token) = csrf_token_from_cookie(&cookies) {
            self.csrf_token = Some(token);
        }
        self.cookie_header = Some(cookies);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Sends one request to `endpoint` (relative to the API base).
    ///
    /// A 204 answer yields `None`. Rejections are turned into
    /// [`ApiError::Remote`] and also reported through the notifier.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let body = body.map(Value::to_string);
        self.send(method, endpoint, body).await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<String>,
    ) -> Result<Option<Value>, ApiError> {
        let mut url = format!("{}{}", self.api_base, endpoint);
        if method == Method::Get && !url.contains("?_=") && !url.contains("&_=") {
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{separator}_={}", Utc::now().timestamp_millis());
        }

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Cache-Control".to_string(),
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            ("Pragma".to_string(), "no-cache".to_string()),
            ("Expires".to_string(), "0".to_string()),
        ];
        if let Some(token) = &self.csrf_token {
            headers.push(("X-CSRFToken".to_string(), token.clone()));
        }
        if let Some(cookies) = &self.cookie_header {
            headers.push(("Cookie".to_string(), cookies.clone()));
        }

        debug!(method = method.as_str(), %url, "sending request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url: url.clone(),
                headers,
                body,
            })
            .await?;

        if !response.is_success() {
            let body = ErrorBody::parse(&response.body);
            let message = body.message();
            warn!(method = method.as_str(), %url, status = response.status, %message, "request rejected");
            self.notifier.notify(NoticeLevel::Error, &message);
            return Err(ApiError::Remote {
                status: response.status,
                body,
            });
        }

        if response.status == 204 {
            return Ok(None);
        }
        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn fetch<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R, ApiError> {
        let value = self.send(Method::Get, endpoint, None).await?;
        decode(value.unwrap_or(Value::Null))
    }

    async fn fetch_list<R: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<R>, ApiError> {
        let value = self.send(Method::Get, endpoint, None).await?;
        unwrap_list(value.unwrap_or(Value::Null))
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn write<B: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let body = serde_json::to_string(body).map_err(|err| ApiError::Decode(err.to_string()))?;
        let value = self.send(method, endpoint, Some(body)).await?;
        decode(value.unwrap_or(Value::Null))
    }

    pub async fn list_insurers(&self) -> Result<Vec<Insurer>, ApiError> {
        self.fetch_list("/aseguradoras/").await
    }

    pub async fn search_patients(&self, query: &PatientQuery) -> Result<Vec<Patient>, ApiError> {
        let endpoint = match query {
            PatientQuery::Identifier(value) => {
                format!("/pacientes/?num_identificacion={}", urlencoding::encode(value))
            }
            PatientQuery::ClinicalRecord(value) => {
                format!("/pacientes/?num_historia_clinica={}", urlencoding::encode(value))
            }
        };
        self.fetch_list(&endpoint).await
    }

    pub async fn fetch_patient(&self, id: i64) -> Result<Patient, ApiError> {
        self.fetch(&format!("/pacientes/{id}/")).await
    }

    /// PUT when the id is known, POST otherwise.
    pub async fn save_patient(
        &self,
        id: Option<i64>,
        payload: &PatientPayload,
    ) -> Result<Patient, ApiError> {
        match id {
            Some(id) => self.write(Method::Put, &format!("/pacientes/{id}/"), payload).await,
            None => self.write(Method::Post, "/pacientes/", payload).await,
        }
    }

    /// Most recently updated first, as the backend orders them.
    pub async fn search_forms(&self, query: &FormQuery) -> Result<Vec<Form>, ApiError> {
        let endpoint = match query {
            FormQuery::Patient(id) => format!("/formularios/?paciente={id}"),
            FormQuery::PatientIdentifier(value) => format!(
                "/formularios/?paciente__num_identificacion={}",
                urlencoding::encode(value)
            ),
        };
        self.fetch_list(&endpoint).await
    }

    pub async fn fetch_form(&self, id: i64) -> Result<Form, ApiError> {
        self.fetch(&format!("/formularios/{id}/")).await
    }

    /// The reply carries ids only; fetch the form for the nested record.
    pub async fn save_form(
        &self,
        id: Option<i64>,
        payload: &FormPayload,
    ) -> Result<StoredForm, ApiError> {
        match id {
            Some(id) => self.write(Method::Put, &format!("/formularios/{id}/"), payload).await,
            None => self.write(Method::Post, "/formularios/", payload).await,
        }
    }

    pub async fn list_measurements(&self, form_id: i64) -> Result<Vec<Measurement>, ApiError> {
        let value = self
            .send(Method::Get, &format!("/formularios/{form_id}/mediciones/"), None)
            .await?;
        measurements_from_value(value.unwrap_or(Value::Null))
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    pub async fn create_measurement(&self, payload: &MeasurementPayload) -> Result<(), ApiError> {
        let body = serde_json::to_string(payload).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.send(Method::Post, "/mediciones/", Some(body)).await?;
        Ok(())
    }

    /// Submits every group concurrently. The first rejection is returned,
    /// naming its group; groups already stored stay stored.
    pub async fn submit_measurements(&self, groups: &[MeasurementGroup]) -> Result<usize, ApiError> {
        let requests = groups.iter().map(|group| async move {
            self.create_measurement(&group.payload)
                .await
                .map_err(|err| ApiError::MeasurementGroup {
                    parameter_id: group.payload.parameter_id,
                    column: group.column,
                    source: Box::new(err),
                })
        });
        try_join_all(requests).await?;
        debug!(groups = groups.len(), "measurements submitted");
        Ok(groups.len())
    }

    pub fn print_url(&self, target: PrintTarget) -> String {
        match target {
            PrintTarget::Form(id) => format!("{}/formulario/{id}/impresion/", self.site_base),
            PrintTarget::Patient(id) => format!("{}/pacientes/{id}/pdf/", self.site_base),
        }
    }
}

/// Reads `csrftoken` out of a `document.cookie` style string.
pub fn csrf_token_from_cookie(cookies: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("csrftoken="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// List endpoints answer either a bare array or `{"results": [...]}`.
fn unwrap_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn decode<R: DeserializeOwned>(value: Value) -> Result<R, ApiError> {
    serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}
