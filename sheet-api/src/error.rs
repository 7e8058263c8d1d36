use serde_json::Value;
use sheet_core::SheetError;

/// Fallback shown when a rejection carries no body at all.
pub const GENERIC_FAILURE: &str = "Error en la petición";

/// Shape of a backend rejection body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Detail(String),
    Message(String),
    /// Per-field validation errors, in the order the body lists them.
    FieldErrors(Vec<(String, Vec<String>)>),
    Raw(String),
}

impl ErrorBody {
    pub fn parse(body: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) else {
            return ErrorBody::Raw(body.to_string());
        };

        if let Some(detail) = object.get("detail").and_then(non_empty_text) {
            return ErrorBody::Detail(detail);
        }
        if let Some(message) = object.get("message").and_then(non_empty_text) {
            return ErrorBody::Message(message);
        }
        if object.is_empty() {
            return ErrorBody::Raw(body.to_string());
        }

        let fields = object
            .into_iter()
            .map(|(field, value)| {
                let messages = match value {
                    Value::Array(items) => items.iter().map(value_text).collect(),
                    other => vec![value_text(&other)],
                };
                (field, messages)
            })
            .collect();
        ErrorBody::FieldErrors(fields)
    }

    /// Human-readable message, one `Field Name: a, b` line per field.
    pub fn message(&self) -> String {
        match self {
            ErrorBody::Detail(text) | ErrorBody::Message(text) => text.clone(),
            ErrorBody::FieldErrors(fields) => fields
                .iter()
                .map(|(field, messages)| {
                    format!("{}: {}", humanize_field(field), messages.join(", "))
                })
                .collect::<Vec<_>>()
                .join("\n"),
            ErrorBody::Raw(text) if text.trim().is_empty() => GENERIC_FAILURE.to_string(),
            ErrorBody::Raw(text) => text.clone(),
        }
    }
}

/// `num_identificacion` becomes `Num Identificacion`.
pub fn humanize_field(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        other => Some(value_text(other)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("{}", .body.message())]
    Remote { status: u16, body: ErrorBody },
    #[error("Error de conexión: {0}")]
    Transport(String),
    #[error("Respuesta inválida del servidor: {0}")]
    Decode(String),
    #[error("Error al guardar mediciones (parámetro {parameter_id}, columna {column}): {source}")]
    MeasurementGroup {
        parameter_id: i64,
        column: usize,
        #[source]
        source: Box<ApiError>,
    },
    #[error(transparent)]
    Validation(#[from] SheetError),
    #[error("Confirme la modificación del formulario existente")]
    ConfirmationRequired,
    #[error("Busque un paciente o formulario para imprimir")]
    NothingToPrint,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            ApiError::MeasurementGroup { source, .. } => source.status(),
            _ => None,
        }
    }
}
