//! Framework-neutral bridge between the sheet logic and JavaScript.

use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use sheet_core::{
    age_on, local_today, parse_date, FieldRef, FieldRegistry, Form, GridSnapshot, GridState,
    Patient, SheetConfig, SheetError, SheetLayout,
};
use wasm_bindgen::prelude::*;

/// Partial config from JS; missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
struct JsSheetConfig {
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    site_base_url: Option<String>,
    #[serde(default)]
    column_count: Option<usize>,
    #[serde(default)]
    default_form_code: Option<String>,
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
    #[serde(default)]
    time_of_day_fields: Option<Vec<FieldRef>>,
}

impl From<JsSheetConfig> for SheetConfig {
    fn from(cfg: JsSheetConfig) -> Self {
        let mut base = SheetConfig::default();
        if let Some(url) = cfg.api_base_url {
            base.api_base_url = url;
        }
        if let Some(url) = cfg.site_base_url {
            base.site_base_url = url;
        }
        if let Some(count) = cfg.column_count {
            base.column_count = count;
        }
        if let Some(code) = cfg.default_form_code {
            base.default_form_code = code;
        }
        if let Some(minutes) = cfg.utc_offset_minutes {
            base.utc_offset_minutes = minutes;
        }
        if let Some(fields) = cfg.time_of_day_fields {
            base.time_of_day_fields = fields;
        }
        base
    }
}

/// Reconciled grid as handed back to the page.
#[derive(Debug, Serialize)]
struct ReconcileOutput {
    snapshot: GridSnapshot,
    skipped_measurements: usize,
    skipped_values: usize,
}

/// Builds the measurement bodies for a grid snapshot.
#[wasm_bindgen]
pub fn aggregate_grid(
    layout: JsValue,
    snapshot: JsValue,
    form_id: u32,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init_panic_hook();
    let cfg = read_config(config)?;
    let registry = read_registry(layout, &cfg)?;
    let snapshot: GridSnapshot = read("snapshot", snapshot)?;

    let grid = GridState::from_snapshot(&registry, &snapshot).map_err(js_error)?;
    let payloads = sheet_grid::aggregate_grid(&grid, &registry, &cfg, i64::from(form_id))
        .map_err(js_error)?;
    write("payloads", &payloads)
}

/// Loads stored measurements (array or paginated envelope) into a fresh grid.
#[wasm_bindgen]
pub fn reconcile_grid(
    layout: JsValue,
    measurements: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init_panic_hook();
    let cfg = read_config(config)?;
    let registry = read_registry(layout, &cfg)?;
    let measurements: serde_json::Value = read("measurements", measurements)?;
    let measurements = sheet_grid::measurements_from_value(measurements).map_err(js_error)?;

    let reconciled = sheet_grid::reconcile_grid(
        GridState::for_registry(&registry),
        &registry,
        &cfg,
        &measurements,
    )
    .map_err(js_error)?;

    write(
        "grid",
        &ReconcileOutput {
            snapshot: reconciled.grid.snapshot(),
            skipped_measurements: reconciled.skipped_measurements,
            skipped_values: reconciled.skipped_values,
        },
    )
}

/// Summary view for the panel. `form` and `patient` may be null.
#[wasm_bindgen]
pub fn build_summary(
    layout: JsValue,
    snapshot: JsValue,
    form: JsValue,
    patient: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init_panic_hook();
    let cfg = read_config(config)?;
    let registry = read_registry(layout, &cfg)?;
    let snapshot: GridSnapshot = read("snapshot", snapshot)?;
    let form: Option<Form> = read("form", form)?;
    let patient: Option<Patient> = read("patient", patient)?;

    let grid = GridState::from_snapshot(&registry, &snapshot).map_err(js_error)?;
    let today = clinic_today(&cfg)?;
    let view = sheet_grid::build_summary(form.as_ref(), patient.as_ref(), &grid, &registry, today);
    write("summary", &view)
}

/// Age in whole years; `today` defaults to the clinic's current date.
#[wasm_bindgen]
pub fn compute_age(birth_date: &str, today: Option<String>) -> Result<Option<u32>, JsValue> {
    let birth = parse_date(birth_date)
        .ok_or_else(|| JsValue::from_str(&format!("Fecha inválida: {birth_date}")))?;
    let today = match today.as_deref() {
        Some(text) => {
            parse_date(text).ok_or_else(|| JsValue::from_str(&format!("Fecha inválida: {text}")))?
        }
        None => clinic_today(&SheetConfig::default())?,
    };
    Ok(age_on(birth, today))
}

#[wasm_bindgen]
pub fn parse_boolean(text: &str) -> bool {
    sheet_grid::parse_boolean(text)
}

/// User-facing message for a rejected request body.
#[wasm_bindgen]
pub fn extract_error_message(body: &str) -> String {
    sheet_api::ErrorBody::parse(body).message()
}

#[wasm_bindgen]
pub fn csrf_token(cookies: &str) -> Option<String> {
    sheet_api::csrf_token_from_cookie(cookies)
}

fn init_panic_hook() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn read_config(config: Option<JsValue>) -> Result<SheetConfig, JsValue> {
    match config {
        Some(js_cfg) if !js_cfg.is_null() && !js_cfg.is_undefined() => {
            let cfg: JsSheetConfig = read("config", js_cfg)?;
            Ok(SheetConfig::from(cfg))
        }
        _ => Ok(SheetConfig::default()),
    }
}

fn read_registry(layout: JsValue, cfg: &SheetConfig) -> Result<FieldRegistry, JsValue> {
    let layout: SheetLayout = read("layout", layout)?;
    FieldRegistry::from_layout(layout, cfg).map_err(js_error)
}

fn clinic_today(cfg: &SheetConfig) -> Result<chrono::NaiveDate, JsValue> {
    Ok(local_today(cfg.offset().map_err(js_error)?))
}

fn read<T: serde::de::DeserializeOwned>(what: &str, value: JsValue) -> Result<T, JsValue> {
    from_value(value).map_err(|err| JsValue::from_str(&format!("No se pudo leer {what}: {err}")))
}

fn write<T: Serialize>(what: &str, value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|err| JsValue::from_str(&format!("No se pudo serializar {what}: {err}")))
}

fn js_error(err: SheetError) -> JsValue {
    JsValue::from_str(&format_sheet_error(err))
}

fn format_sheet_error(err: SheetError) -> String {
    format!("Error de hoja: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: JsSheetConfig =
            serde_json::from_str(r#"{"column_count": 6, "utc_offset_minutes": 0}"#).unwrap();
        let cfg = SheetConfig::from(cfg);
        assert_eq!(cfg.column_count, 6);
        assert_eq!(cfg.utc_offset_minutes, 0);
        assert_eq!(cfg.default_form_code, "FRSPA-022");
        assert!(cfg.is_time_of_day(17, 19));

        let registry = FieldRegistry::from_layout(SheetLayout::with_default_header(), &cfg).unwrap();
        assert_eq!(registry.column_count(), 6);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(SheetConfig::from(JsSheetConfig::default()), SheetConfig::default());
    }

    #[test]
    fn sheet_errors_are_prefixed() {
        let message = format_sheet_error(SheetError::MissingFields(vec!["Versión".to_string()]));
        assert!(message.starts_with("Error de hoja: "));
        assert!(message.contains("Versión"));
    }
}
