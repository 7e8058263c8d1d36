//! Page-wide settings, read once and shared by every sheet operation.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::SheetError;

/// A (parameter, field) pair of the measurement catalogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub parameter_id: i64,
    pub field_id: i64,
}

impl FieldRef {
    pub const fn new(parameter_id: i64, field_id: i64) -> Self {
        Self {
            parameter_id,
            field_id,
        }
    }
}

/// Runtime settings for the sheet client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SheetConfig {
    /// Prefix for REST collection endpoints.
    pub api_base_url: String,
    /// Prefix for server-rendered pages (print views).
    pub site_base_url: String,
    /// Number of timestamp columns in the grid.
    pub column_count: usize,
    /// Code used when the form header leaves it blank.
    pub default_form_code: String,
    /// Offset of the clinic's wall clock from UTC.
    pub utc_offset_minutes: i32,
    /// Text fields holding a time of day, shown in 12-hour format.
    pub time_of_day_fields: Vec<FieldRef>,
    pub request_timeout_secs: u64,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            api_base_url: "/api".to_string(),
            site_base_url: String::new(),
            column_count: 12,
            default_form_code: "FRSPA-022".to_string(),
            utc_offset_minutes: -300,
            time_of_day_fields: vec![FieldRef::new(17, 19), FieldRef::new(14, 18)],
            request_timeout_secs: 30,
        }
    }
}

impl SheetConfig {
    pub fn offset(&self) -> Result<FixedOffset, SheetError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(SheetError::InvalidOffset(self.utc_offset_minutes))
    }

    pub fn is_time_of_day(&self, parameter_id: i64, field_id: i64) -> bool {
        self.time_of_day_fields
            .contains(&FieldRef::new(parameter_id, field_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_offset_is_colombia() {
        let offset = SheetConfig::default().offset().unwrap();
        assert_eq!(offset.local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn rejects_impossible_offset() {
        let config = SheetConfig {
            utc_offset_minutes: 24 * 60,
            ..SheetConfig::default()
        };
        assert_eq!(config.offset(), Err(SheetError::InvalidOffset(1440)));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SheetConfig =
            serde_json::from_str(r#"{"column_count": 6, "api_base_url": "/v2"}"#).unwrap();
        assert_eq!(config.column_count, 6);
        assert_eq!(config.api_base_url, "/v2");
        assert_eq!(config.default_form_code, "FRSPA-022");
        assert!(config.is_time_of_day(17, 19));
        assert!(!config.is_time_of_day(19, 17));
    }
}
