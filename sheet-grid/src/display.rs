//! Text rendering shared by the reconciler and the summary projection.

use chrono::{NaiveDateTime, Timelike};
use sheet_core::{MeasurementValue, SelectOption, StoredValue};

/// Shown for cells and fields that have no value.
pub const PLACEHOLDER: &str = "-";

/// Display text for a stored value, `None` when every slot is empty.
///
/// Precedence is text, number, boolean, then structured data. Blank text
/// counts as no value.
pub fn display_value(value: &MeasurementValue, time_of_day: bool) -> Option<String> {
    match value.stored() {
        StoredValue::Text(text) if text.trim().is_empty() => None,
        StoredValue::Text(text) if time_of_day => {
            Some(to_twelve_hour(text).unwrap_or_else(|| text.to_string()))
        }
        StoredValue::Text(text) => Some(text.to_string()),
        StoredValue::Number(number) => Some(format_number(number)),
        StoredValue::Boolean(flag) => Some(format_boolean(flag).to_string()),
        StoredValue::Json(json) => Some(json.to_string()),
        StoredValue::Empty => None,
    }
}

pub fn format_boolean(flag: bool) -> &'static str {
    if flag {
        "SÍ"
    } else {
        "NO"
    }
}

/// Integral values drop the decimal point: `120.000` renders as `120`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// `HH:MM` in 24-hour form to `hh:mm a. m.` / `hh:mm p. m.`.
pub fn to_twelve_hour(text: &str) -> Option<String> {
    let (hours, minutes) = text.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    let hour: u32 = digits(hours)?;
    let minute: u32 = digits(minutes)?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(clock_label(hour, minute))
}

/// Inverse of [`to_twelve_hour`]; plain `HH:MM` input is zero-padded.
pub fn from_twelve_hour(text: &str) -> Option<String> {
    let text = text.trim();
    let (clock, meridiem) = match text.split_once(' ') {
        Some((clock, rest)) => (clock, Some(rest.trim())),
        None => (text, None),
    };
    let (hours, minutes) = clock.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    let hour: u32 = digits(hours)?;
    let minute: u32 = digits(minutes)?;
    if minute > 59 {
        return None;
    }

    let hour = match meridiem.map(|m| m.replace([' ', '.'], "").to_ascii_lowercase()) {
        None if hour <= 23 => hour,
        Some(m) if m == "am" && (1..=12).contains(&hour) => hour % 12,
        Some(m) if m == "pm" && (1..=12).contains(&hour) => hour % 12 + 12,
        _ => return None,
    };
    Some(format!("{hour:02}:{minute:02}"))
}

/// Column header text: `dd/mm/yyyy, hh:mm a. m.`.
pub fn format_column_label(taken_at: NaiveDateTime) -> String {
    format!(
        "{}, {}",
        taken_at.format("%d/%m/%Y"),
        clock_label(taken_at.hour(), taken_at.minute())
    )
}

/// Picks the select option for a stored value.
///
/// Boolean values match the option whose value starts with the affirmative
/// or negative token. Otherwise an exact match wins over a substring match
/// in either direction.
pub fn match_option<'a>(
    options: &'a [SelectOption],
    text: &str,
    boolean: Option<bool>,
) -> Option<&'a SelectOption> {
    if text.is_empty() {
        return None;
    }

    if let Some(flag) = boolean {
        let found = options.iter().find(|option| {
            let upper = option.value.to_uppercase();
            if flag {
                upper.starts_with("SÍ") || upper.starts_with("SI")
            } else {
                upper.starts_with("NO")
            }
        });
        if found.is_some() {
            return found;
        }
    }

    options
        .iter()
        .find(|option| option.value == text)
        .or_else(|| {
            options
                .iter()
                .find(|option| option.value.contains(text) || text.contains(option.value.as_str()))
        })
}

fn clock_label(hour: u32, minute: u32) -> String {
    let meridiem = if hour >= 12 { "p. m." } else { "a. m." };
    let hour = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{hour:02}:{minute:02} {meridiem}")
}

fn digits(text: &str) -> Option<u32> {
    if text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sheet_core::FieldSummary;

    fn value() -> MeasurementValue {
        MeasurementValue {
            id: None,
            field: FieldSummary {
                id: 1,
                code: None,
                value_type: None,
            },
            number: None,
            text: None,
            boolean: None,
            json: None,
        }
    }

    fn select_options(values: &[&str]) -> Vec<SelectOption> {
        values
            .iter()
            .map(|value| SelectOption {
                value: value.to_string(),
                label: format!("{value} (etiqueta)"),
            })
            .collect()
    }

    #[test]
    fn stored_slots_follow_precedence() {
        let mut stored = value();
        assert_eq!(display_value(&stored, false), None);

        stored.json = Some(serde_json::json!({"a": 1}));
        assert_eq!(display_value(&stored, false).as_deref(), Some(r#"{"a":1}"#));

        stored.boolean = Some(false);
        assert_eq!(display_value(&stored, false).as_deref(), Some("NO"));

        stored.number = Some(120.0);
        assert_eq!(display_value(&stored, false).as_deref(), Some("120"));

        stored.text = Some("14:05".to_string());
        assert_eq!(display_value(&stored, false).as_deref(), Some("14:05"));
        assert_eq!(display_value(&stored, true).as_deref(), Some("02:05 p. m."));
    }

    #[test]
    fn blank_text_has_no_display() {
        let mut stored = value();
        stored.text = Some("  ".to_string());
        assert_eq!(display_value(&stored, false), None);
        assert_eq!(display_value(&stored, true), None);
    }

    #[test]
    fn numbers_drop_integral_decimals() {
        assert_eq!(format_number(120.0), "120");
        assert_eq!(format_number(36.5), "36.5");
        assert_eq!(format_number(-2.0), "-2");
    }

    #[test]
    fn twelve_hour_conversion() {
        assert_eq!(to_twelve_hour("00:15").as_deref(), Some("12:15 a. m."));
        assert_eq!(to_twelve_hour("9:40").as_deref(), Some("09:40 a. m."));
        assert_eq!(to_twelve_hour("12:00").as_deref(), Some("12:00 p. m."));
        assert_eq!(to_twelve_hour("23:59").as_deref(), Some("11:59 p. m."));
        assert_eq!(to_twelve_hour("25:00"), None);
        assert_eq!(to_twelve_hour("mañana"), None);

        assert_eq!(from_twelve_hour("12:15 a. m.").as_deref(), Some("00:15"));
        assert_eq!(from_twelve_hour("02:05 p. m.").as_deref(), Some("14:05"));
        assert_eq!(from_twelve_hour("12:00 p. m.").as_deref(), Some("12:00"));
        assert_eq!(from_twelve_hour("9:40").as_deref(), Some("09:40"));
        assert_eq!(from_twelve_hour("13:00 p. m."), None);
    }

    #[test]
    fn column_label_uses_day_first_date() {
        let taken_at = NaiveDate::from_ymd_opt(2024, 6, 5)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        assert_eq!(format_column_label(taken_at), "05/06/2024, 03:30 p. m.");
    }

    #[test]
    fn boolean_values_pick_prefixed_option() {
        let options = select_options(&["No", "Sí, con reservas"]);
        assert_eq!(
            match_option(&options, "SÍ", Some(true)).map(|o| o.value.as_str()),
            Some("Sí, con reservas")
        );
        assert_eq!(
            match_option(&options, "NO", Some(false)).map(|o| o.value.as_str()),
            Some("No")
        );
    }

    #[test]
    fn exact_match_beats_substring() {
        let options = select_options(&["++", "+", "+++"]);
        assert_eq!(
            match_option(&options, "+", None).map(|o| o.value.as_str()),
            Some("+")
        );
        let options = select_options(&["Cefálica", "Podálica"]);
        assert_eq!(
            match_option(&options, "Cefálica fija", None).map(|o| o.value.as_str()),
            Some("Cefálica")
        );
        assert_eq!(match_option(&options, "Transversa", None), None);
    }
}
