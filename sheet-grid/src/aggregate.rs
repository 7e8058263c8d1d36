//! Groups grid cells into one measurement body per (parameter, column).

use std::collections::{btree_map::Entry, BTreeMap};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use sheet_core::{
    CellKey, FieldRegistry, GridRow, GridState, MeasurementPayload, SheetConfig, SheetError,
    ValueData, ValuePayload, ValueType,
};
use tracing::debug;

use crate::display::from_twelve_hour;

/// One creation body and the grid column it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementGroup {
    pub column: usize,
    pub payload: MeasurementPayload,
}

/// Builds the creation bodies for every filled, timestamped column.
///
/// Cells that are blank after trimming, or whose column has no timestamp,
/// are skipped. Groups come out ordered by parameter then column; values
/// keep the registry's row order.
pub fn aggregate_grid(
    grid: &GridState,
    registry: &FieldRegistry,
    config: &SheetConfig,
    form_id: i64,
) -> Result<Vec<MeasurementPayload>, SheetError> {
    Ok(aggregate_groups(grid, registry, config, form_id)?
        .into_iter()
        .map(|group| group.payload)
        .collect())
}

/// Same as [`aggregate_grid`], keeping the source column of each group.
pub fn aggregate_groups(
    grid: &GridState,
    registry: &FieldRegistry,
    config: &SheetConfig,
    form_id: i64,
) -> Result<Vec<MeasurementGroup>, SheetError> {
    let offset = config.offset()?;
    let mut groups: BTreeMap<(i64, usize), MeasurementPayload> = BTreeMap::new();

    for row in registry.rows() {
        for column in 0..registry.column_count() {
            let key = CellKey::new(row.parameter_id, row.field_id, column);
            let Some(cell) = grid.cell(&key) else {
                continue;
            };
            let text = cell.value.trim();
            if text.is_empty() {
                continue;
            }
            let Some(local) = grid.column(column).and_then(|slot| slot.taken_at) else {
                continue;
            };

            let data = typed_value(row, key, text, config)?;
            let group = match groups.entry((row.parameter_id, column)) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(MeasurementPayload {
                        form_id,
                        parameter_id: row.parameter_id,
                        taken_at: to_utc(local, offset)?,
                        values: Vec::new(),
                    })
                }
            };
            group.values.push(ValuePayload {
                field_id: row.field_id,
                data,
            });
        }
    }

    debug!(form_id, groups = groups.len(), "aggregated grid");
    Ok(groups
        .into_iter()
        .map(|((_, column), payload)| MeasurementGroup { column, payload })
        .collect())
}

/// Case-insensitive affirmative check: anything starting with `SÍ` or `SI`.
pub fn parse_boolean(text: &str) -> bool {
    let upper = text.trim().to_uppercase();
    upper.starts_with("SÍ") || upper.starts_with("SI")
}

fn typed_value(
    row: &GridRow,
    key: CellKey,
    text: &str,
    config: &SheetConfig,
) -> Result<ValueData, SheetError> {
    let data = match row.value_type {
        ValueType::Number => ValueData::Text(text.to_string()),
        ValueType::Text if config.is_time_of_day(row.parameter_id, row.field_id) => {
            ValueData::Text(from_twelve_hour(text).unwrap_or_else(|| text.to_string()))
        }
        ValueType::Text => ValueData::Text(text.to_string()),
        ValueType::Boolean => ValueData::Boolean(parse_boolean(text)),
        ValueType::Json => {
            ValueData::Json(serde_json::from_str(text).map_err(|err| SheetError::InvalidCell {
                key,
                reason: err.to_string(),
            })?)
        }
    };
    Ok(data)
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> Result<DateTime<Utc>, SheetError> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| SheetError::Parse(format!("local time {local} is ambiguous")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheet_core::{parse_column_time, SheetLayout};

    fn registry(config: &SheetConfig) -> FieldRegistry {
        let layout = SheetLayout {
            column_count: Some(3),
            rows: vec![
                GridRow::input(1, 1, "Sistólica", ValueType::Number),
                GridRow::input(1, 2, "Diastólica", ValueType::Number),
                GridRow::input(5, 7, "Membranas íntegras", ValueType::Boolean),
                GridRow::input(17, 19, "Hora", ValueType::Text),
                GridRow::input(9, 1, "Dilatación", ValueType::Json),
            ],
            ..SheetLayout::with_default_header()
        };
        FieldRegistry::from_layout(layout, config).unwrap()
    }

    fn time(text: &str) -> Option<NaiveDateTime> {
        parse_column_time(text)
    }

    #[test]
    fn parses_affirmative_prefixes() {
        assert!(parse_boolean("Sí"));
        assert!(parse_boolean("SI"));
        assert!(parse_boolean("sí, con reservas"));
        assert!(parse_boolean("  si"));
        assert!(!parse_boolean("No"));
        assert!(!parse_boolean("no aplica"));
        assert!(!parse_boolean(""));
    }

    #[test]
    fn groups_by_parameter_and_column() {
        let config = SheetConfig::default();
        let registry = registry(&config);
        let mut grid = GridState::for_registry(&registry);
        grid.set_column_time(0, time("2024-06-15T08:00")).unwrap();
        grid.set_column_time(1, time("2024-06-15T09:00")).unwrap();
        grid.set_cell(CellKey::new(1, 2, 0), " 80 ").unwrap();
        grid.set_cell(CellKey::new(1, 1, 0), "120").unwrap();
        grid.set_cell(CellKey::new(1, 1, 1), "   ").unwrap();
        grid.set_cell(CellKey::new(5, 7, 1), "sí").unwrap();
        // No timestamp on column 2.
        grid.set_cell(CellKey::new(1, 1, 2), "110").unwrap();

        let payloads = aggregate_grid(&grid, &registry, &config, 42).unwrap();
        assert_eq!(payloads.len(), 2);

        let first = &payloads[0];
        assert_eq!((first.form_id, first.parameter_id), (42, 1));
        assert_eq!(first.taken_at.to_rfc3339(), "2024-06-15T13:00:00+00:00");
        assert_eq!(
            first.values,
            vec![
                ValuePayload {
                    field_id: 1,
                    data: ValueData::Text("120".to_string())
                },
                ValuePayload {
                    field_id: 2,
                    data: ValueData::Text("80".to_string())
                },
            ]
        );

        let second = &payloads[1];
        assert_eq!(second.parameter_id, 5);
        assert_eq!(second.values[0].data, ValueData::Boolean(true));
    }

    #[test]
    fn time_of_day_is_sent_as_24_hour() {
        let config = SheetConfig::default();
        let registry = registry(&config);
        let mut grid = GridState::for_registry(&registry);
        grid.set_column_time(0, time("2024-06-15T08:00")).unwrap();
        grid.set_cell(CellKey::new(17, 19, 0), "02:05 p. m.").unwrap();

        let payloads = aggregate_grid(&grid, &registry, &config, 1).unwrap();
        assert_eq!(payloads[0].values[0].data, ValueData::Text("14:05".to_string()));
    }

    #[test]
    fn structured_cells_must_be_json() {
        let config = SheetConfig::default();
        let registry = registry(&config);
        let mut grid = GridState::for_registry(&registry);
        grid.set_column_time(0, time("2024-06-15T08:00")).unwrap();
        grid.set_cell(CellKey::new(9, 1, 0), r#"{"cm": 4}"#).unwrap();

        let payloads = aggregate_grid(&grid, &registry, &config, 1).unwrap();
        assert_eq!(
            payloads[0].values[0].data,
            ValueData::Json(serde_json::json!({"cm": 4}))
        );

        grid.set_cell(CellKey::new(9, 1, 0), "{cm").unwrap();
        assert!(matches!(
            aggregate_grid(&grid, &registry, &config, 1),
            Err(SheetError::InvalidCell { key, .. }) if key == CellKey::new(9, 1, 0)
        ));
    }

    #[test]
    fn groups_remember_their_column() {
        let config = SheetConfig::default();
        let registry = registry(&config);
        let mut grid = GridState::for_registry(&registry);
        grid.set_column_time(2, time("2024-06-15T10:00")).unwrap();
        grid.set_cell(CellKey::new(1, 2, 2), "70").unwrap();

        let groups = aggregate_groups(&grid, &registry, &config, 1).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].column, 2);
        assert_eq!(groups[0].payload.parameter_id, 1);
    }

    #[test]
    fn empty_grid_yields_nothing() {
        let config = SheetConfig::default();
        let registry = registry(&config);
        let grid = GridState::for_registry(&registry);
        assert!(aggregate_grid(&grid, &registry, &config, 1).unwrap().is_empty());
    }
}
