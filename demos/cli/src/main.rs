use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sheet_api::{Gateway, LookupOutcome, ReqwestTransport, SheetClient, TracingNotifier};
use sheet_core::{
    age_on, local_today, parse_date, FieldRegistry, Form, GridSnapshot, GridState, Patient,
    SheetConfig, SheetLayout, SummaryView,
};
use sheet_grid::{aggregate_grid, build_summary, measurements_from_str, reconcile_grid};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sheet-cli",
    about = "Herramientas de la hoja de monitoreo obstétrico."
)]
struct Args {
    /// Archivo TOML con la configuración (opcional).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Edad en años cumplidos.
    Age {
        /// Fecha de nacimiento (YYYY-MM-DD).
        birth_date: String,
        /// Fecha de referencia; por defecto, hoy.
        #[arg(long)]
        today: Option<String>,
    },
    /// Genera los cuerpos de medición a partir de una cuadrícula.
    Aggregate {
        #[arg(short, long)]
        layout: PathBuf,
        /// Instantánea de la cuadrícula (JSON).
        #[arg(short, long)]
        grid: PathBuf,
        #[arg(long)]
        form_id: i64,
    },
    /// Carga mediciones guardadas en una cuadrícula vacía.
    Reconcile {
        #[arg(short, long)]
        layout: PathBuf,
        /// Lista de mediciones (arreglo o respuesta paginada).
        #[arg(short, long)]
        measurements: PathBuf,
    },
    /// Imprime el resumen de un formulario guardado.
    Summary {
        #[arg(short, long)]
        layout: PathBuf,
        #[arg(short, long)]
        measurements: PathBuf,
        #[arg(long)]
        form: Option<PathBuf>,
        #[arg(long)]
        patient: Option<PathBuf>,
    },
    /// Busca en el servidor el formulario de un documento y muestra su resumen.
    Lookup {
        #[arg(short, long)]
        layout: PathBuf,
        document: String,
        /// Cookies de sesión (incluye csrftoken).
        #[arg(long, env = "SHEET_COOKIES")]
        cookies: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Age { birth_date, today } => {
            let birth = parse_date(&birth_date)
                .with_context(|| format!("Fecha de nacimiento inválida: {birth_date}"))?;
            let today = match today {
                Some(text) => {
                    parse_date(&text).with_context(|| format!("Fecha inválida: {text}"))?
                }
                None => local_today(config.offset()?),
            };
            match age_on(birth, today) {
                Some(age) => println!("{age}"),
                None => bail!("La fecha de nacimiento es posterior a {today}"),
            }
        }
        Command::Aggregate {
            layout,
            grid,
            form_id,
        } => {
            let registry = load_registry(&layout, &config)?;
            let snapshot: GridSnapshot = read_json(&grid)?;
            let grid = GridState::from_snapshot(&registry, &snapshot)?;
            let payloads = aggregate_grid(&grid, &registry, &config, form_id)?;
            info!(groups = payloads.len(), "grid aggregated");
            println!("{}", serde_json::to_string_pretty(&payloads)?);
        }
        Command::Reconcile {
            layout,
            measurements,
        } => {
            let registry = load_registry(&layout, &config)?;
            let reconciled = load_grid(&registry, &config, &measurements)?;
            info!(
                locked = ?reconciled.locked_columns,
                skipped_measurements = reconciled.skipped_measurements,
                skipped_values = reconciled.skipped_values,
                "measurements reconciled"
            );
            println!("{}", serde_json::to_string_pretty(&reconciled.grid.snapshot())?);
        }
        Command::Summary {
            layout,
            measurements,
            form,
            patient,
        } => {
            let registry = load_registry(&layout, &config)?;
            let reconciled = load_grid(&registry, &config, &measurements)?;
            let form = form.as_deref().map(read_json::<Form>).transpose()?;
            let patient = patient.as_deref().map(read_json::<Patient>).transpose()?;
            let today = local_today(config.offset()?);
            let view = build_summary(
                form.as_ref(),
                patient.as_ref(),
                &reconciled.grid,
                &registry,
                today,
            );
            print_summary(&view);
        }
        Command::Lookup {
            layout,
            document,
            cookies,
        } => {
            let registry = load_registry(&layout, &config)?;
            let transport = ReqwestTransport::new(config.request_timeout_secs)?;
            let mut gateway = Gateway::new(transport, TracingNotifier, &config);
            if let Some(cookies) = cookies {
                gateway = gateway.with_cookie_header(cookies);
            }
            let client = SheetClient::new(gateway, registry, config.clone());
            let today: NaiveDate = local_today(config.offset()?);

            let report = client
                .lookup_by_document(client.new_session(), &document, today)
                .await
                .map_err(|err| err.error)
                .with_context(|| format!("No se pudo consultar el documento {document}"))?;

            match report.outcome {
                LookupOutcome::Form { form_id } => println!("Formulario {form_id}"),
                LookupOutcome::PatientOnly { patient_id } => {
                    println!("Paciente {patient_id} sin formulario")
                }
                LookupOutcome::NotFound => println!("Sin resultados para {document}"),
            }
            if let Some(view) = &report.summary {
                print_summary(view);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SheetConfig> {
    let Some(path) = path else {
        return Ok(SheetConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer el archivo {path:?}"))?;
    toml::from_str(&data).with_context(|| format!("Configuración inválida en {path:?}"))
}

/// Layouts may be JSON or TOML, picked by extension.
fn load_registry(path: &Path, config: &SheetConfig) -> anyhow::Result<FieldRegistry> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer el archivo {path:?}"))?;
    let layout: SheetLayout = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&data).with_context(|| format!("Diseño inválido en {path:?}"))?
    } else {
        serde_json::from_str(&data).with_context(|| format!("Diseño inválido en {path:?}"))?
    };
    Ok(FieldRegistry::from_layout(layout, config)?)
}

fn load_grid(
    registry: &FieldRegistry,
    config: &SheetConfig,
    path: &Path,
) -> anyhow::Result<sheet_grid::Reconciliation> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer el archivo {path:?}"))?;
    let measurements = measurements_from_str(&data)?;
    Ok(reconcile_grid(
        GridState::for_registry(registry),
        registry,
        config,
        &measurements,
    )?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer el archivo {path:?}"))?;
    serde_json::from_str(&data).with_context(|| format!("JSON inválido en {path:?}"))
}

fn print_summary(view: &SummaryView) {
    for field in &view.fields {
        println!("{}: {}", field.label, field.value);
    }

    let columns: Vec<_> = view
        .columns
        .iter()
        .filter(|column| column.taken_at != "-")
        .collect();
    if columns.is_empty() {
        println!("\nSin mediciones registradas.");
        return;
    }

    println!();
    for row in &view.rows {
        let label = match &row.unit {
            Some(unit) => format!("{} ({unit})", row.label),
            None => row.label.clone(),
        };
        let cells: Vec<String> = columns
            .iter()
            .map(|column| {
                let text = row
                    .cells
                    .iter()
                    .find(|cell| cell.column == column.index)
                    .map_or("-", |cell| cell.text.as_str());
                format!("{}: {text}", column.taken_at)
            })
            .collect();
        println!("{label}\n  {}", cells.join("\n  "));
    }
}
