// rentab - daily profitability report CLI

mod exit_codes;
mod overrides;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use rentab_report::dates::resolve_target_date;
use rentab_report::engine::resolve;
use rentab_report::source::{select_strategy, AcquisitionStrategy};
use rentab_report::{ReportError, RunConfig, RunReport, RunSummary};

use exit_codes::{exit_kind, report_exit_code, EXIT_SUCCESS, EXIT_WRITE};
use overrides::SourceArgs;

#[derive(Parser)]
#[command(name = "rentab")]
#[command(author, version, long_version = long_version())]
#[command(about = "Populate the daily profitability workbook and flag price deviations")]
#[command(after_help = "\
Examples:
  rentab run --workbook RENTABILIDAD.xlsx                      Yesterday, from $EXCZDIR
  rentab run --workbook RENTABILIDAD.xlsx --date 2025-01-15 --json
  rentab run --workbook RENTABILIDAD.xlsx --source sql --sql-profile conexion.toml
  rentab resolve --date 2025-01-15                             Which export would be read
  rentab check-config --show                                   Effective settings")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the day's sales into the workbook and flag price deviations
    #[command(after_help = "\
Exit codes:
  0   workbook written (flagged lines are reported, not failures)
  60  configuration    61  no data for the date    62  connection
  63  data shape       64  workbook not writable or missing sections")]
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Workbook to populate; must already contain the report sections
        #[arg(long, short = 'w', value_name = "PATH", env = "RENTAB_WORKBOOK")]
        workbook: PathBuf,

        /// Target date (YYYY-MM-DD) [default: yesterday]
        #[arg(long, value_name = "DATE")]
        date: Option<String>,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Also write the flagged lines to a CSV file
        #[arg(long, value_name = "PATH")]
        flagged_csv: Option<PathBuf>,
    },

    /// Show which export or database a run would read, without reading it
    Resolve {
        #[command(flatten)]
        source: SourceArgs,

        /// Target date (YYYY-MM-DD) [default: yesterday]
        #[arg(long, value_name = "DATE")]
        date: Option<String>,

        /// Print as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate settings and the chosen source without touching any data
    CheckConfig {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the effective settings as TOML (password masked)
        #[arg(long)]
        show: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  rentab-report ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let json = match &cli.command {
        Some(Commands::Run { json, .. }) | Some(Commands::Resolve { json, .. }) => *json,
        _ => false,
    };

    let result = match cli.command {
        None => {
            eprintln!("Usage: rentab <command> [options]");
            eprintln!("       rentab --help for more information");
            Ok(())
        }
        Some(Commands::Run { source, workbook, date, json, flagged_csv }) => {
            cmd_run(source, workbook, date, json, flagged_csv)
        }
        Some(Commands::Resolve { source, date, json }) => cmd_resolve(source, date, json),
        Some(Commands::CheckConfig { source, show }) => cmd_check_config(source, show),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            if json {
                print_failure(&e);
            }
            eprintln!("error: {}", e.message);
            if let Some(hint) = &e.hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(e.code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Create error from a run failure with its category's exit code.
    pub fn report(err: ReportError) -> Self {
        let hint = match &err {
            ReportError::Configuration(_) => Some("run `rentab check-config` to see the effective settings"),
            ReportError::NotFound(_) => Some("pass --date YYYY-MM-DD, or --use-latest to take the newest export"),
            ReportError::Connection(_) => Some("check [sql.connection] or RENTAB_SQL_PROFILE, and that the database is reachable"),
            ReportError::Write(_) => Some("close the workbook if it is open and check the [workbook] section names"),
            ReportError::DataShape(_) => None,
        };
        Self {
            code: report_exit_code(&err),
            message: err.to_string(),
            hint: hint.map(str::to_string),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Machine-readable failure, printed on stdout when `--json` was requested.
#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    message: &'a str,
    exit_code: u8,
}

/// Any failure under `--json` still leaves one JSON value on stdout.
fn print_failure(err: &CliError) {
    let out = ErrorOutput { error: exit_kind(err.code), message: &err.message, exit_code: err.code };
    if let Ok(text) = serde_json::to_string(&out) {
        println!("{text}");
    }
}

fn target_date(explicit: Option<&str>) -> Result<NaiveDate, CliError> {
    resolve_target_date(explicit, Local::now().date_naive())
        .map_err(|e| CliError::report(e).with_hint("dates are written YYYY-MM-DD, e.g. 2025-01-15"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: exit_codes::EXIT_ERROR, message: e.to_string(), hint: None })?;
    println!("{text}");
    Ok(())
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    source: SourceArgs,
    workbook: PathBuf,
    date: Option<String>,
    json: bool,
    flagged_csv: Option<PathBuf>,
) -> Result<(), CliError> {
    let settings = source.load_settings()?;
    let target_date = target_date(date.as_deref())?;

    let config = RunConfig { target_date, workbook_path: workbook, settings };
    let report = rentab_report::run(&config).map_err(CliError::report)?;

    if let Some(path) = &flagged_csv {
        write_flagged_csv(path, &report)?;
    }

    if json {
        print_json(&report.summary)
    } else {
        print_summary(&report);
        Ok(())
    }
}

fn print_summary(report: &RunReport) {
    let summary: &RunSummary = &report.summary;
    println!("{}", summary.headline());

    let width = summary.sections.iter().map(|s| s.name.chars().count()).max().unwrap_or(0);
    for section in &summary.sections {
        println!("  {:<width$}  {:>5}", section.name, section.rows);
    }

    if summary.discarded > 0 {
        println!("discarded: {} (totals and other transaction types)", summary.discarded);
    }
    if !summary.rejected.is_empty() {
        let reasons: Vec<String> = summary.rejected.iter().map(|(reason, n)| format!("{reason} {n}")).collect();
        println!("rejected: {}", reasons.join(", "));
    }

    let flagged: Vec<_> = report.flagged_lines().collect();
    if !flagged.is_empty() {
        println!("flagged:");
        for line in flagged {
            println!(
                "  row {:<5} {:<12} {:<30} {}",
                line.source_row, line.product_id, line.description, line.observation
            );
        }
    }

    for warning in &summary.warnings {
        println!("warning: {warning}");
    }
}

const FLAGGED_HEADER: [&str; 14] = [
    "fila",
    "fecha",
    "nit",
    "cliente",
    "codigo",
    "descripcion",
    "centro_costo",
    "cantidad",
    "ventas",
    "precio_unitario",
    "precio_lista",
    "diferencia",
    "porcentaje",
    "observacion",
];

fn amount(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

fn write_flagged_csv(path: &Path, report: &RunReport) -> Result<(), CliError> {
    let records: Vec<Vec<String>> = report
        .flagged_lines()
        .map(|line| {
            vec![
                line.source_row.to_string(),
                line.date.format("%Y-%m-%d").to_string(),
                line.client_id.clone(),
                line.client_name.clone(),
                line.product_id.clone(),
                line.description.clone(),
                line.cost_center.clone(),
                format!("{}", line.quantity),
                amount(Some(line.net_amount)),
                amount(line.unit_price),
                amount(line.list_price),
                amount(line.variance.map(|v| v.amount)),
                line.variance.map(|v| format!("{:.4}", v.pct)).unwrap_or_default(),
                line.observation.clone(),
            ]
        })
        .collect();

    rentab_io::csv::write_records(path, &FLAGGED_HEADER, &records).map_err(|e| {
        CliError { code: EXIT_WRITE, message: format!("flagged lines not written: {e}"), hint: None }
            .with_hint("the workbook itself was saved")
    })?;
    log::info!("{} flagged lines written to {}", records.len(), path.display());
    Ok(())
}

// ============================================================================
// resolve
// ============================================================================

#[derive(Serialize)]
struct ResolveOutput {
    target_date: NaiveDate,
    strategy: &'static str,
    artifact: String,
    path: Option<PathBuf>,
}

fn cmd_resolve(source: SourceArgs, date: Option<String>, json: bool) -> Result<(), CliError> {
    let settings = source.load_settings()?;
    let target_date = target_date(date.as_deref())?;
    let resolution = resolve(&settings, target_date).map_err(CliError::report)?;

    let out = ResolveOutput {
        target_date,
        strategy: resolution.strategy,
        artifact: resolution.artifact,
        path: resolution.path,
    };
    if json {
        return print_json(&out);
    }
    println!("{}  {}  {}", out.target_date, out.strategy, out.artifact);
    if let Some(path) = &out.path {
        println!("  {}", path.display());
    }
    Ok(())
}

// ============================================================================
// check-config
// ============================================================================

fn cmd_check_config(source: SourceArgs, show: bool) -> Result<(), CliError> {
    let mut settings = source.load_settings()?;
    let strategy = select_strategy(&settings).map_err(CliError::report)?;

    println!("settings:  {}", source.settings_origin());
    match &strategy {
        AcquisitionStrategy::File(file) => {
            println!("source:    file ({}, prefix {})", file.directory.display(), file.movements_prefix);
            if let Some(cc) = &file.cost_center_prefix {
                println!("cross-check: prefix {cc}");
            }
            for (label, reference) in [("prices", &file.prices), ("sellers", &file.sellers)] {
                if let Some(r) = reference {
                    println!("{label}:    {} (prefix {})", r.directory.display(), r.prefix);
                }
            }
            if file.use_latest {
                println!("use-latest: on");
            }
        }
        AcquisitionStrategy::Sql(sql) => {
            println!("source:    sql ({}, {} lookups)", sql.describe(), sql.lookups.len());
        }
    }
    println!("tolerance: {}", settings.validation.tolerance);
    println!("sections:  {}", settings.workbook.section_names().join(", "));
    println!("optional:  {}", settings.workbook.optional_section_names().join(", "));

    if show {
        if settings.sql.connection.password.is_some() {
            settings.sql.connection.password = Some("****".to_string());
        }
        let text = toml::to_string_pretty(&settings)
            .map_err(|e| CliError { code: exit_codes::EXIT_ERROR, message: e.to_string(), hint: None })?;
        println!();
        print!("{text}");
    }
    Ok(())
}
