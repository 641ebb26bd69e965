//! Source Selector: decides, from configuration alone, whether the day's
//! data comes from a dated flat export or from the relational source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use rentab_config::{LookupSettings, MovementSettings, Settings, SourceMode};

use crate::error::ReportError;

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub directory: PathBuf,
    pub movements_prefix: String,
    /// Companion per-cost-center export, read for cross-checking only.
    pub cost_center_prefix: Option<String>,
    /// Per-seller summary export feeding the seller sections.
    pub seller_summary_prefix: Option<String>,
    /// Price list copied into the products section.
    pub prices: Option<ReferenceFile>,
    /// Seller assignments copied into the sellers section.
    pub sellers: Option<ReferenceFile>,
    pub use_latest: bool,
}

/// Where a day's reference list lives: `<prefix><stamp>.<ext>` in `directory`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFile {
    pub directory: PathBuf,
    pub prefix: String,
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SqlAuth {
    Trusted,
    Credentials { user: String, password: String },
}

/// A prepared statement text plus the positional parameters that follow the
/// target date (`?1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub extra_params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupStatement {
    /// `partners`, `products` or `sellers`
    pub catalog: &'static str,
    pub sql: String,
    pub active_value: String,
    pub settings: LookupSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlSource {
    pub database_path: PathBuf,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub auth: SqlAuth,
    pub timeout: Duration,
    pub movements: Statement,
    pub lookups: Vec<LookupStatement>,
}

impl SqlSource {
    /// `database@host[:port]`, never including credentials.
    pub fn describe(&self) -> String {
        match self.port {
            Some(port) => format!("{}@{}:{}", self.database, self.host, port),
            None => format!("{}@{}", self.database, self.host),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionStrategy {
    File(FileSource),
    Sql(SqlSource),
}

impl AcquisitionStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Sql(_) => "sql",
        }
    }

    /// Reference catalogs (and their workbook sections) only exist on the
    /// relational path.
    pub fn has_catalogs(&self) -> bool {
        matches!(self, Self::Sql(_))
    }
}

/// Pick the strategy. `force_file` beats the configured mode; everything the
/// chosen strategy needs is validated here, before any data is touched.
pub fn select_strategy(settings: &Settings) -> Result<AcquisitionStrategy, ReportError> {
    let mode = if settings.source.force_file {
        SourceMode::File
    } else {
        settings.source.mode
    };
    log::debug!(
        "source mode {} (configured {}, force_file {})",
        mode.as_str(),
        settings.source.mode.as_str(),
        settings.source.force_file
    );

    match mode {
        SourceMode::File => file_source(settings).map(AcquisitionStrategy::File),
        SourceMode::Sql => sql_source(settings).map(AcquisitionStrategy::Sql),
    }
}

fn file_source(settings: &Settings) -> Result<FileSource, ReportError> {
    let files = &settings.files;
    let directory = files.directory.clone().ok_or_else(|| {
        ReportError::Configuration("file source needs an export directory (files.directory or EXCZDIR)".into())
    })?;
    if !directory.is_dir() {
        return Err(ReportError::Configuration(format!(
            "export directory {} does not exist",
            directory.display()
        )));
    }

    let movements_prefix = files.movements_prefix.trim().to_string();
    if movements_prefix.is_empty() {
        return Err(ReportError::Configuration("movements export prefix is empty".into()));
    }

    let cost_center_prefix = Some(files.cost_center_prefix.trim())
        .filter(|p| files.cross_check_cost_centers && !p.is_empty())
        .map(str::to_string);

    let reference = |dir: &Option<PathBuf>, prefix: &str| {
        let prefix = prefix.trim();
        (!prefix.is_empty()).then(|| ReferenceFile {
            directory: dir.clone().unwrap_or_else(|| directory.clone()),
            prefix: prefix.to_string(),
        })
    };
    let prices = reference(&files.prices_directory, &files.prices_prefix);
    let sellers = reference(&files.sellers_directory, &files.sellers_prefix);
    let seller_summary_prefix = Some(files.seller_export_prefix.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(FileSource {
        directory,
        movements_prefix,
        cost_center_prefix,
        seller_summary_prefix,
        prices,
        sellers,
        use_latest: settings.source.use_latest,
    })
}

/// `host[,port]` as written in connection profiles.
fn split_server(server: &str) -> Result<(String, Option<u16>), ReportError> {
    match server.split_once(',') {
        Some((host, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| {
                ReportError::Configuration(format!("invalid port '{}' in server '{server}'", port.trim()))
            })?;
            Ok((host.trim().to_string(), Some(port)))
        }
        None => Ok((server.trim().to_string(), None)),
    }
}

fn sql_source(settings: &Settings) -> Result<SqlSource, ReportError> {
    let profile = settings.sql.resolve_profile()?;

    if !profile.driver.trim().eq_ignore_ascii_case("sqlite") {
        return Err(ReportError::Configuration(format!(
            "unsupported SQL driver '{}' (supported: sqlite)",
            profile.driver
        )));
    }
    if profile.server.trim().is_empty() || profile.database.trim().is_empty() {
        return Err(ReportError::Configuration(
            "sql source needs both server and database".into(),
        ));
    }

    let auth = if profile.trusted_connection {
        SqlAuth::Trusted
    } else {
        match (&profile.user, &profile.password) {
            (Some(user), Some(password)) if !user.trim().is_empty() && !password.is_empty() => {
                SqlAuth::Credentials {
                    user: user.trim().to_string(),
                    password: password.clone(),
                }
            }
            _ => {
                return Err(ReportError::Configuration(
                    "sql source needs user and password unless trusted_connection is set".into(),
                ))
            }
        }
    };

    let (host, port) = split_server(&profile.server)?;
    let database = profile.database.trim().to_string();
    let database_path = if Path::new(&database).is_absolute() {
        PathBuf::from(&database)
    } else {
        Path::new(&host).join(&database)
    };

    let movements = movements_statement(&settings.sql.movements)?;
    let lookups = vec![
        lookup_statement("partners", &settings.sql.partners)?,
        lookup_statement("products", &settings.sql.products)?,
        lookup_statement("sellers", &settings.sql.sellers)?,
    ];

    Ok(SqlSource {
        database_path,
        host,
        port,
        database,
        auth,
        timeout: Duration::from_secs(settings.sql.timeout_secs),
        movements,
        lookups,
    })
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn identifier_pattern() -> Result<Regex, ReportError> {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .map_err(|e| ReportError::Configuration(e.to_string()))
}

/// Double-quote a (possibly schema-qualified) identifier after checking it.
fn quote_identifier(name: &str, what: &str, pattern: &Regex) -> Result<String, ReportError> {
    let name = name.trim();
    if !pattern.is_match(name) {
        return Err(ReportError::Configuration(format!("invalid {what} identifier '{name}'")));
    }
    Ok(name
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

/// Movements for one date (`?1`) restricted to the configured type codes
/// (`?2..`). An override query receives the same parameters.
pub fn movements_statement(movements: &MovementSettings) -> Result<Statement, ReportError> {
    let codes: Vec<String> = movements
        .type_codes
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if codes.is_empty() {
        return Err(ReportError::Configuration("no transaction type codes configured".into()));
    }

    if let Some(query) = movements.query.as_deref().filter(|q| !q.trim().is_empty()) {
        return Ok(Statement { sql: query.to_string(), extra_params: codes });
    }

    let pattern = identifier_pattern()?;
    let table = quote_identifier(&movements.table, "movements table", &pattern)?;
    let date_col = quote_identifier(&movements.date_column, "date column", &pattern)?;
    let type_col = quote_identifier(&movements.type_column, "type column", &pattern)?;
    let placeholders: Vec<String> = (0..codes.len()).map(|i| format!("?{}", i + 2)).collect();

    Ok(Statement {
        sql: format!(
            "SELECT * FROM {table} WHERE date({date_col}) = ?1 AND {type_col} IN ({})",
            placeholders.join(", ")
        ),
        extra_params: codes,
    })
}

/// Active rows of one catalog; the active value binds to `?1`.
pub fn lookup_statement(catalog: &'static str, lookup: &LookupSettings) -> Result<LookupStatement, ReportError> {
    let sql = match lookup.query.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(query) => query.to_string(),
        None => {
            let pattern = identifier_pattern()?;
            let table = quote_identifier(&lookup.table, &format!("{catalog} table"), &pattern)?;
            quote_identifier(&lookup.key_column, &format!("{catalog} key column"), &pattern)?;
            if lookup.active_column.trim().is_empty() {
                format!("SELECT * FROM {table}")
            } else {
                let active = quote_identifier(&lookup.active_column, &format!("{catalog} active column"), &pattern)?;
                format!("SELECT * FROM {table} WHERE {active} = ?1")
            }
        }
    };

    Ok(LookupStatement {
        catalog,
        sql,
        active_value: lookup.active_value.clone(),
        settings: lookup.clone(),
    })
}
