//! Record Producers: fetch raw tables for the target date.
//!
//! The file producer reads one dated export; the SQL producer runs three
//! catalog lookups and one movements statement over a single read-only
//! connection.

use std::path::Path;

use chrono::NaiveDate;
use rentab_io::sql::{SqlClient, SqlError};
use rentab_io::{read_table, RawTable};

use crate::dates::find_artifact;
use crate::error::ReportError;
use crate::source::{AcquisitionStrategy, FileSource, SqlAuth, SqlSource};

/// Unparsed catalog snapshots as returned by the lookups.
#[derive(Debug, Clone, Default)]
pub struct RawCatalogs {
    pub partners: RawTable,
    pub products: RawTable,
    pub sellers: RawTable,
}

/// Everything a producer hands to normalization.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub movements: RawTable,
    /// Export file name or database description.
    pub artifact: String,
    pub catalogs: Option<RawCatalogs>,
    /// Per-cost-center export, when cross-checking is enabled and found.
    pub cost_center_export: Option<RawTable>,
    pub warnings: Vec<String>,
}

pub trait RecordProducer {
    fn kind(&self) -> &'static str;

    fn acquire(&self, target: NaiveDate) -> Result<RawBatch, ReportError>;
}

fn read_export(path: &Path) -> Result<RawTable, ReportError> {
    read_table(path).map_err(|e| ReportError::DataShape(format!("cannot read {}: {e}", path.display())))
}

impl RecordProducer for FileSource {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn acquire(&self, target: NaiveDate) -> Result<RawBatch, ReportError> {
        let artifact = find_artifact(&self.directory, &self.movements_prefix, target, self.use_latest)?;
        let movements = read_export(&artifact.path)?;
        log::info!("{}: {} rows (header at row {})", artifact.name, movements.len(), movements.header_row + 1);

        let mut warnings = Vec::new();
        if self.use_latest && artifact.date() != target {
            warnings.push(format!("using latest export {} dated {}, not {target}", artifact.name, artifact.date()));
        }

        let cost_center_export = match &self.cost_center_prefix {
            None => None,
            Some(prefix) => match find_artifact(&self.directory, prefix, target, self.use_latest) {
                Ok(cc) => match read_export(&cc.path) {
                    Ok(table) => Some(table),
                    Err(e) => {
                        warnings.push(format!("cost-center export skipped: {}", e.message()));
                        None
                    }
                },
                Err(e) => {
                    warnings.push(format!("cost-center export skipped: {}", e.message()));
                    None
                }
            },
        };

        Ok(RawBatch {
            movements,
            artifact: artifact.name,
            catalogs: None,
            cost_center_export,
            warnings,
        })
    }
}

impl FileSource {
    /// The day's per-seller summary export, when a prefix is configured.
    pub fn read_seller_summary(&self, target: NaiveDate) -> Result<Option<RawTable>, ReportError> {
        let Some(prefix) = &self.seller_summary_prefix else {
            return Ok(None);
        };
        let artifact = find_artifact(&self.directory, prefix, target, self.use_latest)?;
        let table = read_export(&artifact.path)?;
        log::info!("{}: {} seller summary rows", artifact.name, table.len());
        Ok(Some(table))
    }
}

fn connection_error(err: SqlError, source: &SqlSource) -> ReportError {
    match err {
        SqlError::Open(msg) => ReportError::Connection(format!("{}: {msg}", source.describe())),
        SqlError::Query(msg) => ReportError::Configuration(format!("query rejected by {}: {msg}", source.describe())),
    }
}

impl RecordProducer for SqlSource {
    fn kind(&self) -> &'static str {
        "sql"
    }

    fn acquire(&self, target: NaiveDate) -> Result<RawBatch, ReportError> {
        match &self.auth {
            SqlAuth::Trusted => log::debug!("connecting to {} (trusted)", self.describe()),
            SqlAuth::Credentials { user, .. } => log::debug!("connecting to {} as {user}", self.describe()),
        }

        let mut client = SqlClient::open_read_only(&self.database_path, self.timeout)
            .map_err(|e| connection_error(e, self))?;

        let mut tables = Vec::with_capacity(self.lookups.len());
        for lookup in &self.lookups {
            let table = client
                .query_table(&lookup.sql, std::slice::from_ref(&lookup.active_value))
                .map_err(|e| connection_error(e, self))?;
            log::debug!("{}: {} rows", lookup.catalog, table.len());
            tables.push(table);
        }

        let mut params = vec![target.format("%Y-%m-%d").to_string()];
        params.extend(self.movements.extra_params.iter().cloned());
        let movements = client
            .query_table(&self.movements.sql, &params)
            .map_err(|e| connection_error(e, self))?;

        log::info!(
            "{}: {} movement rows for {target} in {} statements",
            self.describe(),
            movements.len(),
            client.statements_executed()
        );
        client.close().map_err(|e| connection_error(e, self))?;

        if movements.is_empty() {
            return Err(ReportError::NotFound(format!(
                "no movements dated {target} in {}",
                self.describe()
            )));
        }

        let mut tables = tables.into_iter();
        let catalogs = RawCatalogs {
            partners: tables.next().unwrap_or_default(),
            products: tables.next().unwrap_or_default(),
            sellers: tables.next().unwrap_or_default(),
        };

        Ok(RawBatch {
            movements,
            artifact: self.describe(),
            catalogs: Some(catalogs),
            cost_center_export: None,
            warnings: Vec::new(),
        })
    }
}

impl RecordProducer for AcquisitionStrategy {
    fn kind(&self) -> &'static str {
        AcquisitionStrategy::kind(self)
    }

    fn acquire(&self, target: NaiveDate) -> Result<RawBatch, ReportError> {
        match self {
            Self::File(file) => file.acquire(target),
            Self::Sql(sql) => sql.acquire(target),
        }
    }
}
