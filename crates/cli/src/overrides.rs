// Effective settings: settings file, then environment, then flags.

use std::path::PathBuf;

use clap::Args;
use rentab_config::{parse_flag, Settings, SourceMode};

use crate::exit_codes::{EXIT_CONFIG, EXIT_USAGE};
use crate::CliError;

/// Source and validation options shared by every subcommand.
///
/// Value options fall back to the environment variables the nightly job
/// already exports; boolean switches read theirs as flag text (`1`, `si`, ...).
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Settings file [default: <config dir>/rentab/settings.toml]
    #[arg(long, value_name = "PATH", env = "RENTAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data source: file or sql
    #[arg(long, value_name = "MODE", env = "RENTAB_SOURCE")]
    pub source: Option<String>,

    /// Read the export directory even when the source is sql [env: RENTAB_FORCE_FILE]
    #[arg(long)]
    pub force_file: bool,

    /// Directory holding the dated exports
    #[arg(long, value_name = "DIR", env = "EXCZDIR")]
    pub dir: Option<PathBuf>,

    /// File-name prefix of the movements export
    #[arg(long, value_name = "PREFIX", env = "EXCZPREFIX")]
    pub prefix: Option<String>,

    /// File-name prefix of the per-cost-center export
    #[arg(long, value_name = "PREFIX", env = "CCOSTO_EXCZPREFIX")]
    pub cc_prefix: Option<String>,

    /// Compare section totals against the per-cost-center export
    #[arg(long)]
    pub cross_check: bool,

    /// File-name prefix of the per-seller summary export
    #[arg(long, value_name = "PREFIX", env = "COD_EXCZPREFIX")]
    pub seller_export_prefix: Option<String>,

    /// Directory holding the daily price list [default: the export directory]
    #[arg(long, value_name = "DIR", env = "PRECIOS_DIR")]
    pub prices_dir: Option<PathBuf>,

    /// File-name prefix of the price list (<prefix>MMDD.xlsx)
    #[arg(long, value_name = "PREFIX", env = "PRECIOS_PREFIX")]
    pub prices_prefix: Option<String>,

    /// Directory holding the seller assignments [default: the export directory]
    #[arg(long, value_name = "DIR", env = "VENDEDORES_DIR")]
    pub sellers_dir: Option<PathBuf>,

    /// File-name prefix of the seller assignments (<prefix>DDMM.xlsx)
    #[arg(long, value_name = "PREFIX", env = "VENDEDORES_PREFIX")]
    pub sellers_prefix: Option<String>,

    /// Take the newest export whatever its date [env: RENTAB_USE_LATEST]
    #[arg(long)]
    pub use_latest: bool,

    /// TOML file with the database connection profile
    #[arg(long, value_name = "PATH", env = "RENTAB_SQL_PROFILE")]
    pub sql_profile: Option<PathBuf>,

    /// Relative price deviation that flags a line (0.002 = 0.2%)
    #[arg(long, value_name = "RATIO")]
    pub tolerance: Option<f64>,

    /// Main ledger sheet name
    #[arg(long, value_name = "NAME", env = "PLANTILLA_HOJA")]
    pub sheet: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl SourceArgs {
    /// Where settings are read from, for display.
    pub fn settings_origin(&self) -> String {
        match &self.config {
            Some(path) => path.display().to_string(),
            None if Settings::path().exists() => Settings::path().display().to_string(),
            None => "built-in defaults".to_string(),
        }
    }

    /// Layer these options over `settings`. `env` answers the boolean
    /// switches' environment variables.
    pub fn apply<F>(&self, settings: &mut Settings, env: F) -> Result<(), CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = non_empty(&self.source) {
            settings.source.mode = SourceMode::parse(mode).ok_or_else(|| {
                CliError::usage(format!("unknown source '{mode}'")).with_hint("use --source file or --source sql")
            })?;
        }

        let env_flag = |name: &str| env(name).map(|v| parse_flag(&v)).unwrap_or(false);
        if self.force_file || env_flag("RENTAB_FORCE_FILE") {
            settings.source.force_file = true;
        }
        if self.use_latest || env_flag("RENTAB_USE_LATEST") {
            settings.source.use_latest = true;
        }

        if let Some(dir) = self.dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            settings.files.directory = Some(dir.clone());
        }
        if let Some(prefix) = non_empty(&self.prefix) {
            settings.files.movements_prefix = prefix.to_string();
        }
        if let Some(prefix) = non_empty(&self.cc_prefix) {
            settings.files.cost_center_prefix = prefix.to_string();
        }
        if self.cross_check {
            settings.files.cross_check_cost_centers = true;
        }
        if let Some(prefix) = non_empty(&self.seller_export_prefix) {
            settings.files.seller_export_prefix = prefix.to_string();
        }
        if let Some(dir) = self.prices_dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            settings.files.prices_directory = Some(dir.clone());
        }
        if let Some(prefix) = non_empty(&self.prices_prefix) {
            settings.files.prices_prefix = prefix.to_string();
        }
        if let Some(dir) = self.sellers_dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            settings.files.sellers_directory = Some(dir.clone());
        }
        if let Some(prefix) = non_empty(&self.sellers_prefix) {
            settings.files.sellers_prefix = prefix.to_string();
        }

        if let Some(profile) = self.sql_profile.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            settings.sql.profile_path = Some(profile.clone());
        }
        if let Some(tolerance) = self.tolerance {
            settings.validation.tolerance = tolerance;
        }
        if let Some(sheet) = non_empty(&self.sheet) {
            settings.workbook.main_ledger = Some(sheet.to_string());
        }
        Ok(())
    }

    /// Load the settings file and layer the environment and flags on top.
    pub fn load_settings(&self) -> Result<Settings, CliError> {
        let loaded = match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load_default(),
        };
        let mut settings = loaded.map_err(|e| CliError::config(e.to_string()))?;

        self.apply(&mut settings, |name| std::env::var(name).ok())?;

        settings.validate().map_err(|e| {
            let err = CliError::config(e.to_string());
            if self.tolerance.is_some() {
                err.with_hint("--tolerance takes a ratio, e.g. 0.002 for 0.2%")
            } else {
                err
            }
        })?;
        log::debug!("settings from {}", self.settings_origin());
        Ok(settings)
    }
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }
}
