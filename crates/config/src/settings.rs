// Run settings
// Loaded from ~/.config/rentab/settings.toml (or an explicit --config path)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read.
    Read { path: PathBuf, reason: String },
    /// TOML did not deserialize.
    Parse(String),
    /// Values parsed but are out of range or contradictory.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, reason } => {
                write!(f, "cannot read {}: {}", path.display(), reason)
            }
            ConfigError::Parse(msg) => write!(f, "invalid settings: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub files: FileSettings,
    pub sql: SqlSettings,
    pub validation: ValidationSettings,
    pub workbook: WorkbookSettings,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Dated flat exports in a directory (default)
    #[default]
    File,
    /// Direct read-only queries against the ERP database
    Sql,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::File => "file",
            SourceMode::Sql => "sql",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "archivo" => Some(SourceMode::File),
            "sql" => Some(SourceMode::Sql),
            _ => None,
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub mode: SourceMode,
    /// Use the file path even when `mode = "sql"`.
    pub force_file: bool,
    /// Pick the newest export regardless of its embedded date.
    pub use_latest: bool,
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub directory: Option<PathBuf>,
    pub movements_prefix: String,
    pub cost_center_prefix: String,
    /// Compare per-cost-center totals against the cost-center export.
    pub cross_check_cost_centers: bool,
    /// Per-seller summary export, read only when the workbook has seller sections.
    pub seller_export_prefix: String,
    /// Price list `<prefix><MMDD>.xlsx` copied into the products section.
    /// Looked up in `directory` when unset; an empty prefix disables it.
    pub prices_directory: Option<PathBuf>,
    pub prices_prefix: String,
    /// Client/seller list `<prefix><DDMM>.xlsx|csv` copied into the sellers section.
    pub sellers_directory: Option<PathBuf>,
    pub sellers_prefix: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            directory: None,
            movements_prefix: "EXCZ980".to_string(),
            cost_center_prefix: "EXCZ979".to_string(),
            cross_check_cost_centers: false,
            seller_export_prefix: "EXCZ978".to_string(),
            prices_directory: None,
            prices_prefix: "productos".to_string(),
            sellers_directory: None,
            sellers_prefix: "movimientocontable".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

/// Connection parameters. May live inline under `[sql.connection]` or in a
/// separate TOML file referenced by `sql.profile_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    /// `host[,port]`; for the sqlite driver, the directory holding the database.
    pub server: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub trusted_connection: bool,
    pub driver: String,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            server: String::new(),
            database: String::new(),
            user: None,
            password: None,
            trusted_connection: false,
            driver: "sqlite".to_string(),
        }
    }
}

impl ConnectionProfile {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementSettings {
    pub table: String,
    pub date_column: String,
    pub type_column: String,
    /// Transaction-type codes that count as sales lines.
    pub type_codes: Vec<String>,
    /// Replaces the generated statement; `?1` binds the target date (YYYY-MM-DD).
    pub query: Option<String>,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            table: "movimientos".to_string(),
            date_column: "fecha".to_string(),
            type_column: "tipo".to_string(),
            type_codes: vec!["F".to_string()],
            query: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    pub table: String,
    pub key_column: String,
    pub active_column: String,
    pub active_value: String,
    /// Replaces the generated statement; `?1` binds the active value.
    pub query: Option<String>,
}

impl LookupSettings {
    fn named(table: &str, key_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            active_column: "activo".to_string(),
            active_value: "1".to_string(),
            query: None,
        }
    }
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self::named("", "")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSettings {
    /// External TOML holding a [`ConnectionProfile`]; wins over the inline one.
    pub profile_path: Option<PathBuf>,
    pub connection: ConnectionProfile,
    pub timeout_secs: u64,
    pub movements: MovementSettings,
    pub partners: LookupSettings,
    pub products: LookupSettings,
    pub sellers: LookupSettings,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            profile_path: None,
            connection: ConnectionProfile::default(),
            timeout_secs: 30,
            movements: MovementSettings::default(),
            partners: LookupSettings::named("clientes", "nit"),
            products: LookupSettings::named("productos", "codigo"),
            sellers: LookupSettings::named("vendedores", "codigo"),
        }
    }
}

impl SqlSettings {
    /// The effective connection profile: the external file when configured,
    /// otherwise the inline table.
    pub fn resolve_profile(&self) -> Result<ConnectionProfile, ConfigError> {
        match &self.profile_path {
            Some(path) => ConnectionProfile::load(path),
            None => Ok(self.connection.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation + Workbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Relative price deviation above which a line is flagged.
    pub tolerance: f64,
    /// Share of unusable rows a run may drop before it fails.
    pub max_rejected_ratio: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.002,
            max_rejected_ratio: 0.05,
        }
    }
}

/// A cost-center section and the export label of the cost center it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCenterSection {
    pub sheet: String,
    /// e.g. `"0001   MOST. PRINCIPAL"`; the leading code is what lines are routed on.
    pub label: String,
}

impl CostCenterSection {
    fn new(sheet: &str, label: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            label: label.to_string(),
        }
    }
}

/// A section holding one seller's rows of the per-seller export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerSection {
    pub sheet: String,
    /// Seller code as exported, e.g. `"0024"`.
    pub code: String,
    /// Seller name as exported; matched when the code is not.
    pub name: String,
}

impl SellerSection {
    fn new(sheet: &str, code: &str, name: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookSettings {
    /// Main ledger sheet; the first sheet when unset.
    pub main_ledger: Option<String>,
    pub cost_centers: Vec<CostCenterSection>,
    pub code_section: String,
    pub partners_section: String,
    pub products_section: String,
    pub sellers_section: String,
    /// Sales by product line and group. Written only when the template has it.
    pub lines_section: String,
    /// Written only when the template has them.
    pub seller_sections: Vec<SellerSection>,
}

impl Default for WorkbookSettings {
    fn default() -> Self {
        Self {
            main_ledger: None,
            cost_centers: vec![
                CostCenterSection::new("CCOSTO 1", "0001   MOST. PRINCIPAL"),
                CostCenterSection::new("CCOSTO 2", "0002   MOST. SUCURSAL"),
                CostCenterSection::new("CCOSTO 3", "0003   MOSTRADOR CALARCA"),
                CostCenterSection::new("CCOSTO 4", "0007   TIENDA PINTUCO"),
            ],
            code_section: "COD".to_string(),
            partners_section: "CLIENTES".to_string(),
            products_section: "PRECIOS".to_string(),
            sellers_section: "VENDEDORES".to_string(),
            lines_section: "LINEAS".to_string(),
            seller_sections: vec![
                SellerSection::new("COD24", "0024", "CR CARLOS ALBERTO TOVAR HERRER"),
                SellerSection::new("COD25", "0025", "CO CARLOS ALBERTO TOVAR HERRER"),
                SellerSection::new("COD26", "0026", "CR OMAR SMITH PARRADO BELTRAN"),
                SellerSection::new("COD27", "0027", "CR OMAR SMITH PARRADO BELTRAN"),
                SellerSection::new("COD29", "0029", "CO BEATRIZ LONDOÑO VELASQUEZ"),
                SellerSection::new("COD30", "0030", "CR BEATRIZ LONDOÑO VELASQUEZ"),
                SellerSection::new("COD51", "0051", "CR MARICELY LONDOÑO"),
                SellerSection::new("COD52", "0052", "CO MARICELY LONDOÑO"),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl Settings {
    /// Default location: `<config_dir>/rentab/settings.toml`.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rentab")
            .join("settings.toml")
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load an explicit file; a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Load the default file, or defaults when it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tol = self.validation.tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "validation.tolerance must be a non-negative number, got {tol}"
            )));
        }

        let ratio = self.validation.max_rejected_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "validation.max_rejected_ratio must be between 0 and 1, got {ratio}"
            )));
        }

        if self.sql.timeout_secs == 0 {
            return Err(ConfigError::Invalid("sql.timeout_secs must be at least 1".into()));
        }

        if self.workbook.cost_centers.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "workbook.cost_centers must list exactly 4 sections, got {}",
                self.workbook.cost_centers.len()
            )));
        }

        if let Some(seller) = self.workbook.seller_sections.iter().find(|s| s.code.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "workbook seller section '{}' has no seller code",
                seller.sheet
            )));
        }

        // Section names must not collide (sheet lookup is case-insensitive)
        let mut names: Vec<String> = self
            .workbook
            .section_names()
            .iter()
            .chain(self.workbook.optional_section_names().iter())
            .map(|n| n.trim().to_lowercase())
            .collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(ConfigError::Invalid("workbook section names cannot be empty".into()));
        }
        names.sort();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!(
                "workbook section '{}' is configured twice",
                dup[0]
            )));
        }

        Ok(())
    }
}

impl WorkbookSettings {
    /// Every configured section name (main ledger only when set).
    pub fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(main) = &self.main_ledger {
            names.push(main);
        }
        names.extend(self.cost_centers.iter().map(|c| c.sheet.as_str()));
        names.push(&self.code_section);
        names.push(&self.partners_section);
        names.push(&self.products_section);
        names.push(&self.sellers_section);
        names
    }

    /// Sections written only when the template carries them.
    pub fn optional_section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![&self.lines_section];
        names.extend(self.seller_sections.iter().map(|s| s.sheet.as_str()));
        names
    }
}

/// Truthy flag text as written in env files: `1`, `true`, `yes`, `y`, `si`, `sí`.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "si" | "sí"
    )
}

/// Comma-separated list, blanks dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
