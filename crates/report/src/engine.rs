//! Run pipeline: select source, check destination, acquire, normalize,
//! derive, validate, write.
//!
//! On the file path the workbook's own reference sections are refreshed
//! from the day's price and seller lists first, and then serve as the
//! lookup for list prices and seller codes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use rentab_config::Settings;
use rentab_engine::Workbook;
use rentab_io::RawTable;

use crate::acquire::{RawBatch, RecordProducer};
use crate::dates::find_artifact;
use crate::derive::{derive_lines, CostCenterRouter};
use crate::error::ReportError;
use crate::format::format_currency;
use crate::model::{ReferenceCatalogs, Rejections, RunSummary, SectionCount, SellerSummaryRow, TransactionLine};
use crate::normalize::{
    normalize_movements, normalize_partners, normalize_products, normalize_seller_summary,
    normalize_sellers, parse_decimal, ColumnMap, Field, NormalizeOptions,
};
use crate::reference::{refresh_reference_sections, workbook_catalogs};
use crate::source::{select_strategy, AcquisitionStrategy, FileSource};
use crate::variance::{validate_lines, ValidationStats};
use crate::writer;

/// Per-cost-center differences below this are rounding.
const CROSS_CHECK_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_date: NaiveDate,
    pub workbook_path: PathBuf,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub lines: Vec<TransactionLine>,
}

impl RunReport {
    pub fn flagged_lines(&self) -> impl Iterator<Item = &TransactionLine> {
        self.lines.iter().filter(|l| l.flagged)
    }
}

/// Lines ready to be written, with what was dropped on the way.
#[derive(Debug, Default)]
pub struct Processed {
    pub lines: Vec<TransactionLine>,
    /// Catalogs from the relational source, to be written to the workbook.
    pub catalogs: Option<ReferenceCatalogs>,
    pub rejections: Rejections,
    pub discarded: usize,
    pub stats: ValidationStats,
    pub warnings: Vec<String>,
}

/// Everything between acquisition and writing; touches no files. Catalogs
/// from the source win over `lookup`, which is only read.
pub fn process(
    batch: &RawBatch,
    settings: &Settings,
    target: NaiveDate,
    lookup: Option<&ReferenceCatalogs>,
) -> Result<Processed, ReportError> {
    let options = NormalizeOptions {
        target_date: target,
        type_codes: &settings.sql.movements.type_codes,
    };
    let normalized = normalize_movements(&batch.movements, &options)?;

    let catalogs = match &batch.catalogs {
        Some(raw) => Some(ReferenceCatalogs::new(
            normalize_partners(&raw.partners, &settings.sql.partners)?,
            normalize_products(&raw.products, &settings.sql.products)?,
            normalize_sellers(&raw.sellers, &settings.sql.sellers)?,
        )),
        None => None,
    };

    let router = CostCenterRouter::new(&settings.workbook.cost_centers);
    let derived = derive_lines(normalized.lines, &router, catalogs.as_ref().or(lookup));

    let mut rejections = normalized.rejections;
    rejections.merge(&derived.rejections);

    let usable = derived.lines.len() + rejections.total();
    if usable > 0 {
        let ratio = rejections.total() as f64 / usable as f64;
        if ratio > settings.validation.max_rejected_ratio {
            let reasons: Vec<String> = rejections
                .to_map()
                .iter()
                .map(|(reason, n)| format!("{reason}: {n}"))
                .collect();
            return Err(ReportError::DataShape(format!(
                "{} of {usable} rows unusable ({:.1}% > {:.1}%): {}",
                rejections.total(),
                ratio * 100.0,
                settings.validation.max_rejected_ratio * 100.0,
                reasons.join(", ")
            )));
        }
    }

    let mut lines = derived.lines;
    let stats = validate_lines(&mut lines, settings.validation.tolerance);

    let mut warnings = batch.warnings.clone();
    if let Some(export) = &batch.cost_center_export {
        warnings.extend(cross_check(&lines, export, settings, &router));
    }

    Ok(Processed {
        lines,
        catalogs,
        rejections,
        discarded: normalized.discarded,
        stats,
        warnings,
    })
}

/// Compare per-section net sales against the per-cost-center export.
pub fn cross_check(
    lines: &[TransactionLine],
    export: &RawTable,
    settings: &Settings,
    router: &CostCenterRouter,
) -> Vec<String> {
    let map = ColumnMap::detect(&export.headers, &[Field::CostCenter, Field::NetAmount]);
    let (Some(cc_col), Some(net_col)) = (map.get(Field::CostCenter), map.get(Field::NetAmount)) else {
        return vec!["cost-center export lacks cost center or sales columns; cross-check skipped".to_string()];
    };

    let mut expected: BTreeMap<usize, f64> = BTreeMap::new();
    for row in &export.rows {
        let cc = row.get(cc_col).map(String::as_str).unwrap_or("");
        let net = row.get(net_col).and_then(|v| parse_decimal(v));
        if let (Some(section), Some(net)) = (router.route(cc), net) {
            *expected.entry(section).or_insert(0.0) += net;
        }
    }

    let mut warnings = Vec::new();
    for (i, section) in settings.workbook.cost_centers.iter().enumerate() {
        let actual: f64 = lines.iter().filter(|l| l.section == Some(i)).map(|l| l.net_amount).sum();
        let want = expected.get(&i).copied().unwrap_or(0.0);
        if (actual - want).abs() > CROSS_CHECK_TOLERANCE {
            warnings.push(format!(
                "{}: lines total {} but cost-center export says {}",
                section.label.trim(),
                format_currency(actual),
                format_currency(want)
            ));
        }
    }
    warnings
}

/// What a run would read, without reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub strategy: &'static str,
    pub artifact: String,
    pub path: Option<PathBuf>,
}

pub fn resolve(settings: &Settings, target: NaiveDate) -> Result<Resolution, ReportError> {
    settings.validate()?;
    match select_strategy(settings)? {
        AcquisitionStrategy::File(file) => {
            let artifact = find_artifact(&file.directory, &file.movements_prefix, target, file.use_latest)?;
            Ok(Resolution { strategy: "file", artifact: artifact.name, path: Some(artifact.path) })
        }
        AcquisitionStrategy::Sql(sql) => Ok(Resolution {
            strategy: "sql",
            artifact: sql.describe(),
            path: Some(sql.database_path),
        }),
    }
}

/// What the file path adds around processing: refreshed reference
/// sections, the lookup read back from them, and the seller summary.
#[derive(Debug, Default)]
struct FileExtras {
    lookup: Option<ReferenceCatalogs>,
    seller_rows: Option<Vec<SellerSummaryRow>>,
    sections: Vec<SectionCount>,
    warnings: Vec<String>,
}

fn prepare_file_extras(
    workbook: &mut Workbook,
    settings: &Settings,
    file: &FileSource,
    target: NaiveDate,
) -> Result<FileExtras, ReportError> {
    let refreshed = refresh_reference_sections(workbook, &settings.workbook, file, target)?;
    let mut extras = FileExtras {
        lookup: workbook_catalogs(workbook, &settings.workbook),
        sections: refreshed.sections,
        warnings: refreshed.warnings,
        ..FileExtras::default()
    };

    let has_seller_sections = settings
        .workbook
        .seller_sections
        .iter()
        .any(|s| workbook.sheet_index(&s.sheet).is_some());
    if has_seller_sections {
        match file.read_seller_summary(target) {
            Ok(Some(table)) => extras.seller_rows = Some(normalize_seller_summary(&table)?),
            Ok(None) => {}
            Err(ReportError::NotFound(msg)) => {
                extras.warnings.push(format!("seller sections kept as is: {msg}"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(extras)
}

/// One full run. The workbook is checked before any data is read and is
/// only rewritten once every line has been processed.
pub fn run(config: &RunConfig) -> Result<RunReport, ReportError> {
    let settings = &config.settings;
    settings.validate()?;

    let strategy = select_strategy(settings)?;
    log::info!("run for {} via {}", config.target_date, strategy.kind());

    let mut workbook =
        writer::open_destination(&config.workbook_path, &settings.workbook, strategy.has_catalogs())?;

    let batch = strategy.acquire(config.target_date)?;
    let extras = match &strategy {
        AcquisitionStrategy::File(file) => prepare_file_extras(&mut workbook, settings, file, config.target_date)?,
        AcquisitionStrategy::Sql(_) => FileExtras::default(),
    };
    let mut processed = process(&batch, settings, config.target_date, extras.lookup.as_ref())?;

    let mut sections = writer::write_report(
        &mut workbook,
        &settings.workbook,
        &processed.lines,
        processed.catalogs.as_ref(),
    )?;
    if let Some(rows) = &extras.seller_rows {
        sections.extend(writer::write_seller_sections(&mut workbook, &settings.workbook, rows));
    }
    sections.extend(extras.sections);
    processed.warnings.extend(extras.warnings);
    writer::save(&workbook, &config.workbook_path)?;

    let summary = RunSummary {
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        target_date: config.target_date,
        strategy: strategy.kind().to_string(),
        artifact: batch.artifact.clone(),
        lines_imported: processed.lines.len(),
        flagged: processed.stats.flagged,
        skipped: processed.stats.skipped,
        rejected: processed.rejections.to_map(),
        discarded: processed.discarded,
        sections,
        warnings: processed.warnings,
    };

    for warning in &summary.warnings {
        log::warn!("{warning}");
    }
    log::info!("{}", summary.headline());

    Ok(RunReport { summary, lines: processed.lines })
}
