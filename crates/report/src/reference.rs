//! Reference sections on the file path.
//!
//! The day's price list and seller assignments are copied into the
//! workbook's products and sellers sections, and the lookup used to price
//! and assign lines is read back from those sections. Prices are found by
//! description (column A) with the list price in column M; sellers by
//! client NIT (column A) with the seller code in column B. A section with
//! its own header row is read by header instead.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDate;
use rentab_config::WorkbookSettings;
use rentab_engine::{CellValue, Sheet, Workbook};

use crate::error::ReportError;
use crate::model::{Partner, PricedProduct, ReferenceCatalogs, SectionCount};
use crate::normalize::{parse_decimal, ColumnMap, Field};
use crate::source::{FileSource, ReferenceFile};

const PRICE_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xls"];
const SELLER_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "csv"];

const HEADER_SCAN_ROWS: usize = 20;
const PRICE_DESCRIPTION_COL: usize = 0;
const PRICE_COL: usize = 12;
const NIT_COL: usize = 0;
const SELLER_CODE_COL: usize = 1;

// ---------------------------------------------------------------------------
// Locating
// ---------------------------------------------------------------------------

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

/// `<prefix><stamp>.<ext>` in `dir`, names compared case-insensitively and
/// extensions tried in order; with `use_latest`, the most recently modified
/// file carrying the prefix.
pub fn locate(
    dir: &Path,
    prefix: &str,
    stamp: &str,
    extensions: &[&str],
    use_latest: bool,
) -> Result<PathBuf, ReportError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ReportError::NotFound(format!("cannot list reference directory {}: {e}", dir.display()))
    })?;
    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| extension_of(path).is_some_and(|ext| extensions.contains(&ext.as_str())))
        .collect();

    let prefix = prefix.to_lowercase();
    let stem = |path: &Path| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    };

    let found = if use_latest {
        let modified = |path: &Path| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        };
        let mut candidates: Vec<&PathBuf> = files.iter().filter(|p| stem(p).starts_with(&prefix)).collect();
        candidates.sort_by(|a, b| modified(b).cmp(&modified(a)).then_with(|| a.cmp(b)));
        candidates.first().map(|p| (*p).clone())
    } else {
        let wanted = format!("{prefix}{stamp}");
        extensions.iter().find_map(|ext| {
            files
                .iter()
                .find(|p| stem(p) == wanted && extension_of(p).as_deref() == Some(*ext))
                .cloned()
        })
    };

    found.ok_or_else(|| {
        if use_latest {
            ReportError::NotFound(format!("no {prefix}* file in {}", dir.display()))
        } else {
            ReportError::NotFound(format!(
                "no {prefix}{stamp}.{{{}}} in {}",
                extensions.join(","),
                dir.display()
            ))
        }
    })
}

// ---------------------------------------------------------------------------
// Copying
// ---------------------------------------------------------------------------

/// Numbers stay numbers only when writing them back gives the same text,
/// so codes such as `0024` keep their zeros.
fn copied_value(text: &str) -> CellValue {
    let text = text.trim();
    match text.parse::<f64>() {
        Ok(n) if CellValue::Number(n).raw_display() == text => CellValue::Number(n),
        _ => text.into(),
    }
}

/// Copy the price list cell for cell. Returns the rows holding data.
pub fn copy_prices(sheet: &mut Sheet, grid: &[Vec<String>]) -> usize {
    sheet.clear();
    let mut rows = 0;
    for (r, row) in grid.iter().enumerate() {
        let mut has_data = false;
        for (c, text) in row.iter().enumerate().filter(|(_, t)| !t.trim().is_empty()) {
            sheet.set_value(r, c, copied_value(text));
            has_data = true;
        }
        if has_data {
            rows += 1;
        }
    }
    rows
}

/// Copy seller assignments as NIT (A) and seller code (B). The source file
/// lists the code first; blank rows are dropped.
pub fn copy_sellers(sheet: &mut Sheet, grid: &[Vec<String>]) -> usize {
    sheet.clear();
    let cell = |row: &[String], col: usize| row.get(col).map(|s| s.trim().to_string()).unwrap_or_default();
    let mut rows = 0;
    for row in grid {
        let (code, nit) = (cell(row, 0), cell(row, 1));
        if code.is_empty() && nit.is_empty() {
            continue;
        }
        sheet.set_value(rows, NIT_COL, nit);
        sheet.set_value(rows, SELLER_CODE_COL, code);
        rows += 1;
    }
    rows
}

/// Result of refreshing the reference sections.
#[derive(Debug, Default)]
pub struct Refreshed {
    pub sections: Vec<SectionCount>,
    pub warnings: Vec<String>,
}

/// One reference list and the section it is copied into.
struct ReferenceList<'a> {
    section: &'a str,
    file: &'a ReferenceFile,
    stamp: String,
    extensions: &'a [&'a str],
    copy: fn(&mut Sheet, &[Vec<String>]) -> usize,
}

fn refresh_one(
    workbook: &mut Workbook,
    list: ReferenceList<'_>,
    use_latest: bool,
    out: &mut Refreshed,
) -> Result<(), ReportError> {
    let ReferenceList { section, file, stamp, extensions, copy } = list;
    let Some(sheet) = workbook.sheet_by_name_mut(section) else {
        return Ok(());
    };

    let path = match locate(&file.directory, &file.prefix, &stamp, extensions, use_latest) {
        Ok(path) => path,
        Err(e) => {
            out.warnings.push(format!("{section} kept as is: {}", e.message()));
            return Ok(());
        }
    };
    let grid = rentab_io::read_grid(&path)
        .map_err(|e| ReportError::DataShape(format!("cannot read {}: {e}", path.display())))?;

    let rows = copy(sheet, &grid);
    log::info!("{section}: {rows} rows from {}", path.display());
    out.sections.push(SectionCount { name: sheet.name.clone(), rows });
    Ok(())
}

/// Copy the day's price list (`<prefix>MMDD`) and seller assignments
/// (`<prefix>DDMM`) into their sections, when the template has them. A
/// missing file leaves its section as it was and is reported as a warning.
pub fn refresh_reference_sections(
    workbook: &mut Workbook,
    settings: &WorkbookSettings,
    source: &FileSource,
    target: NaiveDate,
) -> Result<Refreshed, ReportError> {
    let mut out = Refreshed::default();
    if let Some(file) = &source.prices {
        let list = ReferenceList {
            section: &settings.products_section,
            file,
            stamp: target.format("%m%d").to_string(),
            extensions: &PRICE_EXTENSIONS,
            copy: copy_prices,
        };
        refresh_one(workbook, list, source.use_latest, &mut out)?;
    }
    if let Some(file) = &source.sellers {
        let list = ReferenceList {
            section: &settings.sellers_section,
            file,
            stamp: target.format("%d%m").to_string(),
            extensions: &SELLER_EXTENSIONS,
            copy: copy_sellers,
        };
        refresh_one(workbook, list, source.use_latest, &mut out)?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Reading back
// ---------------------------------------------------------------------------

fn row_texts(sheet: &Sheet, row: usize) -> Vec<String> {
    let width = sheet.row_values(row).last().map(|(c, _)| c + 1).unwrap_or(0);
    (0..width).map(|c| sheet.get_text(row, c)).collect()
}

/// First row within the scan window naming every `required` field.
fn find_header(sheet: &Sheet, fields: &[Field], required: &[Field]) -> Option<(usize, ColumnMap)> {
    (0..HEADER_SCAN_ROWS).find_map(|row| {
        let map = ColumnMap::detect(&row_texts(sheet, row), fields);
        required.iter().all(|f| map.contains(*f)).then_some((row, map))
    })
}

fn number_at(sheet: &Sheet, row: usize, col: usize) -> Option<f64> {
    match sheet.get_value(row, col) {
        CellValue::Number(n) => Some(*n),
        other => parse_decimal(&other.raw_display()),
    }
}

fn read_prices(sheet: &Sheet) -> Vec<PricedProduct> {
    let Some(last) = sheet.max_row() else {
        return Vec::new();
    };
    let header = find_header(
        sheet,
        &[Field::ProductId, Field::Description, Field::ListPrice],
        &[Field::Description, Field::ListPrice],
    );
    let (first, id_col, desc_col, price_col) = match &header {
        Some((row, map)) => (
            row + 1,
            map.get(Field::ProductId),
            map.get(Field::Description).unwrap_or(PRICE_DESCRIPTION_COL),
            map.get(Field::ListPrice).unwrap_or(PRICE_COL),
        ),
        None => (0, None, PRICE_DESCRIPTION_COL, PRICE_COL),
    };

    (first..=last)
        .filter_map(|row| {
            let list_price = number_at(sheet, row, price_col)?;
            let id = id_col.map(|c| sheet.get_text(row, c).trim().to_string()).unwrap_or_default();
            let description = sheet.get_text(row, desc_col).trim().to_string();
            (!id.is_empty() || !description.is_empty()).then_some(PricedProduct {
                id,
                description,
                list_price: Some(list_price),
            })
        })
        .collect()
}

fn read_assignments(sheet: &Sheet) -> Vec<Partner> {
    let Some(last) = sheet.max_row() else {
        return Vec::new();
    };
    let fields = [Field::ClientId, Field::Seller];
    let (first, nit_col, code_col) = match find_header(sheet, &fields, &fields) {
        Some((row, map)) => (
            row + 1,
            map.get(Field::ClientId).unwrap_or(NIT_COL),
            map.get(Field::Seller).unwrap_or(SELLER_CODE_COL),
        ),
        None => (0, NIT_COL, SELLER_CODE_COL),
    };

    (first..=last)
        .filter_map(|row| {
            let id = sheet.get_text(row, nit_col).trim().to_string();
            let seller_code = sheet.get_text(row, code_col).trim().to_string();
            (!id.is_empty() && !seller_code.is_empty()).then_some(Partner {
                id,
                name: String::new(),
                seller_code,
            })
        })
        .collect()
}

/// Lookup built from the workbook's products and sellers sections, or None
/// when neither holds usable rows.
pub fn workbook_catalogs(workbook: &Workbook, settings: &WorkbookSettings) -> Option<ReferenceCatalogs> {
    let products = workbook
        .sheet_by_name(&settings.products_section)
        .map(read_prices)
        .unwrap_or_default();
    let partners = workbook
        .sheet_by_name(&settings.sellers_section)
        .map(read_assignments)
        .unwrap_or_default();
    log::debug!("workbook lookup: {} prices, {} seller assignments", products.len(), partners.len());

    let catalogs = ReferenceCatalogs::new(partners, products, Vec::new());
    (!catalogs.is_empty()).then_some(catalogs)
}
