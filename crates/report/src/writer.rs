//! Sheet Writer: fills the ledger workbook sections from routed lines.
//!
//! Every section is cleared before it is written, so running twice for the
//! same day gives the same workbook.

use std::collections::BTreeMap;
use std::path::Path;

use rentab_config::WorkbookSettings;
use rentab_engine::{CellValue, NumberFormat, Sheet, Workbook};

use crate::error::ReportError;
use crate::derive::CostCenterRouter;
use crate::model::{ReferenceCatalogs, SectionCount, SellerSummaryRow, TransactionLine};
use crate::normalize::{normalize_header, ColumnMap, Field};

/// Background of flagged rows.
pub const FLAG_FILL: u32 = 0xFFFF00;
/// Written in a cost-center section that had no lines for the day.
pub const CLOSED_NOTICE: &str = "ESTE PUNTO DE VENTA NO ABRIÓ HOY";
pub const TOTAL_LABEL: &str = "Total General";
/// Written in the lines section when no line carries a product line.
pub const NO_DATA_NOTICE: &str = "SIN DATOS PARA MOSTRAR";
/// Written in a seller section when the seller sold nothing.
pub const NO_SALES_NOTICE: &str = "ESTE VENDEDOR NO REGISTRA VENTAS";

const LEDGER_HEADER_SCAN_ROWS: usize = 100;

/// Ledger columns in default order.
pub const LEDGER_FIELDS: [Field; 16] = [
    Field::Date,
    Field::ClientId,
    Field::ClientName,
    Field::Seller,
    Field::CostCenter,
    Field::ProductId,
    Field::Description,
    Field::Quantity,
    Field::NetAmount,
    Field::CostAmount,
    Field::Margin,
    Field::UnitPrice,
    Field::ListPrice,
    Field::Variance,
    Field::VariancePct,
    Field::Observation,
];

/// Cost-center sections repeat the ledger without the cost center itself.
const SECTION_FIELDS: [Field; 15] = [
    Field::Date,
    Field::ClientId,
    Field::ClientName,
    Field::Seller,
    Field::ProductId,
    Field::Description,
    Field::Quantity,
    Field::NetAmount,
    Field::CostAmount,
    Field::Margin,
    Field::UnitPrice,
    Field::ListPrice,
    Field::Variance,
    Field::VariancePct,
    Field::Observation,
];

/// Columns summed on the total row.
const SUMMED: [Field; 4] = [Field::Quantity, Field::NetAmount, Field::CostAmount, Field::Variance];

/// `0` → `A`, `25` → `Z`, `26` → `AA`.
pub fn col_letter(col: usize) -> String {
    let mut n = col + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Destination checks
// ---------------------------------------------------------------------------

fn main_ledger_index(workbook: &Workbook, settings: &WorkbookSettings) -> Option<usize> {
    match settings.main_ledger.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => workbook.sheet_index(name),
        None => (workbook.sheet_count() > 0).then_some(0),
    }
}

/// Every section this run will write must already exist in the template.
pub fn check_sections(
    workbook: &Workbook,
    settings: &WorkbookSettings,
    with_catalogs: bool,
) -> Result<(), ReportError> {
    let mut missing: Vec<String> = Vec::new();
    if main_ledger_index(workbook, settings).is_none() {
        missing.push(settings.main_ledger.clone().unwrap_or_else(|| "main ledger".to_string()));
    }

    let mut required: Vec<&str> = settings.cost_centers.iter().map(|c| c.sheet.as_str()).collect();
    required.push(&settings.code_section);
    if with_catalogs {
        required.push(&settings.partners_section);
        required.push(&settings.products_section);
        required.push(&settings.sellers_section);
    }
    missing.extend(
        required
            .into_iter()
            .filter(|name| workbook.sheet_index(name).is_none())
            .map(str::to_string),
    );

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReportError::Write(format!(
            "workbook lacks sections: {} (has: {})",
            missing.join(", "),
            workbook.sheet_names().join(", ")
        )))
    }
}

/// Load the destination template after checking it can be rewritten.
pub fn open_destination(
    path: &Path,
    settings: &WorkbookSettings,
    with_catalogs: bool,
) -> Result<Workbook, ReportError> {
    rentab_io::xlsx::ensure_writable(path).map_err(ReportError::Write)?;
    let (workbook, stats) = rentab_io::xlsx::import(path).map_err(ReportError::Write)?;
    log::debug!("loaded template {}: {}", path.display(), stats.summary());
    check_sections(&workbook, settings, with_catalogs)?;
    Ok(workbook)
}

pub fn save(workbook: &Workbook, path: &Path) -> Result<(), ReportError> {
    let stats = rentab_io::xlsx::export(workbook, path).map_err(ReportError::Write)?;
    log::info!(
        "wrote {} ({} sheets, {} cells, {} formulas, {} ms)",
        path.display(),
        stats.sheets_exported,
        stats.cells_exported,
        stats.formulas_exported,
        stats.export_duration_ms
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

fn put(sheet: &mut Sheet, row: usize, col: usize, value: impl Into<CellValue>, number_format: NumberFormat) {
    sheet.set_value(row, col, value);
    let format = sheet.format_mut(row, col);
    format.bordered = true;
    format.number_format = number_format;
}

fn put_bold(sheet: &mut Sheet, row: usize, col: usize, value: impl Into<CellValue>) {
    put(sheet, row, col, value, NumberFormat::General);
    sheet.format_mut(row, col).bold = true;
}

fn field_format(field: Field) -> NumberFormat {
    match field {
        Field::ClientId | Field::Seller | Field::ProductId => NumberFormat::Text,
        Field::Quantity | Field::UnitPrice | Field::ListPrice => NumberFormat::Number { decimals: 2 },
        Field::NetAmount | Field::CostAmount | Field::Variance => NumberFormat::Accounting,
        Field::Margin | Field::Markup | Field::VariancePct => NumberFormat::Percent { decimals: 2 },
        _ => NumberFormat::General,
    }
}

fn field_value(line: &TransactionLine, field: Field) -> CellValue {
    match field {
        Field::Date => line.date.format("%Y-%m-%d").to_string().into(),
        Field::TypeCode => CellValue::Empty,
        Field::ClientId => line.client_id.as_str().into(),
        Field::ClientName => line.client_name.as_str().into(),
        Field::Seller => line.seller_code.as_str().into(),
        Field::ProductId => line.product_id.as_str().into(),
        Field::Description => line.description.as_str().into(),
        Field::CostCenter => line.cost_center.as_str().into(),
        Field::Quantity => line.quantity.into(),
        Field::NetAmount => line.net_amount.into(),
        Field::CostAmount => line.cost_amount.into(),
        Field::ListPrice => line.list_price.into(),
        Field::UnitPrice => line.unit_price.into(),
        Field::Variance => line.variance.map(|v| v.amount).into(),
        Field::VariancePct => line.variance.map(|v| v.pct).into(),
        Field::Margin => line.margin_pct().into(),
        Field::Markup => line.markup_pct().into(),
        Field::Observation => line.observation.as_str().into(),
        Field::ProductLine => line.product_line.as_str().into(),
        Field::ProductGroup => line.product_group.as_str().into(),
    }
}

fn write_header(sheet: &mut Sheet, row: usize, columns: &[(Field, usize)]) {
    for (field, col) in columns {
        put_bold(sheet, row, *col, field.label());
    }
}

/// Write `lines` from `start_row`; flagged rows get the fill across every
/// column. Returns the row after the last line.
fn write_lines(sheet: &mut Sheet, start_row: usize, columns: &[(Field, usize)], lines: &[&TransactionLine]) -> usize {
    for (i, line) in lines.iter().enumerate() {
        let row = start_row + i;
        for (field, col) in columns {
            put(sheet, row, *col, field_value(line, *field), field_format(*field));
            if line.flagged {
                sheet.format_mut(row, *col).fill = Some(FLAG_FILL);
            }
        }
    }
    start_row + lines.len()
}

/// Bold total row: SUM formulas over the data rows, or zeros without data.
fn write_total(sheet: &mut Sheet, row: usize, columns: &[(Field, usize)], first_data_row: usize, count: usize) {
    let label_col = columns
        .iter()
        .filter(|(f, _)| !SUMMED.contains(f))
        .map(|(_, c)| *c)
        .min();
    if let Some(col) = label_col {
        put_bold(sheet, row, col, TOTAL_LABEL);
    }

    for (field, col) in columns.iter().filter(|(f, _)| SUMMED.contains(f)) {
        let value = if count == 0 {
            CellValue::Number(0.0)
        } else {
            let letter = col_letter(*col);
            // Sheet rows are 1-based
            CellValue::Formula(format!(
                "=SUM({letter}{}:{letter}{})",
                first_data_row + 1,
                first_data_row + count
            ))
        };
        put(sheet, row, *col, value, field_format(*field));
        sheet.format_mut(row, *col).bold = true;
    }
}

// ---------------------------------------------------------------------------
// Main ledger
// ---------------------------------------------------------------------------

/// Where the ledger header sits and which column holds each field.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerLayout {
    pub header_row: usize,
    pub columns: Vec<(Field, usize)>,
}

fn header_texts(sheet: &Sheet, row: usize) -> Vec<String> {
    let width = sheet.row_values(row).last().map(|(c, _)| c + 1).unwrap_or(0);
    (0..width).map(|c| sheet.get_text(row, c)).collect()
}

/// Find the template's header (first row within 100 with at least three
/// cells naming two or more ledger fields). Fields the template lacks are
/// appended after its last header column. A sheet without a header gets
/// the default one in the first row.
pub fn ledger_layout(sheet: &mut Sheet) -> LedgerLayout {
    for row in 0..LEDGER_HEADER_SCAN_ROWS {
        let values = sheet.row_values(row);
        if values.len() < 3 || !values.iter().any(|(_, v)| matches!(v, CellValue::Text(_))) {
            continue;
        }
        let texts = header_texts(sheet, row);
        let map = ColumnMap::detect(&texts, &LEDGER_FIELDS);
        if map.len() < 2 {
            continue;
        }

        let mut next_col = texts.len();
        let mut columns = Vec::with_capacity(LEDGER_FIELDS.len());
        for field in LEDGER_FIELDS {
            match map.get(field) {
                Some(col) => columns.push((field, col)),
                None => {
                    put_bold(sheet, row, next_col, field.label());
                    columns.push((field, next_col));
                    next_col += 1;
                }
            }
        }
        columns.sort_by_key(|(_, col)| *col);
        return LedgerLayout { header_row: row, columns };
    }

    let columns: Vec<(Field, usize)> = LEDGER_FIELDS.iter().copied().zip(0..).collect();
    write_header(sheet, 0, &columns);
    LedgerLayout { header_row: 0, columns }
}

/// Replace everything below the header with `lines` plus the total row.
pub fn write_main_ledger(sheet: &mut Sheet, lines: &[TransactionLine]) -> LedgerLayout {
    let layout = ledger_layout(sheet);
    let first = layout.header_row + 1;
    let cleared = sheet.clear_rows_from(first);
    log::debug!("{}: cleared {cleared} cells below row {}", sheet.name, first);

    let refs: Vec<&TransactionLine> = lines.iter().collect();
    let next = write_lines(sheet, first, &layout.columns, &refs);
    write_total(sheet, next, &layout.columns, first, lines.len());
    layout
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Label row, then header, lines and total; or the closed notice.
pub fn write_cost_center(sheet: &mut Sheet, label: &str, lines: &[&TransactionLine]) {
    sheet.clear();
    put_bold(sheet, 0, 0, label);

    if lines.is_empty() {
        put_bold(sheet, 1, 0, CLOSED_NOTICE);
        return;
    }

    let columns: Vec<(Field, usize)> = SECTION_FIELDS.iter().copied().zip(0..).collect();
    write_header(sheet, 1, &columns);
    let next = write_lines(sheet, 2, &columns, lines);
    write_total(sheet, next, &columns, 2, lines.len());
}

const CODE_HEADERS: [&str; 7] = ["COD. VENDEDOR", "DESCRIPCION", "CANTIDAD", "VENTAS", "COSTOS", "% RENTA", "% UTIL."];

/// Lines grouped by seller code (stable, so source order holds within a
/// seller), with margin over sales and over cost.
pub fn write_code_section(sheet: &mut Sheet, lines: &[TransactionLine]) {
    sheet.clear();
    for (col, text) in CODE_HEADERS.iter().enumerate() {
        put_bold(sheet, 0, col, *text);
    }

    let mut sorted: Vec<&TransactionLine> = lines.iter().collect();
    sorted.sort_by(|a, b| a.seller_code.cmp(&b.seller_code));

    let percent = NumberFormat::Percent { decimals: 2 };
    for (i, line) in sorted.iter().enumerate() {
        let row = i + 1;
        put(sheet, row, 0, line.seller_code.as_str(), NumberFormat::Text);
        put(sheet, row, 1, line.description.as_str(), NumberFormat::General);
        put(sheet, row, 2, line.quantity, NumberFormat::Number { decimals: 2 });
        put(sheet, row, 3, line.net_amount, NumberFormat::Accounting);
        put(sheet, row, 4, line.cost_amount, NumberFormat::Accounting);
        put(sheet, row, 5, line.margin_pct(), percent);
        put(sheet, row, 6, line.markup_pct(), percent);
    }

    let total_row = sorted.len() + 1;
    put_bold(sheet, total_row, 0, TOTAL_LABEL);
    for col in 2..=4 {
        let value = if sorted.is_empty() {
            CellValue::Number(0.0)
        } else {
            let letter = col_letter(col);
            CellValue::Formula(format!("=SUM({letter}2:{letter}{})", sorted.len() + 1))
        };
        let format = if col == 2 { NumberFormat::Number { decimals: 2 } } else { NumberFormat::Accounting };
        put(sheet, total_row, col, value, format);
        sheet.format_mut(total_row, col).bold = true;
    }
}

// ---------------------------------------------------------------------------
// Product lines
// ---------------------------------------------------------------------------

const LINES_HEADERS: [&str; 7] = [
    "LÍNEA  DESCRIPCIÓN",
    "GRUPO  DESCRIPCIÓN",
    "CANTIDAD",
    "VENTAS",
    "COSTO",
    "%RENTABILIDAD",
    "%UTILIDAD",
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    quantity: f64,
    net: f64,
    cost: f64,
}

impl Totals {
    fn add(&mut self, other: Totals) {
        self.quantity += other.quantity;
        self.net += other.net;
        self.cost += other.cost;
    }

    /// 1 − cost ÷ sales, 0 without sales.
    fn margin(&self) -> f64 {
        if self.net == 0.0 { 0.0 } else { 1.0 - self.cost / self.net }
    }

    /// sales ÷ cost − 1, 0 without cost.
    fn markup(&self) -> f64 {
        if self.cost == 0.0 { 0.0 } else { self.net / self.cost - 1.0 }
    }
}

/// Sort key of a line or group label: its first number, then the text.
/// Labels without a number sort last.
fn label_order(label: &str) -> (u64, String) {
    let code = label
        .split(|c: char| !c.is_ascii_digit())
        .find(|t| !t.is_empty())
        .and_then(|t| t.parse().ok())
        .unwrap_or(1_000_000);
    (code, label.to_string())
}

fn total_label(text: &str) -> String {
    let cleaned = text.replace('-', " ").split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() { "Total".to_string() } else { format!("Total {cleaned}") }
}

fn write_totals_row(sheet: &mut Sheet, row: usize, label_col: usize, label: &str, totals: Totals, bold: bool) {
    let percent = NumberFormat::Percent { decimals: 2 };
    put(sheet, row, 0, CellValue::Empty, NumberFormat::General);
    put(sheet, row, 1, CellValue::Empty, NumberFormat::General);
    put(sheet, row, label_col, label, NumberFormat::General);
    put(sheet, row, 2, totals.quantity, NumberFormat::Number { decimals: 2 });
    put(sheet, row, 3, totals.net, NumberFormat::Accounting);
    put(sheet, row, 4, totals.cost, NumberFormat::Accounting);
    put(sheet, row, 5, totals.margin(), percent);
    put(sheet, row, 6, totals.markup(), percent);
    if bold {
        for col in 0..LINES_HEADERS.len() {
            sheet.format_mut(row, col).bold = true;
        }
    }
}

/// Sales summarized by product line and group: one row per group, a bold
/// total per line, then the overall total. Lines without a line or group,
/// or whose labels are themselves totals, are left out. Returns the number
/// of groups written.
pub fn write_lines_section(sheet: &mut Sheet, lines: &[TransactionLine]) -> usize {
    sheet.clear();
    for (col, text) in LINES_HEADERS.iter().enumerate() {
        put_bold(sheet, 0, col, *text);
    }

    let clean = |text: &str| text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut groups: BTreeMap<(u64, String), BTreeMap<(u64, String), Totals>> = BTreeMap::new();
    for line in lines {
        let (product_line, group) = (clean(&line.product_line), clean(&line.product_group));
        if product_line.is_empty()
            || group.is_empty()
            || product_line.to_lowercase().contains("total")
            || group.to_lowercase().contains("total")
        {
            continue;
        }
        let amounts = Totals {
            quantity: line.quantity,
            net: line.net_amount,
            cost: line.cost_amount.unwrap_or(0.0),
        };
        groups
            .entry(label_order(&product_line))
            .or_default()
            .entry(label_order(&group))
            .or_default()
            .add(amounts);
    }

    if groups.is_empty() {
        put(sheet, 1, 0, NO_DATA_NOTICE, NumberFormat::General);
        return 0;
    }

    let mut row = 1;
    let mut written = 0;
    let mut overall = Totals::default();
    for ((_, product_line), by_group) in &groups {
        let mut line_totals = Totals::default();
        for ((_, group), totals) in by_group {
            write_totals_row(sheet, row, 1, &total_label(group), *totals, false);
            line_totals.add(*totals);
            row += 1;
            written += 1;
        }
        write_totals_row(sheet, row, 0, &total_label(product_line), line_totals, true);
        overall.add(line_totals);
        row += 1;
    }
    write_totals_row(sheet, row, 0, TOTAL_LABEL, overall, true);
    written
}

// ---------------------------------------------------------------------------
// Seller sections
// ---------------------------------------------------------------------------

fn is_grand_total(text: &str) -> bool {
    let normalized = normalize_header(text);
    normalized
        .strip_prefix("total ")
        .is_some_and(|rest| rest.starts_with("00"))
}

/// One seller's rows from the per-seller export: detail rows by margin
/// (lowest first, unknown last), subtotal rows at the end, then a total
/// row with SUM formulas. Returns the number of data rows.
pub fn write_seller_section(sheet: &mut Sheet, rows: &[&SellerSummaryRow]) -> usize {
    sheet.clear();

    let kept: Vec<&SellerSummaryRow> = rows
        .iter()
        .copied()
        .filter(|r| {
            !r.description.is_empty()
                || [r.quantity, r.net_amount, r.cost_amount, r.margin, r.markup].iter().any(Option::is_some)
        })
        .filter(|r| !is_grand_total(&r.seller) && !is_grand_total(&r.description))
        .collect();
    if kept.is_empty() {
        put(sheet, 0, 0, NO_SALES_NOTICE, NumberFormat::General);
        return 0;
    }

    let (mut detail, subtotals): (Vec<&SellerSummaryRow>, Vec<&SellerSummaryRow>) = kept
        .into_iter()
        .partition(|r| !r.description.to_lowercase().contains("subtotal"));
    detail.sort_by(|a, b| match (a.margin, b.margin) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    detail.extend(subtotals);

    for (col, text) in CODE_HEADERS.iter().enumerate() {
        put(sheet, 0, col, *text, NumberFormat::General);
    }
    let percent = NumberFormat::Percent { decimals: 2 };
    for (i, r) in detail.iter().enumerate() {
        let row = i + 1;
        put(sheet, row, 0, r.seller.as_str(), NumberFormat::Text);
        put(sheet, row, 1, r.description.as_str(), NumberFormat::General);
        put(sheet, row, 2, r.quantity, NumberFormat::General);
        put(sheet, row, 3, r.net_amount, NumberFormat::Accounting);
        put(sheet, row, 4, r.cost_amount, NumberFormat::Accounting);
        put(sheet, row, 5, r.margin, percent);
        put(sheet, row, 6, r.markup, percent);
    }

    // Data fills sheet rows 2..=last (1-based); the total row follows
    let last = detail.len() + 1;
    let total_row = last;
    let t = total_row + 1;
    put_bold(sheet, total_row, 1, TOTAL_LABEL);
    for (col, format) in [(2, NumberFormat::General), (3, NumberFormat::Accounting), (4, NumberFormat::Accounting)] {
        let letter = col_letter(col);
        put(sheet, total_row, col, CellValue::Formula(format!("=SUM({letter}2:{letter}{last})")), format);
        sheet.format_mut(total_row, col).bold = true;
    }
    put(sheet, total_row, 5, CellValue::Formula(format!("=IF(D{t}=0,0,1-(E{t}/D{t}))")), percent);
    put(sheet, total_row, 6, CellValue::Formula(format!("=IF(E{t}=0,0,(D{t}/E{t})-1)")), percent);
    sheet.format_mut(total_row, 5).bold = true;
    sheet.format_mut(total_row, 6).bold = true;
    detail.len()
}

/// Fill every configured seller section the workbook has from the
/// per-seller export. Rows are matched by seller code, then by name.
pub fn write_seller_sections(
    workbook: &mut Workbook,
    settings: &WorkbookSettings,
    rows: &[SellerSummaryRow],
) -> Vec<SectionCount> {
    let labels: Vec<String> = settings
        .seller_sections
        .iter()
        .map(|s| format!("{} {}", s.code.trim(), s.name.trim()))
        .collect();
    let router = CostCenterRouter::from_labels(labels.iter().map(String::as_str));
    let routed: Vec<Option<usize>> = rows.iter().map(|r| router.route(&r.seller)).collect();

    let mut counts = Vec::new();
    for (i, section) in settings.seller_sections.iter().enumerate() {
        let Some(sheet) = workbook.sheet_by_name_mut(&section.sheet) else {
            continue;
        };
        let mine: Vec<&SellerSummaryRow> = rows
            .iter()
            .zip(&routed)
            .filter(|(_, r)| **r == Some(i))
            .map(|(row, _)| row)
            .collect();
        let written = write_seller_section(sheet, &mine);
        if written == 0 {
            log::info!("{}: no sales for seller {}", section.sheet, section.code);
        }
        counts.push(SectionCount { name: sheet.name.clone(), rows: written });
    }
    counts
}

fn write_rows(sheet: &mut Sheet, headers: &[&str], rows: Vec<Vec<CellValue>>, formats: &[NumberFormat]) -> usize {
    sheet.clear();
    for (col, text) in headers.iter().enumerate() {
        put_bold(sheet, 0, col, *text);
    }
    let count = rows.len();
    for (i, row) in rows.into_iter().enumerate() {
        for (col, value) in row.into_iter().enumerate() {
            let format = formats.get(col).copied().unwrap_or_default();
            put(sheet, i + 1, col, value, format);
        }
    }
    count
}

pub fn write_partners(sheet: &mut Sheet, catalogs: &ReferenceCatalogs) -> usize {
    let rows = catalogs
        .partners
        .iter()
        .map(|p| vec![p.id.as_str().into(), p.name.as_str().into(), p.seller_code.as_str().into()])
        .collect();
    write_rows(
        sheet,
        &["NIT", "NOMBRE", "COD. VENDEDOR"],
        rows,
        &[NumberFormat::Text, NumberFormat::General, NumberFormat::Text],
    )
}

pub fn write_products(sheet: &mut Sheet, catalogs: &ReferenceCatalogs) -> usize {
    let rows = catalogs
        .products
        .iter()
        .map(|p| vec![p.id.as_str().into(), p.description.as_str().into(), p.list_price.into()])
        .collect();
    write_rows(
        sheet,
        &["CODIGO", "DESCRIPCION", "PRECIO LISTA"],
        rows,
        &[NumberFormat::Text, NumberFormat::General, NumberFormat::Number { decimals: 2 }],
    )
}

pub fn write_sellers(sheet: &mut Sheet, catalogs: &ReferenceCatalogs) -> usize {
    let rows = catalogs
        .sellers
        .iter()
        .map(|s| vec![s.code.as_str().into(), s.name.as_str().into()])
        .collect();
    write_rows(sheet, &["CODIGO", "NOMBRE"], rows, &[NumberFormat::Text, NumberFormat::General])
}

fn section_mut<'w>(workbook: &'w mut Workbook, name: &str) -> Result<&'w mut Sheet, ReportError> {
    workbook
        .sheet_by_name_mut(name)
        .ok_or_else(|| ReportError::Write(format!("workbook lacks section {name}")))
}

/// Populate every section. `lines` must already be routed; reference
/// sections are written only when catalogs are given, the lines section
/// only when the template has one.
pub fn write_report(
    workbook: &mut Workbook,
    settings: &WorkbookSettings,
    lines: &[TransactionLine],
    catalogs: Option<&ReferenceCatalogs>,
) -> Result<Vec<SectionCount>, ReportError> {
    check_sections(workbook, settings, catalogs.is_some())?;
    let mut counts = Vec::new();

    let main = main_ledger_index(workbook, settings)
        .ok_or_else(|| ReportError::Write("workbook has no main ledger".into()))?;
    let ledger = workbook
        .sheet_mut(main)
        .ok_or_else(|| ReportError::Write("workbook has no main ledger".into()))?;
    write_main_ledger(ledger, lines);
    counts.push(SectionCount { name: ledger.name.clone(), rows: lines.len() });

    for (i, section) in settings.cost_centers.iter().enumerate() {
        let routed: Vec<&TransactionLine> = lines.iter().filter(|l| l.section == Some(i)).collect();
        let sheet = section_mut(workbook, &section.sheet)?;
        write_cost_center(sheet, &section.label, &routed);
        if routed.is_empty() {
            log::info!("{}: no sales", section.label);
        }
        counts.push(SectionCount { name: sheet.name.clone(), rows: routed.len() });
    }

    let sheet = section_mut(workbook, &settings.code_section)?;
    write_code_section(sheet, lines);
    counts.push(SectionCount { name: sheet.name.clone(), rows: lines.len() });

    if let Some(sheet) = workbook.sheet_by_name_mut(&settings.lines_section) {
        let groups = write_lines_section(sheet, lines);
        counts.push(SectionCount { name: sheet.name.clone(), rows: groups });
    }

    if let Some(catalogs) = catalogs {
        type SectionWriter = fn(&mut Sheet, &ReferenceCatalogs) -> usize;
        let writers: [(&str, SectionWriter); 3] = [
            (settings.partners_section.as_str(), write_partners as SectionWriter),
            (settings.products_section.as_str(), write_products as SectionWriter),
            (settings.sellers_section.as_str(), write_sellers as SectionWriter),
        ];
        for (name, write) in writers {
            let sheet = section_mut(workbook, name)?;
            let rows = write(sheet, catalogs);
            counts.push(SectionCount { name: sheet.name.clone(), rows });
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Partner, PricedProduct, Seller, Variance};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn template() -> Workbook {
        let settings = WorkbookSettings::default();
        let mut wb = Workbook::new();
        wb.add_sheet_named("RENTABILIDAD");
        for name in settings.section_names() {
            wb.add_sheet_named(name);
        }
        wb
    }

    fn line(row: usize, seller: &str, section: usize, flagged: bool) -> TransactionLine {
        let mut l = TransactionLine::new(row, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        l.client_id = "900".into();
        l.seller_code = seller.into();
        l.product_id = format!("P{row}");
        l.description = format!("Producto {row}");
        l.cost_center = "0001".into();
        l.quantity = 2.0;
        l.net_amount = 100.0;
        l.cost_amount = Some(80.0);
        l.unit_price = Some(50.0);
        l.list_price = Some(if flagged { 60.0 } else { 50.0 });
        l.variance = Some(Variance { amount: 0.0, pct: 0.0 });
        l.flagged = flagged;
        l.section = Some(section);
        l
    }

    #[test]
    fn column_letters() {
        assert_eq!(col_letter(0), "A");
        assert_eq!(col_letter(25), "Z");
        assert_eq!(col_letter(26), "AA");
        assert_eq!(col_letter(27 * 26), "AAA");
    }

    #[test]
    fn missing_sections_fail_before_writing() {
        let mut wb = Workbook::new();
        wb.add_sheet_named("RENTABILIDAD");
        wb.add_sheet_named("CCOSTO 1");
        let settings = WorkbookSettings::default();
        let err = write_report(&mut wb, &settings, &[], None).unwrap_err();
        assert_eq!(err.kind(), "write");
        assert!(err.message().contains("CCOSTO 2"));
        assert!(err.message().contains("COD"));
        assert!(wb.sheet(0).unwrap().max_row().is_none());
    }

    #[test]
    fn reference_sections_required_only_with_catalogs() {
        let mut wb = Workbook::new();
        wb.add_sheet_named("RENTABILIDAD");
        for name in ["CCOSTO 1", "CCOSTO 2", "CCOSTO 3", "CCOSTO 4", "COD"] {
            wb.add_sheet_named(name);
        }
        let settings = WorkbookSettings::default();
        assert!(check_sections(&wb, &settings, false).is_ok());
        assert!(check_sections(&wb, &settings, true).unwrap_err().message().contains("PRECIOS"));
    }

    #[test]
    fn template_header_is_kept_and_extended() {
        let mut sheet = Sheet::new_with_name("RENTABILIDAD");
        sheet.set_value(0, 0, "INFORME DE RENTABILIDAD");
        sheet.set_value(2, 0, "NIT");
        sheet.set_value(2, 1, "Cliente");
        sheet.set_value(2, 2, "Descripción");
        sheet.set_value(2, 3, "Cantidad");
        sheet.set_value(2, 4, "Ventas");
        sheet.set_value(3, 0, "stale");

        let layout = write_main_ledger(&mut sheet, &[line(1, "24", 0, false)]);
        assert_eq!(layout.header_row, 2);
        assert_eq!(sheet.get_text(0, 0), "INFORME DE RENTABILIDAD");
        assert_eq!(sheet.get_text(3, 0), "900");
        assert_eq!(sheet.get_text(3, 4), "100");
        // appended after the template's last column, in ledger order
        assert_eq!(sheet.get_text(2, 5), "FECHA");
        assert_eq!(layout.columns.len(), LEDGER_FIELDS.len());
        assert_eq!(sheet.get_text(4, 0), TOTAL_LABEL);
        assert_eq!(sheet.get_value(4, 4), &CellValue::Formula("=SUM(E4:E4)".into()));
    }

    #[test]
    fn ledger_without_header_gets_default() {
        let mut sheet = Sheet::new_with_name("RENTABILIDAD");
        let lines = vec![line(1, "24", 0, true), line(2, "11", 1, false)];
        write_main_ledger(&mut sheet, &lines);

        assert_eq!(sheet.get_text(0, 0), "FECHA");
        assert_eq!(sheet.get_text(1, 0), "2025-01-15");
        // quantity is column H
        assert_eq!(sheet.get_value(3, 7), &CellValue::Formula("=SUM(H2:H3)".into()));
        assert!(sheet.get_format(3, 7).bold);
        // flagged row is filled across, the other is not
        assert_eq!(sheet.get_format(1, 15).fill, Some(FLAG_FILL));
        assert_eq!(sheet.get_format(1, 0).fill, Some(FLAG_FILL));
        assert_eq!(sheet.get_format(2, 0).fill, None);
        assert_eq!(sheet.get_format(1, 8).number_format, NumberFormat::Accounting);
    }

    #[test]
    fn rewriting_drops_previous_rows() {
        let mut sheet = Sheet::new_with_name("RENTABILIDAD");
        let many: Vec<_> = (1..=5).map(|i| line(i, "24", 0, false)).collect();
        write_main_ledger(&mut sheet, &many);
        write_main_ledger(&mut sheet, &many[..1]);
        assert_eq!(sheet.max_row(), Some(2));
        assert_eq!(sheet.get_text(2, 0), TOTAL_LABEL);
    }

    #[test]
    fn empty_day_writes_zero_totals() {
        let mut sheet = Sheet::new_with_name("RENTABILIDAD");
        write_main_ledger(&mut sheet, &[]);
        assert_eq!(sheet.get_text(1, 0), TOTAL_LABEL);
        assert_eq!(sheet.get_value(1, 7), &CellValue::Number(0.0));
    }

    #[test]
    fn cost_centers_and_code_section() {
        let mut wb = template();
        let settings = WorkbookSettings::default();
        let lines = vec![line(1, "24", 0, false), line(2, "11", 0, true), line(3, "24", 2, false)];
        let counts = write_report(&mut wb, &settings, &lines, None).unwrap();

        let rows: Vec<usize> = counts.iter().map(|c| c.rows).collect();
        assert_eq!(rows, vec![3, 2, 0, 1, 0, 3]);

        let cc1 = wb.sheet_by_name("CCOSTO 1").unwrap();
        assert_eq!(cc1.get_text(0, 0), "0001   MOST. PRINCIPAL");
        assert_eq!(cc1.get_text(1, 0), "FECHA");
        assert_eq!(cc1.get_text(4, 0), TOTAL_LABEL);
        assert_eq!(cc1.get_format(3, 0).fill, Some(FLAG_FILL));

        let cc2 = wb.sheet_by_name("CCOSTO 2").unwrap();
        assert_eq!(cc2.get_text(1, 0), CLOSED_NOTICE);
        assert_eq!(cc2.max_row(), Some(1));

        let cod = wb.sheet_by_name("COD").unwrap();
        assert_eq!(cod.get_text(0, 5), "% RENTA");
        assert_eq!(cod.get_text(1, 0), "11");
        assert_eq!(cod.get_text(2, 0), "24");
        assert_eq!(cod.get_text(2, 1), "Producto 1");
        assert_eq!(cod.get_text(3, 1), "Producto 3");
        assert_eq!(cod.get_value(1, 5), &CellValue::Number(0.2));
        assert_eq!(cod.get_value(1, 6), &CellValue::Number(0.25));
        assert_eq!(cod.get_value(4, 3), &CellValue::Formula("=SUM(D2:D4)".into()));

        // no catalogs, reference sections untouched
        assert!(wb.sheet_by_name("PRECIOS").unwrap().max_row().is_none());
    }

    #[test]
    fn catalogs_fill_reference_sections() {
        let mut wb = template();
        let catalogs = ReferenceCatalogs::new(
            vec![Partner { id: "900".into(), name: "Ferreteria".into(), seller_code: "24".into() }],
            vec![PricedProduct { id: "VIN-01".into(), description: "Vinilo".into(), list_price: Some(39472.25) }],
            vec![Seller { code: "24".into(), name: "CR CARLOS".into() }],
        );
        let counts = write_report(&mut wb, &WorkbookSettings::default(), &[], Some(&catalogs)).unwrap();
        assert_eq!(counts.len(), 9);

        let precios = wb.sheet_by_name("PRECIOS").unwrap();
        assert_eq!(precios.get_text(0, 2), "PRECIO LISTA");
        assert_eq!(precios.get_value(1, 2), &CellValue::Number(39472.25));
        assert_eq!(wb.sheet_by_name("VENDEDORES").unwrap().get_text(1, 1), "CR CARLOS");
        assert_eq!(wb.sheet_by_name("CLIENTES").unwrap().get_text(1, 2), "24");
    }

    fn lined(row: usize, product_line: &str, group: &str, net: f64, cost: f64) -> TransactionLine {
        let mut l = line(row, "24", 0, false);
        l.product_line = product_line.into();
        l.product_group = group.into();
        l.quantity = 1.0;
        l.net_amount = net;
        l.cost_amount = Some(cost);
        l
    }

    #[test]
    fn lines_section_groups_by_line_and_group() {
        let mut sheet = Sheet::new_with_name("LINEAS");
        let lines = vec![
            lined(1, "10 SOLVENTES", "101 THINNER", 50.0, 50.0),
            lined(2, "2 PINTURAS", "21 VINILOS", 100.0, 80.0),
            lined(3, "2 PINTURAS", "21 VINILOS", 100.0, 80.0),
            lined(4, "2 PINTURAS", "20 ESMALTES-BASE", 40.0, 0.0),
            lined(5, "", "21 VINILOS", 999.0, 1.0),
            lined(6, "TOTAL LINEA", "21 VINILOS", 999.0, 1.0),
        ];
        assert_eq!(write_lines_section(&mut sheet, &lines), 3);

        assert_eq!(sheet.get_text(0, 0), "LÍNEA  DESCRIPCIÓN");
        // line 2 before line 10, group 20 before 21
        assert_eq!(sheet.get_text(1, 1), "Total 20 ESMALTES BASE");
        assert_eq!(sheet.get_value(1, 6), &CellValue::Number(0.0));
        assert_eq!(sheet.get_text(2, 1), "Total 21 VINILOS");
        assert_eq!(sheet.get_value(2, 3), &CellValue::Number(200.0));
        assert_eq!(sheet.get_value(2, 5), &CellValue::Number(0.19999999999999996));
        assert_eq!(sheet.get_text(3, 0), "Total 2 PINTURAS");
        assert!(sheet.get_format(3, 0).bold);
        assert_eq!(sheet.get_value(3, 2), &CellValue::Number(3.0));
        assert_eq!(sheet.get_value(3, 4), &CellValue::Number(160.0));
        assert_eq!(sheet.get_text(4, 1), "Total 101 THINNER");
        assert_eq!(sheet.get_text(5, 0), "Total 10 SOLVENTES");
        assert_eq!(sheet.get_text(6, 0), TOTAL_LABEL);
        assert_eq!(sheet.get_value(6, 3), &CellValue::Number(290.0));
        assert_eq!(sheet.max_row(), Some(6));
    }

    #[test]
    fn lines_section_without_lines_says_so() {
        let mut sheet = Sheet::new_with_name("LINEAS");
        sheet.set_value(9, 0, "stale");
        assert_eq!(write_lines_section(&mut sheet, &[line(1, "24", 0, false)]), 0);
        assert_eq!(sheet.get_text(1, 0), NO_DATA_NOTICE);
        assert_eq!(sheet.max_row(), Some(1));
    }

    #[test]
    fn lines_section_is_written_when_the_template_has_one() {
        let mut wb = template();
        wb.add_sheet_named("LINEAS");
        let lines = vec![lined(1, "2 PINTURAS", "21 VINILOS", 100.0, 80.0)];
        let counts = write_report(&mut wb, &WorkbookSettings::default(), &lines, None).unwrap();
        assert_eq!(counts.last().map(|c| (c.name.as_str(), c.rows)), Some(("LINEAS", 1)));
        assert_eq!(wb.sheet_by_name("LINEAS").unwrap().get_text(2, 0), "Total 2 PINTURAS");
    }

    fn summary(seller: &str, description: &str, net: f64, margin: Option<f64>) -> SellerSummaryRow {
        SellerSummaryRow {
            seller: seller.into(),
            description: description.into(),
            quantity: Some(1.0),
            net_amount: Some(net),
            cost_amount: Some(net / 2.0),
            margin,
            markup: None,
        }
    }

    #[test]
    fn seller_sections_from_the_summary_export() {
        let mut wb = template();
        for name in ["COD24", "COD26", "COD27"] {
            wb.add_sheet_named(name);
        }
        wb.sheet_by_name_mut("COD26").unwrap().set_value(5, 5, "stale");
        let rows = vec![
            summary("0024 CR CARLOS ALBERTO TOVAR HERRER", "VINILO", 100.0, Some(0.3)),
            summary("0024 CR CARLOS ALBERTO TOVAR HERRER", "BROCHA", 50.0, None),
            summary("0024 CR CARLOS ALBERTO TOVAR HERRER", "Subtotal 0024", 150.0, Some(0.1)),
            summary("24", "ESMALTE", 70.0, Some(0.05)),
            summary("Total 0024", "", 220.0, Some(0.2)),
            summary("27", "THINNER", 10.0, Some(0.5)),
        ];
        let counts = write_seller_sections(&mut wb, &WorkbookSettings::default(), &rows);
        let by_name: Vec<(&str, usize)> = counts.iter().map(|c| (c.name.as_str(), c.rows)).collect();
        assert_eq!(by_name, vec![("COD24", 4), ("COD26", 0), ("COD27", 1)]);

        let cod24 = wb.sheet_by_name("COD24").unwrap();
        assert_eq!(cod24.get_text(0, 6), "% UTIL.");
        assert_eq!(cod24.get_text(1, 1), "ESMALTE");
        assert_eq!(cod24.get_text(2, 1), "VINILO");
        assert_eq!(cod24.get_text(3, 1), "BROCHA");
        assert_eq!(cod24.get_text(4, 1), "Subtotal 0024");
        assert_eq!(cod24.get_text(5, 1), TOTAL_LABEL);
        assert_eq!(cod24.get_value(5, 3), &CellValue::Formula("=SUM(D2:D5)".into()));
        assert_eq!(cod24.get_value(5, 5), &CellValue::Formula("=IF(D6=0,0,1-(E6/D6))".into()));
        assert_eq!(cod24.get_value(5, 6), &CellValue::Formula("=IF(E6=0,0,(D6/E6)-1)".into()));

        let cod26 = wb.sheet_by_name("COD26").unwrap();
        assert_eq!(cod26.get_text(0, 0), NO_SALES_NOTICE);
        assert_eq!(cod26.max_row(), Some(0));
    }

    #[test]
    fn grand_total_rows_are_dropped() {
        assert!(is_grand_total("TOTAL 0024"));
        assert!(is_grand_total("Total 000"));
        assert!(!is_grand_total("Total 24"));
        assert!(!is_grand_total("Subtotal 0024"));
    }

    #[test]
    fn open_and_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rentabilidad.xlsx");
        let settings = WorkbookSettings::default();

        assert_eq!(open_destination(&path, &settings, false).unwrap_err().kind(), "write");

        save(&template(), &path).unwrap();
        let mut wb = open_destination(&path, &settings, false).unwrap();
        write_report(&mut wb, &settings, &[line(1, "24", 0, false)], None).unwrap();
        save(&wb, &path).unwrap();

        let reopened = open_destination(&path, &settings, false).unwrap();
        let cc1 = reopened.sheet_by_name("CCOSTO 1").unwrap();
        assert_eq!(cc1.get_text(2, 1), "900");
    }
}
