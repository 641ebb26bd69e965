//! Record Normalizer: raw tables (flat export or query result) into
//! canonical lines and catalog snapshots.
//!
//! Both sources go through the same code so a value means the same thing
//! whichever path produced it.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rentab_config::LookupSettings;
use rentab_io::RawTable;

use crate::error::ReportError;
use crate::model::{
    Partner, PricedProduct, RejectReason, Rejections, Seller, SellerSummaryRow, TransactionLine,
};

// ---------------------------------------------------------------------------
// Header matching
// ---------------------------------------------------------------------------

/// Lowercase, strip accents, turn punctuation into spaces, collapse runs.
/// `"Cód. Vendedor"` → `"cod vendedor"`, `"% Renta"` → `"renta"`.
pub fn normalize_header(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let c = match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        };
        out.push(if c.is_alphanumeric() { c } else { ' ' });
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical columns, on the input side and the ledger side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Date,
    TypeCode,
    ClientId,
    ClientName,
    Seller,
    ProductId,
    Description,
    CostCenter,
    Quantity,
    NetAmount,
    CostAmount,
    ListPrice,
    UnitPrice,
    Variance,
    VariancePct,
    Margin,
    Markup,
    Observation,
    ProductLine,
    ProductGroup,
}

impl Field {
    /// Columns read from movement sources.
    pub const INPUT: [Field; 14] = [
        Field::Date,
        Field::TypeCode,
        Field::ClientId,
        Field::ClientName,
        Field::Seller,
        Field::ProductId,
        Field::Description,
        Field::CostCenter,
        Field::Quantity,
        Field::NetAmount,
        Field::CostAmount,
        Field::ListPrice,
        Field::ProductLine,
        Field::ProductGroup,
    ];

    /// Columns read from the per-seller summary export.
    pub const SELLER_SUMMARY: [Field; 8] = [
        Field::Seller,
        Field::CostCenter,
        Field::Description,
        Field::Quantity,
        Field::NetAmount,
        Field::CostAmount,
        Field::Margin,
        Field::Markup,
    ];

    /// Accepted header spellings, already normalized.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Date => &["fecha", "fecha documento", "fecha doc", "fecha factura", "fec"],
            Field::TypeCode => &[
                "tipo", "tipo documento", "tipo doc", "tipo comprobante", "comprobante",
                "tipo movimiento",
            ],
            Field::ClientId => &["nit", "nit cliente", "identificacion", "cedula", "id cliente"],
            Field::ClientName => &[
                "cliente", "nombre cliente", "razon social", "nit sucursal cliente",
                "cliente sucursal",
            ],
            Field::Seller => &[
                "cod vendedor", "codigo vendedor", "vendedor", "vendedor cod", "cod vend",
            ],
            Field::ProductId => &[
                "codigo", "codigo producto", "cod producto", "referencia", "ref", "sku",
                "id producto",
            ],
            Field::Description => &[
                "descripcion", "producto", "nombre producto", "descripcion producto", "item",
            ],
            Field::CostCenter => &[
                "centro de costo", "centro costo", "centro de costos", "ccosto", "punto de venta",
                "pto de venta", "punto", "centro", "zona",
            ],
            Field::Quantity => &["cantidad", "cant", "unidades"],
            Field::NetAmount => &[
                "ventas", "venta", "subtotal sin iva", "total sin iva", "valor venta", "base",
                "valor neto", "neto",
            ],
            Field::CostAmount => &["costos", "costo", "costo total", "costo sin iva"],
            Field::ListPrice => &[
                "precio lista", "precio de lista", "lista", "precio unitario lista", "precio",
                "valor lista",
            ],
            Field::UnitPrice => &["precio unit", "precio unitario", "valor unitario", "vr unitario"],
            Field::Variance => &["diferencia", "variacion", "valor diferencia"],
            Field::VariancePct => &["dif", "porcentaje diferencia", "variacion porcentual"],
            Field::Margin => &["renta", "rentabilidad", "margen"],
            Field::Markup => &["util", "utili", "utilidad"],
            Field::Observation => &["observacion", "observaciones", "obs"],
            Field::ProductLine => &["linea", "linea descripcion", "linea producto"],
            Field::ProductGroup => &["grupo", "grupo descripcion", "grupo producto"],
        }
    }

    /// Header text written when a template has no header of its own.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Date => "FECHA",
            Field::TypeCode => "TIPO",
            Field::ClientId => "NIT",
            Field::ClientName => "CLIENTE",
            Field::Seller => "COD. VENDEDOR",
            Field::ProductId => "CODIGO",
            Field::Description => "DESCRIPCION",
            Field::CostCenter => "CENTRO COSTO",
            Field::Quantity => "CANTIDAD",
            Field::NetAmount => "VENTAS",
            Field::CostAmount => "COSTOS",
            Field::ListPrice => "PRECIO LISTA",
            Field::UnitPrice => "PRECIO UNIT.",
            Field::Variance => "DIFERENCIA",
            Field::VariancePct => "% DIF.",
            Field::Margin => "% RENTA",
            Field::Markup => "% UTIL.",
            Field::Observation => "OBSERVACION",
            Field::ProductLine => "LINEA",
            Field::ProductGroup => "GRUPO",
        }
    }
}

/// Which column holds which field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: HashMap<Field, usize>,
}

impl ColumnMap {
    /// Match `headers` against `fields`. Exact alias matches come first; the
    /// cost center also accepts headers merely containing "centro" or
    /// "punto". Each column is claimed at most once.
    pub fn detect(headers: &[String], fields: &[Field]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut columns = HashMap::new();
        let mut claimed = vec![false; headers.len()];

        for field in fields {
            // Alias order expresses preference
            let hit = field.aliases().iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .position(|(i, h)| !claimed[i] && h == alias)
            });
            if let Some(col) = hit {
                claimed[col] = true;
                columns.insert(*field, col);
            }
        }

        if !columns.contains_key(&Field::CostCenter) && fields.contains(&Field::CostCenter) {
            let hit = normalized
                .iter()
                .enumerate()
                .position(|(i, h)| !claimed[i] && (h.contains("centro") || h.contains("punto")));
            if let Some(col) = hit {
                columns.insert(Field::CostCenter, col);
            }
        }

        Self { columns }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Parse amounts as exported: `1.234,56`, `1,234.56`, `1234.56`, `$ 1.500`,
/// `(200)`. A lone comma is the decimal mark; a repeated separator is
/// grouping. Text with letters is not a number.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');
    let negative = parenthesized || trimmed.contains('-');
    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !kept.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let commas = kept.matches(',').count();
    let dots = kept.matches('.').count();
    let canonical = match (commas, dots) {
        (0, 0) => kept,
        (_, 0) if commas > 1 => kept.replace(',', ""),
        (_, 0) => kept.replace(',', "."),
        (0, _) if dots > 1 => kept.replace('.', ""),
        (0, _) => kept,
        _ => {
            // Both present: whichever comes last is the decimal mark
            let last_comma = kept.rfind(',').unwrap_or(0);
            let last_dot = kept.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                kept.replace('.', "").replace(',', ".")
            } else {
                kept.replace(',', "")
            }
        }
    };

    let value: f64 = canonical.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Excel's day zero for serial dates (1900 system, after the leap-year bug).
fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Parse `YYYY-MM-DD` (optionally followed by a time), `DD/MM/YYYY`,
/// `YYYY/MM/DD`, `DD-MM-YYYY`, `YYYYMMDD` or a spreadsheet serial number.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(d);
        }
    }

    if date_part.len() == 8 && date_part.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(date_part, "%Y%m%d").ok();
    }

    // Serial numbers in a plausible range (1954..2119)
    let serial: f64 = trimmed.parse().ok()?;
    if (20000.0..80000.0).contains(&serial) {
        return excel_epoch()?.checked_add_signed(Duration::days(serial.trunc() as i64));
    }
    None
}

/// Case-insensitive equality that also treats `1` and `1.0` as equal.
fn values_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

pub struct NormalizeOptions<'a> {
    /// Date given to lines whose own date is missing or unreadable.
    pub target_date: NaiveDate,
    /// Recognized transaction types; empty accepts all.
    pub type_codes: &'a [String],
}

#[derive(Debug, Default)]
pub struct NormalizedLines {
    pub lines: Vec<TransactionLine>,
    pub rejections: Rejections,
    /// Total rows and unrecognized transaction types.
    pub discarded: usize,
}

fn is_total_row(row: &[String], product_cols: &[usize]) -> bool {
    let Some(first) = row.iter().map(|c| c.trim()).find(|c| !c.is_empty()) else {
        return false;
    };
    let label = normalize_header(first);
    if !(label.starts_with("total") || label.starts_with("subtotal")) {
        return false;
    }
    // "TOTAL PINTURAS SAS" as a client name still has a product
    product_cols
        .iter()
        .all(|&c| row.get(c).map_or(true, |v| v.trim().is_empty()))
}

/// Turn movement rows into canonical lines. Fails only when required columns
/// are absent; bad rows are counted in `rejections`.
pub fn normalize_movements(
    table: &RawTable,
    options: &NormalizeOptions<'_>,
) -> Result<NormalizedLines, ReportError> {
    let map = ColumnMap::detect(&table.headers, &Field::INPUT);

    let mut missing: Vec<&str> = [Field::Quantity, Field::NetAmount, Field::CostCenter]
        .iter()
        .filter(|f| !map.contains(**f))
        .map(|f| f.label())
        .collect();
    if !map.contains(Field::ProductId) && !map.contains(Field::Description) {
        missing.push("CODIGO/DESCRIPCION");
    }
    if !missing.is_empty() {
        return Err(ReportError::DataShape(format!(
            "movements lack required columns {} (headers: {})",
            missing.join(", "),
            table.headers.join(" | ")
        )));
    }

    let codes: Vec<String> = options.type_codes.iter().map(|c| c.trim().to_lowercase()).collect();
    let product_cols: Vec<usize> = [Field::ProductId, Field::Description]
        .iter()
        .filter_map(|f| map.get(*f))
        .collect();

    let mut out = NormalizedLines::default();

    for (idx, row) in table.rows.iter().enumerate() {
        let cell = |field: Field| {
            map.get(field)
                .and_then(|c| row.get(c))
                .map(|s| s.trim())
                .unwrap_or("")
        };

        if is_total_row(row, &product_cols) {
            out.discarded += 1;
            continue;
        }

        if map.contains(Field::TypeCode) && !codes.is_empty() {
            let code = cell(Field::TypeCode).to_lowercase();
            if !codes.contains(&code) {
                out.discarded += 1;
                continue;
            }
        }

        let reject = |out: &mut NormalizedLines, reason: RejectReason| {
            log::debug!("row {}: rejected ({reason})", idx + 1);
            out.rejections.record(reason);
        };

        let (Some(quantity), Some(net_amount)) =
            (parse_decimal(cell(Field::Quantity)), parse_decimal(cell(Field::NetAmount)))
        else {
            reject(&mut out, RejectReason::BadNumber);
            continue;
        };

        let optional_number = |field: Field| -> Result<Option<f64>, ()> {
            let text = cell(field);
            if text.is_empty() {
                Ok(None)
            } else {
                parse_decimal(text).map(Some).ok_or(())
            }
        };
        let (Ok(cost_amount), Ok(list_price)) =
            (optional_number(Field::CostAmount), optional_number(Field::ListPrice))
        else {
            reject(&mut out, RejectReason::BadNumber);
            continue;
        };

        let product_id = cell(Field::ProductId);
        let description = cell(Field::Description);
        if product_id.is_empty() && description.is_empty() {
            reject(&mut out, RejectReason::MissingProduct);
            continue;
        }

        let cost_center = cell(Field::CostCenter);
        if cost_center.is_empty() {
            reject(&mut out, RejectReason::MissingCostCenter);
            continue;
        }

        let date = parse_date(cell(Field::Date)).unwrap_or(options.target_date);
        let mut line = TransactionLine::new(idx + 1, date);
        line.client_id = cell(Field::ClientId).to_string();
        line.client_name = cell(Field::ClientName).to_string();
        line.seller_code = cell(Field::Seller).to_string();
        line.product_id = if product_id.is_empty() { description } else { product_id }.to_string();
        line.description = description.to_string();
        line.product_line = cell(Field::ProductLine).to_string();
        line.product_group = cell(Field::ProductGroup).to_string();
        line.cost_center = cost_center.to_string();
        line.quantity = quantity;
        line.net_amount = net_amount;
        line.cost_amount = cost_amount;
        line.list_price = list_price;
        out.lines.push(line);
    }

    log::info!(
        "normalized {} lines ({} rejected, {} discarded)",
        out.lines.len(),
        out.rejections.total(),
        out.discarded
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Per-seller summary
// ---------------------------------------------------------------------------

/// Read the per-seller summary export. The seller column falls back to the
/// cost center column, which is how some exports label it; rows without a
/// seller are skipped.
pub fn normalize_seller_summary(table: &RawTable) -> Result<Vec<SellerSummaryRow>, ReportError> {
    let map = ColumnMap::detect(&table.headers, &Field::SELLER_SUMMARY);
    let Some(seller_col) = map.get(Field::Seller).or_else(|| map.get(Field::CostCenter)) else {
        return Err(ReportError::DataShape(format!(
            "seller summary lacks a seller column (headers: {})",
            table.headers.join(" | ")
        )));
    };

    let rows: Vec<SellerSummaryRow> = table
        .rows
        .iter()
        .filter(|r| r.get(seller_col).is_some_and(|v| !v.trim().is_empty()))
        .map(|r| {
            let number = |field: Field| {
                map.get(field).and_then(|c| r.get(c)).and_then(|v| parse_decimal(v))
            };
            SellerSummaryRow {
                seller: r[seller_col].trim().to_string(),
                description: text_at(r, map.get(Field::Description)),
                quantity: number(Field::Quantity),
                net_amount: number(Field::NetAmount),
                cost_amount: number(Field::CostAmount),
                margin: number(Field::Margin),
                markup: number(Field::Markup),
            }
        })
        .collect();

    log::debug!("seller summary: {} rows", rows.len());
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

/// Rows of an active catalog snapshot, with the key column resolved.
struct ActiveRows<'t> {
    key_col: usize,
    rows: Vec<&'t [String]>,
}

fn active_rows<'t>(
    table: &'t RawTable,
    lookup: &LookupSettings,
    catalog: &str,
) -> Result<ActiveRows<'t>, ReportError> {
    let find = |name: &str| {
        let wanted = normalize_header(name);
        table.headers.iter().position(|h| normalize_header(h) == wanted)
    };

    let key_col = find(&lookup.key_column).ok_or_else(|| {
        ReportError::DataShape(format!(
            "{catalog} catalog lacks key column '{}' (headers: {})",
            lookup.key_column,
            table.headers.join(" | ")
        ))
    })?;

    let active_col = if lookup.active_column.trim().is_empty() {
        None
    } else {
        Some(find(&lookup.active_column).ok_or_else(|| {
            ReportError::DataShape(format!(
                "{catalog} catalog lacks active column '{}'",
                lookup.active_column
            ))
        })?)
    };

    let rows: Vec<&[String]> = table
        .rows
        .iter()
        .map(|r| r.as_slice())
        .filter(|r| r.get(key_col).is_some_and(|k| !k.trim().is_empty()))
        .filter(|r| match active_col {
            Some(c) => r.get(c).is_some_and(|v| values_match(v, &lookup.active_value)),
            None => true,
        })
        .collect();

    log::debug!("{catalog}: {} of {} rows active", rows.len(), table.len());
    Ok(ActiveRows { key_col, rows })
}

/// First column (other than `skip`) whose header matches one of `aliases`.
fn find_column(headers: &[String], aliases: &[&str], skip: usize) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    aliases.iter().find_map(|alias| {
        normalized
            .iter()
            .enumerate()
            .position(|(i, h)| i != skip && h == alias)
    })
}

fn text_at(row: &[String], col: Option<usize>) -> String {
    col.and_then(|c| row.get(c)).map(|s| s.trim().to_string()).unwrap_or_default()
}

pub fn normalize_partners(table: &RawTable, lookup: &LookupSettings) -> Result<Vec<Partner>, ReportError> {
    let active = active_rows(table, lookup, "partner")?;
    let mut name_aliases = vec!["nombre", "razon social"];
    name_aliases.extend_from_slice(Field::ClientName.aliases());
    let name_col = find_column(&table.headers, &name_aliases, active.key_col);
    let seller_col = find_column(&table.headers, Field::Seller.aliases(), active.key_col);

    Ok(active
        .rows
        .iter()
        .map(|r| Partner {
            id: r[active.key_col].trim().to_string(),
            name: text_at(r, name_col),
            seller_code: text_at(r, seller_col),
        })
        .collect())
}

pub fn normalize_products(table: &RawTable, lookup: &LookupSettings) -> Result<Vec<PricedProduct>, ReportError> {
    let active = active_rows(table, lookup, "product")?;
    let mut desc_aliases = vec!["nombre"];
    desc_aliases.extend_from_slice(Field::Description.aliases());
    let desc_col = find_column(&table.headers, &desc_aliases, active.key_col);
    let price_col = find_column(&table.headers, Field::ListPrice.aliases(), active.key_col);

    Ok(active
        .rows
        .iter()
        .map(|r| PricedProduct {
            id: r[active.key_col].trim().to_string(),
            description: text_at(r, desc_col),
            list_price: price_col.and_then(|c| r.get(c)).and_then(|v| parse_decimal(v)),
        })
        .collect())
}

pub fn normalize_sellers(table: &RawTable, lookup: &LookupSettings) -> Result<Vec<Seller>, ReportError> {
    let active = active_rows(table, lookup, "seller")?;
    let name_col = find_column(
        &table.headers,
        &["nombre", "nombre vendedor", "vendedor", "descripcion"],
        active.key_col,
    );

    Ok(active
        .rows
        .iter()
        .map(|r| Seller {
            code: r[active.key_col].trim().to_string(),
            name: text_at(r, name_col),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn opts(codes: &[String]) -> NormalizeOptions<'_> {
        NormalizeOptions { target_date: d(2025, 1, 15), type_codes: codes }
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("  Cód. Vendedor "), "cod vendedor");
        assert_eq!(normalize_header("% Renta"), "renta");
        assert_eq!(normalize_header("NIT - SUCURSAL - CLIENTE"), "nit sucursal cliente");
        assert_eq!(normalize_header("DESCRIPCIÓN"), "descripcion");
        assert_eq!(normalize_header("centro_de_costo"), "centro de costo");
    }

    #[test]
    fn detect_columns_by_alias() {
        let headers: Vec<String> = ["NIT", "Descripción", "Cant.", "Subtotal sin IVA", "Zona", "Precio Lista"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = ColumnMap::detect(&headers, &Field::INPUT);
        assert_eq!(map.get(Field::ClientId), Some(0));
        assert_eq!(map.get(Field::Description), Some(1));
        assert_eq!(map.get(Field::Quantity), Some(2));
        assert_eq!(map.get(Field::NetAmount), Some(3));
        assert_eq!(map.get(Field::CostCenter), Some(4));
        assert_eq!(map.get(Field::ListPrice), Some(5));
        assert_eq!(map.get(Field::ProductId), None);
    }

    #[test]
    fn cost_center_contains_fallback() {
        let headers: Vec<String> = ["Centro de operación", "Cantidad"].iter().map(|s| s.to_string()).collect();
        let map = ColumnMap::detect(&headers, &Field::INPUT);
        assert_eq!(map.get(Field::CostCenter), Some(0));
    }

    #[test]
    fn decimals_in_both_conventions() {
        assert_eq!(parse_decimal("1.234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1,234.56"), Some(1234.56));
        assert_eq!(parse_decimal("1234.56"), Some(1234.56));
        assert_eq!(parse_decimal("99,5"), Some(99.5));
        assert_eq!(parse_decimal("$ 1.234.567"), Some(1234567.0));
        assert_eq!(parse_decimal("1,234,567"), Some(1234567.0));
        assert_eq!(parse_decimal(" -26 "), Some(-26.0));
        assert_eq!(parse_decimal("(200,00)"), Some(-200.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("N/A"), None);
        assert_eq!(parse_decimal("$"), None);
    }

    #[test]
    fn dates_in_export_formats() {
        assert_eq!(parse_date("2025-01-15"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date("2025-01-15 10:30:00"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date("15/01/2025"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date("20250115"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date("45672"), Some(d(2025, 1, 15)));
        assert_eq!(parse_date("31/02/2025"), None);
        assert_eq!(parse_date("12"), None);
    }

    #[test]
    fn movements_happy_path_and_rejections() {
        let t = table(
            &["FECHA", "NIT", "CODIGO", "DESCRIPCION", "CENTRO COSTO", "CANTIDAD", "VENTAS", "PRECIO LISTA"],
            &[
                &["2025-01-15", "900", "VIN-01", "Vinilo", "0001", "26", "947.798,32", "39.472,25"],
                &["", "901", "BRO-02", "Brocha", "0002", "2", "10.000", ""],
                &["", "902", "X", "X", "0002", "dos", "10", ""],
                &["", "903", "", "", "0001", "1", "10", ""],
                &["", "904", "Y", "Y", "", "1", "10", ""],
                &["TOTAL", "", "", "", "", "29", "957.808,32", ""],
            ],
        );
        let out = normalize_movements(&t, &opts(&[])).unwrap();

        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.discarded, 1);
        assert_eq!(out.rejections.count(RejectReason::BadNumber), 1);
        assert_eq!(out.rejections.count(RejectReason::MissingProduct), 1);
        assert_eq!(out.rejections.count(RejectReason::MissingCostCenter), 1);

        let first = &out.lines[0];
        assert_eq!(first.source_row, 1);
        assert_eq!(first.product_id, "VIN-01");
        assert_eq!(first.quantity, 26.0);
        assert_eq!(first.net_amount, 947798.32);
        assert_eq!(first.list_price, Some(39472.25));

        // missing date falls back to the target day; 10.000 is read as 10
        let second = &out.lines[1];
        assert_eq!(second.date, d(2025, 1, 15));
        assert_eq!(second.net_amount, 10.0);
        assert_eq!(second.list_price, None);
    }

    #[test]
    fn product_line_and_group_are_carried() {
        let t = table(
            &["CODIGO", "ZONA", "CANT", "VENTAS", "LÍNEA DESCRIPCIÓN", "GRUPO DESCRIPCIÓN"],
            &[&["VIN-01", "0001", "1", "5", "01 PINTURAS", "011 VINILOS"]],
        );
        let out = normalize_movements(&t, &opts(&[])).unwrap();
        assert_eq!(out.lines[0].product_line, "01 PINTURAS");
        assert_eq!(out.lines[0].product_group, "011 VINILOS");
    }

    #[test]
    fn seller_summary_rows() {
        let t = table(
            &["Cód. Vendedor", "Descripción", "Cantidad", "Ventas", "Costos", "% Renta", "% Util."],
            &[
                &["0024 CR CARLOS", "VINILO", "2", "100000", "80000", "0,2", "0,25"],
                &["", "", "", "", "", "", ""],
                &["Total 0024", "", "2", "100000", "80000", "", ""],
            ],
        );
        let rows = normalize_seller_summary(&t).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].seller, "0024 CR CARLOS");
        assert_eq!(rows[0].net_amount, Some(100000.0));
        assert_eq!(rows[0].margin, Some(0.2));
        assert_eq!(rows[0].markup, Some(0.25));
        assert_eq!(rows[1].margin, None);

        let by_center = table(&["Centro de costo", "Ventas"], &[&["0025", "7"]]);
        assert_eq!(normalize_seller_summary(&by_center).unwrap()[0].seller, "0025");

        let none = table(&["Descripción", "Ventas"], &[]);
        assert_eq!(normalize_seller_summary(&none).unwrap_err().kind(), "data_shape");
    }

    #[test]
    fn description_stands_in_for_missing_product_id() {
        let t = table(&["PRODUCTO", "ZONA", "CANT", "VENTAS"], &[&["Vinilo blanco", "0001", "1", "5"]]);
        let out = normalize_movements(&t, &opts(&[])).unwrap();
        assert_eq!(out.lines[0].product_id, "Vinilo blanco");
        assert_eq!(out.lines[0].description, "Vinilo blanco");
    }

    #[test]
    fn client_named_total_is_kept() {
        let t = table(
            &["CLIENTE", "CODIGO", "ZONA", "CANTIDAD", "VENTAS"],
            &[&["TOTAL PINTURAS SAS", "VIN-01", "0001", "1", "5"]],
        );
        let out = normalize_movements(&t, &opts(&[])).unwrap();
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.discarded, 0);
    }

    #[test]
    fn type_filter_discards_silently() {
        let t = table(
            &["TIPO", "CODIGO", "ZONA", "CANTIDAD", "VENTAS"],
            &[
                &["F", "A", "0001", "1", "5"],
                &["nc", "B", "0001", "1", "5"],
                &["fv", "C", "0001", "1", "5"],
            ],
        );
        let codes = vec!["F".to_string(), "FV".to_string()];
        let out = normalize_movements(&t, &opts(&codes)).unwrap();
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.discarded, 1);
        assert_eq!(out.rejections.total(), 0);
    }

    #[test]
    fn missing_required_columns_is_data_shape() {
        let t = table(&["NIT", "CLIENTE", "VENTAS"], &[]);
        let err = normalize_movements(&t, &opts(&[])).unwrap_err();
        assert_eq!(err.kind(), "data_shape");
        assert!(err.message().contains("CANTIDAD"));
        assert!(err.message().contains("CODIGO/DESCRIPCION"));
    }

    fn lookup(key: &str) -> LookupSettings {
        LookupSettings {
            table: "t".into(),
            key_column: key.into(),
            active_column: "activo".into(),
            active_value: "1".into(),
            query: None,
        }
    }

    #[test]
    fn catalogs_filter_inactive_rows() {
        let t = table(
            &["codigo", "descripcion", "precio", "activo"],
            &[
                &["VIN-01", "Vinilo", "39.472,25", "1"],
                &["VIN-02", "Vinilo viejo", "1.000", "0"],
                &["VIN-03", "Sin precio", "", "1.0"],
                &["", "Sin codigo", "5", "1"],
            ],
        );
        let products = normalize_products(&t, &lookup("codigo")).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].list_price, Some(39472.25));
        assert_eq!(products[1].id, "VIN-03");
        assert_eq!(products[1].list_price, None);
    }

    #[test]
    fn partners_and_sellers() {
        let partners = table(
            &["nit", "razon_social", "cod_vendedor", "activo"],
            &[&["900", "Ferreteria Uno", "0024", "1"]],
        );
        let p = normalize_partners(&partners, &lookup("NIT")).unwrap();
        assert_eq!(p[0].name, "Ferreteria Uno");
        assert_eq!(p[0].seller_code, "0024");

        let sellers = table(&["codigo", "nombre", "activo"], &[&["0024", "CR CARLOS", "1"]]);
        let s = normalize_sellers(&sellers, &lookup("codigo")).unwrap();
        assert_eq!(s[0].name, "CR CARLOS");
    }

    #[test]
    fn catalog_without_key_or_active_column_is_data_shape() {
        let t = table(&["codigo", "nombre"], &[&["1", "x"]]);
        assert_eq!(normalize_sellers(&t, &lookup("id")).unwrap_err().kind(), "data_shape");
        assert_eq!(normalize_sellers(&t, &lookup("codigo")).unwrap_err().kind(), "data_shape");

        let mut no_filter = lookup("codigo");
        no_filter.active_column.clear();
        assert_eq!(normalize_sellers(&t, &no_filter).unwrap().len(), 1);
    }
}
