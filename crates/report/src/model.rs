use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Transaction lines
// ---------------------------------------------------------------------------

/// Price deviation of one line against its list price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Variance {
    /// (list − unit) × quantity. Positive when invoiced below list.
    pub amount: f64,
    /// (list − unit) ÷ list.
    pub pct: f64,
}

/// A canonical sales line, identical in shape whichever source produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionLine {
    /// 1-based data row in the source, for tracing back.
    pub source_row: usize,
    pub date: NaiveDate,
    pub client_id: String,
    pub client_name: String,
    pub seller_code: String,
    pub product_id: String,
    pub description: String,
    /// Product line and group, when the source carries them.
    pub product_line: String,
    pub product_group: String,
    /// Cost center as it appeared in the source.
    pub cost_center: String,
    pub quantity: f64,
    /// Tax-excluded net sales.
    pub net_amount: f64,
    pub cost_amount: Option<f64>,
    /// net ÷ quantity; None when quantity ≤ 0.
    pub unit_price: Option<f64>,
    pub list_price: Option<f64>,
    pub variance: Option<Variance>,
    pub flagged: bool,
    pub observation: String,
    /// Index into the configured cost-center sections (0..4) once routed.
    pub section: Option<usize>,
}

impl TransactionLine {
    pub fn new(source_row: usize, date: NaiveDate) -> Self {
        Self {
            source_row,
            date,
            client_id: String::new(),
            client_name: String::new(),
            seller_code: String::new(),
            product_id: String::new(),
            description: String::new(),
            product_line: String::new(),
            product_group: String::new(),
            cost_center: String::new(),
            quantity: 0.0,
            net_amount: 0.0,
            cost_amount: None,
            unit_price: None,
            list_price: None,
            variance: None,
            flagged: false,
            observation: String::new(),
            section: None,
        }
    }

    /// net − cost, when the cost is known.
    pub fn gross_profit(&self) -> Option<f64> {
        self.cost_amount.map(|c| self.net_amount - c)
    }

    /// Gross profit over net sales.
    pub fn margin_pct(&self) -> Option<f64> {
        match self.gross_profit() {
            Some(p) if self.net_amount != 0.0 => Some(p / self.net_amount),
            _ => None,
        }
    }

    /// Gross profit over cost.
    pub fn markup_pct(&self) -> Option<f64> {
        match (self.gross_profit(), self.cost_amount) {
            (Some(p), Some(c)) if c != 0.0 => Some(p / c),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reference catalogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partner {
    pub id: String,
    pub name: String,
    pub seller_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedProduct {
    pub id: String,
    pub description: String,
    pub list_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seller {
    pub code: String,
    pub name: String,
}

/// Lookup key for business identifiers: trimmed, case-insensitive.
pub fn lookup_key(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Lookup key for descriptions: like [`lookup_key`], inner runs of
/// whitespace collapsed.
pub fn description_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Snapshots of the three catalogs, keyed by business identifier: active
/// rows from the database, or the workbook's reference sections on the
/// file path. Lives for one run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalogs {
    pub partners: Vec<Partner>,
    pub products: Vec<PricedProduct>,
    pub sellers: Vec<Seller>,
    partner_index: HashMap<String, usize>,
    product_index: HashMap<String, usize>,
    description_index: HashMap<String, usize>,
    seller_index: HashMap<String, usize>,
}

impl ReferenceCatalogs {
    /// Build the indexes. On duplicate keys the first row wins; blank keys
    /// are not indexed.
    pub fn new(partners: Vec<Partner>, products: Vec<PricedProduct>, sellers: Vec<Seller>) -> Self {
        fn index<T>(items: &[T], key: impl Fn(&T) -> String) -> HashMap<String, usize> {
            let mut map = HashMap::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let k = key(item);
                if !k.is_empty() {
                    map.entry(k).or_insert(i);
                }
            }
            map
        }

        Self {
            partner_index: index(&partners, |p| lookup_key(&p.id)),
            product_index: index(&products, |p| lookup_key(&p.id)),
            description_index: index(&products, |p| description_key(&p.description)),
            seller_index: index(&sellers, |s| lookup_key(&s.code)),
            partners,
            products,
            sellers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty() && self.products.is_empty() && self.sellers.is_empty()
    }

    pub fn partner(&self, id: &str) -> Option<&Partner> {
        self.partner_index.get(&lookup_key(id)).map(|&i| &self.partners[i])
    }

    pub fn product(&self, id: &str) -> Option<&PricedProduct> {
        self.product_index.get(&lookup_key(id)).map(|&i| &self.products[i])
    }

    pub fn product_by_description(&self, description: &str) -> Option<&PricedProduct> {
        self.description_index
            .get(&description_key(description))
            .map(|&i| &self.products[i])
    }

    pub fn seller(&self, code: &str) -> Option<&Seller> {
        self.seller_index.get(&lookup_key(code)).map(|&i| &self.sellers[i])
    }
}

// ---------------------------------------------------------------------------
// Per-seller export
// ---------------------------------------------------------------------------

/// One row of the per-seller summary export, as exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellerSummaryRow {
    pub seller: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub net_amount: Option<f64>,
    pub cost_amount: Option<f64>,
    /// Margin over sales as exported (`% RENTA`).
    pub margin: Option<f64>,
    /// Margin over cost as exported (`% UTIL.`).
    pub markup: Option<f64>,
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a source row was dropped as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectReason {
    BadNumber,
    MissingProduct,
    MissingCostCenter,
    UnroutableCostCenter,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadNumber => "bad_number",
            Self::MissingProduct => "missing_product",
            Self::MissingCostCenter => "missing_cost_center",
            Self::UnroutableCostCenter => "unroutable_cost_center",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-reason counts of dropped rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rejections {
    counts: BTreeMap<RejectReason, usize>,
}

impl Rejections {
    pub fn record(&mut self, reason: RejectReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &Rejections) {
        for (reason, n) in &other.counts {
            *self.counts.entry(*reason).or_insert(0) += n;
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, usize> {
        self.counts
            .iter()
            .map(|(reason, n)| (reason.as_str().to_string(), *n))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionCount {
    pub name: String,
    pub rows: usize,
}

/// What a run did, surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub engine_version: String,
    pub target_date: NaiveDate,
    /// `file` or `sql`
    pub strategy: String,
    /// Export file name or database description.
    pub artifact: String,
    /// Lines written to the main ledger.
    pub lines_imported: usize,
    pub flagged: usize,
    /// Lines without unit-level validation (quantity ≤ 0 or no list price).
    pub skipped: usize,
    /// Malformed rows dropped, by reason.
    pub rejected: BTreeMap<String, usize>,
    /// Total/subtotal rows and unrecognized transaction types.
    pub discarded: usize,
    pub sections: Vec<SectionCount>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    /// One-line human summary.
    pub fn headline(&self) -> String {
        format!(
            "{}: {} lines imported, {} flagged, {} skipped, {} rejected ({} via {})",
            self.target_date,
            self.lines_imported,
            self.flagged,
            self.skipped,
            self.rejected_total(),
            self.artifact,
            self.strategy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_is_trimmed_and_case_insensitive() {
        let catalogs = ReferenceCatalogs::new(
            vec![Partner { id: "900123".into(), name: "Ferreteria".into(), seller_code: "24".into() }],
            vec![
                PricedProduct { id: "VIN-01".into(), description: "Vinilo".into(), list_price: Some(10.0) },
                PricedProduct { id: "vin-01".into(), description: "dup".into(), list_price: Some(99.0) },
            ],
            vec![Seller { code: "0024".into(), name: "CR CARLOS".into() }],
        );
        assert_eq!(catalogs.product(" vin-01 ").map(|p| p.list_price), Some(Some(10.0)));
        assert_eq!(catalogs.partner("900123").map(|p| p.name.as_str()), Some("Ferreteria"));
        assert!(catalogs.seller("24").is_none());
        assert!(catalogs.product("missing").is_none());
    }

    #[test]
    fn products_are_also_found_by_description() {
        let catalogs = ReferenceCatalogs::new(
            vec![],
            vec![
                PricedProduct { id: String::new(), description: "VINILO  BLANCO ".into(), list_price: Some(39472.25) },
                PricedProduct { id: String::new(), description: "Brocha 2".into(), list_price: None },
            ],
            vec![],
        );
        let found = catalogs.product_by_description("vinilo blanco").unwrap();
        assert_eq!(found.list_price, Some(39472.25));
        assert!(catalogs.product("").is_none());
        assert!(catalogs.product_by_description("vinilo").is_none());
        assert!(!catalogs.is_empty());
        assert!(ReferenceCatalogs::default().is_empty());
    }

    #[test]
    fn rejection_counts() {
        let mut r = Rejections::default();
        r.record(RejectReason::BadNumber);
        r.record(RejectReason::BadNumber);
        r.record(RejectReason::MissingProduct);
        let mut other = Rejections::default();
        other.record(RejectReason::UnroutableCostCenter);
        r.merge(&other);

        assert_eq!(r.total(), 4);
        assert_eq!(r.count(RejectReason::BadNumber), 2);
        let map = r.to_map();
        assert_eq!(map.get("unroutable_cost_center"), Some(&1));
        assert!(!map.contains_key("missing_cost_center"));
    }

    #[test]
    fn margin_needs_cost_and_sales() {
        let mut line = TransactionLine::new(1, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        line.net_amount = 200.0;
        assert_eq!(line.margin_pct(), None);
        line.cost_amount = Some(150.0);
        assert_eq!(line.gross_profit(), Some(50.0));
        assert_eq!(line.margin_pct(), Some(0.25));
    }
}
