//! Derived fields: unit price, catalog enrichment and cost-center routing.

use rentab_config::CostCenterSection;

use crate::model::{ReferenceCatalogs, RejectReason, Rejections, TransactionLine};
use crate::normalize::normalize_header;

/// net ÷ quantity, only for positive quantities.
pub fn unit_price(quantity: f64, net_amount: f64) -> Option<f64> {
    (quantity.is_finite() && quantity > 0.0 && net_amount.is_finite()).then(|| net_amount / quantity)
}

/// Leading numeric code of a cost-center text, without zero padding:
/// `"0003   MOSTRADOR"` → 3.
fn leading_code(normalized: &str) -> Option<u32> {
    normalized.split(' ').next()?.parse().ok()
}

struct RouteKey {
    normalized: String,
    compact: String,
    code: Option<u32>,
    /// Label without its leading code, for partial matches.
    name: String,
}

impl RouteKey {
    fn new(label: &str) -> Self {
        let normalized = normalize_header(label);
        let code = leading_code(&normalized);
        let name = match code {
            Some(_) => normalized.split_once(' ').map(|(_, rest)| rest.to_string()).unwrap_or_default(),
            None => normalized.clone(),
        };
        Self {
            compact: normalized.replace(' ', ""),
            normalized,
            code,
            name,
        }
    }
}

/// Maps the cost-center text of a line to one of the configured sections.
///
/// Matching is progressive: normalized text, then text without spaces, then
/// the leading code (`1`, `0001`), then an unambiguous partial name match.
pub struct CostCenterRouter {
    keys: Vec<RouteKey>,
}

impl CostCenterRouter {
    pub fn new(sections: &[CostCenterSection]) -> Self {
        Self::from_labels(sections.iter().map(|s| s.label.as_str()))
    }

    /// Router over arbitrary `"<code> <name>"` labels, e.g. seller sections.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            keys: labels.into_iter().map(RouteKey::new).collect(),
        }
    }

    pub fn route(&self, raw: &str) -> Option<usize> {
        let normalized = normalize_header(raw);
        if normalized.is_empty() {
            return None;
        }

        if let Some(i) = self.keys.iter().position(|k| k.normalized == normalized) {
            return Some(i);
        }

        let compact = normalized.replace(' ', "");
        if let Some(i) = self.keys.iter().position(|k| k.compact == compact) {
            return Some(i);
        }

        if let Some(code) = leading_code(&normalized) {
            // A code that names no section does not fall through to names
            return self.keys.iter().position(|k| k.code == Some(code));
        }

        if normalized.len() < 3 {
            return None;
        }
        let mut hits = self.keys.iter().enumerate().filter(|(_, k)| {
            !k.name.is_empty() && (k.name.contains(&normalized) || normalized.contains(&k.name))
        });
        match (hits.next(), hits.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }
}

/// Fill gaps from the catalogs: client name and seller from the partner,
/// description and list price from the product, found by id or else by
/// description. Source values win.
pub fn enrich(line: &mut TransactionLine, catalogs: &ReferenceCatalogs) {
    if !line.client_id.is_empty() {
        if let Some(partner) = catalogs.partner(&line.client_id) {
            if line.client_name.is_empty() {
                line.client_name = partner.name.clone();
            }
            if line.seller_code.is_empty() {
                line.seller_code = partner.seller_code.clone();
            }
        }
    }

    let product = catalogs
        .product(&line.product_id)
        .or_else(|| catalogs.product_by_description(&line.description));
    if let Some(product) = product {
        if line.description.is_empty() {
            line.description = product.description.clone();
        }
        if line.list_price.is_none() {
            line.list_price = product.list_price;
        }
    }
}

#[derive(Debug, Default)]
pub struct Derived {
    pub lines: Vec<TransactionLine>,
    /// Lines whose cost center matched no section.
    pub rejections: Rejections,
}

/// Compute unit prices, enrich from catalogs and route every line. Lines
/// that cannot be routed are dropped and counted.
pub fn derive_lines(
    lines: Vec<TransactionLine>,
    router: &CostCenterRouter,
    catalogs: Option<&ReferenceCatalogs>,
) -> Derived {
    let mut out = Derived::default();

    for mut line in lines {
        line.unit_price = unit_price(line.quantity, line.net_amount);
        if let Some(catalogs) = catalogs {
            enrich(&mut line, catalogs);
        }

        match router.route(&line.cost_center) {
            Some(section) => {
                line.section = Some(section);
                out.lines.push(line);
            }
            None => {
                log::debug!("row {}: cost center '{}' matches no section", line.source_row, line.cost_center);
                out.rejections.record(RejectReason::UnroutableCostCenter);
            }
        }
    }

    out
}
