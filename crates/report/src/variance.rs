//! Variance Validator: invoiced unit price against list price.

use crate::format::observation;
use crate::model::{TransactionLine, Variance};

/// Default relative deviation allowed before a line is flagged.
pub const DEFAULT_TOLERANCE: f64 = 0.002;

/// Ratios are compared on a 1e-9 grid, so decimal prices that land exactly
/// on the tolerance are not flagged by binary rounding noise.
const RATIO_STEP: f64 = 1e9;

fn quantize(ratio: f64) -> f64 {
    (ratio * RATIO_STEP).round() / RATIO_STEP
}

/// Outcome of checking one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub unit_price: f64,
    pub variance: Variance,
    pub flagged: bool,
}

/// Pure rule over (quantity, net amount, list unit price).
///
/// Returns None when the line cannot be checked: quantity ≤ 0, no list
/// price, a non-positive list price, or non-finite inputs. Such lines are
/// neither flagged nor given a zero variance.
pub fn evaluate(quantity: f64, net_amount: f64, list_price: Option<f64>, tolerance: f64) -> Option<Verdict> {
    let list = list_price?;
    if !(quantity.is_finite() && quantity > 0.0 && net_amount.is_finite()) {
        return None;
    }
    if !(list.is_finite() && list > 0.0) {
        return None;
    }

    let unit_price = net_amount / quantity;
    let amount = (list - unit_price) * quantity;
    let pct = (list - unit_price) / list;

    Some(Verdict {
        unit_price,
        variance: Variance { amount, pct },
        flagged: quantize(pct.abs()) > quantize(tolerance),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub checked: usize,
    pub flagged: usize,
    pub skipped: usize,
}

/// Apply the rule to every line, filling variance, flag and observation.
pub fn validate_lines(lines: &mut [TransactionLine], tolerance: f64) -> ValidationStats {
    let mut stats = ValidationStats::default();

    for line in lines.iter_mut() {
        line.variance = None;
        line.flagged = false;
        line.observation.clear();

        match evaluate(line.quantity, line.net_amount, line.list_price, tolerance) {
            Some(verdict) => {
                stats.checked += 1;
                line.variance = Some(verdict.variance);
                if verdict.flagged {
                    stats.flagged += 1;
                    line.flagged = true;
                    line.observation = observation(verdict.variance.amount, verdict.variance.pct);
                    log::debug!(
                        "row {}: {} {}",
                        line.source_row,
                        line.product_id,
                        line.observation
                    );
                }
            }
            None => stats.skipped += 1,
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn line(quantity: f64, net: f64, list: Option<f64>) -> TransactionLine {
        let mut l = TransactionLine::new(1, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        l.product_id = "VIN-01".into();
        l.quantity = quantity;
        l.net_amount = net;
        l.list_price = list;
        l
    }

    #[test]
    fn worked_example() {
        let v = evaluate(26.0, 947798.32, Some(39472.25), DEFAULT_TOLERANCE).unwrap();
        assert!((v.unit_price - 36453.78).abs() < 0.01);
        assert!((v.variance.amount - 78480.18).abs() < 0.01);
        assert!((v.variance.pct * 100.0 - 7.65).abs() < 0.01);
        assert!(v.flagged);
    }

    #[test]
    fn exactly_at_tolerance_is_not_flagged() {
        let v = evaluate(1.0, 998.0, Some(1000.0), DEFAULT_TOLERANCE).unwrap();
        assert_eq!(v.variance.pct, 0.002);
        assert!(!v.flagged);

        let v = evaluate(1.0, 997.99, Some(1000.0), DEFAULT_TOLERANCE).unwrap();
        assert!(v.flagged);
    }

    #[test]
    fn decimal_prices_on_the_boundary_are_not_flagged() {
        for (quantity, net, list) in [
            (1.0, 1232.031, 1234.5),
            (1.0, 99.8, 100.0),
            (3.0, 299.4, 100.0),
            (1.0, 4980.02, 4990.0),
            (7.0, 9167.3785, 1312.25),
        ] {
            let v = evaluate(quantity, net, Some(list), DEFAULT_TOLERANCE).unwrap();
            assert!((v.variance.pct - 0.002).abs() < 1e-12, "{net}/{quantity} vs {list}: {}", v.variance.pct);
            assert!(!v.flagged, "{net}/{quantity} vs {list} sits on the tolerance");
        }
    }

    #[test]
    fn just_past_the_boundary_is_flagged() {
        assert!(evaluate(1.0, 1232.03, Some(1234.5), DEFAULT_TOLERANCE).unwrap().flagged);
        assert!(evaluate(1.0, 99.79, Some(100.0), DEFAULT_TOLERANCE).unwrap().flagged);
        assert!(evaluate(1.0, 100.21, Some(100.0), DEFAULT_TOLERANCE).unwrap().flagged);
        assert!(!evaluate(1.0, 100.2, Some(100.0), DEFAULT_TOLERANCE).unwrap().flagged);
    }

    #[test]
    fn overpricing_flags_with_negative_variance() {
        let v = evaluate(2.0, 2100.0, Some(1000.0), DEFAULT_TOLERANCE).unwrap();
        assert_eq!(v.variance.amount, -100.0);
        assert_eq!(v.variance.pct, -0.05);
        assert!(v.flagged);
    }

    #[test]
    fn unusable_lines_are_skipped() {
        assert!(evaluate(0.0, 100.0, Some(1000.0), DEFAULT_TOLERANCE).is_none());
        assert!(evaluate(-3.0, -300.0, Some(1000.0), DEFAULT_TOLERANCE).is_none());
        assert!(evaluate(3.0, 300.0, None, DEFAULT_TOLERANCE).is_none());
        assert!(evaluate(3.0, 300.0, Some(0.0), DEFAULT_TOLERANCE).is_none());
        assert!(evaluate(f64::NAN, 300.0, Some(10.0), DEFAULT_TOLERANCE).is_none());
    }

    #[test]
    fn validate_fills_lines() {
        let mut lines = vec![
            line(26.0, 947798.32, Some(39472.25)),
            line(1.0, 1000.0, Some(1000.0)),
            line(0.0, 5000.0, Some(1000.0)),
            line(4.0, 400.0, None),
        ];
        let stats = validate_lines(&mut lines, DEFAULT_TOLERANCE);
        assert_eq!(stats, ValidationStats { checked: 2, flagged: 1, skipped: 2 });

        assert!(lines[0].flagged);
        assert_eq!(lines[0].observation, "Precio total menor que la lista en $78.480,18 (+7,65%).");
        assert!(!lines[1].flagged);
        assert_eq!(lines[1].variance, Some(Variance { amount: 0.0, pct: 0.0 }));
        assert!(lines[1].observation.is_empty());
        assert_eq!(lines[2].variance, None);
        assert!(!lines[2].flagged);
        assert_eq!(lines[3].variance, None);
    }

    #[test]
    fn revalidation_clears_previous_flags() {
        let mut lines = vec![line(1.0, 500.0, Some(1000.0))];
        validate_lines(&mut lines, DEFAULT_TOLERANCE);
        assert!(lines[0].flagged);
        validate_lines(&mut lines, 0.9);
        assert!(!lines[0].flagged);
        assert!(lines[0].observation.is_empty());
    }
}
