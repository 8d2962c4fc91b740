//! Net, tax and total derivation plus payment date estimation.
//!
//! Amounts are whole currency units held in integers; percentages may carry
//! decimals (e.g. 4.14) and are rounded to four decimal places before use. Every function here is pure so screens can recompute
//! them on each render and always get the same figures.
use crate::types::CalendarDate;
use chrono::Days;

/// Payment term applied when neither the provider nor an administrator set one.
pub const DEFAULT_PAYMENT_TERM_DAYS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub net_value: u64,
    pub tax_value: u64,
    pub total_with_tax: u64,
}

/// One percentage point, in the fixed-point units rates are rounded to.
const POINT: u128 = 10_000;
/// 100% in the same units.
const WHOLE: u128 = 100 * POINT;

/// Rate as an integer number of ten-thousandths of a point.
///
/// Negative and NaN rates count as zero. Everything downstream is integer
/// math in `u128`, so amounts above 2^53 keep every unit.
fn fixed_point_rate(tax_percentage: f64) -> u128 {
    (tax_percentage.max(0.0) * POINT as f64).round() as u128
}

/// `tax = round(net * pct / 100)`, `total = net + tax`.
pub fn compute_tax(net_value: u64, tax_percentage: f64) -> TaxBreakdown {
    let rate = fixed_point_rate(tax_percentage);
    let tax = u128::from(net_value)
        .saturating_mul(rate)
        .saturating_add(WHOLE / 2)
        / WHOLE;
    let tax_value = u64::try_from(tax).unwrap_or(u64::MAX);

    TaxBreakdown {
        net_value,
        tax_value,
        total_with_tax: net_value.saturating_add(tax_value),
    }
}

/// Split a tax-inclusive gross amount into its net and tax parts.
///
/// The net value is rounded to the nearest unit and the tax absorbs the
/// remainder, so `net + tax` always equals the gross amount.
pub fn decompose_gross(gross: u64, tax_percentage: f64) -> TaxBreakdown {
    let divisor = WHOLE.saturating_add(fixed_point_rate(tax_percentage));
    // round half up: (2 * gross * WHOLE + divisor) / (2 * divisor)
    let net = (u128::from(gross) * WHOLE * 2).saturating_add(divisor) / divisor.saturating_mul(2);
    let net_value = u64::try_from(net).unwrap_or(gross).min(gross);

    TaxBreakdown {
        net_value,
        tax_value: gross - net_value,
        total_with_tax: gross,
    }
}

/// Calendar-day addition, no business-day adjustment.
///
/// Returns `None` only when the result falls outside chrono's supported range.
pub fn estimate_payment_date(issue_date: CalendarDate, term_days: u32) -> Option<CalendarDate> {
    issue_date
        .to_naive()
        .checked_add_days(Days::new(u64::from(term_days)))
        .map(CalendarDate::from)
}
