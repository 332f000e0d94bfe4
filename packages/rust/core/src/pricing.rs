//! Line pricing: markup first, then discount on the marked-up value.
//!
//! Percents are not clamped. A negative markup lowers the value and a
//! discount above 100 produces a negative final value.

use devize_shared::AggregateLine;

/// The three derived values of a priced line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineValues {
    pub base_value: f64,
    pub value_with_markup: f64,
    pub final_value: f64,
}

/// Price a base value with the given markup and discount percents.
pub fn price(base_value: f64, markup_percent: f64, discount_percent: f64) -> LineValues {
    let value_with_markup = base_value * (1.0 + markup_percent / 100.0);
    let final_value = value_with_markup * (1.0 - discount_percent / 100.0);
    LineValues {
        base_value,
        value_with_markup,
        final_value,
    }
}

/// Average unit price, defined as 0 when nothing was ordered.
pub fn weighted_unit_price(weighted_price_sum: f64, total_quantity: f64) -> f64 {
    if total_quantity > 0.0 && weighted_price_sum.is_finite() {
        weighted_price_sum / total_quantity
    } else {
        0.0
    }
}

/// Recompute `value_with_markup` and `final_value` from the line's current
/// base value and percents.
///
/// The exact `total_base_value` is the base: it equals
/// `total_quantity × weighted_unit_price` without re-introducing rounding.
pub fn apply_pricing(line: &mut AggregateLine) -> LineValues {
    let values = price(
        line.total_base_value,
        line.markup_percent,
        line.discount_percent,
    );
    line.value_with_markup = values.value_with_markup;
    line.final_value = values.final_value;
    values
}
