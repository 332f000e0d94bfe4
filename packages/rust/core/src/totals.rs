//! Project totals and the indirect-cost roll-up.

use devize_shared::AggregateLine;

/// Project-level totals of one quote.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub base_total: f64,
    pub materials_total: f64,
    pub labor_total: f64,
    pub indirect_amount: f64,
    pub grand_total: f64,
}

/// Indirect costs on the combined materials + labor total.
pub fn indirect_amount(subtotal: f64, indirect_costs_percent: f64) -> f64 {
    subtotal * indirect_costs_percent / 100.0
}

/// Sum final values per side and apply the indirect percentage once, on the
/// combined total.
pub fn roll_up(
    material_lines: &[AggregateLine],
    labor_lines: &[AggregateLine],
    indirect_costs_percent: f64,
) -> Totals {
    let materials_total: f64 = material_lines.iter().map(|l| l.final_value).sum();
    let labor_total: f64 = labor_lines.iter().map(|l| l.final_value).sum();
    let base_total: f64 = material_lines
        .iter()
        .chain(labor_lines)
        .map(|l| l.total_base_value)
        .sum();
    let indirect = indirect_amount(materials_total + labor_total, indirect_costs_percent);

    Totals {
        base_total,
        materials_total,
        labor_total,
        indirect_amount: indirect,
        grand_total: materials_total + labor_total + indirect,
    }
}
