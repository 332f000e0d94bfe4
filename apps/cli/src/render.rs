//! Plain-text rendering of quotes and standards.

use std::fmt::Write;

use devize_shared::{AggregateLine, QuoteSummary, StandardParameters};

pub(crate) fn money(value: f64) -> String {
    format!("{value:.2}")
}

fn percent(value: f64, tracking: bool) -> String {
    if tracking {
        format!("{value:.2}%")
    } else {
        format!("{value:.2}%*")
    }
}

fn quantity(value: f64) -> String {
    let rounded = format!("{value:.3}");
    rounded
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn side(out: &mut String, title: &str, lines: &[AggregateLine], total: f64) {
    let _ = writeln!(out, "{title}");
    if lines.is_empty() {
        let _ = writeln!(out, "  (none)");
        return;
    }
    let _ = writeln!(
        out,
        "  {:<24} {:<28} {:>10} {:<6} {:>10} {:>12} {:>9} {:>9} {:>12}  {}",
        "KEY",
        "DESCRIPTION",
        "QTY",
        "UNIT",
        "UNIT PRICE",
        "BASE",
        "MARKUP",
        "DISCOUNT",
        "FINAL",
        "SUPPLIER"
    );
    for line in lines {
        let supplier = match (&line.supplier, line.pack_quantity, &line.pack_unit) {
            (Some(s), Some(q), Some(u)) => format!("{s} ({} {u})", quantity(q)),
            (Some(s), _, _) => s.clone(),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "  {:<24} {:<28} {:>10} {:<6} {:>10} {:>12} {:>9} {:>9} {:>12}  {}",
            line.key,
            line.description,
            quantity(line.total_quantity),
            line.unit,
            money(line.weighted_unit_price),
            money(line.total_base_value),
            percent(line.markup_percent, line.markup_uses_standard),
            percent(line.discount_percent, line.discount_uses_standard),
            money(line.final_value),
            supplier,
        );
    }
    let _ = writeln!(out, "  {:>130}", format!("Total: {}", money(total)));
}

/// Full quote as a table. Pinned percents carry a `*`.
pub(crate) fn quote_table(summary: &QuoteSummary, standards: &StandardParameters) -> String {
    let mut out = String::new();
    side(&mut out, "MATERIALS", &summary.material_lines, summary.materials_total);
    out.push('\n');
    side(&mut out, "LABOR", &summary.labor_lines, summary.labor_total);
    out.push('\n');

    let _ = writeln!(out, "  Base total:        {:>14}", money(summary.base_total));
    let _ = writeln!(out, "  Materials:         {:>14}", money(summary.materials_total));
    let _ = writeln!(out, "  Labor:             {:>14}", money(summary.labor_total));
    let _ = writeln!(
        out,
        "  Indirect ({:>6}): {:>14}",
        format!("{:.2}%", standards.indirect_costs_percent),
        money(summary.indirect_amount)
    );
    let _ = writeln!(out, "  Grand total:       {:>14}", money(summary.grand_total));

    if !summary.unavailable_operations.is_empty() {
        let _ = writeln!(
            out,
            "\n  Unavailable recipes (not priced): {}",
            summary.unavailable_operations.join(", ")
        );
    }
    out
}

pub(crate) fn standards(standards: &StandardParameters) -> String {
    format!(
        "  Standard markup:   {:.2}%\n  Standard discount: {:.2}%\n  Indirect costs:    {:.2}%\n",
        standards.standard_markup_percent,
        standards.standard_discount_percent,
        standards.indirect_costs_percent,
    )
}
