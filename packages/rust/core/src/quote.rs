//! The quote pipeline: aggregate → enrich → standards → price → roll up.
//!
//! [`compute_quote`] is pure and deterministic: identical inputs produce
//! bit-identical summaries, so callers may re-run it on every keystroke.

use tracing::{debug, info, instrument};

use devize_shared::{
    AggregateLine, LineKind, ManualLine, MaterialCatalogEntry, OperationSelection, QuoteSummary,
    RecipesByOperation, StandardParameters,
};

use crate::aggregate::aggregate_recipes;
use crate::catalog::{CatalogIndex, enrich_lines};
use crate::manual::manual_to_line;
use crate::pricing::apply_pricing;
use crate::standards::{reseed, sync_with_standards};
use crate::totals::{Totals, roll_up};

/// Everything one pricing pass reads.
#[derive(Debug, Clone, Copy)]
pub struct QuoteInput<'a> {
    pub selections: &'a [OperationSelection],
    pub recipes: &'a RecipesByOperation,
    pub catalog: &'a [MaterialCatalogEntry],
    pub standards: &'a StandardParameters,
    /// Lines from an earlier pass or from storage; their override flags are
    /// carried over by key.
    pub previous: &'a [AggregateLine],
    pub manual_lines: &'a [ManualLine],
}

/// Run the full pipeline.
#[instrument(skip_all, fields(
    selections = input.selections.len(),
    manual = input.manual_lines.len(),
    previous = input.previous.len(),
))]
pub fn compute_quote(input: &QuoteInput<'_>) -> QuoteSummary {
    let aggregation = aggregate_recipes(input.selections, input.recipes);
    let mut material_lines = aggregation.material_lines;
    let mut labor_lines = aggregation.labor_lines;

    for manual in input.manual_lines {
        let line = manual_to_line(manual);
        match line.kind {
            LineKind::Material => material_lines.push(line),
            LineKind::Labor => labor_lines.push(line),
        }
    }

    let index = CatalogIndex::build(input.catalog);
    let enriched = enrich_lines(&mut material_lines, &index);
    debug!(enriched, catalog_codes = index.len(), "catalog enrichment done");

    reseed(&mut material_lines, input.previous, input.standards);
    reseed(&mut labor_lines, input.previous, input.standards);

    let summary = finish(
        material_lines,
        labor_lines,
        input.standards,
        aggregation.unavailable_operations,
    );

    info!(
        material_lines = summary.material_lines.len(),
        labor_lines = summary.labor_lines.len(),
        unavailable = summary.unavailable_operations.len(),
        grand_total = summary.grand_total,
        "quote computed"
    );

    summary
}

/// Re-price already aggregated lines (e.g. loaded from storage) under
/// `standards`, without re-reading recipes.
///
/// Tracking rates pick up the current standard; pinned rates are kept.
pub fn reprice(lines: Vec<AggregateLine>, standards: &StandardParameters) -> QuoteSummary {
    let (mut material_lines, mut labor_lines): (Vec<_>, Vec<_>) =
        lines.into_iter().partition(|l| l.kind == LineKind::Material);
    sync_with_standards(&mut material_lines, standards);
    sync_with_standards(&mut labor_lines, standards);
    finish(material_lines, labor_lines, standards, Vec::new())
}

fn finish(
    mut material_lines: Vec<AggregateLine>,
    mut labor_lines: Vec<AggregateLine>,
    standards: &StandardParameters,
    unavailable_operations: Vec<String>,
) -> QuoteSummary {
    for line in material_lines.iter_mut().chain(labor_lines.iter_mut()) {
        apply_pricing(line);
    }

    let Totals {
        base_total,
        materials_total,
        labor_total,
        indirect_amount,
        grand_total,
    } = roll_up(&material_lines, &labor_lines, standards.indirect_costs_percent);

    QuoteSummary {
        material_lines,
        labor_lines,
        base_total,
        materials_total,
        labor_total,
        indirect_amount,
        grand_total,
        unavailable_operations,
    }
}
