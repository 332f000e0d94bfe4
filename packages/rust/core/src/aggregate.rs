//! Recipe aggregation: explode each selected operation's recipe by the
//! ordered quantity and merge identical lines across operations.

use std::collections::HashMap;

use tracing::{debug, instrument, warn};

use devize_shared::{
    AggregateLine, LineKind, LineOrigin, OperationSelection, RecipeFetchResult, RecipeItem,
    RecipesByOperation,
};

use crate::merge_key::{non_blank, resolve_merge_key};
use crate::pricing::weighted_unit_price;

/// Output of one aggregation pass. Lines carry quantities and base values
/// only; percents and derived values are filled in by later stages.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Material side, in first-seen order.
    pub material_lines: Vec<AggregateLine>,
    /// Labor side, in first-seen order.
    pub labor_lines: Vec<AggregateLine>,
    /// Selected operations whose recipe was missing or unavailable.
    pub unavailable_operations: Vec<String>,
    /// Contributions dropped for a non-finite or non-positive quantity.
    pub skipped_contributions: usize,
}

/// Running totals for one merge key.
#[derive(Debug)]
struct Accumulator {
    key: String,
    kind: LineKind,
    code: Option<String>,
    description: String,
    unit: String,
    total_quantity: f64,
    total_base_value: f64,
    weighted_price_sum: f64,
    operation_ids: Vec<String>,
}

impl Accumulator {
    fn new(key: String, item: &RecipeItem) -> Self {
        Self {
            key,
            kind: item.item_type.line_kind(),
            code: non_blank(item.code.as_deref()).map(String::from),
            description: item.description.trim().to_string(),
            unit: item.unit.trim().to_string(),
            total_quantity: 0.0,
            total_base_value: 0.0,
            weighted_price_sum: 0.0,
            operation_ids: Vec::new(),
        }
    }

    fn add(&mut self, operation_id: &str, quantity: f64, unit_price: f64) {
        self.total_quantity += quantity;
        self.total_base_value += quantity * unit_price;
        self.weighted_price_sum += unit_price * quantity;
        if !self.operation_ids.iter().any(|id| id == operation_id) {
            self.operation_ids.push(operation_id.to_string());
        }
    }

    fn into_line(self) -> AggregateLine {
        let mut line = blank_line(
            self.key,
            self.kind,
            LineOrigin::Recipe,
            self.code,
            self.description,
            self.unit,
        );
        line.weighted_unit_price =
            weighted_unit_price(self.weighted_price_sum, self.total_quantity);
        line.total_quantity = self.total_quantity;
        line.total_base_value = self.total_base_value;
        line.operation_ids = self.operation_ids;
        line
    }
}

/// A line with zero quantities that tracks both standards.
pub(crate) fn blank_line(
    key: String,
    kind: LineKind,
    origin: LineOrigin,
    code: Option<String>,
    description: String,
    unit: String,
) -> AggregateLine {
    AggregateLine {
        key,
        kind,
        origin,
        code,
        description,
        unit,
        total_quantity: 0.0,
        total_base_value: 0.0,
        weighted_unit_price: 0.0,
        markup_percent: 0.0,
        discount_percent: 0.0,
        markup_uses_standard: true,
        discount_uses_standard: true,
        value_with_markup: 0.0,
        final_value: 0.0,
        supplier: None,
        pack_quantity: None,
        pack_unit: None,
        operation_ids: Vec::new(),
    }
}

/// Explode and merge the recipes of every selected operation.
///
/// A selection without a usable quantity is ignored. An operation whose
/// recipe is missing from `recipes` or [`RecipeFetchResult::Unavailable`]
/// contributes nothing and is reported in
/// [`Aggregation::unavailable_operations`]; the others still aggregate.
#[instrument(skip_all, fields(selections = selections.len()))]
pub fn aggregate_recipes(
    selections: &[OperationSelection],
    recipes: &RecipesByOperation,
) -> Aggregation {
    let mut accumulators: Vec<Accumulator> = Vec::new();
    let mut index: HashMap<(LineKind, String), usize> = HashMap::new();
    let mut unavailable: Vec<String> = Vec::new();
    let mut skipped = 0_usize;

    for selection in selections {
        let Some(operation_quantity) = selection.effective_quantity() else {
            debug!(
                operation_id = %selection.operation_id,
                quantity = ?selection.quantity,
                "selection without a positive quantity, skipping"
            );
            continue;
        };

        let items = match recipes.get(&selection.operation_id) {
            Some(RecipeFetchResult::Ok(items)) => items.as_slice(),
            Some(RecipeFetchResult::Unavailable { reason }) => {
                warn!(operation_id = %selection.operation_id, %reason, "recipe unavailable");
                push_unique(&mut unavailable, &selection.operation_id);
                continue;
            }
            None => {
                warn!(operation_id = %selection.operation_id, "no recipe for operation");
                push_unique(&mut unavailable, &selection.operation_id);
                continue;
            }
        };

        for item in items {
            let contributed = item.quantity * operation_quantity;
            if !contributed.is_finite() || contributed <= 0.0 {
                debug!(
                    operation_id = %selection.operation_id,
                    description = %item.description,
                    contributed,
                    "dropping contribution"
                );
                skipped += 1;
                continue;
            }

            let key = resolve_merge_key(item);
            let kind = item.item_type.line_kind();
            let slot = *index.entry((kind, key.clone())).or_insert_with(|| {
                accumulators.push(Accumulator::new(key, item));
                accumulators.len() - 1
            });
            accumulators[slot].add(
                &selection.operation_id,
                contributed,
                item.unit_price_or_zero(),
            );
        }
    }

    let mut aggregation = Aggregation {
        unavailable_operations: unavailable,
        skipped_contributions: skipped,
        ..Aggregation::default()
    };
    for acc in accumulators {
        match acc.kind {
            LineKind::Material => aggregation.material_lines.push(acc.into_line()),
            LineKind::Labor => aggregation.labor_lines.push(acc.into_line()),
        }
    }

    debug!(
        materials = aggregation.material_lines.len(),
        labor = aggregation.labor_lines.len(),
        unavailable = aggregation.unavailable_operations.len(),
        skipped = aggregation.skipped_contributions,
        "aggregation complete"
    );

    aggregation
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
