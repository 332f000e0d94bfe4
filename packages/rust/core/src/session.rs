//! A stateful quote being edited.
//!
//! [`QuoteSession`] owns one quote's inputs and the last computed summary.
//! Every mutation re-runs the whole pipeline with the current lines as the
//! previous pass, so per-line overrides survive changes to the operation
//! list, the recipes and the standards.
//!
//! A pinned line whose operation drops out (removed, zero quantity, recipe
//! gone) is parked and re-applied when a line with the same key comes back.

use tracing::{debug, instrument};

use devize_shared::{
    AggregateLine, DevizeError, LineKind, ManualLine, MaterialCatalogEntry, OperationSelection,
    QuoteSummary, RateKind, RecipeFetchResult, RecipesByOperation, Result, StandardParameters,
};

use crate::manual::validate_manual_line;
use crate::quote::{QuoteInput, compute_quote};
use crate::standards;

/// Inputs a session starts from.
#[derive(Debug, Clone, Default)]
pub struct SessionInputs {
    pub standards: StandardParameters,
    pub selections: Vec<OperationSelection>,
    pub recipes: RecipesByOperation,
    pub catalog: Vec<MaterialCatalogEntry>,
    pub manual_lines: Vec<ManualLine>,
}

/// One quote under edit.
#[derive(Debug, Clone)]
pub struct QuoteSession {
    inputs: SessionInputs,
    summary: QuoteSummary,
    /// Pinned lines absent from the current summary.
    parked: Vec<AggregateLine>,
}

impl QuoteSession {
    /// Start a new quote; every line tracks the standards.
    pub fn new(inputs: SessionInputs) -> Result<Self> {
        Self::resume(inputs, &[])
    }

    /// Reopen a quote, carrying override flags over from `saved_lines`.
    pub fn resume(inputs: SessionInputs, saved_lines: &[AggregateLine]) -> Result<Self> {
        inputs.standards.validate()?;
        for (i, manual) in inputs.manual_lines.iter().enumerate() {
            validate_manual_line(manual)?;
            check_manual_id_free(&inputs.manual_lines[..i], &manual.id)?;
        }
        let summary = compute(&inputs, saved_lines);
        let parked = parked_overrides(saved_lines.to_vec(), &summary);
        Ok(Self {
            inputs,
            summary,
            parked,
        })
    }

    pub fn summary(&self) -> &QuoteSummary {
        &self.summary
    }

    pub fn into_summary(self) -> QuoteSummary {
        self.summary
    }

    pub fn standards(&self) -> &StandardParameters {
        &self.inputs.standards
    }

    pub fn selections(&self) -> &[OperationSelection] {
        &self.inputs.selections
    }

    pub fn manual_lines(&self) -> &[ManualLine] {
        &self.inputs.manual_lines
    }

    /// Change the project standards. Tracking lines follow the new values.
    #[instrument(skip_all)]
    pub fn set_standards(&mut self, standards: StandardParameters) -> Result<&QuoteSummary> {
        standards.validate()?;
        self.inputs.standards = standards;
        Ok(self.recompute())
    }

    /// Add an operation or change its quantity. Zero keeps the operation
    /// selected but excludes it from aggregation; pinned percents of lines
    /// that disappear come back with a later non-zero quantity.
    pub fn set_selection(&mut self, operation_id: &str, quantity: f64) -> Result<&QuoteSummary> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(DevizeError::validation(format!(
                "operation quantity must be a finite number >= 0, got {quantity}"
            )));
        }
        match self
            .inputs
            .selections
            .iter_mut()
            .find(|s| s.operation_id == operation_id)
        {
            Some(selection) => selection.quantity = Some(quantity),
            None => self
                .inputs
                .selections
                .push(OperationSelection::new(operation_id, quantity)),
        }
        Ok(self.recompute())
    }

    /// Drop an operation. Its pinned lines stay parked for the session.
    pub fn remove_selection(&mut self, operation_id: &str) -> &QuoteSummary {
        self.inputs
            .selections
            .retain(|s| s.operation_id != operation_id);
        self.recompute()
    }

    pub fn set_recipe(&mut self, operation_id: &str, recipe: RecipeFetchResult) -> &QuoteSummary {
        self.inputs.recipes.insert(operation_id.to_string(), recipe);
        self.recompute()
    }

    pub fn set_catalog(&mut self, catalog: Vec<MaterialCatalogEntry>) -> &QuoteSummary {
        self.inputs.catalog = catalog;
        self.recompute()
    }

    /// User typed a percent into a line.
    #[instrument(skip(self))]
    pub fn set_line_percent(
        &mut self,
        kind: LineKind,
        key: &str,
        rate: RateKind,
        value: f64,
    ) -> Result<&QuoteSummary> {
        standards::validate_percent(rate, value)?;
        let current = self.inputs.standards;
        let line = self.line_mut(kind, key)?;
        standards::set_line_percent(line, rate, value, &current);
        debug!(uses_standard = line.uses_standard(rate), "line percent set");
        Ok(self.recompute())
    }

    /// User flipped a line's "use standard" control.
    #[instrument(skip(self))]
    pub fn set_line_uses_standard(
        &mut self,
        kind: LineKind,
        key: &str,
        rate: RateKind,
        enabled: bool,
    ) -> Result<&QuoteSummary> {
        let current = self.inputs.standards;
        let line = self.line_mut(kind, key)?;
        standards::set_uses_standard(line, rate, enabled, &current);
        Ok(self.recompute())
    }

    pub fn add_manual_line(&mut self, manual: ManualLine) -> Result<&QuoteSummary> {
        validate_manual_line(&manual)?;
        check_manual_id_free(&self.inputs.manual_lines, &manual.id)?;
        self.inputs.manual_lines.push(manual);
        Ok(self.recompute())
    }

    pub fn remove_manual_line(&mut self, id: &str) -> Result<&QuoteSummary> {
        let before = self.inputs.manual_lines.len();
        self.inputs.manual_lines.retain(|m| m.id.trim() != id.trim());
        if self.inputs.manual_lines.len() == before {
            return Err(DevizeError::not_found(format!("manual line '{id}'")));
        }
        Ok(self.recompute())
    }

    fn line_mut(&mut self, kind: LineKind, key: &str) -> Result<&mut AggregateLine> {
        self.summary
            .find_line_mut(kind, key)
            .ok_or_else(|| DevizeError::not_found(format!("{kind} line '{key}'")))
    }

    fn recompute(&mut self) -> &QuoteSummary {
        let mut previous: Vec<AggregateLine> = self.summary.lines().cloned().collect();
        previous.append(&mut self.parked);
        self.summary = compute(&self.inputs, &previous);
        self.parked = parked_overrides(previous, &self.summary);
        &self.summary
    }
}

/// Manual ids are keyed trimmed, so `"x"` and `" x"` collide.
fn check_manual_id_free(existing: &[ManualLine], id: &str) -> Result<()> {
    if existing.iter().any(|m| m.id.trim() == id.trim()) {
        return Err(DevizeError::validation(format!(
            "manual line '{}' already exists",
            id.trim()
        )));
    }
    Ok(())
}

fn parked_overrides(previous: Vec<AggregateLine>, summary: &QuoteSummary) -> Vec<AggregateLine> {
    previous
        .into_iter()
        .filter(|l| !l.markup_uses_standard || !l.discount_uses_standard)
        .filter(|l| summary.find_line(l.kind, &l.key).is_none())
        .collect()
}

fn compute(inputs: &SessionInputs, previous: &[AggregateLine]) -> QuoteSummary {
    compute_quote(&QuoteInput {
        selections: &inputs.selections,
        recipes: &inputs.recipes,
        catalog: &inputs.catalog,
        standards: &inputs.standards,
        previous,
        manual_lines: &inputs.manual_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use devize_shared::{ItemType, RecipeItem};

    fn item(
        item_type: ItemType,
        code: Option<&str>,
        description: &str,
        qty: f64,
        price: f64,
    ) -> RecipeItem {
        RecipeItem {
            item_type,
            reference_id: None,
            code: code.map(String::from),
            description: description.into(),
            unit: "u".into(),
            quantity: qty,
            unit_price: Some(price),
            pack_quantity: None,
            pack_unit: None,
        }
    }

    fn session() -> QuoteSession {
        let mut recipes = RecipesByOperation::new();
        recipes.insert(
            "plaster".into(),
            RecipeFetchResult::Ok(vec![
                item(ItemType::Material, Some("GYP-30"), "Gypsum plaster", 12.0, 1.5),
                item(ItemType::Labor, None, "Plasterer", 0.4, 30.0),
            ]),
        );
        recipes.insert(
            "paint".into(),
            RecipeFetchResult::Ok(vec![item(ItemType::Labor, None, "Painter", 0.25, 25.0)]),
        );
        QuoteSession::new(SessionInputs {
            standards: StandardParameters::new(10.0, 0.0, 0.0),
            selections: vec![OperationSelection::new("plaster", 10.0)],
            recipes,
            ..SessionInputs::default()
        })
        .expect("valid session")
    }

    #[test]
    fn standard_change_updates_tracking_lines() {
        let mut s = session();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert_eq!(line.markup_percent, 10.0);

        s.set_standards(StandardParameters::new(15.0, 0.0, 0.0)).unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert_eq!(line.markup_percent, 15.0);
        assert!(line.markup_uses_standard);
    }

    #[test]
    fn edit_then_snap_back() {
        let mut s = session();
        s.set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Markup, 20.0)
            .unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert!(!line.markup_uses_standard);
        assert_eq!(line.markup_percent, 20.0);

        s.set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Markup, 10.0)
            .unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert!(line.markup_uses_standard);

        s.set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Markup, 12.0)
            .unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert!(!line.markup_uses_standard);
        assert_eq!(line.markup_percent, 12.0);
    }

    #[test]
    fn pinned_line_ignores_standard_change_and_survives_new_operations() {
        let mut s = session();
        s.set_line_percent(LineKind::Labor, "labor:Plasterer", RateKind::Markup, 30.0)
            .unwrap();
        s.set_standards(StandardParameters::new(12.0, 0.0, 0.0)).unwrap();
        s.set_selection("paint", 40.0).unwrap();

        let summary = s.summary();
        let plasterer = summary.find_line(LineKind::Labor, "labor:Plasterer").unwrap();
        assert_eq!(plasterer.markup_percent, 30.0);
        let painter = summary.find_line(LineKind::Labor, "labor:Painter").unwrap();
        assert_eq!(painter.markup_percent, 12.0);
        assert_eq!(painter.total_quantity, 10.0);
    }

    #[test]
    fn toggle_off_freezes_then_on_resyncs() {
        let mut s = session();
        s.set_line_uses_standard(LineKind::Material, "code:GYP-30", RateKind::Markup, false)
            .unwrap();
        s.set_standards(StandardParameters::new(18.0, 0.0, 0.0)).unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert_eq!(line.markup_percent, 10.0);

        s.set_line_uses_standard(LineKind::Material, "code:GYP-30", RateKind::Markup, true)
            .unwrap();
        let line = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert_eq!(line.markup_percent, 18.0);
    }

    #[test]
    fn unknown_line_is_not_found() {
        let mut s = session();
        let err = s
            .set_line_percent(LineKind::Material, "code:NOPE", RateKind::Discount, 5.0)
            .unwrap_err();
        assert!(matches!(err, DevizeError::NotFound { .. }));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let mut s = session();
        assert!(s.set_standards(StandardParameters::new(-1.0, 0.0, 0.0)).is_err());
        assert_eq!(s.standards().standard_markup_percent, 10.0);
        assert!(s.set_selection("paint", f64::NAN).is_err());
        assert!(s
            .set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Markup, f64::INFINITY)
            .is_err());
    }

    #[test]
    fn removing_an_operation_drops_its_lines() {
        let mut s = session();
        s.set_selection("paint", 10.0).unwrap();
        assert_eq!(s.summary().labor_lines.len(), 2);
        s.remove_selection("plaster");
        assert_eq!(s.summary().labor_lines.len(), 1);
        assert!(s.summary().material_lines.is_empty());
    }

    #[test]
    fn zero_quantity_keeps_selection_but_excludes_it() {
        let mut s = session();
        s.set_selection("plaster", 0.0).unwrap();
        assert_eq!(s.selections().len(), 1);
        assert!(s.summary().material_lines.is_empty());
        assert_eq!(s.summary().grand_total, 0.0);
    }

    #[test]
    fn manual_lines_follow_standards() {
        let mut s = session();
        s.add_manual_line(ManualLine {
            id: "skip".into(),
            kind: LineKind::Material,
            description: "Waste skip".into(),
            unit: "pcs".into(),
            quantity: 1.0,
            unit_price: 200.0,
        })
        .unwrap();
        let line = s.summary().find_line(LineKind::Material, "manual:skip").unwrap();
        assert!((line.final_value - 220.0).abs() < 1e-9);

        assert!(s
            .add_manual_line(ManualLine {
                id: "skip".into(),
                kind: LineKind::Labor,
                description: "dup".into(),
                unit: String::new(),
                quantity: 1.0,
                unit_price: 1.0,
            })
            .is_err());

        s.remove_manual_line("skip").unwrap();
        assert!(s.summary().find_line(LineKind::Material, "manual:skip").is_none());
        assert!(s.remove_manual_line("skip").is_err());
    }

    #[test]
    fn late_recipe_arrival_fills_unavailable_operation() {
        let mut s = session();
        s.set_selection("tiles", 5.0).unwrap();
        assert_eq!(s.summary().unavailable_operations, vec!["tiles"]);

        s.set_recipe(
            "tiles",
            RecipeFetchResult::Ok(vec![item(
                ItemType::Material,
                Some("TIL-1"),
                "Tile",
                1.1,
                8.0,
            )]),
        );
        assert!(s.summary().unavailable_operations.is_empty());
        assert!(s.summary().find_line(LineKind::Material, "code:TIL-1").is_some());
    }

    #[test]
    fn resume_reseeds_from_saved_lines() {
        let mut s = session();
        s.set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Discount, 4.0)
            .unwrap();
        let saved: Vec<AggregateLine> = s.summary().lines().cloned().collect();

        let mut recipes = RecipesByOperation::new();
        recipes.insert(
            "plaster".into(),
            RecipeFetchResult::Ok(vec![item(
                ItemType::Material,
                Some("GYP-30"),
                "Gypsum plaster",
                12.0,
                1.5,
            )]),
        );
        let resumed = QuoteSession::resume(
            SessionInputs {
                standards: StandardParameters::new(11.0, 1.0, 0.0),
                selections: vec![OperationSelection::new("plaster", 10.0)],
                recipes,
                ..SessionInputs::default()
            },
            &saved,
        )
        .unwrap();
        let line = resumed
            .summary()
            .find_line(LineKind::Material, "code:GYP-30")
            .unwrap();
        assert_eq!(line.markup_percent, 11.0);
        assert_eq!(line.discount_percent, 4.0);
        assert!(!line.discount_uses_standard);
    }

    fn skip(id: &str) -> ManualLine {
        ManualLine {
            id: id.into(),
            kind: LineKind::Material,
            description: "Waste skip".into(),
            unit: "pcs".into(),
            quantity: 1.0,
            unit_price: 200.0,
        }
    }

    #[test]
    fn manual_ids_collide_after_trimming() {
        let mut s = session();
        s.add_manual_line(skip("skip")).unwrap();
        let err = s.add_manual_line(skip(" skip ")).unwrap_err();
        assert!(matches!(err, DevizeError::Validation { .. }));
        assert_eq!(s.manual_lines().len(), 1);

        s.remove_manual_line(" skip").unwrap();
        assert!(s.manual_lines().is_empty());

        let inputs = SessionInputs {
            manual_lines: vec![skip("skip"), skip("skip ")],
            ..SessionInputs::default()
        };
        assert!(QuoteSession::new(inputs).is_err());
    }

    #[test]
    fn pinned_percent_returns_with_its_operation() {
        let mut s = session();
        s.set_line_percent(LineKind::Labor, "labor:Plasterer", RateKind::Markup, 30.0)
            .unwrap();

        s.set_selection("plaster", 0.0).unwrap();
        assert!(s.summary().find_line(LineKind::Labor, "labor:Plasterer").is_none());
        s.set_standards(StandardParameters::new(12.0, 0.0, 0.0)).unwrap();
        s.set_selection("plaster", 4.0).unwrap();
        let plasterer = s.summary().find_line(LineKind::Labor, "labor:Plasterer").unwrap();
        assert!(!plasterer.markup_uses_standard);
        assert_eq!(plasterer.markup_percent, 30.0);
        let plaster = s.summary().find_line(LineKind::Material, "code:GYP-30").unwrap();
        assert_eq!(plaster.markup_percent, 12.0);

        s.remove_selection("plaster");
        s.set_selection("plaster", 2.0).unwrap();
        let plasterer = s.summary().find_line(LineKind::Labor, "labor:Plasterer").unwrap();
        assert_eq!(plasterer.markup_percent, 30.0);
    }

    #[test]
    fn resume_parks_saved_pins_until_the_recipe_arrives() {
        let mut s = session();
        s.set_line_percent(LineKind::Material, "code:GYP-30", RateKind::Markup, 25.0)
            .unwrap();
        let saved: Vec<AggregateLine> = s.summary().lines().cloned().collect();

        let mut resumed = QuoteSession::resume(
            SessionInputs {
                standards: StandardParameters::new(10.0, 0.0, 0.0),
                selections: vec![OperationSelection::new("plaster", 10.0)],
                ..SessionInputs::default()
            },
            &saved,
        )
        .unwrap();
        assert_eq!(resumed.summary().unavailable_operations, vec!["plaster"]);

        resumed.set_recipe(
            "plaster",
            RecipeFetchResult::Ok(vec![item(
                ItemType::Material,
                Some("GYP-30"),
                "Gypsum plaster",
                12.0,
                1.5,
            )]),
        );
        let line = resumed
            .summary()
            .find_line(LineKind::Material, "code:GYP-30")
            .unwrap();
        assert_eq!(line.markup_percent, 25.0);
    }
}
