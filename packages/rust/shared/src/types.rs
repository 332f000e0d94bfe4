//! Core domain types for Devize quotes.
//!
//! Input feed shapes (recipes, catalog, selections) mirror the JSON served by
//! the back-office API, which uses camelCase field names.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DevizeError, Result};

// ---------------------------------------------------------------------------
// ProjectId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for project identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Generate a new time-sortable project identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Category of a recipe ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Material,
    Labor,
    Consumable,
    Equipment,
}

impl ItemType {
    /// Which side of the quote this item aggregates into.
    ///
    /// Consumables and equipment are bought goods and merge with materials.
    pub fn line_kind(self) -> LineKind {
        match self {
            Self::Labor => LineKind::Labor,
            Self::Material | Self::Consumable | Self::Equipment => LineKind::Material,
        }
    }
}

/// The two sides of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Material,
    Labor,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::Labor => "labor",
        }
    }
}

impl std::fmt::Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LineKind {
    type Err = DevizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "material" => Ok(Self::Material),
            "labor" => Ok(Self::Labor),
            other => Err(DevizeError::parse(format!("unknown line kind '{other}'"))),
        }
    }
}

/// Where a quote line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrigin {
    /// Exploded from operation recipes.
    Recipe,
    /// Hand-entered by the estimator.
    Manual,
}

impl LineOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recipe => "recipe",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for LineOrigin {
    type Err = DevizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recipe" => Ok(Self::Recipe),
            "manual" => Ok(Self::Manual),
            other => Err(DevizeError::parse(format!("unknown line origin '{other}'"))),
        }
    }
}

/// Selects the markup or the discount half of a line's pricing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateKind {
    Markup,
    Discount,
}

impl std::fmt::Display for RateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markup => f.write_str("markup"),
            Self::Discount => f.write_str("discount"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input feeds
// ---------------------------------------------------------------------------

/// One ingredient of an operation's bill of materials/labor.
///
/// Quantities are per one unit of the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeItem {
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_unit: Option<String>,
}

impl RecipeItem {
    /// Unit price with missing or non-finite values read as zero.
    pub fn unit_price_or_zero(&self) -> f64 {
        self.unit_price.filter(|p| p.is_finite()).unwrap_or(0.0)
    }
}

/// "This project needs `quantity` units of this operation."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSelection {
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

impl OperationSelection {
    pub fn new(operation_id: impl Into<String>, quantity: f64) -> Self {
        Self {
            operation_id: operation_id.into(),
            quantity: Some(quantity),
        }
    }

    /// The ordered quantity, if it takes part in aggregation (finite and > 0).
    pub fn effective_quantity(&self) -> Option<f64> {
        self.quantity.filter(|q| q.is_finite() && *q > 0.0)
    }
}

/// One purchase record from the materials catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialCatalogEntry {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
}

/// Outcome of fetching one operation's recipe.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeFetchResult {
    Ok(Vec<RecipeItem>),
    /// The recipe could not be obtained; the operation contributes nothing.
    Unavailable { reason: String },
}

impl RecipeFetchResult {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Recipe items, or an empty slice when unavailable.
    pub fn items(&self) -> &[RecipeItem] {
        match self {
            Self::Ok(items) => items,
            Self::Unavailable { .. } => &[],
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Recipes keyed by operation id.
pub type RecipesByOperation = HashMap<String, RecipeFetchResult>;

// ---------------------------------------------------------------------------
// StandardParameters
// ---------------------------------------------------------------------------

/// Project-wide standard percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardParameters {
    #[serde(default)]
    pub standard_markup_percent: f64,
    #[serde(default)]
    pub standard_discount_percent: f64,
    #[serde(default)]
    pub indirect_costs_percent: f64,
}

impl StandardParameters {
    pub fn new(markup: f64, discount: f64, indirect: f64) -> Self {
        Self {
            standard_markup_percent: markup,
            standard_discount_percent: discount,
            indirect_costs_percent: indirect,
        }
    }

    /// The standard value a line inherits for `rate`.
    pub fn standard_for(&self, rate: RateKind) -> f64 {
        match rate {
            RateKind::Markup => self.standard_markup_percent,
            RateKind::Discount => self.standard_discount_percent,
        }
    }

    /// All three percentages must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("standard markup", self.standard_markup_percent),
            ("standard discount", self.standard_discount_percent),
            ("indirect costs", self.indirect_costs_percent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DevizeError::validation(format!(
                    "{name} percent must be a finite number >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Quote lines
// ---------------------------------------------------------------------------

/// A hand-entered quote line priced as `quantity × unit_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualLine {
    pub id: String,
    pub kind: LineKind,
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
}

/// One merged material or labor row of a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateLine {
    /// Merge key (see `devize_core::merge_key`).
    pub key: String,
    pub kind: LineKind,
    pub origin: LineOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub description: String,
    pub unit: String,
    pub total_quantity: f64,
    /// Exact sum of per-contribution `quantity × price`.
    pub total_base_value: f64,
    pub weighted_unit_price: f64,
    pub markup_percent: f64,
    pub discount_percent: f64,
    pub markup_uses_standard: bool,
    pub discount_uses_standard: bool,
    pub value_with_markup: f64,
    pub final_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_unit: Option<String>,
    /// Operations that contributed to this line, in first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operation_ids: Vec<String>,
}

impl AggregateLine {
    /// Current percent for `rate`.
    pub fn percent(&self, rate: RateKind) -> f64 {
        match rate {
            RateKind::Markup => self.markup_percent,
            RateKind::Discount => self.discount_percent,
        }
    }

    /// Whether `rate` tracks the project standard.
    pub fn uses_standard(&self, rate: RateKind) -> bool {
        match rate {
            RateKind::Markup => self.markup_uses_standard,
            RateKind::Discount => self.discount_uses_standard,
        }
    }
}

/// The computed view model of one quote.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    pub material_lines: Vec<AggregateLine>,
    pub labor_lines: Vec<AggregateLine>,
    /// Sum of base values before markup and discount.
    pub base_total: f64,
    pub materials_total: f64,
    pub labor_total: f64,
    pub indirect_amount: f64,
    pub grand_total: f64,
    /// Selected operations whose recipe could not be fetched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_operations: Vec<String>,
}

impl QuoteSummary {
    /// All lines, materials first.
    pub fn lines(&self) -> impl Iterator<Item = &AggregateLine> {
        self.material_lines.iter().chain(self.labor_lines.iter())
    }

    pub fn find_line(&self, kind: LineKind, key: &str) -> Option<&AggregateLine> {
        self.side(kind).iter().find(|l| l.key == key)
    }

    pub fn find_line_mut(&mut self, kind: LineKind, key: &str) -> Option<&mut AggregateLine> {
        let side = match kind {
            LineKind::Material => &mut self.material_lines,
            LineKind::Labor => &mut self.labor_lines,
        };
        side.iter_mut().find(|l| l.key == key)
    }

    fn side(&self, kind: LineKind) -> &[AggregateLine] {
        match kind {
            LineKind::Material => &self.material_lines,
            LineKind::Labor => &self.labor_lines,
        }
    }
}

// ---------------------------------------------------------------------------
// QuoteRequest
// ---------------------------------------------------------------------------

/// Offline request file consumed by `devize quote --input`.
///
/// Operations listed in `selections` but absent from `recipes` are treated
/// as unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub selections: Vec<OperationSelection>,
    #[serde(default)]
    pub recipes: HashMap<String, Vec<RecipeItem>>,
    #[serde(default)]
    pub catalog: Vec<MaterialCatalogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standards: Option<StandardParameters>,
    #[serde(default)]
    pub manual_lines: Vec<ManualLine>,
}
