//! Merge keys for aggregate lines.
//!
//! Two recipe items from different operations land on the same quote line
//! exactly when they resolve to the same key. Precedence on the material side
//! (materials, consumables, equipment):
//!
//! 1. `ref:<referenceId>` (link to a catalog material)
//! 2. `code:<code>`
//! 3. `desc:<description>|<unit>`
//!
//! Labor merges on `labor:<description>`; hand-entered lines use
//! `manual:<id>`. Whitespace-only fields count as absent and every field is
//! trimmed before it enters a key.

use devize_shared::{LineKind, RecipeItem};

/// Resolve the merge key of a recipe item. Total: every item gets a key.
pub fn resolve_merge_key(item: &RecipeItem) -> String {
    match item.item_type.line_kind() {
        LineKind::Labor => format!("labor:{}", item.description.trim()),
        LineKind::Material => {
            if let Some(reference) = non_blank(item.reference_id.as_deref()) {
                format!("ref:{reference}")
            } else if let Some(code) = non_blank(item.code.as_deref()) {
                format!("code:{code}")
            } else {
                format!("desc:{}|{}", item.description.trim(), item.unit.trim())
            }
        }
    }
}

/// Key of a hand-entered line.
pub fn manual_key(id: &str) -> String {
    format!("manual:{}", id.trim())
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devize_shared::ItemType;

    fn item(item_type: ItemType) -> RecipeItem {
        RecipeItem {
            item_type,
            reference_id: None,
            code: None,
            description: "Cement CEM II".into(),
            unit: "kg".into(),
            quantity: 1.0,
            unit_price: Some(1.0),
            pack_quantity: None,
            pack_unit: None,
        }
    }

    #[test]
    fn reference_id_wins_over_code() {
        let it = RecipeItem {
            reference_id: Some("mat-17".into()),
            code: Some("CEM-42".into()),
            ..item(ItemType::Material)
        };
        assert_eq!(resolve_merge_key(&it), "ref:mat-17");
    }

    #[test]
    fn code_used_without_reference() {
        let it = RecipeItem {
            code: Some(" CEM-42 ".into()),
            ..item(ItemType::Material)
        };
        assert_eq!(resolve_merge_key(&it), "code:CEM-42");
    }

    #[test]
    fn description_and_unit_fallback() {
        assert_eq!(resolve_merge_key(&item(ItemType::Material)), "desc:Cement CEM II|kg");

        let per_bag = RecipeItem {
            unit: "bag".into(),
            ..item(ItemType::Material)
        };
        assert_ne!(
            resolve_merge_key(&per_bag),
            resolve_merge_key(&item(ItemType::Material))
        );
    }

    #[test]
    fn blank_fields_count_as_absent() {
        let it = RecipeItem {
            reference_id: Some("   ".into()),
            code: Some(String::new()),
            ..item(ItemType::Material)
        };
        assert_eq!(resolve_merge_key(&it), "desc:Cement CEM II|kg");
    }

    #[test]
    fn labor_merges_on_description_only() {
        let mason = RecipeItem {
            description: "Mason ".into(),
            code: Some("LAB-1".into()),
            unit: "h".into(),
            ..item(ItemType::Labor)
        };
        assert_eq!(resolve_merge_key(&mason), "labor:Mason");
    }

    #[test]
    fn consumables_and_equipment_use_material_keys() {
        let disc = RecipeItem {
            code: Some("DISC-125".into()),
            ..item(ItemType::Consumable)
        };
        assert_eq!(resolve_merge_key(&disc), "code:DISC-125");

        let mixer = item(ItemType::Equipment);
        assert!(resolve_merge_key(&mixer).starts_with("desc:"));
    }

    #[test]
    fn manual_keys() {
        assert_eq!(manual_key("transport"), "manual:transport");
    }
}
