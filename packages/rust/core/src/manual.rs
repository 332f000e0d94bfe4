//! Hand-entered quote lines.

use devize_shared::{AggregateLine, DevizeError, LineOrigin, ManualLine, Result};

use crate::aggregate::blank_line;
use crate::merge_key::manual_key;

/// Convert a manual line into a quote line priced as `quantity × unit_price`.
///
/// Non-finite numbers read as zero. Negative values pass through.
pub fn manual_to_line(manual: &ManualLine) -> AggregateLine {
    let quantity = finite_or_zero(manual.quantity);
    let unit_price = finite_or_zero(manual.unit_price);

    let mut line = blank_line(
        manual_key(&manual.id),
        manual.kind,
        LineOrigin::Manual,
        None,
        manual.description.trim().to_string(),
        manual.unit.trim().to_string(),
    );
    line.total_quantity = quantity;
    line.total_base_value = quantity * unit_price;
    line.weighted_unit_price = if quantity > 0.0 { unit_price } else { 0.0 };
    line
}

/// Reject manual lines a user could not have meant.
pub fn validate_manual_line(manual: &ManualLine) -> Result<()> {
    if manual.id.trim().is_empty() {
        return Err(DevizeError::validation("manual line id must not be blank"));
    }
    if manual.description.trim().is_empty() {
        return Err(DevizeError::validation(format!(
            "manual line '{}' needs a description",
            manual.id
        )));
    }
    if !manual.quantity.is_finite() || !manual.unit_price.is_finite() {
        return Err(DevizeError::validation(format!(
            "manual line '{}' has a non-finite quantity or price",
            manual.id
        )));
    }
    Ok(())
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devize_shared::LineKind;

    fn transport(quantity: f64, unit_price: f64) -> ManualLine {
        ManualLine {
            id: "transport".into(),
            kind: LineKind::Material,
            description: "Site transport".into(),
            unit: "trip".into(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn priced_as_quantity_times_price() {
        let line = manual_to_line(&transport(3.0, 120.0));
        assert_eq!(line.key, "manual:transport");
        assert_eq!(line.origin, LineOrigin::Manual);
        assert_eq!(line.total_base_value, 360.0);
        assert_eq!(line.weighted_unit_price, 120.0);
        assert!(line.markup_uses_standard);
    }

    #[test]
    fn zero_quantity_has_zero_price() {
        let line = manual_to_line(&transport(0.0, 120.0));
        assert_eq!(line.weighted_unit_price, 0.0);
        assert_eq!(line.total_base_value, 0.0);
    }

    #[test]
    fn non_finite_reads_as_zero() {
        let line = manual_to_line(&transport(f64::NAN, 120.0));
        assert_eq!(line.total_base_value, 0.0);
        assert!(validate_manual_line(&transport(f64::NAN, 1.0)).is_err());
    }

    #[test]
    fn credit_lines_pass_through() {
        let line = manual_to_line(&transport(-1.0, 50.0));
        assert_eq!(line.total_base_value, -50.0);
        assert!(validate_manual_line(&transport(-1.0, 50.0)).is_ok());
    }

    #[test]
    fn blank_id_or_description_rejected() {
        let mut m = transport(1.0, 1.0);
        m.id = " ".into();
        assert!(validate_manual_line(&m).is_err());

        let mut m = transport(1.0, 1.0);
        m.description.clear();
        assert!(validate_manual_line(&m).unwrap_err().to_string().contains("description"));
    }
}
