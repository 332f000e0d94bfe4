//! Standards propagation: decides, per line and per rate, whether a line
//! tracks the project standard or keeps a pinned percent.
//!
//! Invariant kept by every function here: when a line's `*_uses_standard`
//! flag is set, its percent equals the current standard.

use std::collections::HashMap;

use devize_shared::{AggregateLine, DevizeError, LineKind, RateKind, Result, StandardParameters};

/// Absolute tolerance for "the typed value equals the standard".
pub const PERCENT_EPSILON: f64 = 1e-9;

/// Numeric percent equality within [`PERCENT_EPSILON`].
pub fn same_percent(a: f64, b: f64) -> bool {
    (a - b).abs() <= PERCENT_EPSILON
}

const RATES: [RateKind; 2] = [RateKind::Markup, RateKind::Discount];

fn slot(line: &mut AggregateLine, rate: RateKind) -> (&mut f64, &mut bool) {
    match rate {
        RateKind::Markup => (&mut line.markup_percent, &mut line.markup_uses_standard),
        RateKind::Discount => (&mut line.discount_percent, &mut line.discount_uses_standard),
    }
}

/// Initial creation: a fresh line tracks both standards.
pub fn attach_to_standards(line: &mut AggregateLine, standards: &StandardParameters) {
    for rate in RATES {
        let (percent, uses_standard) = slot(line, rate);
        *uses_standard = true;
        *percent = standards.standard_for(rate);
    }
}

/// Standard value change: every tracking line picks up the new value.
/// Pinned lines are left alone.
pub fn sync_with_standards(lines: &mut [AggregateLine], standards: &StandardParameters) {
    for line in lines.iter_mut() {
        for rate in RATES {
            let (percent, uses_standard) = slot(line, rate);
            if *uses_standard {
                *percent = standards.standard_for(rate);
            }
        }
    }
}

/// Reject a typed percent that cannot be priced. Any finite value passes,
/// negative and above 100 included.
pub fn validate_percent(rate: RateKind, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DevizeError::validation(format!(
            "{rate} percent must be a finite number, got {value}"
        )))
    }
}

/// Explicit user edit of a line's percent.
///
/// Typing the current standard re-attaches the line to it; any other value
/// pins the line.
pub fn set_line_percent(
    line: &mut AggregateLine,
    rate: RateKind,
    value: f64,
    standards: &StandardParameters,
) {
    let standard = standards.standard_for(rate);
    let (percent, uses_standard) = slot(line, rate);
    if same_percent(value, standard) {
        *uses_standard = true;
        *percent = standard;
    } else {
        *uses_standard = false;
        *percent = value;
    }
}

/// Explicit toggle of the "use standard" control.
///
/// Switching on overwrites the percent with the standard; switching off
/// freezes the current percent.
pub fn set_uses_standard(
    line: &mut AggregateLine,
    rate: RateKind,
    enabled: bool,
    standards: &StandardParameters,
) {
    let standard = standards.standard_for(rate);
    let (percent, uses_standard) = slot(line, rate);
    *uses_standard = enabled;
    if enabled {
        *percent = standard;
    }
}

/// Re-seed freshly built lines from previously saved ones, matched by
/// `(kind, key)`.
///
/// Flags come from storage. A tracking rate is re-synced to the current
/// standard; the stored percent only matters for pinned rates. Lines with no
/// saved counterpart keep tracking both standards.
pub fn reseed(
    lines: &mut [AggregateLine],
    previous: &[AggregateLine],
    standards: &StandardParameters,
) {
    let saved: HashMap<(LineKind, &str), &AggregateLine> = previous
        .iter()
        .map(|l| ((l.kind, l.key.as_str()), l))
        .collect();

    for line in lines.iter_mut() {
        let Some(old) = saved.get(&(line.kind, line.key.as_str())).copied() else {
            attach_to_standards(line, standards);
            continue;
        };
        for rate in RATES {
            let stored_flag = old.uses_standard(rate);
            let stored_percent = old.percent(rate);
            let (percent, uses_standard) = slot(line, rate);
            *uses_standard = stored_flag;
            *percent = if stored_flag {
                standards.standard_for(rate)
            } else {
                stored_percent
            };
        }
    }
}
