//! Pricing engine for Devize quotes.
//!
//! Turns selected operations and their recipes into consolidated material
//! and labor lines, enriches them from the material catalog, applies the
//! project standards and rolls everything up into a [`QuoteSummary`].
//!
//! [`QuoteSummary`]: devize_shared::QuoteSummary

pub mod aggregate;
pub mod catalog;
pub mod manual;
pub mod merge_key;
pub mod pricing;
pub mod quote;
pub mod session;
pub mod standards;
pub mod totals;

pub use aggregate::{Aggregation, aggregate_recipes};
pub use catalog::{CatalogIndex, enrich_lines};
pub use merge_key::resolve_merge_key;
pub use pricing::{LineValues, apply_pricing, price};
pub use quote::{QuoteInput, compute_quote, reprice};
pub use session::{QuoteSession, SessionInputs};
pub use totals::{Totals, roll_up};
