//! Input adapters for the Devize pricing engine.
//!
//! Recipes and the materials catalog come either from the operations API
//! ([`ApiClient`]) or from an offline request file ([`load_request`]).

mod client;
mod file;
mod progress;

pub use client::{ApiClient, FetchedInputs, distinct_operation_ids};
pub use file::{load_request, recipes_from_request};
pub use progress::{FetchProgress, SilentProgress};
