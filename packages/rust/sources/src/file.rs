//! Offline request files (`devize quote --input request.json`).

use std::path::Path;

use tracing::{debug, instrument};

use devize_shared::{DevizeError, QuoteRequest, RecipeFetchResult, RecipesByOperation, Result};

/// Read and parse a request file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_request(path: &Path) -> Result<QuoteRequest> {
    let content = std::fs::read_to_string(path).map_err(|e| DevizeError::io(path, e))?;
    let request: QuoteRequest = serde_json::from_str(&content)
        .map_err(|e| DevizeError::parse(format!("{}: {e}", path.display())))?;
    debug!(
        selections = request.selections.len(),
        recipes = request.recipes.len(),
        catalog = request.catalog.len(),
        "request file loaded"
    );
    Ok(request)
}

/// Recipes carried by the request. Selected operations without an entry are
/// unavailable.
pub fn recipes_from_request(request: &QuoteRequest) -> RecipesByOperation {
    let mut recipes: RecipesByOperation = request
        .recipes
        .iter()
        .map(|(operation_id, items)| (operation_id.clone(), RecipeFetchResult::Ok(items.clone())))
        .collect();
    for selection in &request.selections {
        recipes
            .entry(selection.operation_id.clone())
            .or_insert_with(|| RecipeFetchResult::unavailable("no recipe in request file"));
    }
    recipes
}
