//! HTTP client for the recipe and materials catalog feeds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use devize_shared::{
    DevizeError, MaterialCatalogEntry, OperationSelection, RecipeFetchResult, RecipeItem,
    RecipesByOperation, Result, SourceConfig,
};

use crate::progress::FetchProgress;

/// User-Agent string for feed requests.
const USER_AGENT: &str = concat!("Devize/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Everything the pricing engine needs from the remote feeds.
#[derive(Debug, Clone, Default)]
pub struct FetchedInputs {
    pub recipes: RecipesByOperation,
    pub catalog: Vec<MaterialCatalogEntry>,
}

impl FetchedInputs {
    pub fn unavailable_count(&self) -> usize {
        self.recipes.values().filter(|r| !r.is_available()).count()
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Client for the operations/materials API.
///
/// Endpoints, relative to the configured base URL:
/// - `GET operations/{operationId}/recipe-items` → `RecipeItem[]`
/// - `GET materials` → `MaterialCatalogEntry[]`
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    concurrency: usize,
}

impl ApiClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = config.parsed_base_url()?;
        if base_url.cannot_be_a_base() {
            return Err(DevizeError::config(format!(
                "base_url '{base_url}' cannot carry a path"
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DevizeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            concurrency: config.concurrency.max(1) as usize,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always accepts path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn recipe_url(&self, operation_id: &str) -> Url {
        self.endpoint(&["operations", operation_id, "recipe-items"])
    }

    /// Fetch one operation's recipe. Never fails: any error becomes
    /// [`RecipeFetchResult::Unavailable`].
    #[instrument(skip(self))]
    pub async fn fetch_recipe(&self, operation_id: &str) -> RecipeFetchResult {
        recipe_result(&self.client, self.recipe_url(operation_id)).await
    }

    /// Fetch recipes for every distinct operation id, at most `concurrency`
    /// requests in flight.
    #[instrument(
        skip_all,
        fields(operations = operation_ids.len(), concurrency = self.concurrency)
    )]
    pub async fn fetch_recipes(
        &self,
        operation_ids: &[String],
        progress: &dyn FetchProgress,
    ) -> RecipesByOperation {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(operation_ids.len());

        for operation_id in operation_ids {
            let client = self.client.clone();
            let url = self.recipe_url(operation_id);
            let sem = semaphore.clone();

            let handle = tokio::spawn(async move {
                match sem.acquire_owned().await {
                    Ok(_permit) => recipe_result(&client, url).await,
                    Err(_) => RecipeFetchResult::unavailable("fetch cancelled"),
                }
            });
            handles.push((operation_id.clone(), handle));
        }

        let total = handles.len();
        let mut recipes = RecipesByOperation::with_capacity(total);
        for (current, (operation_id, handle)) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap_or_else(|e| {
                warn!(%operation_id, error = %e, "recipe task failed");
                RecipeFetchResult::unavailable(format!("task failed: {e}"))
            });
            progress.recipe_fetched(&operation_id, result.is_available(), current + 1, total);
            recipes.insert(operation_id, result);
        }
        recipes
    }

    /// Fetch the materials catalog.
    #[instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> Result<Vec<MaterialCatalogEntry>> {
        let entries: Vec<MaterialCatalogEntry> =
            get_json(&self.client, self.endpoint(&["materials"])).await?;
        debug!(entries = entries.len(), "catalog fetched");
        Ok(entries)
    }

    /// Fetch recipes for the selected operations and the catalog
    /// concurrently.
    ///
    /// A catalog failure is logged and yields an empty catalog; the quote is
    /// still priced, just without supplier/pack enrichment.
    #[instrument(skip_all, fields(base_url = %self.base_url))]
    pub async fn fetch_inputs(
        &self,
        selections: &[OperationSelection],
        progress: &dyn FetchProgress,
    ) -> FetchedInputs {
        let operation_ids = distinct_operation_ids(selections);
        progress.phase("Fetching recipes and catalog");

        let (recipes, catalog) = tokio::join!(
            self.fetch_recipes(&operation_ids, progress),
            self.fetch_catalog(),
        );

        let catalog = catalog.unwrap_or_else(|e| {
            warn!(error = %e, "catalog unavailable, pricing without enrichment");
            Vec::new()
        });

        let inputs = FetchedInputs { recipes, catalog };
        let unavailable = inputs.unavailable_count();
        info!(
            operations = operation_ids.len(),
            unavailable,
            catalog_entries = inputs.catalog.len(),
            "inputs fetched"
        );
        progress.done(unavailable);
        inputs
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Operation ids in first-seen order, without duplicates.
pub fn distinct_operation_ids(selections: &[OperationSelection]) -> Vec<String> {
    let mut seen = HashSet::new();
    selections
        .iter()
        .filter(|s| seen.insert(s.operation_id.as_str()))
        .map(|s| s.operation_id.clone())
        .collect()
}

async fn recipe_result(client: &Client, url: Url) -> RecipeFetchResult {
    match get_json::<Vec<RecipeItem>>(client, url.clone()).await {
        Ok(items) => {
            debug!(%url, items = items.len(), "recipe fetched");
            RecipeFetchResult::Ok(items)
        }
        Err(DevizeError::NotFound { message }) => {
            debug!(%url, "no recipe published");
            RecipeFetchResult::unavailable(message)
        }
        Err(e) => {
            warn!(%url, error = %e, "recipe unavailable");
            RecipeFetchResult::unavailable(e.to_string())
        }
    }
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: Url) -> Result<T> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| DevizeError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(DevizeError::not_found(format!("{url}: HTTP {status}")));
    }
    if !status.is_success() {
        return Err(DevizeError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| DevizeError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| DevizeError::parse(format!("{url}: {e}")))
}
