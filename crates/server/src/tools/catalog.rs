//! catalog and favorites tool implementations.
//!
//! Both return the merged view model, sorted by the session's sort mode,
//! with presentation fields (group heading, price text, external link)
//! already rendered.

use boothmark_core::{AnnotatedItem, Error, Group, Resource, Session, SortMode, ViewModel};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters shared by the catalog and favorites tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ViewParams {
    /// Refetch from the store instead of answering from the cache.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ViewOutput {
    pub sort_mode: SortMode,
    pub item_count: usize,
    pub groups: Vec<GroupOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GroupOutput {
    /// `publisher #location`
    pub heading: String,
    pub publisher: String,
    pub location: Option<String>,
    pub items: Vec<ItemOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemOutput {
    pub id: String,
    pub title: String,
    pub availability: String,
    /// `$<amount>` or `N/A`.
    pub price: String,
    pub url: String,
    pub is_favorite: bool,
    pub is_visited: bool,
}

impl From<&AnnotatedItem> for ItemOutput {
    fn from(entry: &AnnotatedItem) -> Self {
        Self {
            id: entry.item.id.to_string(),
            title: entry.item.title.clone(),
            availability: entry.item.availability.clone(),
            price: entry.item.price.to_string(),
            url: entry.item.external_url(),
            is_favorite: entry.annotation.is_favorite,
            is_visited: entry.annotation.is_visited,
        }
    }
}

impl From<&Group> for GroupOutput {
    fn from(group: &Group) -> Self {
        Self {
            heading: group.heading(),
            publisher: group.key.clone(),
            location: group.location.clone(),
            items: group.items.iter().map(ItemOutput::from).collect(),
        }
    }
}

impl ViewOutput {
    fn new(view: &ViewModel, sort_mode: SortMode) -> Self {
        Self { sort_mode, item_count: view.item_count(), groups: view.groups.iter().map(GroupOutput::from).collect() }
    }
}

async fn view_impl(session: &Session, resource: Resource, params: ViewParams) -> Result<CallToolResult, McpError> {
    let view = match (resource, params.refresh) {
        (resource, true) => session.refresh(resource).await?,
        (Resource::AllItems, false) => session.catalog().await?,
        (Resource::FavoritesOnly, false) => session.favorites().await?,
    };

    let output = ViewOutput::new(&view, session.sort_mode());
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize view: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the catalog tool.
pub async fn catalog_impl(session: &Session, params: ViewParams) -> Result<CallToolResult, McpError> {
    view_impl(session, Resource::AllItems, params).await
}

/// Implementation of the favorites tool.
pub async fn favorites_impl(session: &Session, params: ViewParams) -> Result<CallToolResult, McpError> {
    view_impl(session, Resource::FavoritesOnly, params).await
}
