//! PostgREST client for the hosted catalog store.
//!
//! ### Endpoints
//!
//! - **Catalog**: `GET rest/v1/booths`, ordered by publisher
//! - **Annotations**: `GET rest/v1/favorites` filtered by user, optionally
//!   embedding the referenced booth
//! - **Writes**: `POST`/`DELETE rest/v1/favorites`; the visited flag is an
//!   upsert on `(user_id, booth_id)`
//! - **Sign-out**: `POST auth/v1/logout`
//!
//! Every request carries the project key in the `apikey` header and a bearer
//! token (the user's access token, else the project key).

pub mod error;
pub mod rows;

pub use error::PostgrestError;
pub use rows::{BOOTH_COLUMNS, BoothRow, FavoriteBoothRow, FavoriteRow, FavoriteWrite};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use boothmark_core::{AnnotationRow, AppConfig, Item, ItemId, Remote, RemoteError, SignOut, UserId};
use reqwest::{Method, RequestBuilder, header};
use serde::de::DeserializeOwned;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_USER_AGENT: &str = "boothmark/0.1";

/// Conflict target of the visited upsert.
const FAVORITES_CONFLICT: &str = "user_id,booth_id";

#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Bearer token of the signed-in user.
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PostgrestConfig {
    /// Take connection settings from the application config.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, PostgrestError> {
        let base_url = config.require_api_url().map_err(|_| PostgrestError::MissingApiUrl)?;
        Ok(Self {
            base_url: base_url.to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })
    }

    fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.api_key.as_deref())
    }
}

/// PostgREST implementation of [`Remote`] and [`SignOut`].
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    config: PostgrestConfig,
    base: Url,
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> Result<Self, PostgrestError> {
        if config.base_url.trim().is_empty() {
            return Err(PostgrestError::MissingApiUrl);
        }

        let mut base = Url::parse(config.base_url.trim()).map_err(|e| PostgrestError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { http, config, base })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, PostgrestError> {
        Self::new(PostgrestConfig::from_app_config(config)?)
    }

    fn endpoint(&self, path: &str) -> Result<Url, PostgrestError> {
        self.base.join(path).map_err(|e| PostgrestError::InvalidUrl(e.to_string()))
    }

    fn table(&self, table: &str, query: &[(&str, String)]) -> Result<Url, PostgrestError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// `GET booths`, every column the catalog shows, by publisher.
    pub fn items_url(&self) -> Result<Url, PostgrestError> {
        self.table("booths", &[("select", BOOTH_COLUMNS.to_string()), ("order", "publisher.asc".to_string())])
    }

    pub fn annotations_url(&self, user: &UserId) -> Result<Url, PostgrestError> {
        self.table(
            "favorites",
            &[("select", "booth_id,is_visited".to_string()), ("user_id", format!("eq.{user}"))],
        )
    }

    pub fn favorited_items_url(&self, user: &UserId) -> Result<Url, PostgrestError> {
        self.table(
            "favorites",
            &[
                ("select", format!("is_visited,booths({BOOTH_COLUMNS})")),
                ("user_id", format!("eq.{user}")),
            ],
        )
    }

    pub fn upsert_url(&self) -> Result<Url, PostgrestError> {
        self.table("favorites", &[("on_conflict", FAVORITES_CONFLICT.to_string())])
    }

    pub fn insert_url(&self) -> Result<Url, PostgrestError> {
        self.table("favorites", &[])
    }

    pub fn delete_url(&self, user: &UserId, item: &ItemId) -> Result<Url, PostgrestError> {
        self.table("favorites", &[("user_id", format!("eq.{user}")), ("booth_id", format!("eq.{item}"))])
    }

    pub fn logout_url(&self) -> Result<Url, PostgrestError> {
        self.endpoint("auth/v1/logout")
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.http.request(method, url).header(header::ACCEPT, "application/json");
        if let Some(key) = &self.config.api_key {
            req = req.header("apikey", key);
        }
        if let Some(token) = self.config.bearer() {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, req: RequestBuilder) -> Result<Vec<u8>, PostgrestError> {
        let start = Instant::now();
        let response = req.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        tracing::debug!(status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "store response");

        if status.is_client_error() || status.is_server_error() {
            return Err(error::from_response(status.as_u16(), &bytes));
        }
        Ok(bytes.to_vec())
    }

    async fn get_rows<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, PostgrestError> {
        let body = self.send(self.request(Method::GET, url)).await?;
        serde_json::from_slice(&body).map_err(|e| PostgrestError::Parse(e.to_string()))
    }

    async fn write_favorite(&self, url: Url, prefer: &str, body: &FavoriteWrite<'_>) -> Result<(), PostgrestError> {
        let req = self.request(Method::POST, url).header("Prefer", prefer).json(body);
        self.send(req).await.map(|_| ())
    }
}

#[async_trait]
impl Remote for PostgrestClient {
    async fn list_items(&self) -> Result<Vec<Item>, RemoteError> {
        let rows: Vec<BoothRow> = self.get_rows(self.items_url()?).await?;
        tracing::debug!(count = rows.len(), "loaded catalog");
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn list_annotations(&self, user: &UserId) -> Result<Vec<AnnotationRow>, RemoteError> {
        let rows: Vec<FavoriteRow> = self.get_rows(self.annotations_url(user)?).await?;
        Ok(rows.into_iter().map(AnnotationRow::from).collect())
    }

    async fn list_favorited_items(&self, user: &UserId) -> Result<Vec<(Item, bool)>, RemoteError> {
        let rows: Vec<FavoriteBoothRow> = self.get_rows(self.favorited_items_url(user)?).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match row.booths {
                Some(booth) => items.push((Item::from(booth), row.is_visited.unwrap_or(false))),
                None => tracing::warn!(user_id = %user, "favorite references a missing booth, skipped"),
            }
        }
        Ok(items)
    }

    async fn upsert_annotation(&self, user: &UserId, item: &ItemId, is_visited: bool) -> Result<(), RemoteError> {
        let body = FavoriteWrite { user_id: user.as_str(), booth_id: item.as_str(), is_visited };
        self.write_favorite(self.upsert_url()?, "resolution=merge-duplicates,return=minimal", &body)
            .await?;
        Ok(())
    }

    async fn insert_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError> {
        let body = FavoriteWrite { user_id: user.as_str(), booth_id: item.as_str(), is_visited: false };
        self.write_favorite(self.insert_url()?, "return=minimal", &body).await?;
        Ok(())
    }

    async fn delete_favorite(&self, user: &UserId, item: &ItemId) -> Result<(), RemoteError> {
        let req = self.request(Method::DELETE, self.delete_url(user, item)?);
        self.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl SignOut for PostgrestClient {
    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.config.access_token.is_none() {
            tracing::debug!("no access token, skipping remote logout");
            return Ok(());
        }
        self.send(self.request(Method::POST, self.logout_url()?)).await?;
        Ok(())
    }
}
