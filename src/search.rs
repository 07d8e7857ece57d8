//! Search Index
//!
//! Thin proxy to a Meilisearch instance: paged keyword queries and document
//! ingestion.

use crate::error::ServiceError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A document handed to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub domain: String,
    /// Path of the archived file relative to the archive root
    pub path: String,
    pub content: String,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<serde_json::Value>,
    pub total_hits: u64,
    pub total_pages: u64,
    pub page: u64,
}

/// External full-text index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Query by keyword. `page` starts at 1.
    async fn query(&self, keyword: &str, page: u64) -> Result<SearchPage, ServiceError>;

    async fn add_document(&self, document: Document) -> Result<(), ServiceError>;
}

/// Meilisearch HTTP client
pub struct MeiliSearchIndex {
    client: reqwest::Client,
    host: String,
    index: String,
    api_key: Option<String>,
    page_size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeiliSearchRequest<'a> {
    q: &'a str,
    page: u64,
    hits_per_page: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeiliSearchResponse {
    #[serde(default)]
    hits: Vec<serde_json::Value>,
    #[serde(default)]
    total_hits: u64,
    #[serde(default)]
    total_pages: u64,
    #[serde(default)]
    page: u64,
}

impl MeiliSearchIndex {
    pub fn new(
        host: impl Into<String>,
        index: impl Into<String>,
        api_key: Option<String>,
        page_size: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            index: index.into(),
            api_key,
            page_size,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/indexes/{}/{}", self.host, self.index, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl SearchIndex for MeiliSearchIndex {
    async fn query(&self, keyword: &str, page: u64) -> Result<SearchPage, ServiceError> {
        let body = MeiliSearchRequest {
            q: keyword,
            page,
            hits_per_page: self.page_size,
        };

        let response: MeiliSearchResponse = self
            .authorize(self.client.post(self.endpoint("search")))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(SearchPage {
            hits: response.hits,
            total_hits: response.total_hits,
            total_pages: response.total_pages,
            page: if response.page == 0 { page } else { response.page },
        })
    }

    async fn add_document(&self, document: Document) -> Result<(), ServiceError> {
        tracing::info!(id = %document.id, domain = %document.domain, "Indexing document");

        self.authorize(self.client.post(self.endpoint("documents")))
            .json(&[document])
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
