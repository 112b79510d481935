pub mod auth;
pub mod intune;
pub mod models;

use crate::config::ConfigManager;
use crate::error::{IntuneError, Result};
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

pub use models::PaginatedResponse;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const GRAPH_API_BETA: &str = "https://graph.microsoft.com/beta";

/// Default retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30000;
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Calculate backoff with jitter for exponential backoff
fn calculate_backoff_with_jitter(attempt: u32) -> Duration {
    let base_backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let capped_backoff = base_backoff.min(MAX_BACKOFF_MS);

    let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
    let jitter = if jitter_range > 0 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
    } else {
        0
    };

    let final_backoff = (capped_backoff as i64 + jitter).max(100) as u64;
    Duration::from_millis(final_backoff)
}

/// Which Graph surface a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    Beta,
}

/// Graph API client with retry support
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    beta_url: String,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_urls(access_token, GRAPH_API_BASE, GRAPH_API_BETA)
    }

    /// Point the client at alternative roots (national clouds, mock servers)
    pub fn with_base_urls(access_token: String, base_url: &str, beta_url: &str) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            beta_url: beta_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a GraphClient from ConfigManager and tenant name
    /// This will load a cached token for the specified tenant
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let graph_auth = auth::GraphAuth::new(config.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;

        Ok(Self::new(access_token))
    }

    fn url_for(&self, endpoint: &str, version: ApiVersion) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            return endpoint.to_string();
        }
        let base = match version {
            ApiVersion::V1 => &self.base_url,
            ApiVersion::Beta => &self.beta_url,
        };
        format!("{}/{}", base, endpoint.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url_for(endpoint, ApiVersion::V1);
        self.request(Method::GET, &url, None::<&Value>).await
    }

    pub async fn get_beta<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url_for(endpoint, ApiVersion::Beta);
        self.request(Method::GET, &url, None::<&Value>).await
    }

    pub async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url_for(endpoint, ApiVersion::V1);
        self.request(Method::POST, &url, Some(body)).await
    }

    pub async fn post_beta<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url_for(endpoint, ApiVersion::Beta);
        self.request(Method::POST, &url, Some(body)).await
    }

    pub async fn patch<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url_for(endpoint, ApiVersion::V1);
        self.request(Method::PATCH, &url, Some(body)).await
    }

    pub async fn patch_beta<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url_for(endpoint, ApiVersion::Beta);
        self.request(Method::PATCH, &url, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        let url = self.url_for(endpoint, ApiVersion::V1);
        let _: Value = self.request(Method::DELETE, &url, None::<&Value>).await?;
        Ok(())
    }

    pub async fn delete_beta(&self, endpoint: &str) -> Result<()> {
        let url = self.url_for(endpoint, ApiVersion::Beta);
        let _: Value = self.request(Method::DELETE, &url, None::<&Value>).await?;
        Ok(())
    }

    /// Send a request, retrying on 429, 5xx and connection errors.
    ///
    /// Empty success bodies (204 No Content) deserialize from JSON `null`,
    /// so callers that don't care about the body should ask for `Value`.
    async fn request<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<R> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            let mut builder = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.access_token);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES - 1
                    {
                        let retry_after = resp
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(INITIAL_BACKOFF_MS / 1000);

                        tracing::warn!(
                            "Rate limited (429) on {} {}. Retrying in {}s (attempt {}/{})",
                            method,
                            url,
                            retry_after,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                        continue;
                    }

                    if status.is_server_error() && attempt < MAX_RETRIES - 1 {
                        let wait_time = calculate_backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Server error ({}) on {} {}. Retrying in {:?} (attempt {}/{})",
                            status,
                            method,
                            url,
                            wait_time,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait_time).await;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = resp.text().await.unwrap_or_default();
                        return Err(IntuneError::GraphApiError {
                            status: status.as_u16(),
                            message: crate::error::enhance_graph_error(&error_text),
                        });
                    }

                    let text = resp.text().await?;
                    tracing::debug!("{} {} -> {} ({} bytes)", method, url, status, text.len());
                    if text.trim().is_empty() {
                        return Ok(serde_json::from_value(Value::Null)?);
                    }
                    return Ok(serde_json::from_str(&text)?);
                }
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        let wait_time = calculate_backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Connection error: {}. Retrying in {:?} (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait_time).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(|e| e.into()).unwrap_or_else(|| {
            IntuneError::GraphApiError {
                status: 0,
                message: format!("{} {} failed after {} retries", method, url, MAX_RETRIES),
            }
        }))
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

impl GraphClient {
    /// Fetch all pages of a paginated Graph API endpoint
    ///
    /// Follows `@odata.nextLink` until all pages are retrieved.
    ///
    /// ```ignore
    /// let devices: Vec<ManagedDevice> = client.get_all_pages("deviceManagement/managedDevices").await?;
    /// ```
    pub async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        self.get_all_pages_with_version(endpoint, ApiVersion::V1)
            .await
    }

    /// Fetch all pages from a beta endpoint
    pub async fn get_all_pages_beta<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        self.get_all_pages_with_version(endpoint, ApiVersion::Beta)
            .await
    }

    async fn get_all_pages_with_version<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        version: ApiVersion,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = self.url_for(endpoint, version);
        let mut page_count = 0usize;

        loop {
            let response: PaginatedResponse<T> = self
                .request(Method::GET, &current_url, None::<&Value>)
                .await?;
            all_items.extend(response.value);
            page_count += 1;

            match response.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        tracing::debug!(
            "Fetched {} items over {} page(s) from {}",
            all_items.len(),
            page_count,
            endpoint
        );
        Ok(all_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped_and_positive() {
        for attempt in 0..10 {
            let wait = calculate_backoff_with_jitter(attempt);
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis((MAX_BACKOFF_MS as f64 * 1.31) as u64));
        }
    }

    #[test]
    fn test_url_for_joins_and_passes_absolute_links() {
        let client =
            GraphClient::with_base_urls("t".into(), "http://mock/v1.0/", "http://mock/beta");
        assert_eq!(
            client.url_for("/deviceManagement/managedDevices", ApiVersion::V1),
            "http://mock/v1.0/deviceManagement/managedDevices"
        );
        assert_eq!(
            client.url_for("deviceManagement/deviceHealthScripts", ApiVersion::Beta),
            "http://mock/beta/deviceManagement/deviceHealthScripts"
        );
        assert_eq!(
            client.url_for("http://mock/beta/next?$skiptoken=abc", ApiVersion::V1),
            "http://mock/beta/next?$skiptoken=abc"
        );
    }
}
