//! REST client for the ChirpStack v4 API (the gRPC gateway under `/api/`).
//!
//! Authentication is a bearer token carried in the
//! `Grpc-Metadata-Authorization` header.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::api::{ChirpstackApi, Device, DeviceListItem, DeviceProfile, ListResponse, NamedItem};
use crate::config::ChirpstackConfig;
use crate::error::ChirpstackError;

const AUTH_HEADER: &str = "Grpc-Metadata-Authorization";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct DeviceEnvelope {
    device: Device,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileEnvelope {
    device_profile: DeviceProfile,
}

/// HTTP client for the ChirpStack REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    page_limit: u32,
}

impl RestClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the server URL does not parse, the API key is
    /// not a valid header value, or the HTTP client cannot be built.
    pub fn new(config: &ChirpstackConfig) -> Result<Self, ChirpstackError> {
        let mut headers = HeaderMap::new();
        let mut token = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ChirpstackError::InvalidApiKey)?;
        token.set_sensitive(true);
        headers.insert(AUTH_HEADER, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: Self::normalize_base_url(&config.server)?,
            page_limit: config.page_limit.max(1),
        })
    }

    /// Parse the server URL and make sure its path ends with `/`.
    fn normalize_base_url(raw: &str) -> Result<Url, ChirpstackError> {
        let mut url = Url::parse(raw).map_err(ChirpstackError::InvalidUrl)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, ChirpstackError> {
        self.base_url.join(path).map_err(ChirpstackError::InvalidUrl)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ChirpstackError> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self.http.get(url).query(params).send().await?;
        Self::handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ChirpstackError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(ChirpstackError::Decode)
        } else {
            Err(Self::parse_error(status, resp).await)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> ChirpstackError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return ChirpstackError::InvalidApiKey;
        }

        let raw = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|err| err.message)
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status.to_string()
                } else {
                    raw
                }
            });
        ChirpstackError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// Collect every page of a list endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &[(&str, String)],
    ) -> Result<Vec<T>, ChirpstackError> {
        let mut all = Vec::new();
        let mut offset: u32 = 0;

        loop {
            let mut params = filter.to_vec();
            params.push(("limit", self.page_limit.to_string()));
            params.push(("offset", offset.to_string()));

            let page: ListResponse<T> = self.get(path, &params).await?;
            let received = u32::try_from(page.result.len()).unwrap_or(u32::MAX);
            all.extend(page.result);

            if received == 0
                || received < self.page_limit
                || u32::try_from(all.len()).unwrap_or(u32::MAX) >= page.total_count
            {
                break;
            }
            offset = offset.saturating_add(received);
        }

        Ok(all)
    }

    async fn named_items(
        &self,
        path: &str,
        filter: &[(&str, String)],
    ) -> Result<BTreeMap<String, String>, ChirpstackError> {
        let items: Vec<NamedItem> = self.list_all(path, filter).await?;
        Ok(items.into_iter().map(|item| (item.name, item.id)).collect())
    }
}

impl ChirpstackApi for RestClient {
    fn list_tenants(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send {
        async move { self.named_items("api/tenants", &[]).await }
    }

    fn list_applications(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send {
        let filter = [("tenantId", tenant_id.to_string())];
        async move { self.named_items("api/applications", &filter).await }
    }

    fn list_devices(
        &self,
        application_id: &str,
    ) -> impl Future<Output = Result<Vec<DeviceListItem>, ChirpstackError>> + Send {
        let filter = [("applicationId", application_id.to_string())];
        async move { self.list_all("api/devices", &filter).await }
    }

    fn get_device(
        &self,
        dev_eui: &str,
    ) -> impl Future<Output = Result<Device, ChirpstackError>> + Send {
        let path = format!("api/devices/{dev_eui}");
        async move {
            let envelope: DeviceEnvelope = self.get(&path, &[]).await?;
            Ok(envelope.device)
        }
    }

    fn get_device_profile(
        &self,
        profile_id: &str,
    ) -> impl Future<Output = Result<DeviceProfile, ChirpstackError>> + Send {
        let path = format!("api/device-profiles/{profile_id}");
        async move {
            let envelope: ProfileEnvelope = self.get(&path, &[]).await?;
            Ok(envelope.device_profile)
        }
    }
}
