use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::DeliverySettings;

use super::error::DeliveryError;
use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, TypeListingResponse,
};
use super::query::QueryParameter;
use super::source::{DeliverySource, Endpoint};

/// Delivery API over HTTP.
#[derive(Clone, Debug)]
pub struct HttpDeliverySource {
    client: Client,
    base: Url,
    project_id: String,
    preview_api_key: Option<String>,
}

impl HttpDeliverySource {
    pub fn new(
        base: Url,
        project_id: impl Into<String>,
        preview_api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let project_id = project_id.into();
        if project_id.trim().is_empty() {
            return Err(DeliveryError::configuration("project id must not be empty"));
        }
        if base.cannot_be_a_base() {
            return Err(DeliveryError::configuration(format!(
                "`{base}` cannot be used as a base URL"
            )));
        }

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base,
            project_id,
            preview_api_key,
        })
    }

    /// Build from settings, selecting the preview host when a preview key is set.
    pub fn from_settings(settings: &DeliverySettings) -> Result<Self, DeliveryError> {
        let project_id = settings
            .project_id
            .clone()
            .ok_or_else(|| DeliveryError::configuration("delivery.project_id is not set"))?;
        let base = match settings.preview_api_key {
            Some(_) => settings.preview_base_url.clone(),
            None => settings.base_url.clone(),
        };
        Self::new(
            base,
            project_id,
            settings.preview_api_key.clone(),
            settings.timeout,
        )
    }

    pub fn user_agent() -> &'static str {
        concat!("delivery-cache/", env!("CARGO_PKG_VERSION"))
    }

    pub fn is_preview(&self) -> bool {
        self.preview_api_key.is_some()
    }

    pub fn endpoint(&self, segments: &[&str], query: &[QueryParameter]) -> Result<Url, DeliveryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| DeliveryError::configuration("base URL cannot carry a path"))?
            .pop_if_empty()
            .push(&self.project_id)
            .extend(segments);

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for parameter in query {
                pairs.append_pair(&parameter.name, &parameter.value);
            }
        }

        Ok(url)
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, DeliveryError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.preview_api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        Self::handle(response).await
    }

    async fn handle<T: DeserializeOwned>(response: Response) -> Result<T, DeliveryError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            debug!(%status, "delivery API returned an error status");
            return Err(DeliveryError::Status { status, body });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DeliverySource for HttpDeliverySource {
    async fn item(
        &self,
        codename: &str,
        query: &[QueryParameter],
    ) -> Result<ItemResponse, DeliveryError> {
        let url = self.endpoint(&["items", codename], query)?;
        self.fetch(url).await
    }

    async fn items(&self, query: &[QueryParameter]) -> Result<ItemListingResponse, DeliveryError> {
        let url = self.endpoint(&["items"], query)?;
        self.fetch(url).await
    }

    async fn content_type(&self, codename: &str) -> Result<ContentType, DeliveryError> {
        let url = self.endpoint(&["types", codename], &[])?;
        self.fetch(url).await
    }

    async fn content_types(
        &self,
        query: &[QueryParameter],
    ) -> Result<TypeListingResponse, DeliveryError> {
        let url = self.endpoint(&["types"], query)?;
        self.fetch(url).await
    }

    async fn content_element(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<ContentElement, DeliveryError> {
        let url = self.endpoint(&["types", type_codename, "elements", element_codename], &[])?;
        self.fetch(url).await
    }

    async fn json(
        &self,
        endpoint: Endpoint<'_>,
        query: &[QueryParameter],
    ) -> Result<Value, DeliveryError> {
        let url = self.endpoint(&endpoint.segments(), query)?;
        self.fetch(url).await
    }
}
