//! Read-through delivery client.

use std::any::type_name;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;

use crate::cache::{CacheKey, CacheManager, ITEM_CATEGORY, TYPE_CATEGORY, TYPED_ITEM_CATEGORY};

use super::error::DeliveryError;
use super::extract;
use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, TypeListingResponse,
    TypedItemListingResponse, TypedItemResponse,
};
use super::query::QueryParameter;
use super::source::{DeliverySource, Endpoint};

const ITEMS_KEY: &str = "items";
const TYPED_ITEMS_KEY: &str = "typed_items";
const TYPES_KEY: &str = "types";
const ELEMENT_KEY: &str = "element";

fn json_key_prefix(endpoint: Endpoint<'_>) -> Vec<&str> {
    match endpoint {
        Endpoint::Item(codename) => vec!["item_json", codename],
        Endpoint::Items => vec!["items_json"],
        Endpoint::Type(codename) => vec!["type_json", codename],
        Endpoint::Types => vec!["types_json"],
    }
}

fn key(prefix: &[&str], query: &[QueryParameter]) -> CacheKey {
    let parameters: Vec<String> = query.iter().map(QueryParameter::to_query_string).collect();
    CacheKey::new(
        prefix
            .iter()
            .map(|token| (*token).to_string())
            .chain(parameters),
    )
}

/// Delivery client that serves repeated reads from the cache.
///
/// Every response is bound to the items it contains, so a change notification
/// for any of them expires it.
#[derive(Clone)]
pub struct CachedDeliveryClient {
    source: Arc<dyn DeliverySource>,
    cache: Arc<CacheManager>,
}

impl CachedDeliveryClient {
    pub fn new(source: Arc<dyn DeliverySource>, cache: Arc<CacheManager>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    #[instrument(skip(self, query))]
    pub async fn item(
        &self,
        codename: &str,
        query: &[QueryParameter],
    ) -> Result<ItemResponse, DeliveryError> {
        let key = key(&[ITEM_CATEGORY, codename], query);
        self.cache
            .get_or_create(
                &key,
                || self.source.item(codename, query),
                extract::item_dependencies,
            )
            .await
    }

    /// Fetch one item and map its elements into `T`.
    #[instrument(skip(self, query))]
    pub async fn typed_item<T>(
        &self,
        codename: &str,
        query: &[QueryParameter],
    ) -> Result<TypedItemResponse<T>, DeliveryError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = key(&[TYPED_ITEM_CATEGORY, type_name::<T>(), codename], query);
        self.cache
            .get_or_create(
                &key,
                || async {
                    let response = self.source.item(codename, query).await?;
                    Ok::<_, DeliveryError>(TypedItemResponse::<T>::from_response(response)?)
                },
                extract::typed_item_dependencies::<T>,
            )
            .await
    }

    #[instrument(skip(self, query))]
    pub async fn items(&self, query: &[QueryParameter]) -> Result<ItemListingResponse, DeliveryError> {
        let key = key(&[ITEMS_KEY], query);
        self.cache
            .get_or_create(
                &key,
                || self.source.items(query),
                extract::item_listing_dependencies,
            )
            .await
    }

    #[instrument(skip(self, query))]
    pub async fn typed_items<T>(
        &self,
        query: &[QueryParameter],
    ) -> Result<TypedItemListingResponse<T>, DeliveryError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = key(&[TYPED_ITEMS_KEY, type_name::<T>()], query);
        self.cache
            .get_or_create(
                &key,
                || async {
                    let response = self.source.items(query).await?;
                    Ok::<_, DeliveryError>(TypedItemListingResponse::<T>::from_response(
                        response,
                    )?)
                },
                extract::typed_item_listing_dependencies::<T>,
            )
            .await
    }

    #[instrument(skip(self))]
    pub async fn content_type(&self, codename: &str) -> Result<ContentType, DeliveryError> {
        let key = CacheKey::new([TYPE_CATEGORY, codename]);
        self.cache
            .get_or_create(
                &key,
                || self.source.content_type(codename),
                extract::type_dependencies,
            )
            .await
    }

    #[instrument(skip(self, query))]
    pub async fn content_types(
        &self,
        query: &[QueryParameter],
    ) -> Result<TypeListingResponse, DeliveryError> {
        let key = key(&[TYPES_KEY], query);
        self.cache
            .get_or_create(
                &key,
                || self.source.content_types(query),
                extract::type_listing_dependencies,
            )
            .await
    }

    /// One element definition, expired together with its content type.
    #[instrument(skip(self))]
    pub async fn content_element(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<ContentElement, DeliveryError> {
        let key = CacheKey::new([ELEMENT_KEY, type_codename, element_codename]);
        self.cache
            .get_or_create(
                &key,
                || self.source.content_element(type_codename, element_codename),
                extract::content_element_dependencies(type_codename),
            )
            .await
    }

    /// Undecoded response body, cached and bound like its decoded counterpart.
    #[instrument(skip(self, query))]
    pub async fn json(
        &self,
        endpoint: Endpoint<'_>,
        query: &[QueryParameter],
    ) -> Result<Value, DeliveryError> {
        let key = key(&json_key_prefix(endpoint), query);
        self.cache
            .get_or_create(
                &key,
                || self.source.json(endpoint, query),
                extract::json_dependencies,
            )
            .await
    }
}
