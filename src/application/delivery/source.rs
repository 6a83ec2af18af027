use async_trait::async_trait;
use serde_json::Value;

use super::error::DeliveryError;
use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, TypeListingResponse,
};
use super::query::QueryParameter;

/// Upstream resource addressed by an undecoded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    Item(&'a str),
    Items,
    Type(&'a str),
    Types,
}

impl<'a> Endpoint<'a> {
    /// Path segments below the project id.
    pub fn segments(self) -> Vec<&'a str> {
        match self {
            Endpoint::Item(codename) => vec!["items", codename],
            Endpoint::Items => vec!["items"],
            Endpoint::Type(codename) => vec!["types", codename],
            Endpoint::Types => vec!["types"],
        }
    }
}

/// Upstream content source.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    async fn item(
        &self,
        codename: &str,
        query: &[QueryParameter],
    ) -> Result<ItemResponse, DeliveryError>;

    async fn items(&self, query: &[QueryParameter]) -> Result<ItemListingResponse, DeliveryError>;

    async fn content_type(&self, codename: &str) -> Result<ContentType, DeliveryError>;

    async fn content_types(
        &self,
        query: &[QueryParameter],
    ) -> Result<TypeListingResponse, DeliveryError>;

    async fn content_element(
        &self,
        type_codename: &str,
        element_codename: &str,
    ) -> Result<ContentElement, DeliveryError>;

    /// The response body as delivered, without decoding it into a model.
    async fn json(
        &self,
        endpoint: Endpoint<'_>,
        query: &[QueryParameter],
    ) -> Result<Value, DeliveryError>;
}
