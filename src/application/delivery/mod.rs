//! Content delivery API access.
//!
//! [`DeliverySource`] is the upstream seam; [`HttpDeliverySource`] talks to the
//! real API and [`CachedDeliveryClient`] fronts any source with the cache.

mod cached;
mod error;
pub mod extract;
mod http;
mod models;
mod query;
mod source;

pub use cached::CachedDeliveryClient;
pub use error::DeliveryError;
pub use http::HttpDeliverySource;
pub use models::{
    ContentElement, ContentItem, ContentType, ItemListingResponse, ItemResponse, ItemSystem,
    ModularContent, Pagination, TypeListingResponse, TypeSystem, TypedItem,
    TypedItemListingResponse, TypedItemResponse,
};
pub use query::QueryParameter;
pub use source::{DeliverySource, Endpoint};
