//! Delivery API payloads.
//!
//! Elements are kept as raw JSON; typed views are built on demand with
//! [`ContentItem::typed`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSystem {
    pub id: String,
    pub name: String,
    pub codename: String,
    #[serde(default)]
    pub language: String,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub sitemap_locations: Vec<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub system: ItemSystem,
    #[serde(default)]
    pub elements: Map<String, Value>,
}

impl ContentItem {
    pub fn codename(&self) -> &str {
        &self.system.codename
    }

    /// Element values keyed by element codename.
    ///
    /// Each delivery element is an object carrying `type`, `name` and `value`;
    /// elements without a `value` are passed through unchanged.
    pub fn element_values(&self) -> Map<String, Value> {
        self.elements
            .iter()
            .map(|(codename, element)| {
                let value = element
                    .get("value")
                    .cloned()
                    .unwrap_or_else(|| element.clone());
                (codename.clone(), value)
            })
            .collect()
    }

    /// Map the element values into a caller-defined model.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<TypedItem<T>, serde_json::Error> {
        let elements = serde_json::from_value(Value::Object(self.element_values()))?;
        Ok(TypedItem {
            system: self.system.clone(),
            elements,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedItem<T> {
    pub system: ItemSystem,
    pub elements: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next_page: String,
}

/// Embedded items delivered alongside a response, keyed by codename.
pub type ModularContent = BTreeMap<String, ContentItem>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: ContentItem,
    #[serde(default)]
    pub modular_content: ModularContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemListingResponse {
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub modular_content: ModularContent,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedItemResponse<T> {
    pub item: TypedItem<T>,
    pub modular_content: ModularContent,
}

impl<T: DeserializeOwned> TypedItemResponse<T> {
    pub fn from_response(response: ItemResponse) -> Result<Self, serde_json::Error> {
        Ok(Self {
            item: response.item.typed()?,
            modular_content: response.modular_content,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedItemListingResponse<T> {
    pub items: Vec<TypedItem<T>>,
    pub modular_content: ModularContent,
    pub pagination: Pagination,
}

impl<T: DeserializeOwned> TypedItemListingResponse<T> {
    pub fn from_response(response: ItemListingResponse) -> Result<Self, serde_json::Error> {
        let items = response
            .items
            .iter()
            .map(ContentItem::typed)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            items,
            modular_content: response.modular_content,
            pagination: response.pagination,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSystem {
    pub id: String,
    pub name: String,
    pub codename: String,
    #[serde(default)]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    pub system: TypeSystem,
    #[serde(default)]
    pub elements: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeListingResponse {
    #[serde(default)]
    pub types: Vec<ContentType>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// One element definition of a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub name: String,
    #[serde(default)]
    pub codename: String,
    /// Type-specific fields such as `options` or `taxonomy_group`.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}
