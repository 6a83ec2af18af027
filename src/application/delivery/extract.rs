//! Dependency extractors for delivery responses.
//!
//! A response depends on the items it carries and on every item embedded in its
//! modular content. Embedded items are read from the payload as delivered; they
//! are not expanded further.

use crate::cache::{
    Dependencies, ITEM_CATEGORY, SubjectKey, TYPE_CATEGORY, TYPED_ITEM_CATEGORY,
};

use serde_json::Value;

use super::models::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, ModularContent,
    TypeListingResponse, TypedItemListingResponse, TypedItemResponse,
};

/// Every binding category the extractors below emit.
pub const BINDING_CATEGORIES: &[&str] = &[ITEM_CATEGORY, TYPED_ITEM_CATEGORY, TYPE_CATEGORY];

fn modular(modular_content: &ModularContent, into: &mut Dependencies) {
    into.extend(
        modular_content
            .values()
            .map(|item| SubjectKey::new(ITEM_CATEGORY, item.codename())),
    );
}

pub fn item_dependencies(response: &ItemResponse) -> Dependencies {
    let mut deps = Dependencies::from([SubjectKey::new(ITEM_CATEGORY, response.item.codename())]);
    modular(&response.modular_content, &mut deps);
    deps
}

pub fn item_listing_dependencies(response: &ItemListingResponse) -> Dependencies {
    let mut deps: Dependencies = response
        .items
        .iter()
        .map(|item| SubjectKey::new(ITEM_CATEGORY, item.codename()))
        .collect();
    modular(&response.modular_content, &mut deps);
    deps
}

pub fn typed_item_dependencies<T>(response: &TypedItemResponse<T>) -> Dependencies {
    let mut deps = Dependencies::from([SubjectKey::new(
        TYPED_ITEM_CATEGORY,
        response.item.system.codename.as_str(),
    )]);
    modular(&response.modular_content, &mut deps);
    deps
}

pub fn typed_item_listing_dependencies<T>(response: &TypedItemListingResponse<T>) -> Dependencies {
    let mut deps: Dependencies = response
        .items
        .iter()
        .map(|item| SubjectKey::new(TYPED_ITEM_CATEGORY, item.system.codename.as_str()))
        .collect();
    modular(&response.modular_content, &mut deps);
    deps
}

pub fn type_dependencies(content_type: &ContentType) -> Dependencies {
    Dependencies::from([SubjectKey::new(
        TYPE_CATEGORY,
        content_type.system.codename.as_str(),
    )])
}

pub fn type_listing_dependencies(response: &TypeListingResponse) -> Dependencies {
    response
        .types
        .iter()
        .flat_map(type_dependencies)
        .collect()
}

/// An element definition changes with its content type.
pub fn content_element_dependencies(
    type_codename: &str,
) -> impl Fn(&ContentElement) -> Dependencies + '_ {
    move |_: &ContentElement| Dependencies::from([SubjectKey::new(TYPE_CATEGORY, type_codename)])
}

fn system_codename(value: &Value) -> Option<&str> {
    value.pointer("/system/codename").and_then(Value::as_str)
}

/// Dependencies of an undecoded response, read from its shape.
///
/// Items are found under `item`, `items` and the keys of `modular_content`;
/// types under `types` or a top-level `system` block.
pub fn json_dependencies(response: &Value) -> Dependencies {
    let mut deps = Dependencies::new();
    let item = |codename: &str| SubjectKey::new(ITEM_CATEGORY, codename);
    let content_type = |codename: &str| SubjectKey::new(TYPE_CATEGORY, codename);

    match response.get("item") {
        Some(single) => deps.extend(system_codename(single).map(item)),
        None => deps.extend(system_codename(response).map(content_type)),
    }
    if let Some(items) = response.get("items").and_then(Value::as_array) {
        deps.extend(items.iter().filter_map(system_codename).map(item));
    }
    if let Some(modular) = response.get("modular_content").and_then(Value::as_object) {
        deps.extend(modular.keys().map(|codename| item(codename)));
    }
    if let Some(types) = response.get("types").and_then(Value::as_array) {
        deps.extend(types.iter().filter_map(system_codename).map(content_type));
    }
    deps
}
