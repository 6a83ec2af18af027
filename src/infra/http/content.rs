//! Read-through content endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::application::delivery::{
    ContentElement, ContentType, ItemListingResponse, ItemResponse, QueryParameter,
    TypeListingResponse,
};
use crate::application::error::HttpError;

use super::HttpState;

/// Query string pairs forwarded upstream in their original order.
fn parameters(pairs: Vec<(String, String)>) -> Vec<QueryParameter> {
    pairs.into_iter().map(QueryParameter::from).collect()
}

pub async fn item(
    State(state): State<HttpState>,
    Path(codename): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ItemResponse>, HttpError> {
    let query = parameters(pairs);
    Ok(Json(state.delivery.item(&codename, &query).await?))
}

pub async fn items(
    State(state): State<HttpState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ItemListingResponse>, HttpError> {
    let query = parameters(pairs);
    Ok(Json(state.delivery.items(&query).await?))
}

pub async fn content_type(
    State(state): State<HttpState>,
    Path(codename): Path<String>,
) -> Result<Json<ContentType>, HttpError> {
    Ok(Json(state.delivery.content_type(&codename).await?))
}

pub async fn content_types(
    State(state): State<HttpState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<TypeListingResponse>, HttpError> {
    let query = parameters(pairs);
    Ok(Json(state.delivery.content_types(&query).await?))
}

pub async fn content_element(
    State(state): State<HttpState>,
    Path((type_codename, element_codename)): Path<(String, String)>,
) -> Result<Json<ContentElement>, HttpError> {
    Ok(Json(
        state
            .delivery
            .content_element(&type_codename, &element_codename)
            .await?,
    ))
}
