//! The single proxy handler: screen the request, then GET/PUT/DELETE the
//! object whose key is the request path minus its leading `/`.
//!
//! Bodies are streamed in both directions; nothing is buffered here.

use crate::{
    errors::{AppError, Rejection},
    models::object::HttpMetadata,
    services::{gatekeeper::Access, storage::ByteStream},
    state::AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use std::io;
use tracing::{debug, info};

const X_CUSTOM_MESSAGE: HeaderName = HeaderName::from_static("x-custom-message");

/// Object key for a request path: the path with exactly one leading
/// character removed, no decoding or normalization.
pub fn object_key(uri: &Uri) -> &str {
    let path = uri.path();
    let mut chars = path.chars();
    chars.next();
    chars.as_str()
}

/// Entry point for every request on the public listener.
pub async fn proxy_object(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let access = match state.gate.screen(&headers) {
        Ok(access) => access,
        Err(rejection) => {
            debug!(%method, path = uri.path(), reason = ?rejection, "request rejected");
            return Ok(rejection.into_response());
        }
    };
    let key = object_key(&uri);

    match method {
        Method::PUT => put_object(&state, access, key, &headers, body).await,
        Method::GET => get_object(&state, key).await,
        Method::DELETE => delete_object(&state, access, key).await,
        _ => {
            debug!(%method, "method not allowed");
            Ok(Rejection::MethodNotAllowed.into_response())
        }
    }
}

async fn put_object(
    state: &AppState,
    access: Access,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    if !access.is_authorized() {
        debug!(key, "unauthorized put");
        return Ok(Rejection::Unauthorized.into_response());
    }

    let stream: ByteStream = body
        .into_data_stream()
        .map_err(io::Error::other)
        .boxed();
    let meta = state
        .store
        .put(key, HttpMetadata::from_headers(headers), stream)
        .await?;
    info!(key, size = meta.size_bytes, etag = %meta.etag, "object stored");

    Ok((
        [(X_CUSTOM_MESSAGE, "Object stored securely")],
        format!("Put {} successfully!", key),
    )
        .into_response())
}

async fn get_object(state: &AppState, key: &str) -> Result<Response, AppError> {
    let Some(object) = state.store.get(key).await? else {
        debug!(key, "object not found");
        return Ok(Rejection::NotFound.into_response());
    };

    let mut response = Response::new(Body::from_stream(object.body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    object.meta.http_metadata.write_headers(headers);
    if let Ok(etag) = HeaderValue::from_str(&object.meta.http_etag()) {
        headers.insert(header::ETAG, etag);
    }
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(object.meta.size_bytes.max(0)),
    );

    Ok(response)
}

async fn delete_object(
    state: &AppState,
    access: Access,
    key: &str,
) -> Result<Response, AppError> {
    if !access.is_authorized() {
        debug!(key, "unauthorized delete");
        return Ok(Rejection::Unauthorized.into_response());
    }

    state.store.delete(key).await?;
    info!(key, "object deleted");

    Ok(([(X_CUSTOM_MESSAGE, "Object deleted securely")], "Deleted!").into_response())
}
