use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request},
    response::Response,
};
use http_body_util::BodyExt;

pub const BOUNDARY: &str = "----WebKitFormBoundary7MA4YWxkTrZu0gW";

//=================
// Request Builders
//=================
pub fn build_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

/// Multipart upload with one part. `filename: None` sends a plain form field.
pub fn build_upload_request(field_name: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    let disposition = match filename {
        Some(filename) => {
            format!("Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n")
        }
        None => format!("Content-Disposition: form-data; name=\"{field_name}\"\r\n"),
    };
    body.extend_from_slice(disposition.as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("Failed to build request")
}

/// Attach a peer address the way `into_make_service_with_connect_info` would.
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("peer addr");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

//==================
// Response Helpers
//==================
pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes()
        .to_vec()
}

pub async fn extract_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}
