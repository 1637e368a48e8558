// src/response.rs

//! Classification of unexpected registry responses
//!
//! Registries report failures as RFC 7807 problem documents when they can;
//! the classifier prefers the problem `detail` over the raw body and maps
//! the status code onto the error taxonomy.

use serde::Deserialize;

use crate::error::Error;
use crate::headers::{content_type_matches, CONTENT_TYPE_HEADER};
use crate::transport::Response;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// RFC 7807 problem details, fields we consume
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemDetails {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub status: Option<u16>,
}

/// Decode a problem document from an error response, if it carries one.
pub fn problem_details(response: &Response) -> Option<ProblemDetails> {
    let content_type = response.headers.get(CONTENT_TYPE_HEADER);
    if !content_type_matches(content_type, PROBLEM_CONTENT_TYPE) {
        return None;
    }
    serde_json::from_slice(&response.body).ok()
}

fn failure_details(response: &Response) -> String {
    if let Some(detail) = problem_details(response).and_then(|p| p.detail) {
        return detail;
    }
    let body = response.body_text();
    let body = body.trim();
    if body.is_empty() {
        "no details provided by the registry".to_string()
    } else {
        body.to_string()
    }
}

/// Map a response with an unexpected status onto the error taxonomy.
pub fn classify(expected: u16, response: &Response) -> Error {
    let details = failure_details(response);
    match response.status {
        401 => Error::Unauthorized { details },
        403 => Error::Forbidden { details },
        501 => Error::AuthenticationMethodNotSupported { details },
        code @ 400..=499 => Error::ClientError { code, details },
        code @ 500..=599 => Error::ServerError { code, details },
        actual => Error::InvalidResponseStatus { expected, actual },
    }
}
