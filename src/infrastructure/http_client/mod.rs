//! Blocking HTTP clients for the hosted model APIs.
//!
//! Both the completion client and the remote embedding engine go through
//! `ureq` agents built here, and render HTTP failures the same way so the
//! status code and upstream text survive into `DomainError` messages.

mod completion_client;

pub use completion_client::{GeminiCompletionClient, DEFAULT_GEMINI_API_BASE};

use std::time::Duration;

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Agent with one overall timeout per request.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Joins a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Renders a `ureq` failure as `HTTP <code> <status>: <body>`, or
/// `transport error: ...` when no response arrived.
pub fn describe_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            let status = response.status_text().to_string();
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            format!("HTTP {code} {status}: {body}")
        }
        ureq::Error::Transport(transport) => format!("transport error: {transport}"),
    }
}
