//! Swagger document info sourced from the environment.
//!
//! The info is read once at startup and served read-only afterwards, so no
//! request ever mutates shared state. Unset or blank variables leave the
//! built-in defaults in place; an invalid `SWAGGER_HOST` is ignored.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use serde_json::{json, Value};
use url::Url;

pub const DOC_PATH: &str = "/swagger/doc.json";

/// OpenAPI 2.0 info block plus the template delimiters doc renderers use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwaggerInfo {
    pub title: String,
    pub description: String,
    pub version: String,
    pub host: Option<String>,
    pub base_path: String,
    pub schemes: Vec<String>,
    pub left_delim: String,
    pub right_delim: String,
}

impl Default for SwaggerInfo {
    fn default() -> Self {
        Self {
            title: "Report Service API".to_string(),
            description: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: None,
            base_path: "/".to_string(),
            schemes: vec!["http".to_string()],
            left_delim: "{{".to_string(),
            right_delim: "}}".to_string(),
        }
    }
}

impl SwaggerInfo {
    /// Snapshot the `SWAGGER_*` variables of the current process.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut info = Self::default();
        if let Some(v) = value("SWAGGER_TITLE") {
            info.title = v;
        }
        if let Some(v) = value("SWAGGER_DESCRIPTION") {
            info.description = v;
        }
        if let Some(v) = value("SWAGGER_VERSION") {
            info.version = v;
        }
        if let Some(v) = value("SWAGGER_HOST") {
            if is_valid_host(&v) {
                info.host = Some(v);
            } else {
                tracing::warn!(host = %v, "Ignoring invalid SWAGGER_HOST");
            }
        }
        if let Some(v) = value("SWAGGER_BASE_PATH") {
            info.base_path = v;
        }
        if let Some(v) = value("SWAGGER_LEFT_DELIM") {
            info.left_delim = v;
        }
        if let Some(v) = value("SWAGGER_RIGHT_DELIM") {
            info.right_delim = v;
        }
        if let Some(v) = value("SWAGGER_SCHEMES") {
            info.schemes = vec![v];
        }
        info
    }

    /// Minimal OpenAPI 2.0 document carrying this info.
    pub fn document(&self) -> Value {
        let mut doc = json!({
            "swagger": "2.0",
            "info": {
                "title": self.title,
                "description": self.description,
                "version": self.version,
            },
            "basePath": self.base_path,
            "schemes": self.schemes,
            "paths": {},
        });
        if let Some(host) = &self.host {
            doc["host"] = Value::String(host.clone());
        }
        doc
    }
}

/// Accepts `host` or `host:port`, nothing else.
pub fn is_valid_host(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.contains(|c: char| c.is_whitespace() || "/?#@\\".contains(c)) {
        return false;
    }
    let Ok(url) = Url::parse(&format!("http://{candidate}")) else {
        return false;
    };
    url.host_str().is_some_and(|h| !h.is_empty()) && url.path() == "/"
}

/// Attaches the snapshot to the request for the Swagger handlers.
pub async fn swagger_configurator(
    State(info): State<Arc<SwaggerInfo>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(info);
    next.run(request).await
}

pub async fn doc_handler(Extension(info): Extension<Arc<SwaggerInfo>>) -> Json<Value> {
    Json(info.document())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let info = SwaggerInfo::from_lookup(|_| None);
        assert_eq!(info, SwaggerInfo::default());
    }

    #[test]
    fn test_env_values_copied() {
        let info = SwaggerInfo::from_lookup(lookup(&[
            ("SWAGGER_TITLE", "Reports"),
            ("SWAGGER_DESCRIPTION", "Reporting API"),
            ("SWAGGER_VERSION", "2.1.0"),
            ("SWAGGER_HOST", "api.example.com:8443"),
            ("SWAGGER_BASE_PATH", "/v1"),
            ("SWAGGER_LEFT_DELIM", "[["),
            ("SWAGGER_RIGHT_DELIM", "]]"),
            ("SWAGGER_SCHEMES", "https"),
        ]));
        assert_eq!(info.title, "Reports");
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.host.as_deref(), Some("api.example.com:8443"));
        assert_eq!(info.base_path, "/v1");
        assert_eq!(info.left_delim, "[[");
        assert_eq!(info.schemes, vec!["https"]);
    }

    #[test]
    fn test_blank_values_skipped() {
        let info = SwaggerInfo::from_lookup(lookup(&[("SWAGGER_TITLE", "  "), ("SWAGGER_SCHEMES", "")]));
        assert_eq!(info.title, SwaggerInfo::default().title);
        assert_eq!(info.schemes, vec!["http"]);
    }

    #[test]
    fn test_invalid_host_ignored() {
        for bad in [
            "http://api.example.com",
            "api.example.com/v1",
            "user@api.example.com",
            "api.example.com:notaport",
            "api example.com",
            ":8080",
        ] {
            let info = SwaggerInfo::from_lookup(lookup(&[("SWAGGER_HOST", bad)]));
            assert!(info.host.is_none(), "{bad}");
        }
        assert!(is_valid_host("localhost"));
        assert!(is_valid_host("127.0.0.1:8080"));
        assert!(is_valid_host("[::1]:8080"));
    }

    #[test]
    fn test_document_shape() {
        let info = SwaggerInfo::from_lookup(lookup(&[("SWAGGER_HOST", "api.example.com")]));
        let doc = info.document();
        assert_eq!(doc["swagger"], "2.0");
        assert_eq!(doc["host"], "api.example.com");
        assert_eq!(doc["schemes"][0], "http");
        assert!(doc["info"]["title"].is_string());
    }
}
