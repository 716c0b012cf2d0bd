//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All errors are collected and
//! returned together so an operator can fix a config file in one pass.
//! CORS lists are deliberately not validated here: they are sanitized when
//! the CORS policy is built and malformed entries are dropped.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::Method;
use axum::routing::MethodFilter;
use thiserror::Error;
use url::Url;

use crate::config::schema::{EdgeConfig, ParamKind, RouteConfig};
use crate::security::{is_infrastructure_path, SWAGGER_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.base_url `{0}` is not an http:// URL")]
    InvalidUpstream(String),

    #[error("rate_limit.{0} must be greater than zero")]
    NonPositiveRateLimit(&'static str),

    #[error("route `{0}` must start with `/`")]
    InvalidRoutePath(String),

    #[error("route `{path}` has no `{{{name}}}` segment")]
    UnknownPathParam { path: String, name: String },

    #[error("route `{path}` lists invalid method `{method}`")]
    InvalidMethod { path: String, method: String },

    #[error("route `{0}` is not a valid path template")]
    InvalidPathTemplate(String),

    #[error("route `{0}` is served by the edge itself")]
    ReservedPath(String),

    #[error("route `{path}` registers `{method}` more than once")]
    DuplicateRoute { path: String, method: String },

    #[error("route `{path}` conflicts with `{other}`")]
    ConflictingRoute { path: String, other: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let upstream_ok = Url::parse(&config.upstream.base_url)
        .map(|url| url.scheme() == "http" && url.host_str().is_some())
        .unwrap_or(false);
    if !upstream_ok {
        errors.push(ValidationError::InvalidUpstream(config.upstream.base_url.clone()));
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        for (name, value) in [
            ("global_max", rl.global_max),
            ("export_max", rl.export_max),
            ("dispatch_max", rl.dispatch_max),
            ("window_secs", rl.window_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::NonPositiveRateLimit(name));
            }
        }
    }

    check_routes(&config.routes, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Route checks on their own, for callers that build a router from
/// configuration that never went through [`validate_config`].
pub fn validate_routes(routes: &[RouteConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_routes(routes, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_routes(routes: &[RouteConfig], errors: &mut Vec<ValidationError>) {
    // Routes sharing a shape land on the same router node.
    let mut by_shape: HashMap<String, Vec<&RouteConfig>> = HashMap::new();

    for route in routes {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidRoutePath(route.path.clone()));
        } else if is_infrastructure_path(&route.path) || route.path.starts_with(SWAGGER_PREFIX) {
            errors.push(ValidationError::ReservedPath(route.path.clone()));
        }

        match template_shape(&route.path) {
            Some(shape) => by_shape.entry(shape).or_default().push(route),
            None => errors.push(ValidationError::InvalidPathTemplate(route.path.clone())),
        }

        for method in &route.methods {
            let parsed = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok();
            if parsed.and_then(|m| MethodFilter::try_from(m).ok()).is_none() {
                errors.push(ValidationError::InvalidMethod {
                    path: route.path.clone(),
                    method: method.clone(),
                });
            }
        }

        for param in &route.params {
            if param.kind == ParamKind::OrgHeader {
                continue;
            }
            let segment = format!("{{{}}}", param.name);
            if param.name.is_empty() || !route.path.split('/').any(|s| s == segment) {
                errors.push(ValidationError::UnknownPathParam {
                    path: route.path.clone(),
                    name: param.name.clone(),
                });
            }
        }
    }

    let mut shapes: Vec<_> = by_shape.into_values().filter(|group| group.len() > 1).collect();
    shapes.sort_by(|a, b| a[0].path.cmp(&b[0].path));
    for group in shapes {
        check_overlap(&group, errors);
    }
}

fn check_overlap(group: &[&RouteConfig], errors: &mut Vec<ValidationError>) {
    let first = &group[0].path;
    if let Some(other) = group.iter().find(|r| &r.path != first) {
        errors.push(ValidationError::ConflictingRoute {
            path: other.path.clone(),
            other: first.clone(),
        });
        return;
    }

    let mut seen: Vec<String> = Vec::new();
    for route in group {
        let methods: Vec<String> = if route.methods.is_empty() {
            vec!["*".to_string()]
        } else {
            route.methods.iter().map(|m| m.to_ascii_uppercase()).collect()
        };
        for method in methods {
            let clash = seen.iter().any(|m| m == &method || m == "*" || method == "*");
            if clash {
                errors.push(ValidationError::DuplicateRoute {
                    path: route.path.clone(),
                    method: if method == "*" { "any method".into() } else { method },
                });
                return;
            }
            seen.push(method);
        }
    }
}

/// Normalize a path template so that templates differing only in capture
/// names compare equal. `None` when the router would refuse the template.
///
/// Each segment is either literal text, `{name}`, or a trailing `{*name}`.
fn template_shape(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').collect();
    let mut names: Vec<&str> = Vec::new();
    let mut shape = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        if segment.starts_with(':') || segment.starts_with('*') {
            return None;
        }
        if !segment.contains(['{', '}']) {
            shape.push((*segment).to_string());
            continue;
        }

        let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
        let (name, marker) = match inner.strip_prefix('*') {
            Some(rest) if is_last => (rest, "{*}"),
            Some(_) => return None,
            None => (inner, "{}"),
        };
        if name.is_empty() || name.contains(['{', '}', '*']) || names.contains(&name) {
            return None;
        }
        names.push(name);
        shape.push(marker.to_string());
    }
    Some(shape.join("/"))
}
