//! Normalization of operator-supplied comma-separated lists.
//!
//! CORS settings arrive from environment variables and config files and may
//! carry stray whitespace, empty entries or malformed URLs. These functions
//! are the firewall between that input and the CORS engine, which panics on
//! some malformed values.
//!
//! Both functions are idempotent, never emit empty segments, and keep the
//! surviving segments in input order.

use url::Url;

/// Split on `,`, trim ASCII whitespace, drop empty segments, rejoin with `,`.
pub fn sanitize_comma_separated(input: &str) -> String {
    segments(input).collect::<Vec<_>>().join(",")
}

/// Like [`sanitize_comma_separated`], keeping only `*` and well-formed origins.
pub fn sanitize_origins(input: &str) -> String {
    partition_origins(input).0.join(",")
}

/// Split origins into `(kept, dropped)`, both in input order.
pub fn partition_origins(input: &str) -> (Vec<&str>, Vec<&str>) {
    segments(input).partition(|segment| is_valid_origin(segment))
}

/// Returns true for `*` or `scheme://host[:port]` with at most a `/` path.
///
/// Userinfo, queries, fragments and any non-root path are rejected.
pub fn is_valid_origin(candidate: &str) -> bool {
    if candidate == "*" {
        return true;
    }

    let Ok(url) = Url::parse(candidate) else {
        return false;
    };

    // The parser is lenient about a trailing `?` or `#` with nothing after it.
    if candidate.contains(['?', '#']) {
        return false;
    }

    !url.scheme().is_empty()
        && url.host_str().is_some_and(|host| !host.is_empty())
        && url.username().is_empty()
        && url.password().is_none()
        && url.query().is_none()
        && url.fragment().is_none()
        && matches!(url.path(), "" | "/")
}

fn segments(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(',')
        .map(|segment| segment.trim_matches(|c: char| c.is_ascii_whitespace()))
        .filter(|segment| !segment.is_empty())
}
