//! Three-tier rate limiting keyed by client address.
//!
//! Every request is classified into exactly one tier (tiers never stack):
//!
//! 1. infrastructure path → bypass
//! 2. path ends with `/download` → export
//! 3. POST / PUT / PATCH / DELETE → dispatch
//! 4. anything else → global
//!
//! Each `(tier, client)` pair is a fixed-window counter in the
//! [`CounterStore`] under the key `"<tier>:<client>"`. A request is admitted
//! while the post-increment count stays within the tier maximum. When the
//! store cannot answer, the request is admitted.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::observability::metrics;
use crate::security::is_infrastructure_path;
use crate::store::CounterStore;

const EXPORT_SUFFIX: &str = "/download";

/// Quota class a request is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Global,
    Export,
    Dispatch,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Global, Tier::Export, Tier::Dispatch];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Export => "export",
            Tier::Dispatch => "dispatch",
        }
    }

    /// Bucket key for `client` in this tier.
    pub fn key(self, client: &str) -> String {
        format!("{}:{}", self.as_str(), client)
    }
}

/// Outcome of tier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Bypass,
    Limited(Tier),
}

pub fn is_dispatch_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Select the tier for a request. Pure and non-blocking.
pub fn classify(method: &Method, path: &str) -> Classification {
    if is_infrastructure_path(path) {
        Classification::Bypass
    } else if path.ends_with(EXPORT_SUFFIX) {
        Classification::Limited(Tier::Export)
    } else if is_dispatch_method(method) {
        Classification::Limited(Tier::Dispatch)
    } else {
        Classification::Limited(Tier::Global)
    }
}

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// `count` is `None` when the store could not be reached.
    Allowed { count: Option<u64> },
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Shared limiter state.
pub struct RateLimiter {
    enabled: bool,
    global_max: u64,
    export_max: u64,
    dispatch_max: u64,
    window: Duration,
    client_ip_header: Option<HeaderName>,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Build a limiter over `store`.
    ///
    /// Non-positive maxima or window are rejected by config validation; if
    /// they get here anyway they are raised to the smallest legal value.
    pub fn new(config: &RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        let at_least_one = |name: &'static str, value: u64| {
            if value == 0 {
                tracing::warn!(setting = name, "Rate limit maximum is zero, using 1");
            }
            value.max(1)
        };

        if config.window_secs == 0 {
            tracing::warn!("Rate limit window is zero, using 1 second");
        }

        let client_ip_header = config.client_ip_header.as_deref().and_then(|name| {
            match HeaderName::from_bytes(name.trim().as_bytes()) {
                Ok(header) => Some(header),
                Err(_) => {
                    tracing::warn!(header = %name, "Ignoring invalid client IP header name");
                    None
                }
            }
        });

        Self {
            enabled: config.enabled,
            global_max: at_least_one("global_max", config.global_max),
            export_max: at_least_one("export_max", config.export_max),
            dispatch_max: at_least_one("dispatch_max", config.dispatch_max),
            window: Duration::from_secs(config.window_secs.max(1)),
            client_ip_header,
            store,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Global => self.global_max,
            Tier::Export => self.export_max,
            Tier::Dispatch => self.dispatch_max,
        }
    }

    /// Value of the `Retry-After` header on rejection, in whole seconds.
    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    /// Count one request for `client` in `tier` and decide whether to admit it.
    pub async fn check(&self, tier: Tier, client: &str) -> RateLimitDecision {
        let key = tier.key(client);
        match self.store.increment(&key, self.window).await {
            Some(count) if count > self.max_for(tier) => RateLimitDecision::Limited {
                retry_after_secs: self.retry_after_secs(),
            },
            count => RateLimitDecision::Allowed { count },
        }
    }

    /// Client address used as the bucket identity.
    ///
    /// The configured proxy header wins when it holds a valid IP; otherwise
    /// the peer address from `ConnectInfo`; otherwise `"unknown"`.
    pub fn client_address<B>(&self, request: &axum::http::Request<B>) -> String {
        let forwarded = self.client_ip_header.as_ref().and_then(|name| {
            let value = request.headers().get(name)?.to_str().ok()?;
            let first = value.split(',').next()?.trim();
            first.parse::<IpAddr>().ok()
        });
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Middleware enforcing the three-tier limits.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let tier = match classify(request.method(), request.uri().path()) {
        Classification::Bypass => return next.run(request).await,
        Classification::Limited(tier) => tier,
    };

    let client = limiter.client_address(&request);
    match limiter.check(tier, &client).await {
        RateLimitDecision::Allowed { .. } => next.run(request).await,
        RateLimitDecision::Limited { retry_after_secs } => {
            tracing::warn!(
                client = %client,
                tier = tier.as_str(),
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(tier.as_str());
            ApiError::RateLimitExceeded { retry_after_secs }.into_response()
        }
    }
}
