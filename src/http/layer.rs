//! Tower middleware that applies a rate limiter to HTTP requests.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::request::Parts;
use http::{HeaderMap, Request, StatusCode};
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::headers::HeaderNames;
use super::key::{key_all, key_by_ip, key_by_real_ip, KeyError, KeyFunc};
use super::rules::{path_matches, OverrideRules};
use crate::error::{BackendError, Result};
use crate::ratelimit::{RateLimiter, RequestOverrides};

/// Produces the overrides for one request.
pub type OverrideFunc = Arc<dyn Fn(&Parts) -> RequestOverrides + Send + Sync>;
/// Writes the response for a rate limited request.
pub type LimitHandler = Arc<dyn Fn(&Parts) -> Response + Send + Sync>;
/// Writes the response for a request whose client key could not be derived.
pub type KeyErrorHandler = Arc<dyn Fn(&Parts, &KeyError) -> Response + Send + Sync>;
/// Writes the response when the counter backend failed.
pub type BackendErrorHandler = Arc<dyn Fn(&Parts, &BackendError) -> Response + Send + Sync>;

/// What a layer decided for one request. Exactly one variant per request.
#[derive(Debug)]
pub enum Admission {
    /// The layer does not apply to this request
    Bypass,
    /// Proceed; the headers describe the remaining budget
    Admitted(HeaderMap),
    /// Rejected by the limiter
    Limited(Response),
    /// No client key could be derived
    Precondition(Response),
    /// The counter backend failed and the layer fails closed
    Failed(Response),
}

impl Admission {
    /// Whether the request may continue to the next stage.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Bypass | Admission::Admitted(_))
    }
}

/// A rate limiting layer.
///
/// Each layer owns its own limiter, so stacking layers (a broad limit
/// outside, a narrow per-route limit inside) gives independent budgets.
/// When both admit a request, the inner layer's headers are kept.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    key_fn: KeyFunc,
    overrides: Option<OverrideFunc>,
    path_prefix: Option<Arc<str>>,
    headers: Arc<HeaderNames>,
    fail_open: bool,
    on_limited: LimitHandler,
    on_key_error: KeyErrorHandler,
    on_error: BackendErrorHandler,
}

impl RateLimitLayer {
    /// Limit every request against one shared key.
    pub fn new(limiter: RateLimiter) -> Self {
        Self::from_shared(Arc::new(limiter))
    }

    /// Build a layer around a limiter that is also used elsewhere.
    pub fn from_shared(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            key_fn: Arc::new(key_all),
            overrides: None,
            path_prefix: None,
            headers: Arc::new(HeaderNames::default()),
            fail_open: false,
            on_limited: Arc::new(too_many_requests),
            on_key_error: Arc::new(precondition_required),
            on_error: Arc::new(backend_failure),
        }
    }

    /// `request_limit` per `window_length` across all clients.
    pub fn limit_all(request_limit: u64, window_length: Duration) -> Result<Self> {
        Ok(Self::new(RateLimiter::new(request_limit, window_length)?))
    }

    /// `request_limit` per `window_length` per peer address.
    pub fn limit_by_ip(request_limit: u64, window_length: Duration) -> Result<Self> {
        Ok(Self::limit_all(request_limit, window_length)?.key_fn(Arc::new(key_by_ip)))
    }

    /// `request_limit` per `window_length` per proxy-reported client address.
    pub fn limit_by_real_ip(request_limit: u64, window_length: Duration) -> Result<Self> {
        Ok(Self::limit_all(request_limit, window_length)?.key_fn(Arc::new(key_by_real_ip)))
    }

    pub fn key_fn(mut self, key_fn: KeyFunc) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Derive per-request overrides with `f`.
    pub fn overrides<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> RequestOverrides + Send + Sync + 'static,
    {
        self.overrides = Some(Arc::new(f));
        self
    }

    /// Derive per-request overrides from a rule set.
    pub fn override_rules(self, rules: OverrideRules) -> Self {
        if rules.is_empty() {
            return self;
        }
        self.overrides(move |parts| rules.resolve(parts))
    }

    /// Only limit requests whose path lies under `prefix`.
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(Arc::from(prefix.into()));
        self
    }

    pub fn response_headers(mut self, headers: HeaderNames) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    /// Let requests through when the counter backend fails.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn on_limited<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> Response + Send + Sync + 'static,
    {
        self.on_limited = Arc::new(f);
        self
    }

    pub fn on_key_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts, &KeyError) -> Response + Send + Sync + 'static,
    {
        self.on_key_error = Arc::new(f);
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts, &BackendError) -> Response + Send + Sync + 'static,
    {
        self.on_error = Arc::new(f);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run the full admission check for a request.
    pub async fn admit(&self, parts: &Parts) -> Admission {
        if let Some(prefix) = &self.path_prefix {
            if !path_matches(prefix, parts.uri.path()) {
                return Admission::Bypass;
            }
        }

        let key = match (self.key_fn)(parts) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %parts.uri.path(), error = %e, "Could not derive rate limit key");
                return Admission::Precondition((self.on_key_error)(parts, &e));
            }
        };

        self.on_limit(parts, &key).await
    }

    /// Check a request against an explicitly supplied client key.
    ///
    /// For handlers whose key comes from somewhere other than the request
    /// metadata, such as a username in a login form.
    pub async fn on_limit(&self, parts: &Parts, key: &str) -> Admission {
        let overrides = self
            .overrides
            .as_ref()
            .map(|f| f(parts))
            .unwrap_or_default();

        match self.limiter.check(key, &overrides).await {
            Ok(None) => Admission::Bypass,
            Ok(Some(decision)) => {
                let headers = self.headers.render(&decision);
                if decision.admitted {
                    Admission::Admitted(headers)
                } else {
                    debug!(key = %key, path = %parts.uri.path(), "Request rate limited");
                    let mut response = (self.on_limited)(parts);
                    merge_headers(response.headers_mut(), &headers);
                    Admission::Limited(response)
                }
            }
            Err(e) if self.fail_open => {
                warn!(key = %key, error = %e, "Rate limit backend failed, admitting request");
                Admission::Admitted(HeaderMap::new())
            }
            Err(e) => {
                error!(key = %key, error = %e, "Rate limit backend failed");
                Admission::Failed((self.on_error)(parts, &e))
            }
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            layer: self.clone(),
        }
    }
}

/// The service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    layer: RateLimitLayer,
}

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let layer = self.layer.clone();
        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let admission = layer.admit(&parts).await;
            match admission {
                Admission::Bypass => inner.call(Request::from_parts(parts, body)).await,
                Admission::Admitted(headers) => {
                    let mut response = inner.call(Request::from_parts(parts, body)).await?;
                    merge_headers(response.headers_mut(), &headers);
                    Ok(response)
                }
                Admission::Limited(response)
                | Admission::Precondition(response)
                | Admission::Failed(response) => Ok(response),
            }
        })
    }
}

/// Add `headers` to `target` without replacing anything already set.
fn merge_headers(target: &mut HeaderMap, headers: &HeaderMap) {
    for (name, value) in headers {
        if !target.contains_key(name) {
            target.insert(name.clone(), value.clone());
        }
    }
}

fn too_many_requests(_parts: &Parts) -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response()
}

fn precondition_required(_parts: &Parts, error: &KeyError) -> Response {
    (StatusCode::PRECONDITION_REQUIRED, error.to_string()).into_response()
}

fn backend_failure(_parts: &Parts, error: &BackendError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::routing::{get, post};
    use axum::Router;
    use http::HeaderName;
    use tower::ServiceExt;

    use crate::http::headers::ResponseHeaders;
    use crate::http::key::key_by_header;
    use crate::ratelimit::testing::{CountingCounter, FailingCounter};
    use crate::ratelimit::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);
    const T0: i64 = 1_700_000_040;

    fn limiter(limit: u64) -> RateLimiter {
        RateLimiter::builder(limit, MINUTE)
            .clock(Arc::new(ManualClock::at_unix(T0)))
            .build()
            .unwrap()
    }

    fn app(layer: RateLimitLayer) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/login", post(|| async { "welcome" }))
            .layer(layer)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn from_peer(peer: &str) -> Request<Body> {
        let mut req = request("GET", "/");
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    fn weighted(weight: u64) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("x-weight", weight)
            .body(Body::empty())
            .unwrap()
    }

    fn weight_from_header(parts: &Parts) -> RequestOverrides {
        let weight = parts
            .headers
            .get("x-weight")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        RequestOverrides {
            increment: weight,
            ..RequestOverrides::default()
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_response_headers_sequence() {
        let app = app(RateLimitLayer::new(limiter(5)));

        let mut statuses = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..6 {
            let response = send(&app, request("GET", "/")).await;
            assert_eq!(header(&response, "x-ratelimit-limit"), Some("5"));
            assert_eq!(header(&response, "x-ratelimit-reset"), Some("1700000100"));
            statuses.push(response.status().as_u16());
            remaining.push(header(&response, "x-ratelimit-remaining").unwrap().to_string());
        }

        assert_eq!(statuses, vec![200, 200, 200, 200, 200, 429]);
        assert_eq!(remaining, vec!["4", "3", "2", "1", "0", "0"]);
    }

    #[tokio::test]
    async fn test_retry_after_only_on_rejection() {
        let app = app(RateLimitLayer::new(limiter(1)));

        let admitted = send(&app, request("GET", "/")).await;
        assert!(header(&admitted, "retry-after").is_none());

        let rejected = send(&app, request("GET", "/")).await;
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&rejected, "retry-after"), Some("60"));
        assert_eq!(body_text(rejected).await, "Too Many Requests");
    }

    #[tokio::test]
    async fn test_varying_increments() {
        let app = app(RateLimitLayer::new(limiter(5)).overrides(weight_from_header));

        let cases = [
            (2, 200, "3"),
            (2, 200, "1"),
            (1, 200, "0"),
            (2, 429, "0"),
            (10, 429, "0"),
            (1, 429, "0"),
        ];
        for (weight, status, remaining) in cases {
            let response = send(&app, weighted(weight)).await;
            assert_eq!(response.status().as_u16(), status, "weight {}", weight);
            assert_eq!(header(&response, "x-ratelimit-remaining"), Some(remaining));
        }
    }

    #[tokio::test]
    async fn test_increment_header_echoes_heavy_requests() {
        let app = app(RateLimitLayer::new(limiter(5)).overrides(weight_from_header));

        let response = send(&app, weighted(2)).await;
        assert_eq!(header(&response, "x-ratelimit-increment"), Some("2"));

        let response = send(&app, weighted(1)).await;
        assert!(header(&response, "x-ratelimit-increment").is_none());
    }

    #[tokio::test]
    async fn test_zero_increment_never_limits() {
        let app = app(RateLimitLayer::new(limiter(5)).overrides(weight_from_header));

        for _ in 0..6 {
            let response = send(&app, weighted(0)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-remaining"), Some("5"));
        }
    }

    #[tokio::test]
    async fn test_oversized_increment_always_blocks() {
        let app = app(RateLimitLayer::new(limiter(5)).overrides(weight_from_header));

        for _ in 0..3 {
            let response = send(&app, weighted(10)).await;
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(header(&response, "x-ratelimit-remaining"), Some("5"));
        }
    }

    #[tokio::test]
    async fn test_key_error_skips_backend() {
        let counter = Arc::new(CountingCounter::new(MINUTE));
        let limiter = RateLimiter::builder(5, MINUTE)
            .counter(counter.clone())
            .build()
            .unwrap();
        let layer = RateLimitLayer::new(limiter)
            .key_fn(key_by_header(HeaderName::from_static("x-api-key")));
        let app = app(layer);

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
        assert!(header(&response, "x-ratelimit-limit").is_none());
        assert_eq!(counter.gets(), 0);
        assert_eq!(counter.increments(), 0);
    }

    #[tokio::test]
    async fn test_custom_handler_and_header_names() {
        let names = HeaderNames::try_from(&ResponseHeaders {
            limit: "RateLimit-Limit".to_string(),
            remaining: "RateLimit-Remaining".to_string(),
            reset: "RateLimit-Reset".to_string(),
            retry_after: "RateLimit-Retry".to_string(),
            increment: String::new(),
        })
        .unwrap();
        let layer = RateLimitLayer::new(limiter(1))
            .overrides(weight_from_header)
            .response_headers(names)
            .on_limited(|_parts: &Parts| {
                (StatusCode::TOO_MANY_REQUESTS, "Wow Slow Down Kiddo").into_response()
            });
        let app = app(layer);

        let response = send(&app, weighted(2)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        for name in [
            "x-ratelimit-limit",
            "x-ratelimit-remaining",
            "x-ratelimit-increment",
            "x-ratelimit-reset",
            "retry-after",
        ] {
            assert!(header(&response, name).is_none(), "{} not expected", name);
        }
        for name in [
            "ratelimit-limit",
            "ratelimit-remaining",
            "ratelimit-reset",
            "ratelimit-retry",
        ] {
            assert!(header(&response, name).is_some(), "{} expected", name);
        }
        assert_eq!(body_text(response).await, "Wow Slow Down Kiddo");
    }

    #[tokio::test]
    async fn test_headers_disabled() {
        let names = HeaderNames::try_from(&ResponseHeaders::none()).unwrap();
        let app = app(RateLimitLayer::new(limiter(1)).response_headers(names));

        send(&app, request("GET", "/")).await;
        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(header(&response, "retry-after").is_none());
        assert!(header(&response, "x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_fails_closed_by_default() {
        let limiter = RateLimiter::builder(5, MINUTE)
            .counter(Arc::new(FailingCounter { fail_reads: true }))
            .build()
            .unwrap();
        let app = app(RateLimitLayer::new(limiter));

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_backend_failure_custom_handler() {
        let limiter = RateLimiter::builder(5, MINUTE)
            .counter(Arc::new(FailingCounter { fail_reads: false }))
            .build()
            .unwrap();
        let layer = RateLimitLayer::new(limiter).on_error(|_parts: &Parts, _e: &BackendError| {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        });
        let app = app(layer);

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_backend_failure_fail_open() {
        let limiter = RateLimiter::builder(5, MINUTE)
            .counter(Arc::new(FailingCounter { fail_reads: true }))
            .build()
            .unwrap();
        let app = app(RateLimitLayer::new(limiter).fail_open());

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_limit_by_ip() {
        let app = app(RateLimitLayer::limit_by_ip(1, Duration::from_secs(3600)).unwrap());

        let codes = [("1.1.1.1:100", 200), ("1.1.1.1:100", 429), ("2.2.2.2:200", 200)];
        for (peer, code) in codes {
            let response = send(&app, from_peer(peer)).await;
            assert_eq!(response.status().as_u16(), code, "peer {}", peer);
        }
    }

    #[tokio::test]
    async fn test_limit_by_ipv6_prefix() {
        let app = app(RateLimitLayer::new(limiter(1)).key_fn(Arc::new(key_by_ip)));

        let codes = [
            ("[2001:db8::21f:5bff:febf:ce22:1111]:80", 200),
            ("[2001:db8::21f:5bff:febf:ce22:2222]:80", 429),
            ("[2002:db8::21f:5bff:febf:ce22:1111]:80", 200),
        ];
        for (peer, code) in codes {
            let response = send(&app, from_peer(peer)).await;
            assert_eq!(response.status().as_u16(), code, "peer {}", peer);
        }
    }

    #[tokio::test]
    async fn test_missing_peer_address_is_precondition_failure() {
        let app = app(RateLimitLayer::new(limiter(1)).key_fn(Arc::new(key_by_ip)));

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
    }

    #[tokio::test]
    async fn test_limit_override_per_request() {
        let layer = RateLimitLayer::new(limiter(3)).overrides(|parts: &Parts| {
            let limit = parts
                .headers
                .get("x-limit")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            match limit {
                Some(limit) => RequestOverrides::default().with_limit(limit),
                None => RequestOverrides::default(),
            }
        });
        let app = app(layer);

        let cases = [
            (None, 200),
            (Some(1), 429),
            (None, 200),
            (None, 200),
            (None, 429),
            (Some(5), 200),
            (Some(5), 200),
            (Some(5), 429),
        ];
        for (i, (limit, code)) in cases.into_iter().enumerate() {
            let mut req = request("GET", "/");
            if let Some(limit) = limit {
                req.headers_mut().insert("x-limit", limit.into());
            }
            let response = send(&app, req).await;
            assert_eq!(response.status().as_u16(), code, "request {}", i);
        }
    }

    #[tokio::test]
    async fn test_no_limit_override_bypasses() {
        let counter = Arc::new(CountingCounter::new(MINUTE));
        let limiter = RateLimiter::builder(1, MINUTE)
            .counter(counter.clone())
            .build()
            .unwrap();
        let layer = RateLimitLayer::new(limiter)
            .overrides(|_parts: &Parts| RequestOverrides::default().no_limit());
        let app = app(layer);

        for _ in 0..3 {
            let response = send(&app, request("GET", "/")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(header(&response, "x-ratelimit-limit").is_none());
        }
        assert_eq!(counter.gets(), 0);
    }

    #[tokio::test]
    async fn test_override_rules() {
        let rules = OverrideRules::from_yaml(
            r#"
- path_prefix: /login
  methods: [POST]
  requests_limit: 1
"#,
        )
        .unwrap();
        let app = app(RateLimitLayer::new(limiter(10)).override_rules(rules));

        let response = send(&app, request("POST", "/login")).await;
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("1"));
        let response = send(&app, request("POST", "/login")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("10"));
    }

    #[tokio::test]
    async fn test_path_prefix_scoping() {
        let app = app(RateLimitLayer::new(limiter(1)).path_prefix("/login"));

        for _ in 0..3 {
            let response = send(&app, request("GET", "/")).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(header(&response, "x-ratelimit-limit").is_none());
        }

        assert_eq!(send(&app, request("POST", "/login")).await.status(), StatusCode::OK);
        assert_eq!(
            send(&app, request("POST", "/login")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_stacked_layers_are_independent() {
        let login = RateLimitLayer::new(limiter(1)).path_prefix("/login");
        let global = RateLimitLayer::new(limiter(3));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/login", post(|| async { "welcome" }))
            .layer(login)
            .layer(global);

        let response = send(&app, request("POST", "/login")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("1"));

        let response = send(&app, request("POST", "/login")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("1"));

        // The global layer admitted both login attempts before the login layer ran.
        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some("0"));

        let response = send(&app, request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("3"));
    }

    #[tokio::test]
    async fn test_on_limit_with_explicit_key() {
        let layer = RateLimitLayer::new(limiter(1));
        let (parts, _) = request("POST", "/login").into_parts();

        assert!(layer.on_limit(&parts, "alice").await.is_admitted());
        let second = layer.on_limit(&parts, "alice").await;
        assert!(matches!(second, Admission::Limited(_)));
        assert!(layer.on_limit(&parts, "bob").await.is_admitted());

        let status = layer.limiter().status("alice").await.unwrap();
        assert_eq!(status.rate, 1.0);
        assert!(status.within_limit);
    }
}
