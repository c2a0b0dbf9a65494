use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::config::RateLimitSettings;
use crate::response::json_error;
use crate::state::AppState;

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Fixed-window limit on `/api/auth/*`, keyed by client IP.
pub async fn auth_rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/api/auth") {
        return next.run(req).await;
    }

    let ip = extract_client_ip(&req, state.config().trust_proxy)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let check = state.auth_limiter().check(ip).await;

    if !check.allowed {
        tracing::warn!(%ip, "auth rate limit exceeded");
        let mut res = json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_AUTH_REQUESTS",
            "Too many authentication attempts, try again later",
        )
        .into_response();
        apply_rate_limit_headers(&mut res, check);
        return res;
    }

    let mut res = next.run(req).await;
    apply_rate_limit_headers(&mut res, check);
    res
}

fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    if let Ok(value) = HeaderValue::from_str(&check.limit.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_LIMIT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.remaining.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_REMAINING, value);
    }
    if let Ok(value) = HeaderValue::from_str(&check.reset_after_seconds.to_string()) {
        res.headers_mut().insert(RATE_LIMIT_RESET, value.clone());
        if check.remaining == 0 {
            res.headers_mut().insert(RETRY_AFTER, value);
        }
    }
}

#[derive(Debug)]
struct LimiterState {
    entries: HashMap<IpAddr, Entry>,
    last_cleanup_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    window_start_ms: u64,
    hits: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitCheck {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after_seconds: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                last_cleanup_ms: now_ms(),
            }),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitCheck {
        self.check_at(ip, now_ms()).await
    }

    async fn check_at(&self, ip: IpAddr, now_ms: u64) -> RateLimitCheck {
        let window_ms = self.settings.window_ms;
        let max = self.settings.max;
        let mut state = self.state.lock().await;

        if now_ms.saturating_sub(state.last_cleanup_ms) >= window_ms {
            state
                .entries
                .retain(|_, entry| now_ms.saturating_sub(entry.window_start_ms) < window_ms);
            state.last_cleanup_ms = now_ms;
        }

        let entry = state.entries.entry(ip).or_insert(Entry {
            window_start_ms: now_ms,
            hits: 0,
        });

        if now_ms.saturating_sub(entry.window_start_ms) >= window_ms {
            entry.window_start_ms = now_ms;
            entry.hits = 0;
        }

        entry.hits = entry.hits.saturating_add(1);
        let allowed = entry.hits <= max;
        let reset_after_ms = window_ms.saturating_sub(now_ms.saturating_sub(entry.window_start_ms));

        RateLimitCheck {
            allowed,
            limit: max,
            remaining: if allowed { max - entry.hits } else { 0 },
            reset_after_seconds: reset_after_ms.div_ceil(1000),
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn extract_client_ip(req: &Request<Body>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = extract_x_forwarded_for(req) {
            return Some(ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn extract_x_forwarded_for(req: &Request<Body>) -> Option<IpAddr> {
    let raw = req
        .headers()
        .get(HeaderName::from_static("x-forwarded-for"))?
        .to_str()
        .ok()?;
    let first = raw.split(',').next()?.trim();
    first.parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            window_ms: 1_000,
            max,
        })
    }

    #[tokio::test]
    async fn blocks_after_max_hits_in_window() {
        let limiter = limiter(2);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert!(limiter.check_at(ip, 10_000).await.allowed);
        let second = limiter.check_at(ip, 10_100).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
        assert!(!limiter.check_at(ip, 10_200).await.allowed);
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = limiter(1);
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(limiter.check_at(ip, 20_000).await.allowed);
        assert!(!limiter.check_at(ip, 20_500).await.allowed);
        assert!(limiter.check_at(ip, 21_000).await.allowed);
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = limiter(1);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 4));
        assert!(limiter.check_at(a, 30_000).await.allowed);
        assert!(limiter.check_at(b, 30_000).await.allowed);
    }
}
