use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::AppState;
use crate::auth::parse_token;

const WINDOW: Duration = Duration::from_secs(60);

/// Per 60-second window: read 120/ip + 600/token, write 30/ip + 120/token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Read,
    Write,
}

impl RequestClass {
    fn ip_limit(self) -> u32 {
        match self {
            RequestClass::Read => 120,
            RequestClass::Write => 30,
        }
    }

    fn token_limit(self) -> u32 {
        match self {
            RequestClass::Read => 600,
            RequestClass::Write => 120,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

struct Counter {
    window_start: Instant,
    count: u32,
}

/// Keyed fixed-window counters. The only shared in-process state on the
/// server; owned by `AppState` and mutated under a single lock.
pub struct RateLimiter {
    counters: Mutex<HashMap<String, Counter>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Applies both budgets. Headers reflect the more restrictive counter;
    /// either one denying denies the request.
    pub fn check(&self, class: RequestClass, ip: &str, token_lookup: Option<&str>) -> Decision {
        let ip_decision = self.check_key(&format!("{}:ip:{ip}", class_key(class)), class.ip_limit());

        match token_lookup {
            Some(lookup) => {
                let token_decision = self.check_key(
                    &format!("{}:tok:{lookup}", class_key(class)),
                    class.token_limit(),
                );
                more_restrictive(ip_decision, token_decision)
            }
            None => ip_decision,
        }
    }

    fn check_key(&self, key: &str, limit: u32) -> Decision {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());

        // Lazy reap of stale windows once the table gets big.
        if counters.len() > 10_000 {
            counters.retain(|_, c| now.duration_since(c.window_start) < WINDOW);
        }

        let counter = counters.entry(key.to_string()).or_insert(Counter {
            window_start: now,
            count: 0,
        });

        if now.duration_since(counter.window_start) >= WINDOW {
            counter.window_start = now;
            counter.count = 0;
        }

        let elapsed = now.duration_since(counter.window_start);
        let reset_secs = WINDOW.saturating_sub(elapsed).as_secs().max(1);

        if counter.count >= limit {
            return Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
            };
        }

        counter.count += 1;
        Decision {
            allowed: true,
            limit,
            remaining: limit - counter.count,
            reset_secs,
        }
    }
}

fn class_key(class: RequestClass) -> &'static str {
    match class {
        RequestClass::Read => "r",
        RequestClass::Write => "w",
    }
}

fn more_restrictive(a: Decision, b: Decision) -> Decision {
    let mut d = if !a.allowed {
        a
    } else if !b.allowed {
        b
    } else if a.remaining <= b.remaining {
        a
    } else {
        b
    };
    d.allowed = a.allowed && b.allowed;
    d
}

/// Client IP, from the first proxy header present.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    for header in ["cf-connecting-ip", "x-real-ip"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = value.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(value) = headers.get("fly-client-ip").and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }
    "unknown".to_string()
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let class = match *request.method() {
        Method::GET | Method::HEAD => RequestClass::Read,
        _ => RequestClass::Write,
    };

    let ip = client_ip(request.headers());
    let token_lookup = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|raw| parse_token(raw).ok())
        .map(|(lookup, _)| lookup);

    let decision = state
        .limiter
        .check(class, &ip, token_lookup.as_deref());

    if !decision.allowed {
        let body = json!({ "data": null, "error": "Rate limit exceeded" });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_headers(&mut response, decision);
        response.headers_mut().insert(
            "Retry-After",
            decision.reset_secs.to_string().parse().unwrap(),
        );
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(&mut response, decision);
    response
}

fn apply_headers(response: &mut Response, decision: Decision) {
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        decision.limit.to_string().parse().unwrap(),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        decision.remaining.to_string().parse().unwrap(),
    );
    headers.insert(
        "X-RateLimit-Reset",
        decision.reset_secs.to_string().parse().unwrap(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nth_request_remaining() {
        let limiter = RateLimiter::new();
        for n in 1..=30u32 {
            let d = limiter.check(RequestClass::Write, "1.2.3.4", None);
            assert!(d.allowed);
            assert_eq!(d.remaining, 30 - n);
        }

        let denied = limiter.check(RequestClass::Write, "1.2.3.4", None);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_secs >= 1 && denied.reset_secs <= 60);
    }

    #[test]
    fn test_classes_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            assert!(limiter.check(RequestClass::Write, "1.2.3.4", None).allowed);
        }
        assert!(!limiter.check(RequestClass::Write, "1.2.3.4", None).allowed);
        assert!(limiter.check(RequestClass::Read, "1.2.3.4", None).allowed);
    }

    #[test]
    fn test_ips_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            assert!(limiter.check(RequestClass::Write, "1.1.1.1", None).allowed);
        }
        assert!(!limiter.check(RequestClass::Write, "1.1.1.1", None).allowed);
        assert!(limiter.check(RequestClass::Write, "2.2.2.2", None).allowed);
    }

    #[test]
    fn test_token_budget_is_more_permissive() {
        let limiter = RateLimiter::new();
        let d = limiter.check(RequestClass::Read, "1.2.3.4", Some("abcd1234"));
        assert!(d.allowed);
        // Headers reflect the tighter per-IP counter.
        assert_eq!(d.limit, 120);
        assert_eq!(d.remaining, 119);
    }

    #[test]
    fn test_client_ip_header_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 8.8.8.8".parse().unwrap());
        headers.insert("cf-connecting-ip", "1.1.1.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "1.1.1.1");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 8.8.8.8".parse().unwrap());
        assert_eq!(client_ip(&headers), "9.9.9.9");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
