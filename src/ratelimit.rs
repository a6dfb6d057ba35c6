use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{config::RateLimitConfig, errors::ApiError};

/// Windows are only swept once the table holds this many clients, and at
/// most once per window.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Default)]
struct Clients {
    windows: HashMap<IpAddr, Window>,
    last_prune: Option<Instant>,
}

impl Clients {
    fn prune(&mut self, now: Instant, window: Duration) {
        if self.windows.len() < PRUNE_THRESHOLD {
            return;
        }
        if matches!(self.last_prune, Some(at) if now.duration_since(at) < window) {
            return;
        }
        self.windows.retain(|_, w| now.duration_since(w.started) < window);
        self.last_prune = Some(now);
    }
}

/// Fixed-window request counter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    trust_proxy: bool,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    pub fn new(cfg: &RateLimitConfig) -> Self {
        Self {
            limit: cfg.requests.max(1),
            window: Duration::from_secs(cfg.window_secs.max(1)),
            trust_proxy: cfg.trust_proxy,
            clients: Mutex::new(Clients::default()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients.prune(now, self.window);

        let w = clients.windows.entry(client).or_insert(Window { started: now, count: 0 });
        if now.duration_since(w.started) >= self.window {
            w.started = now;
            w.count = 0;
        }

        if w.count >= self.limit {
            let retry_after = self.window.saturating_sub(now.duration_since(w.started));
            return Decision::Limited { retry_after };
        }
        w.count += 1;
        Decision::Allowed { remaining: self.limit - w.count }
    }

    /// Peer address, or the first `X-Forwarded-For` hop behind a trusted proxy.
    fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
        if self.trust_proxy {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
            if let Some(ip) = forwarded {
                return ip;
            }
        }
        peer.map(|a| a.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = limiter.client_key(req.headers(), peer);

    match limiter.check(client) {
        Decision::Allowed { remaining } => {
            let mut res = next.run(req).await;
            let headers = res.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.limit()));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            res
        }
        Decision::Limited { retry_after } => {
            warn!(%client, "rate limit exceeded");
            // Round up so clients never retry early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let mut res = ApiError::TooManyRequests { retry_after_secs: secs.max(1) }.into_response();
            res.headers_mut()
                .insert("ratelimit-limit", HeaderValue::from(limiter.limit()));
            res.headers_mut()
                .insert("ratelimit-remaining", HeaderValue::from(0u32));
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, window_secs: u64, trust_proxy: bool) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig { requests, window_secs, trust_proxy })
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn counts_down_then_limits() {
        let rl = limiter(2, 60, false);
        let t0 = Instant::now();
        assert_eq!(rl.check_at(ip(1), t0), Decision::Allowed { remaining: 1 });
        assert_eq!(rl.check_at(ip(1), t0), Decision::Allowed { remaining: 0 });
        match rl.check_at(ip(1), t0 + Duration::from_secs(15)) {
            Decision::Limited { retry_after } => assert_eq!(retry_after, Duration::from_secs(45)),
            other => panic!("expected limit, got {:?}", other),
        }
    }

    #[test]
    fn clients_are_independent() {
        let rl = limiter(1, 60, false);
        let t0 = Instant::now();
        assert!(matches!(rl.check_at(ip(1), t0), Decision::Allowed { .. }));
        assert!(matches!(rl.check_at(ip(1), t0), Decision::Limited { .. }));
        assert!(matches!(rl.check_at(ip(2), t0), Decision::Allowed { .. }));
    }

    #[test]
    fn window_resets() {
        let rl = limiter(1, 10, false);
        let t0 = Instant::now();
        assert!(matches!(rl.check_at(ip(1), t0), Decision::Allowed { .. }));
        assert!(matches!(rl.check_at(ip(1), t0 + Duration::from_secs(9)), Decision::Limited { .. }));
        assert_eq!(
            rl.check_at(ip(1), t0 + Duration::from_secs(10)),
            Decision::Allowed { remaining: 0 }
        );
    }

    #[test]
    fn forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();

        let trusting = limiter(1, 60, true);
        assert_eq!(
            trusting.client_key(&headers, Some(peer)),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );

        let strict = limiter(1, 60, false);
        assert_eq!(strict.client_key(&headers, Some(peer)), peer.ip());
        assert_eq!(
            strict.client_key(&HeaderMap::new(), None),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn pruning_runs_at_most_once_per_window() {
        let rl = limiter(5, 60, false);
        let tracked = || rl.clients.lock().unwrap().windows.len();
        let t0 = Instant::now();
        for i in 0..PRUNE_THRESHOLD as u32 {
            rl.check_at(IpAddr::V4(Ipv4Addr::from(i)), t0);
        }
        assert_eq!(tracked(), PRUNE_THRESHOLD);

        // First sweep: nothing has expired yet.
        rl.check_at(ip(1), t0 + Duration::from_secs(30));
        assert_eq!(tracked(), PRUNE_THRESHOLD + 1);

        // The bulk has expired, but the last sweep was only 30s ago.
        rl.check_at(ip(2), t0 + Duration::from_secs(60));
        assert_eq!(tracked(), PRUNE_THRESHOLD + 2);

        // A full window after the last sweep everything stale goes.
        rl.check_at(ip(3), t0 + Duration::from_secs(90));
        assert_eq!(tracked(), 2);
    }

    #[test]
    fn zero_config_is_clamped() {
        let rl = limiter(0, 0, false);
        assert_eq!(rl.limit(), 1);
        assert!(matches!(rl.check(ip(9)), Decision::Allowed { remaining: 0 }));
    }
}
