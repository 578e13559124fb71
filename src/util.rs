use rand::Rng;
use reqwest::Url;
use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 408 | 429) || (500..=599).contains(&code)
}

/// Delay before retry number `retry` (0-based): `base * 2^retry`, capped at `max`.
pub(crate) fn backoff(retry: u32, base: Duration, max: Duration) -> Duration {
    let next = base.saturating_mul(2_u32.saturating_pow(retry));
    if next > max { max } else { next }
}

/// Spreads `delay` uniformly over `[delay/2, delay]`.
pub(crate) fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let half = delay / 2;
    let spread = rand::rng().random_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(spread)
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Keeps the first three characters of a username, e.g. `ali***`.
pub fn mask_username(username: &str) -> String {
    let visible: String = username.chars().take(3).collect();
    if username.chars().count() <= 3 {
        // Short names would otherwise be printed in full.
        let first: String = username.chars().take(1).collect();
        return format!("{}***", first);
    }
    format!("{}***", visible)
}

/// Proxy settings may embed `user:pass@`; the password is replaced by `***`.
pub(crate) fn redact_url_password(value: &str) -> String {
    if let Ok(mut url) = Url::parse(value) {
        if url.password().is_some() && url.set_password(Some("***")).is_ok() {
            return url.to_string();
        }
        if url.has_host() {
            return value.to_string();
        }
    }
    // `user:pass@host:port` without a scheme parses as something else.
    match value.rsplit_once('@') {
        Some((userinfo, host)) => {
            let scheme = userinfo
                .split_once("://")
                .map(|(s, _)| format!("{}://", s))
                .unwrap_or_default();
            format!("{}***@{}", scheme, host)
        }
        None => value.to_string(),
    }
}
