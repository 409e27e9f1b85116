//! Randomized browser-like request headers
//!
//! Selection is a pure function of the supplied RNG, so a seeded RNG gives
//! reproducible header sets.

use http::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL,
    CONNECTION, DNT, PRAGMA, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::HeaderPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformClass {
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Copy)]
pub struct UserAgentEntry {
    pub value: &'static str,
    pub weight: u32,
    pub platform: PlatformClass,
}

pub static USER_AGENTS: &[UserAgentEntry] = &[
    UserAgentEntry {
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        weight: 5,
        platform: PlatformClass::Desktop,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        weight: 2,
        platform: PlatformClass::Desktop,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
        weight: 3,
        platform: PlatformClass::Desktop,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        weight: 1,
        platform: PlatformClass::Desktop,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        weight: 4,
        platform: PlatformClass::Mobile,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Mobile Safari/537.36",
        weight: 2,
        platform: PlatformClass::Mobile,
    },
    UserAgentEntry {
        value: "Mozilla/5.0 (Linux; Android 13; SM-G996B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Mobile Safari/537.36",
        weight: 2,
        platform: PlatformClass::Mobile,
    },
];

pub static ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,fr;q=0.6",
    "en-US,en;q=0.8,de;q=0.5",
];

pub static ACCEPT_VALUES: &[&str] = &[
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
];

/// Used when the caller does not supply a referer
pub static DEFAULT_REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

/// Draw a User-Agent: first the platform class, then a weighted entry of that class
pub fn pick_user_agent<R: Rng + ?Sized>(
    rng: &mut R,
    policy: &HeaderPolicy,
    force_mobile: bool,
) -> &'static UserAgentEntry {
    let platform = if force_mobile || rng.gen_bool(policy.mobile_probability.clamp(0.0, 1.0)) {
        PlatformClass::Mobile
    } else {
        PlatformClass::Desktop
    };

    let candidates: Vec<&'static UserAgentEntry> = USER_AGENTS
        .iter()
        .filter(|entry| entry.platform == platform)
        .collect();

    candidates
        .choose_weighted(rng, |entry| entry.weight)
        .map(|entry| *entry)
        .unwrap_or(&USER_AGENTS[0])
}

/// Domains served from an `m.` host always get a mobile profile
pub fn prefers_mobile(domain: &str) -> bool {
    domain.starts_with("m.")
}

/// Build a full browser-like header set
///
/// `extra` is applied last and overrides anything generated.
pub fn build_headers<R: Rng + ?Sized>(
    rng: &mut R,
    policy: &HeaderPolicy,
    domain: &str,
    referer: Option<&str>,
    extra: &HeaderMap,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let ua = pick_user_agent(rng, policy, prefers_mobile(domain));
    headers.insert(USER_AGENT, HeaderValue::from_static(ua.value));

    if let Some(accept) = ACCEPT_VALUES.choose(rng) {
        headers.insert(ACCEPT, HeaderValue::from_static(*accept));
    }
    if let Some(lang) = ACCEPT_LANGUAGES.choose(rng) {
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(*lang));
    }
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

    let referer = if rng.gen_bool(policy.referer_probability.clamp(0.0, 1.0)) {
        match referer {
            Some(r) => HeaderValue::from_str(r).ok(),
            None => DEFAULT_REFERERS
                .choose(rng)
                .map(|r| HeaderValue::from_static(*r)),
        }
    } else {
        None
    };

    let site = if referer.is_some() { "cross-site" } else { "none" };
    headers.insert("sec-fetch-site", HeaderValue::from_static(site));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));

    if let Some(value) = referer {
        headers.insert(REFERER, value);
    }
    if rng.gen_bool(policy.dnt_probability.clamp(0.0, 1.0)) {
        headers.insert(DNT, HeaderValue::from_static("1"));
    }
    if rng.gen_bool(policy.cache_control_probability.clamp(0.0, 1.0)) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    }
    if rng.gen_bool(policy.pragma_probability.clamp(0.0, 1.0)) {
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }

    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn platform_of(headers: &HeaderMap) -> PlatformClass {
        let ua = headers.get(USER_AGENT).unwrap().to_str().unwrap();
        USER_AGENTS
            .iter()
            .find(|entry| entry.value == ua)
            .map(|entry| entry.platform)
            .unwrap()
    }

    #[test]
    fn test_user_agent_table_has_both_classes() {
        assert!(USER_AGENTS
            .iter()
            .any(|e| e.platform == PlatformClass::Desktop));
        assert!(USER_AGENTS
            .iter()
            .any(|e| e.platform == PlatformClass::Mobile));
        assert!(USER_AGENTS.iter().all(|e| e.weight > 0));
    }

    #[test]
    fn test_same_seed_same_headers() {
        let policy = HeaderPolicy::default();
        let extra = HeaderMap::new();

        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(
                build_headers(&mut a, &policy, "example.com", None, &extra),
                build_headers(&mut b, &policy, "example.com", None, &extra)
            );
        }
    }

    #[test]
    fn test_mobile_ratio_follows_policy() {
        let policy = HeaderPolicy::default();
        let mut rng = StdRng::seed_from_u64(42);

        let draws = 10_000;
        let mobile = (0..draws)
            .filter(|_| pick_user_agent(&mut rng, &policy, false).platform == PlatformClass::Mobile)
            .count();
        let ratio = mobile as f64 / draws as f64;
        assert!((0.55..0.65).contains(&ratio), "mobile ratio {}", ratio);
    }

    #[test]
    fn test_mobile_probability_extremes() {
        let mut rng = StdRng::seed_from_u64(1);
        let desktop_only = HeaderPolicy {
            mobile_probability: 0.0,
            ..HeaderPolicy::default()
        };
        for _ in 0..100 {
            assert_eq!(
                pick_user_agent(&mut rng, &desktop_only, false).platform,
                PlatformClass::Desktop
            );
            // The m. hint wins over the policy
            assert_eq!(
                pick_user_agent(&mut rng, &desktop_only, true).platform,
                PlatformClass::Mobile
            );
        }
    }

    #[test]
    fn test_mobile_domain_hint() {
        let policy = HeaderPolicy {
            mobile_probability: 0.0,
            ..HeaderPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let headers = build_headers(&mut rng, &policy, "m.example.com", None, &HeaderMap::new());
        assert_eq!(platform_of(&headers), PlatformClass::Mobile);
        assert!(prefers_mobile("m.example.com"));
        assert!(!prefers_mobile("example.com"));
    }

    #[test]
    fn test_referer_inclusion_rate() {
        let policy = HeaderPolicy::default();
        let mut rng = StdRng::seed_from_u64(11);
        let extra = HeaderMap::new();

        let draws = 5_000;
        let with_referer = (0..draws)
            .filter(|_| {
                build_headers(&mut rng, &policy, "example.com", Some("https://ref.example/"), &extra)
                    .get(REFERER)
                    .is_some_and(|v| v == "https://ref.example/")
            })
            .count();
        let ratio = with_referer as f64 / draws as f64;
        assert!((0.82..0.88).contains(&ratio), "referer ratio {}", ratio);
    }

    #[test]
    fn test_referer_sets_cross_site_fetch() {
        let policy = HeaderPolicy {
            referer_probability: 1.0,
            ..HeaderPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(5);
        let headers = build_headers(&mut rng, &policy, "example.com", None, &HeaderMap::new());
        let referer = headers.get(REFERER).unwrap().to_str().unwrap();
        assert!(DEFAULT_REFERERS.contains(&referer));
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "cross-site");

        let never = HeaderPolicy {
            referer_probability: 0.0,
            ..HeaderPolicy::default()
        };
        let headers = build_headers(&mut rng, &never, "example.com", None, &HeaderMap::new());
        assert!(headers.get(REFERER).is_none());
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "none");
    }

    #[test]
    fn test_core_headers_always_present() {
        let policy = HeaderPolicy::default();
        let mut rng = StdRng::seed_from_u64(9);
        let headers = build_headers(&mut rng, &policy, "example.com", None, &HeaderMap::new());

        for name in [
            "user-agent",
            "accept",
            "accept-language",
            "accept-encoding",
            "sec-fetch-mode",
            "sec-fetch-dest",
        ] {
            assert!(headers.contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn test_extra_headers_override_generated() {
        let policy = HeaderPolicy::default();
        let mut rng = StdRng::seed_from_u64(13);
        let mut extra = HeaderMap::new();
        extra.insert(USER_AGENT, HeaderValue::from_static("custom-agent/1.0"));
        extra.insert("x-trace", HeaderValue::from_static("abc"));

        let headers = build_headers(&mut rng, &policy, "example.com", None, &extra);
        assert_eq!(headers.get(USER_AGENT).unwrap(), "custom-agent/1.0");
        assert_eq!(headers.get("x-trace").unwrap(), "abc");
    }
}
