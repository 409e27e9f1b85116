use std::env;
use std::time::Duration;

use crate::error::{Result, StealthError};
use crate::models::{EndpointDescriptor, FailureKind};

/// Crate configuration, loadable from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Per-session request behaviour
    pub session: SessionConfig,
    /// Pool thresholds and scoring
    pub pool: PoolConfig,
    /// Stealth header and block-detection policy
    pub headers: HeaderPolicy,
    /// Opportunistic discovery and provider input
    pub discovery: DiscoveryConfig,
    /// Logging configuration
    pub log: LogConfig,
}

/// Immutable settings for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Only keep discovered endpoints tagged with this country
    pub country_filter: Option<String>,
    /// Baseline number of endpoints to seed
    pub pool_limit: usize,
    /// Bound on each individual attempt
    pub base_timeout: Duration,
    /// Attempts per logical request
    pub max_retries_per_request: u32,
    /// Minimum gap between requests to the same domain, sampled uniformly (seconds)
    pub per_domain_delay: (f64, f64),
    /// Pause before attempts after the first, sampled uniformly (seconds)
    pub retry_jitter: (f64, f64),
    /// Bind each domain to the endpoint that last served it
    pub sticky_enabled: bool,
    /// Fixed seed for header and delay sampling
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            country_filter: None,
            pool_limit: 30,
            base_timeout: Duration::from_secs(15),
            max_retries_per_request: 6,
            per_domain_delay: (1.0, 4.0),
            retry_jitter: (0.3, 1.8),
            sticky_enabled: true,
            rng_seed: None,
        }
    }
}

/// Health score smoothing and cooldown penalties
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    /// Fraction of the distance to 1 gained per success
    pub success_alpha: f64,
    /// Fraction of the score lost per failure
    pub failure_beta: f64,
    pub soft_penalty: Duration,
    pub hard_penalty: Duration,
    /// Cap on the consecutive-failure multiplier
    pub max_penalty_multiplier: u32,
    /// Remaining cooldown removed by a success
    pub success_cooldown_relief: Duration,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            success_alpha: 0.3,
            failure_beta: 0.3,
            soft_penalty: Duration::from_secs(20),
            hard_penalty: Duration::from_secs(90),
            max_penalty_multiplier: 3,
            success_cooldown_relief: Duration::from_secs(5),
        }
    }
}

impl ScoringPolicy {
    /// Cooldown for a failure of `kind` after `consecutive` failures in a row
    pub fn penalty_for(&self, kind: FailureKind, consecutive: u32) -> Duration {
        let base = match kind {
            FailureKind::Soft => self.soft_penalty,
            FailureKind::Hard => self.hard_penalty,
        };
        base * consecutive.clamp(1, self.max_penalty_multiplier.max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Capacity; `add` never grows the pool past this
    pub max_size: usize,
    /// Endpoints below this score are not selectable
    pub min_score: f64,
    /// Endpoints below this score are dropped at selection time...
    pub eviction_threshold: f64,
    /// ...once they have at least this many recorded outcomes
    pub min_observations: u64,
    pub scoring: ScoringPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 200,
            min_score: 0.25,
            eviction_threshold: 0.05,
            min_observations: 5,
            scoring: ScoringPolicy::default(),
        }
    }
}

/// Default block/captcha signatures, matched case-insensitively
pub const DEFAULT_BLOCK_SIGNATURES: &[&str] = &[
    "captcha",
    "recaptcha",
    "access denied",
    "verify you are human",
    "are you a robot",
    "unusual traffic",
    "blocked because",
    "forbidden",
];

/// Probabilities and signatures that shape outgoing requests
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderPolicy {
    /// Chance of drawing a mobile User-Agent
    pub mobile_probability: f64,
    pub referer_probability: f64,
    pub dnt_probability: f64,
    pub cache_control_probability: f64,
    pub pragma_probability: f64,
    /// Lowercase substrings that mark a block or captcha page
    pub block_signatures: Vec<String>,
    /// Leading body bytes scanned for signatures
    pub body_scan_limit: usize,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            mobile_probability: 0.6,
            referer_probability: 0.85,
            dnt_probability: 0.30,
            cache_control_probability: 0.30,
            pragma_probability: 0.25,
            block_signatures: DEFAULT_BLOCK_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            body_scan_limit: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// Proxy list URL; `None` means discovery is unavailable
    pub source_url: Option<String>,
    /// Endpoints from a trusted provider
    pub provider: Vec<EndpointDescriptor>,
    /// TCP reachability check for discovered candidates
    pub probe_enabled: bool,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            provider: Vec::new(),
            probe_enabled: true,
            probe_timeout: Duration::from_secs(5),
            probe_concurrency: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            session: SessionConfig {
                country_filter: env::var("PROXY_COUNTRY")
                    .ok()
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty()),
                pool_limit: parse_env("PROXY_LIMIT", "30")?,
                base_timeout: Duration::from_secs(parse_env("PROXY_TIMEOUT", "15")?),
                max_retries_per_request: parse_env("PROXY_MAX_RETRIES", "6")?,
                per_domain_delay: parse_range("PROXY_DOMAIN_DELAY", "1.0,4.0")?,
                retry_jitter: parse_range("PROXY_RETRY_JITTER", "0.3,1.8")?,
                sticky_enabled: parse_env("PROXY_STICKY", "true")?,
                rng_seed: None,
            },
            pool: PoolConfig {
                min_score: parse_env("PROXY_MIN_SCORE", "0.25")?,
                ..PoolConfig::default()
            },
            headers: HeaderPolicy {
                mobile_probability: parse_env("PROXY_MOBILE_UA_PROBABILITY", "0.6")?,
                referer_probability: parse_env("PROXY_REFERER_PROBABILITY", "0.85")?,
                ..HeaderPolicy::default()
            },
            discovery: DiscoveryConfig {
                source_url: env::var("PROXY_DISCOVERY_URL")
                    .ok()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty()),
                provider: parse_provider_list()?,
                ..DiscoveryConfig::default()
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pool and session cannot honour
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.pool.validate()?;
        self.headers.validate()
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_limit == 0 {
            return Err(invalid("pool_limit must be at least 1"));
        }
        if self.max_retries_per_request == 0 {
            return Err(invalid("max_retries_per_request must be at least 1"));
        }
        if self.base_timeout.is_zero() {
            return Err(invalid("base_timeout must be non-zero"));
        }
        check_range("per_domain_delay", self.per_domain_delay)?;
        check_range("retry_jitter", self.retry_jitter)
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        check_unit("min_score", self.min_score)?;
        check_unit("eviction_threshold", self.eviction_threshold)?;
        if self.max_size == 0 {
            return Err(invalid("max_size must be at least 1"));
        }
        for (name, value) in [
            ("success_alpha", self.scoring.success_alpha),
            ("failure_beta", self.scoring.failure_beta),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(invalid(&format!("{} must be in (0, 1)", name)));
            }
        }
        Ok(())
    }
}

impl HeaderPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mobile_probability", self.mobile_probability),
            ("referer_probability", self.referer_probability),
            ("dnt_probability", self.dnt_probability),
            ("cache_control_probability", self.cache_control_probability),
            ("pragma_probability", self.pragma_probability),
        ] {
            check_unit(name, value)?;
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> StealthError {
    StealthError::InvalidConfig(msg.to_string())
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be in [0, 1]", name)))
    }
}

fn check_range(name: &str, (min, max): (f64, f64)) -> Result<()> {
    if min.is_finite() && max.is_finite() && min >= 0.0 && min <= max {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be a range 0 <= min <= max", name)))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| StealthError::InvalidConfig(format!("{} has an invalid value", key)))
}

/// Parse a `min,max` pair of seconds
fn parse_range(key: &str, default: &str) -> Result<(f64, f64)> {
    let raw = get_env_or(key, default);
    let (min, max) = raw
        .split_once(',')
        .ok_or_else(|| StealthError::InvalidConfig(format!("{} must look like min,max", key)))?;

    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| StealthError::InvalidConfig(format!("{} has an invalid number", key)))
    };

    Ok((parse(min)?, parse(max)?))
}

fn parse_provider_list() -> Result<Vec<EndpointDescriptor>> {
    get_env_or("PROXY_PROVIDER_LIST", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|line| {
            EndpointDescriptor::parse(line).map_err(|e| {
                StealthError::InvalidConfig(format!("PROXY_PROVIDER_LIST entry {}: {}", line, e))
            })
        })
        .collect()
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
