//! # Settings
//!
//! Layered configuration for the CLI:
//!
//! 1. defaults (from `offload_core::primitives`)
//! 2. TOML file given with `--config`
//! 3. environment flags
//! 4. command-line flags
//!
//! ## Environment
//!
//! | variable                | effect                                   |
//! |-------------------------|------------------------------------------|
//! | `OFFLOAD_DISABLE`       | skip all wrapping                        |
//! | `OFFLOAD_DISABLE_CACHE` | cache off unless the file says otherwise |
//! | `OFFLOAD_REFRESH_CACHE` | fresh refresh token on every run         |
//! | `OFFLOAD_POOL_SIZE`     | number of pool workers                   |
//! | `NODE_ENV`              | cache context `env`                      |
//!
//! A flag counts as set when it is non-empty and not `0`, `false`, `no` or `off`.

use offload_core::primitives::{DEFAULT_CACHE_ENV, DEFAULT_DELEGATE_STEP, DEFAULT_ELIGIBLE_PREFIXES};
use offload_core::{
    CacheContext, CachePolicy, IdentityScope, OffloadError, Plugin, PoolDelegateRegistration,
    Refresh, RewriteOptions, ThreadPool, WorkerPool,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Skip all wrapping.
pub const ENV_DISABLE: &str = "OFFLOAD_DISABLE";
/// Turn the pool cache off by default.
pub const ENV_DISABLE_CACHE: &str = "OFFLOAD_DISABLE_CACHE";
/// Request a fresh cache-busting token.
pub const ENV_REFRESH_CACHE: &str = "OFFLOAD_REFRESH_CACHE";
/// Number of pool workers.
pub const ENV_POOL_SIZE: &str = "OFFLOAD_POOL_SIZE";
/// Build environment name.
pub const ENV_BUILD_ENV: &str = "NODE_ENV";

/// Maximum size of a settings file (1 MB).
const MAX_SETTINGS_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// ENVIRONMENT FLAGS
// =============================================================================

/// Feature flags read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFlags {
    /// `OFFLOAD_DISABLE`
    pub disable_all: bool,
    /// `OFFLOAD_DISABLE_CACHE`
    pub disable_cache: bool,
    /// `OFFLOAD_REFRESH_CACHE`
    pub refresh_cache: bool,
    /// `OFFLOAD_POOL_SIZE`
    pub pool_size: Option<usize>,
    /// `NODE_ENV`
    pub build_env: Option<String>,
}

impl EnvFlags {
    /// Read the flags through a lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OffloadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pool_size = match lookup(ENV_POOL_SIZE).filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                OffloadError::ConfigError(format!("{ENV_POOL_SIZE} must be a positive integer"))
            })?),
            None => None,
        };

        Ok(Self {
            disable_all: is_set(lookup(ENV_DISABLE)),
            disable_cache: is_set(lookup(ENV_DISABLE_CACHE)),
            refresh_cache: is_set(lookup(ENV_REFRESH_CACHE)),
            pool_size,
            build_env: lookup(ENV_BUILD_ENV).filter(|v| !v.is_empty()),
        })
    }

    /// Read the flags from the process environment.
    pub fn from_process() -> Result<Self, OffloadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn is_set(value: Option<String>) -> bool {
    match value {
        Some(v) => {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || matches!(v.as_str(), "0" | "false" | "no" | "off"))
        }
        None => false,
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Everything a caller can configure, as written in the TOML file.
///
/// ```toml
/// eligible_prefixes = ["babel-loader", "ts-loader"]
/// cache = true
/// refresh = false
/// pool_size = 4
/// identity = "matcher_and_chain"
///
/// [cache_context]
/// locale = "en"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Step-name prefixes to offload.
    pub eligible_prefixes: Option<Vec<String>>,
    /// Explicit cache switch; wins over `OFFLOAD_DISABLE_CACHE`.
    pub cache: Option<bool>,
    /// Extra cache context fields; `env` and `refresh` override the defaults.
    pub cache_context: Map<String, Value>,
    /// Request a fresh refresh token.
    pub refresh: bool,
    /// Skip all wrapping.
    pub disable_all: bool,
    /// Number of pool workers.
    pub pool_size: Option<usize>,
    /// Step name of the delegate reference.
    pub delegate_step: Option<String>,
    /// Which parts of a rule feed its identifier.
    pub identity: IdentityScope,
}

/// Command-line flags layered over the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// `--prefix` (repeatable); replaces the configured prefixes when given.
    pub prefixes: Vec<String>,
    /// `--disable`
    pub disable: bool,
    /// `--no-cache`
    pub no_cache: bool,
    /// `--refresh`
    pub refresh: bool,
    /// `--pool-size`
    pub pool_size: Option<usize>,
}

/// Settings turned into what the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Options for `offload_core::offload`.
    pub options: RewriteOptions,
    /// The shared worker pool.
    pub pool: ThreadPool,
    /// Give every delegate registration its own refresh token.
    pub fresh_tokens: bool,
}

impl Resolved {
    /// The pool delegates are registered with.
    #[must_use]
    pub fn worker_pool(&self) -> Arc<dyn WorkerPool> {
        if self.fresh_tokens {
            Arc::new(RefreshingPool::new(self.pool))
        } else {
            Arc::new(self.pool)
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, OffloadError> {
        toml::from_str(text).map_err(|e| OffloadError::ConfigError(e.to_string()))
    }

    /// Load settings from an optional file. No file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, OffloadError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            OffloadError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_SETTINGS_FILE_SIZE {
            return Err(OffloadError::ConfigError(format!(
                "Settings file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_SETTINGS_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            OffloadError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        tracing::debug!("Loaded settings from {}", path.display());
        Self::from_toml(&text)
    }

    /// Lay command-line flags over these settings.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if !overrides.prefixes.is_empty() {
            self.eligible_prefixes = Some(overrides.prefixes.clone());
        }
        if overrides.disable {
            self.disable_all = true;
        }
        if overrides.no_cache {
            self.cache = Some(false);
        }
        if overrides.refresh {
            self.refresh = true;
        }
        if overrides.pool_size.is_some() {
            self.pool_size = overrides.pool_size;
        }
        self
    }

    /// Combine with the environment into engine options and a pool.
    pub fn resolve(self, env: &EnvFlags) -> Result<Resolved, OffloadError> {
        let fresh_tokens =
            (self.refresh || env.refresh_cache) && !self.cache_context.contains_key("refresh");
        let cache_policy = cache_policy(self.cache, &self.cache_context, self.refresh, env)?;

        let eligible_prefixes = self.eligible_prefixes.unwrap_or_else(|| {
            DEFAULT_ELIGIBLE_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect()
        });

        let options = RewriteOptions::new()
            .with_prefixes(eligible_prefixes)
            .with_cache_policy(cache_policy)
            .with_delegate_step(
                self.delegate_step
                    .unwrap_or_else(|| DEFAULT_DELEGATE_STEP.to_string()),
            )
            .with_identity(self.identity)
            .disabled(self.disable_all || env.disable_all);

        let size = self
            .pool_size
            .or(env.pool_size)
            .unwrap_or_else(available_workers);

        Ok(Resolved {
            options,
            pool: ThreadPool::new(size),
            fresh_tokens,
        })
    }
}

/// Build the cache policy every delegate registration carries.
///
/// `cache` wins when given; otherwise the cache is on unless disabled
/// through the environment. The refresh token is `0` unless a refresh is
/// requested, in which case every call yields a new random token.
pub fn cache_policy(
    cache: Option<bool>,
    cache_context: &Map<String, Value>,
    refresh: bool,
    env: &EnvFlags,
) -> Result<CachePolicy, OffloadError> {
    let refresh = if refresh || env.refresh_cache {
        fresh_token()
    } else {
        Refresh::Fixed(0)
    };

    let context = CacheContext {
        env: env
            .build_env
            .clone()
            .unwrap_or_else(|| DEFAULT_CACHE_ENV.to_string()),
        refresh,
        extra: Map::new(),
    }
    .with_overrides(cache_context)?;

    Ok(CachePolicy {
        cache: cache.unwrap_or(!env.disable_cache),
        cache_context: context,
    })
}

fn fresh_token() -> Refresh {
    Refresh::Token(uuid::Uuid::new_v4().to_string())
}

/// A [`ThreadPool`] that stamps each registration with a new refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshingPool {
    inner: ThreadPool,
}

impl RefreshingPool {
    /// Wrap a pool.
    #[must_use]
    pub fn new(inner: ThreadPool) -> Self {
        Self { inner }
    }
}

impl WorkerPool for RefreshingPool {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn register_delegate(&self, mut registration: PoolDelegateRegistration) -> Plugin {
        registration.cache_context.refresh = fresh_token();
        self.inner.register_delegate(registration)
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

// =============================================================================
// TESTS
// =============================================================================
