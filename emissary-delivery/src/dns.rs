//! DNS resolution for mail delivery.
//!
//! Turns a recipient domain into the ordered list of IP addresses to try:
//! MX records sorted by preference, each exchange resolved through its A
//! records. A domain without MX records is its own exchange (RFC 5321
//! section 5.1 implicit MX).
//!
//! # Caching Strategy
//!
//! - **Fixed TTL**: resolved address lists are kept for `cache_ttl_secs`
//! - **Successes only**: a failed resolution is never cached
//! - **Lock-free**: `DashMap` provides concurrent access without mutex contention

use std::{
    fmt::Debug,
    net::IpAddr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use emissary_common::Domain;
use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors that can occur during DNS resolution.
#[derive(Debug, Clone, Error)]
pub enum DnsError {
    /// A query failed for a reason other than a missing name.
    #[error("DNS lookup failed for {name}: {reason}")]
    LookupFailed { name: String, reason: String },

    /// Name does not exist (NXDOMAIN).
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),

    /// DNS query timed out.
    #[error("DNS query timed out for {0}")]
    Timeout(String),

    /// The system resolver configuration could not be loaded.
    #[error("Failed to initialise DNS resolver: {0}")]
    Initialisation(String),
}

/// Configuration for DNS resolver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a resolved address list is reused, in seconds (default: 300).
    /// Zero disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// An MX record as returned by the lookup layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub exchange: String,
    /// Lower value = more preferred
    pub preference: u16,
}

impl MxRecord {
    #[must_use]
    pub fn new(exchange: impl Into<String>, preference: u16) -> Self {
        Self {
            exchange: exchange.into(),
            preference,
        }
    }
}

/// Order MX exchanges by preference and drop repeated hostnames.
///
/// Hostnames compare case-insensitively and without a trailing root dot; a
/// host listed more than once keeps the rank of its most preferred record.
/// Ties keep the order the records were returned in.
#[must_use]
pub fn order_exchanges(mut records: Vec<MxRecord>) -> Vec<Domain> {
    records.sort_by_key(|record| record.preference);

    let mut exchanges: Vec<Domain> = Vec::with_capacity(records.len());
    for record in records {
        let exchange = Domain::new(&record.exchange);
        if !exchange.is_empty() && !exchanges.contains(&exchange) {
            exchanges.push(exchange);
        }
    }

    exchanges
}

/// Raw DNS queries used by [`DnsResolver`].
///
/// An empty answer (NODATA) is `Ok(vec![])`; a name that does not exist or a
/// failed query is an error.
#[async_trait]
pub trait DnsLookup: Send + Sync + Debug {
    /// MX records of `domain`, in whatever order the server returned them.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError>;

    /// IPv4 addresses (A records) of `host`.
    async fn lookup_a(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// [`DnsLookup`] backed by the hickory async resolver.
#[derive(Debug, Clone)]
pub struct HickoryLookup {
    resolver: TokioResolver,
    timeout: Duration,
}

impl HickoryLookup {
    /// Use the system resolver configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(config: &DnsConfig) -> Result<Self, DnsError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(|e| DnsError::Initialisation(e.to_string()))?
            .with_options(opts)
            .build();

        Ok(Self { resolver, timeout })
    }

    /// Use an explicit resolver configuration.
    #[must_use]
    pub fn with_resolver_config(
        resolver_config: ResolverConfig,
        mut opts: ResolverOpts,
        config: &DnsConfig,
    ) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        opts.timeout = timeout;

        let resolver =
            TokioResolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { resolver, timeout }
    }
}

/// Map a hickory failure: NODATA is an empty answer, anything else an error.
fn empty_or_error(name: &str, err: &ResolveError) -> Result<(), DnsError> {
    if err.is_nx_domain() {
        Err(DnsError::DomainNotFound(name.to_string()))
    } else if err.is_no_records_found() {
        Ok(())
    } else {
        Err(DnsError::LookupFailed {
            name: name.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl DnsLookup for HickoryLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        let answer = tokio::time::timeout(self.timeout, self.resolver.mx_lookup(domain))
            .await
            .map_err(|_| DnsError::Timeout(domain.to_string()))?;

        match answer {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord::new(mx.exchange().to_utf8(), mx.preference()))
                .collect()),
            Err(err) => empty_or_error(domain, &err).map(|()| Vec::new()),
        }
    }

    async fn lookup_a(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let answer = tokio::time::timeout(self.timeout, self.resolver.ipv4_lookup(host))
            .await
            .map_err(|_| DnsError::Timeout(host.to_string()))?;

        match answer {
            Ok(lookup) => Ok(lookup.iter().map(|a| IpAddr::V4(a.0)).collect()),
            Err(err) => empty_or_error(host, &err).map(|()| Vec::new()),
        }
    }
}

/// Resolves a recipient domain to the addresses of its mail servers.
#[async_trait]
pub trait ResolveMx: Send + Sync + Debug {
    /// Addresses to try, most preferred exchange first.
    ///
    /// # Errors
    ///
    /// Returns a [`DnsError`] naming the domain or exchange whose query failed.
    async fn resolve_mx_addresses(&self, domain: &Domain) -> Result<Arc<[IpAddr]>, DnsError>;
}

/// Cached DNS result with expiration time.
#[derive(Debug, Clone)]
struct CachedResult {
    addresses: Arc<[IpAddr]>,
    expires_at: Instant,
}

/// DNS resolver for mail delivery with concurrent caching.
///
/// Uses `DashMap` for lock-free concurrent cache access, providing better
/// throughput under high load compared to mutex-based caching.
#[derive(Debug)]
pub struct DnsResolver {
    lookup: Arc<dyn DnsLookup>,
    cache: DashMap<Domain, CachedResult>,
    config: DnsConfig,
}

impl DnsResolver {
    /// Creates a resolver backed by the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        let lookup = HickoryLookup::new(&config)?;
        Ok(Self::with_lookup(Arc::new(lookup), config))
    }

    /// Creates a resolver on top of an arbitrary lookup implementation.
    #[must_use]
    pub fn with_lookup(lookup: Arc<dyn DnsLookup>, config: DnsConfig) -> Self {
        Self {
            lookup,
            cache: DashMap::new(),
            config,
        }
    }

    /// Number of cached domains, expired entries included.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Performs an uncached resolution.
    async fn resolve_uncached(&self, domain: &Domain) -> Result<Vec<IpAddr>, DnsError> {
        let records = self.lookup.lookup_mx(domain.as_str()).await.inspect_err(|err| {
            warn!(%domain, error = %err, "MX lookup failed");
        })?;

        let exchanges = if records.is_empty() {
            debug!(%domain, "No MX records, using the domain as implicit MX");
            vec![domain.clone()]
        } else {
            order_exchanges(records)
        };

        let mut addresses = Vec::new();
        for exchange in &exchanges {
            let found = self.lookup.lookup_a(exchange.as_str()).await.inspect_err(|err| {
                warn!(%domain, %exchange, error = %err, "A lookup failed");
            })?;
            debug!(%domain, %exchange, count = found.len(), "Resolved exchange");
            addresses.extend(found);
        }

        Ok(addresses)
    }
}

#[async_trait]
impl ResolveMx for DnsResolver {
    async fn resolve_mx_addresses(&self, domain: &Domain) -> Result<Arc<[IpAddr]>, DnsError> {
        debug!(%domain, "Resolving mail servers");

        if let Some(cached) = self.cache.get(domain) {
            if cached.expires_at > Instant::now() {
                debug!(%domain, count = cached.addresses.len(), "Cache hit");
                return Ok(Arc::clone(&cached.addresses));
            }
            debug!(%domain, "Cache entry expired");
        }

        let addresses: Arc<[IpAddr]> = self.resolve_uncached(domain).await?.into();

        if self.config.cache_ttl_secs > 0 {
            let expires_at = Instant::now() + Duration::from_secs(self.config.cache_ttl_secs);
            self.cache.insert(
                domain.clone(),
                CachedResult {
                    addresses: Arc::clone(&addresses),
                    expires_at,
                },
            );
        }

        Ok(addresses)
    }
}
