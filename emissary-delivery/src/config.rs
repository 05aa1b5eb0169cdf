use std::time::Duration;

use serde::Deserialize;

use crate::{BounceConfig, DnsConfig, SmtpTimeouts};

const fn default_poll_interval() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_max_concurrent_deliveries() -> usize {
    1
}

const fn default_smtp_port() -> u16 {
    25
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

/// Settings for the delivery processor
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// How long to wait before polling the store again when nothing is due
    /// (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of attempts after which a message is given up on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How many messages may be in delivery at the same time
    ///
    /// Default: 1 (strictly sequential)
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,

    /// Port remote mail servers listen on
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Name announced in EHLO/HELO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// DNS configuration for resolver
    #[serde(default)]
    pub dns: DnsConfig,

    /// SMTP operation timeout configuration
    #[serde(default)]
    pub smtp_timeouts: SmtpTimeouts,

    /// Delivery failure reports
    #[serde(default)]
    pub bounce: BounceConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
            smtp_port: default_smtp_port(),
            helo_name: default_helo_name(),
            dns: DnsConfig::default(),
            smtp_timeouts: SmtpTimeouts::default(),
            bounce: BounceConfig::default(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// The worker pool size; never zero.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_deliveries.max(1)
    }
}
