//! Delivery processor orchestration

mod dispatch;

use std::sync::Arc;

use emissary_common::{Signal, internal};
use emissary_spool::MessageStore;
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, warn};

pub use dispatch::AttemptReport;
use dispatch::Dispatcher;

use crate::{
    BounceGenerator, DeliveryConfig, DeliveryError, DnsResolver, EventLog, ExternalDelivery,
    LocalDelivery, MailboxStore, ResolveMx, SmtpTransport, SystemError, Transport,
    TracingEventLog,
};

/// Pulls queued messages from the store and delivers them
///
/// The processor runs continuously, claiming one message at a time (or up to
/// `max_concurrent_deliveries` at once) and sleeping for the poll interval
/// whenever nothing is due.
#[derive(Debug)]
pub struct DeliveryProcessor {
    config: DeliveryConfig,

    /// The message store (initialised in `init()`)
    store: Option<Arc<dyn MessageStore>>,

    /// Local mailboxes (initialised in `init()`)
    mailboxes: Option<Arc<dyn MailboxStore>>,

    /// MX resolver; built from `config.dns` in `init()` unless supplied
    resolver: Option<Arc<dyn ResolveMx>>,

    /// SMTP client; built from the config in `init()` unless supplied
    transport: Option<Arc<dyn Transport>>,

    event_log: Arc<dyn EventLog>,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self::new(DeliveryConfig::default())
    }
}

impl DeliveryProcessor {
    #[must_use]
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            store: None,
            mailboxes: None,
            resolver: None,
            transport: None,
            event_log: Arc::new(TracingEventLog),
        }
    }

    /// Use `resolver` instead of a DNS resolver built from the config.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ResolveMx>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use `transport` instead of the SMTP client built from the config.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Initialise the delivery processor
    ///
    /// # Errors
    ///
    /// Returns an error if the DNS resolver cannot be created
    pub fn init(
        &mut self,
        store: Arc<dyn MessageStore>,
        mailboxes: Arc<dyn MailboxStore>,
    ) -> Result<(), DeliveryError> {
        internal!("Initialising Delivery Processor ...");
        self.store = Some(store);
        self.mailboxes = Some(mailboxes);

        if self.resolver.is_none() {
            self.resolver = Some(Arc::new(DnsResolver::new(self.config.dns.clone())?));
            internal!(
                "DNS resolver initialised with timeout={}s, cache_ttl={}s",
                self.config.dns.timeout_secs,
                self.config.dns.cache_ttl_secs
            );
        }

        if self.transport.is_none() {
            self.transport = Some(Arc::new(SmtpTransport::new(
                self.config.smtp_port,
                self.config.helo_name.clone(),
                self.config.smtp_timeouts.clone(),
            )));
        }

        Ok(())
    }

    fn dispatcher(&self) -> Result<Dispatcher, DeliveryError> {
        let (Some(store), Some(mailboxes), Some(resolver), Some(transport)) = (
            &self.store,
            &self.mailboxes,
            &self.resolver,
            &self.transport,
        ) else {
            return Err(SystemError::NotInitialised(
                "Delivery processor not initialised. Call init() first.".to_string(),
            )
            .into());
        };

        Ok(Dispatcher {
            store: Arc::clone(store),
            event_log: Arc::clone(&self.event_log),
            local: LocalDelivery::new(Arc::clone(mailboxes)),
            external: ExternalDelivery::new(Arc::clone(resolver), Arc::clone(transport)),
            bounce: BounceGenerator::new(
                self.config.bounce.clone(),
                Arc::clone(store),
                Arc::clone(mailboxes),
            ),
            max_attempts: self.config.max_attempts,
        })
    }

    /// Claim the next due message and run one delivery attempt on it.
    ///
    /// Returns `None` if nothing was claimable.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor is not initialised or the claim
    /// fails. Failures during the attempt itself are logged, not returned.
    pub async fn dispatch_next(&self) -> Result<Option<AttemptReport>, DeliveryError> {
        let dispatcher = self.dispatcher()?;

        let Some(message) = dispatcher.store.claim_next().await? else {
            return Ok(None);
        };

        Ok(Some(dispatcher.dispatch(message).await))
    }

    /// Run the delivery processor
    ///
    /// This method runs continuously until a shutdown signal is received.
    ///
    /// ## Graceful Shutdown
    ///
    /// When a shutdown signal is received:
    /// 1. Stop claiming new messages, waking up from an idle wait at once
    /// 2. Wait for every in-flight attempt to complete
    /// 3. Exit cleanly
    ///
    /// # Errors
    ///
    /// Returns an error if the processor is not initialised
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!("Delivery processor starting");

        let dispatcher = self.dispatcher()?;
        let poll_interval = self.config.poll_interval();
        let concurrency = self.config.concurrency();
        let mut in_flight = JoinSet::new();

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                signal => {
                    stopping(signal.map_err(|e| e.to_string()));
                    break;
                }
            }

            while let Some(joined) = in_flight.try_join_next() {
                finished(joined);
            }

            if in_flight.len() >= concurrency {
                tokio::select! {
                    Some(joined) = in_flight.join_next() => finished(joined),
                    signal = shutdown.recv() => {
                        stopping(signal.map_err(|e| e.to_string()));
                        break;
                    }
                }
                continue;
            }

            let claimed = match dispatcher.store.claim_next().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "Failed to claim next message");
                    None
                }
            };

            if let Some(message) = claimed {
                debug!(message_id = %message.id, "Claimed message for delivery");
                let dispatcher = dispatcher.clone();
                in_flight.spawn(async move { dispatcher.dispatch(message).await });
                continue;
            }

            tokio::select! {
                () = tokio::time::sleep(poll_interval) => {}
                signal = shutdown.recv() => {
                    stopping(signal.map_err(|e| e.to_string()));
                    break;
                }
            }
        }

        if !in_flight.is_empty() {
            internal!("Waiting for {} in-flight deliveries", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            finished(joined);
        }

        internal!("Delivery processor shutdown complete");
        Ok(())
    }
}

fn stopping(signal: Result<Signal, String>) {
    match signal {
        Ok(signal) => internal!("Delivery processor received {signal:?} signal"),
        Err(e) => warn!("Delivery processor shutdown channel error: {e}"),
    }
}

fn finished(joined: Result<AttemptReport, JoinError>) {
    match joined {
        Ok(report) => debug!(
            message_id = %report.message_id,
            attempt = report.attempt,
            disposition = ?report.disposition,
            "Delivery task finished"
        ),
        Err(e) => error!(error = %e, "Delivery task failed"),
    }
}
