//! Reconnect loop around feed sessions

use std::sync::Arc;

use tokio::time;
use tracing::{error, info};

use crate::{
    config::FeedConfig,
    dedup::DedupGate,
    errors::AisStreamerError,
    feed::FeedSession,
    filter::MessageFilter,
    models::Subscription,
    pipeline::MessagePipeline,
    storage::StorageGateway,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connected,
    Backoff,
}

/// Keeps a feed session alive for the lifetime of the process
///
/// Every session end, whatever the cause, is followed by the same fixed
/// `reconnect_delay` and a new attempt. There is no retry limit and no
/// growing backoff.
pub struct IngestSupervisor {
    config: FeedConfig,
    subscription: Subscription,
    pipeline: MessagePipeline,
    state: SupervisorState,
    attempts: u64,
}

impl IngestSupervisor {
    pub fn new(
        config: FeedConfig,
        storage: Arc<dyn StorageGateway>,
    ) -> Result<Self, AisStreamerError> {
        config.validate()?;
        let tracked = config.tracked()?;
        info!(vessels = tracked.len(), "Tracking vessels");
        let subscription = Subscription::new(&config.api_key, &tracked);
        let pipeline = MessagePipeline::new(MessageFilter::new(tracked), DedupGate::new(storage));

        Ok(Self {
            config,
            subscription,
            pipeline,
            state: SupervisorState::Disconnected,
            attempts: 0,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Connection attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// One connect, consume, backoff round
    ///
    /// Returns the error that ended the round, after the backoff delay.
    pub async fn cycle(&mut self) -> AisStreamerError {
        self.attempts += 1;
        self.state = SupervisorState::Disconnected;

        let reason = match FeedSession::open(&self.config, &self.subscription).await {
            Ok(mut session) => {
                self.state = SupervisorState::Connected;
                session.consume(&self.pipeline).await
            }
            Err(e) => e,
        };

        self.state = SupervisorState::Backoff;
        error!(attempt = self.attempts, "Feed disconnected or error occurred: {}", reason);
        info!("Reconnecting in {:?}", self.config.reconnect_delay);
        time::sleep(self.config.reconnect_delay).await;
        self.state = SupervisorState::Disconnected;

        reason
    }

    /// Reconnect forever; only returns if the task is cancelled
    pub async fn run(mut self) {
        info!("Starting ingest supervisor");
        loop {
            self.cycle().await;
        }
    }
}
