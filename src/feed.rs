//! WebSocket feed session

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{self, Duration, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    config::FeedConfig, errors::AisStreamerError, models::Subscription,
    pipeline::MessagePipeline,
};

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live connection to the feed
///
/// Dropped when the session ends; the supervisor opens a fresh one.
pub struct FeedSession {
    ws: FeedStream,
    ping_timer: Interval,
    ping_timeout: Duration,
    /// Set while a ping is unanswered
    pong_deadline: Option<Instant>,
}

impl FeedSession {
    /// Connect and send the subscription
    pub async fn open(
        config: &FeedConfig,
        subscription: &Subscription,
    ) -> Result<Self, AisStreamerError> {
        info!("Connecting to feed at {}", config.uri);
        let (mut ws, _response) =
            time::timeout(config.connect_timeout, connect_async(config.uri.as_str()))
                .await
                .map_err(|_| AisStreamerError::ConnectTimeout(config.connect_timeout))?
                .map_err(AisStreamerError::ConnectionError)?;
        info!("WebSocket connection established");

        let payload = serde_json::to_string(subscription)?;
        ws.send(Message::Text(payload.into()))
            .await
            .map_err(AisStreamerError::SubscriptionError)?;
        info!(
            vessels = subscription.filter_ship_mmsi.len(),
            "Subscription message sent"
        );

        let mut ping_timer =
            time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            ws,
            ping_timer,
            ping_timeout: config.ping_timeout,
            pong_deadline: None,
        })
    }

    /// Receive the next data frame
    ///
    /// Sends keepalive pings while waiting. Any error returned here ends
    /// the session.
    pub async fn recv(&mut self) -> Result<Vec<u8>, AisStreamerError> {
        loop {
            let deadline = self.pong_deadline;

            // Frames already buffered, a late pong included, are read before
            // the deadline is checked; the consumer may have been busy past it.
            tokio::select! {
                biased;

                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => return Ok(text.as_str().as_bytes().to_vec()),
                    Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                    Some(Ok(Message::Pong(_))) => {
                        debug!("Pong received");
                        self.pong_deadline = None;
                    }
                    // Pings are answered by tungstenite
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        return Err(AisStreamerError::StreamClosed(format!(
                            "closed by peer: {:?}",
                            frame
                        )));
                    }
                    Some(Err(e)) => return Err(AisStreamerError::StreamClosed(e.to_string())),
                    None => {
                        return Err(AisStreamerError::StreamClosed("stream ended".to_string()));
                    }
                },
                _ = self.ping_timer.tick(), if deadline.is_none() => {
                    self.ws
                        .send(Message::Ping(Vec::new().into()))
                        .await
                        .map_err(|e| AisStreamerError::StreamClosed(e.to_string()))?;
                    self.pong_deadline = Some(Instant::now() + self.ping_timeout);
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!("No pong within {:?}, dropping connection", self.ping_timeout);
                    return Err(AisStreamerError::KeepaliveTimeout(self.ping_timeout));
                }
            }
        }
    }

    /// Feed every message to the pipeline until the connection fails
    ///
    /// Returns the error that ended the session.
    pub async fn consume(&mut self, pipeline: &MessagePipeline) -> AisStreamerError {
        loop {
            match self.recv().await {
                Ok(payload) => {
                    pipeline.handle(&payload).await;
                }
                Err(e) => return e,
            }
        }
    }
}
