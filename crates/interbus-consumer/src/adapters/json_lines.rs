//! Broker reading newline-delimited JSON messages from a byte stream.
//!
//! Each non-empty line is one [`RawMessage`]:
//!
//! ```text
//! {"headers":{"event":"user_created","event_source":"accounts"},"body":"{\"id\":1}"}
//! ```
//!
//! Acknowledge and reject are no-ops; a line is gone once read.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, trace};

use crate::domain::RawMessage;
use crate::error::BrokerError;
use crate::ports::{BrokerContext, MessageConsumer, TopicHandle};

type LineSource = Box<dyn AsyncBufRead + Send + Unpin>;

/// Single-consumer broker over a line stream.
pub struct JsonLinesBroker {
    source: Mutex<Option<LineSource>>,
}

impl JsonLinesBroker {
    /// Broker over standard input.
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            source: Mutex::new(Some(Box::new(reader))),
        }
    }
}

#[async_trait]
impl BrokerContext for JsonLinesBroker {
    fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        Ok(TopicHandle {
            name: name.to_string(),
        })
    }

    async fn create_consumer(
        &self,
        topic: &TopicHandle,
    ) -> Result<Box<dyn MessageConsumer>, BrokerError> {
        let source = self
            .source
            .lock()
            .take()
            .ok_or_else(|| BrokerError::ConsumerTaken(topic.name.clone()))?;
        Ok(Box::new(JsonLinesConsumer {
            topic: topic.name.clone(),
            lines: source.lines(),
            exhausted: false,
        }))
    }
}

struct JsonLinesConsumer {
    topic: String,
    lines: Lines<LineSource>,
    exhausted: bool,
}

#[async_trait]
impl MessageConsumer for JsonLinesConsumer {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>, BrokerError> {
        if self.exhausted {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }

        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(line)
                    .map(Some)
                    .map_err(|e| BrokerError::Decode(e.to_string()))
            }
            Ok(Ok(None)) => {
                info!(topic = %self.topic, "Input exhausted");
                self.exhausted = true;
                Ok(None)
            }
            Ok(Err(e)) => Err(BrokerError::Transport(e.to_string())),
        }
    }

    async fn acknowledge(&mut self, message: &RawMessage) -> Result<(), BrokerError> {
        trace!(topic = %self.topic, message_id = ?message.correlation_id(), "ack");
        Ok(())
    }

    async fn reject(&mut self, message: &RawMessage) -> Result<(), BrokerError> {
        trace!(topic = %self.topic, message_id = ?message.correlation_id(), "reject");
        Ok(())
    }
}
