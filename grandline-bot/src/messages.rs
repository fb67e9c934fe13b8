//! Outbound messages and the channel they travel on.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use grandline_core::{ChannelId, GrandlineError, Result};

/// Body of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// A titled card of name/value fields.
    Card {
        /// Card title.
        title: String,
        /// `(name, value)` rows.
        fields: Vec<(String, String)>,
    },
}

/// A message for the host to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Where to post it.
    pub channel: ChannelId,
    /// What to post.
    pub body: MessageBody,
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            MessageBody::Text(text) => write!(f, "#{} {text}", self.channel),
            MessageBody::Card { title, fields } => {
                write!(f, "#{} == {title} ==", self.channel)?;
                for (name, value) in fields {
                    write!(f, "\n    {name}: {value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Sending half handed to the plugin.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::Sender<OutgoingMessage>,
}

impl MessageSink {
    /// Wrap an mpsc sender.
    #[must_use]
    pub fn new(tx: mpsc::Sender<OutgoingMessage>) -> Self {
        Self { tx }
    }

    /// Post a message.
    ///
    /// # Errors
    /// `TransientIo` once the host has dropped the receiver.
    pub async fn send(&self, channel: ChannelId, body: MessageBody) -> Result<()> {
        trace!(channel = %channel, "outgoing message");
        self.tx
            .send(OutgoingMessage { channel, body })
            .await
            .map_err(|_| GrandlineError::TransientIo("message channel closed".into()))
    }

    /// Post plain text.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn text(&self, channel: ChannelId, text: impl Into<String>) -> Result<()> {
        self.send(channel, MessageBody::Text(text.into())).await
    }

    /// Post a card.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn card(
        &self,
        channel: ChannelId,
        title: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> Result<()> {
        self.send(
            channel,
            MessageBody::Card {
                title: title.into(),
                fields,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_is_transient() {
        let (tx, rx) = mpsc::channel(1);
        let sink = MessageSink::new(tx);
        drop(rx);
        let err = sink.text(ChannelId(1), "ahoy").await.expect_err("closed");
        assert!(err.is_transient());
    }

    #[test]
    fn card_renders_rows() {
        let msg = OutgoingMessage {
            channel: ChannelId(5),
            body: MessageBody::Card {
                title: "Market".into(),
                fields: vec![("meat".into(), "50".into())],
            },
        };
        assert_eq!(msg.to_string(), "#5 == Market ==\n    meat: 50");
    }
}
