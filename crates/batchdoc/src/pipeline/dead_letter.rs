//! Dead-letter routing for documents that need manual triage.
//!
//! Publishing is fire-and-forget: the document record in the store is the
//! source of truth, so a lost notification is logged and nothing more.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{DocumentRef, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    pub batch_id: String,
    pub document_ref: DocumentRef,
    pub error_kind: ErrorKind,
    pub error_message: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("No dead-letter publisher configured")]
    NotConfigured,

    #[error("Dead-letter channel closed")]
    ChannelClosed,

    #[error("Failed to encode dead-letter message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write dead-letter file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait DeadLetterPublisher: Send + Sync {
    fn publish(&self, topic: &str, message: &DeadLetterMessage) -> Result<(), PublishError>;
}

/// In-process publisher. The receiving half is handed to whoever triages.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: Sender<DeadLetterMessage>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, Receiver<DeadLetterMessage>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl DeadLetterPublisher for ChannelPublisher {
    fn publish(&self, _topic: &str, message: &DeadLetterMessage) -> Result<(), PublishError> {
        self.sender
            .send(message.clone())
            .map_err(|_| PublishError::ChannelClosed)
    }
}

/// Appends one JSON object per line, tagged with the topic.
pub struct JsonLinesPublisher {
    path: PathBuf,
    file: Mutex<File>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    topic: &'a str,
    #[serde(flatten)]
    message: &'a DeadLetterMessage,
}

impl JsonLinesPublisher {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PublishError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PublishError::Io {
                path: path.clone(),
                source: e,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeadLetterPublisher for JsonLinesPublisher {
    fn publish(&self, topic: &str, message: &DeadLetterMessage) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(&JsonLine { topic, message })?;
        line.push(b'\n');

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(&line).map_err(|e| PublishError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Used when no dead-letter destination is configured.
pub struct DisabledPublisher;

impl DeadLetterPublisher for DisabledPublisher {
    fn publish(&self, _topic: &str, _message: &DeadLetterMessage) -> Result<(), PublishError> {
        Err(PublishError::NotConfigured)
    }
}

pub struct DeadLetterRouter {
    publisher: Arc<dyn DeadLetterPublisher>,
    topic: String,
}

impl DeadLetterRouter {
    pub fn new(publisher: Arc<dyn DeadLetterPublisher>, topic: &str) -> Self {
        Self {
            publisher,
            topic: topic.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledPublisher), "")
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Emits a triage notification. Returns whether it was published; errors
    /// are logged and never propagated.
    pub fn route(
        &self,
        batch_id: &str,
        document_ref: &DocumentRef,
        error_kind: ErrorKind,
        error_message: &str,
        attempts: u32,
    ) -> bool {
        let message = DeadLetterMessage {
            batch_id: batch_id.to_string(),
            document_ref: document_ref.clone(),
            error_kind,
            error_message: error_message.to_string(),
            attempts,
            timestamp: Utc::now(),
        };

        match self.publisher.publish(&self.topic, &message) {
            Ok(()) => {
                info!(
                    event_type = "dead_letter_published",
                    batch_id,
                    error_kind = %error_kind,
                    attempts,
                    topic = %self.topic,
                    "Routed document to dead letter"
                );
                true
            }
            Err(e) => {
                warn!(
                    batch_id,
                    error_kind = %error_kind,
                    error = %e,
                    "Dead-letter publish failed, store record remains authoritative"
                );
                false
            }
        }
    }
}
