use crate::models::{DirectoryNode, FileDescriptor, Language};
use actix_web::web::Bytes;
use log::warn;
use serde::{Deserialize, Serialize};

const FRAME_PREFIX: &str = "data: ";
const FRAME_TERMINATOR: &str = "\n\n";

/// Everything a generation or update session reports to its client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        message: String,
    },
    Progress {
        message: String,
    },
    Analysis {
        message: String,
    },
    Structure {
        analysis: String,
        files: Vec<FileDescriptor>,
        tree: DirectoryNode,
    },
    Code {
        path: String,
        code: String,
        language: Language,
    },
    Update {
        path: String,
        code: String,
        language: Language,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Complete,
}

impl StreamEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        StreamEvent::Progress {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            path: None,
        }
    }

    pub fn file_error(path: &str, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            path: Some(path.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Analysis { .. } => "analysis",
            StreamEvent::Structure { .. } => "structure",
            StreamEvent::Code { .. } => "code",
            StreamEvent::Update { .. } => "update",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Complete => "complete",
        }
    }

    /// Session-level errors and completion end a stream; file-scoped errors do not.
    pub fn is_terminal(&self) -> bool {
        match self {
            StreamEvent::Complete => true,
            StreamEvent::Error { path, .. } => path.is_none(),
            StreamEvent::Start { .. }
            | StreamEvent::Progress { .. }
            | StreamEvent::Analysis { .. }
            | StreamEvent::Structure { .. }
            | StreamEvent::Code { .. }
            | StreamEvent::Update { .. } => false,
        }
    }
}

/// Encodes one event as a `data: <json>\n\n` frame.
pub fn encode_frame(event: &StreamEvent) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("{}{}{}", FRAME_PREFIX, json, FRAME_TERMINATOR)))
}

/// Reassembles frames from arbitrarily split chunks of an event stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it. Partial frames
    /// stay buffered; malformed frames are logged and skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        let mut events = Vec::new();
        while let Some(end) = self.buffer.find(FRAME_TERMINATOR) {
            let frame: String = self.buffer.drain(..end + FRAME_TERMINATOR.len()).collect();
            if let Some(event) = decode_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes received that do not yet form a complete frame.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

fn decode_frame(frame: &str) -> Option<StreamEvent> {
    let payload: String = frame
        .lines()
        .filter_map(|line| line.strip_prefix(FRAME_PREFIX).or_else(|| line.strip_prefix("data:")))
        .collect::<Vec<_>>()
        .join("\n");
    if payload.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed event frame: {} ({})", payload, e);
            None
        }
    }
}
