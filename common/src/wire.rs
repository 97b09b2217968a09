//! Wire envelope pushed to live observers.
//!
//! Every outbound message is `{"type": ..., "data": ...}`. The four type
//! names (`event`, `alert`, `camera_status`, `pong`) are what browser
//! clients switch on, so they must not change.

use serde::{Deserialize, Serialize};

use crate::types::{AlertPayload, CameraStatusUpdate, DetectionEvent};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    Event(DetectionEvent),
    Alert(AlertPayload),
    CameraStatus(CameraStatusUpdate),
    Pong(EmptyPayload),
}

impl Envelope {
    pub fn pong() -> Self {
        Envelope::Pong(EmptyPayload::default())
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Envelope::Event(_) => "event",
            Envelope::Alert(_) => "alert",
            Envelope::CameraStatus(_) => "camera_status",
            Envelope::Pong(_) => "pong",
        }
    }

    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// What an observer sent us. Only `ping` has meaning today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Ping,
    Unrecognized(String),
    Malformed,
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(InboundFrame { kind: Some(kind) }) if kind == "ping" => InboundMessage::Ping,
            Ok(InboundFrame { kind: Some(kind) }) => InboundMessage::Unrecognized(kind),
            Ok(InboundFrame { kind: None }) => InboundMessage::Unrecognized(String::new()),
            Err(_) => InboundMessage::Malformed,
        }
    }
}
