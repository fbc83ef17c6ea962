//! Relay message and routing types

use crate::config::{RelaySettings, RouteDefinition};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Outbound type announcing that a session finished
pub const STREAM_END: &str = "stream-end";

/// Outbound type announcing that a session failed
pub const STREAM_ERROR: &str = "stream-error";

// ============================================================================
// Channel Message
// ============================================================================

/// One frame on the consumer channel: `{"type": ..., "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message type
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonObject>,
}

impl ChannelMessage {
    /// Message with no payload
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
        }
    }

    /// Message carrying `data`
    pub fn with_data(kind: impl Into<String>, data: JsonObject) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
        }
    }

    /// Page delivery: `{"type": kind, "data": {key: records}}`
    pub fn records(kind: impl Into<String>, key: impl Into<String>, records: Vec<JsonValue>) -> Self {
        let mut data = JsonObject::new();
        data.insert(key.into(), JsonValue::Array(records));
        Self::with_data(kind, data)
    }

    /// Completion frame for a finished session
    pub fn stream_end(request: &str, pages: u32, records: usize) -> Self {
        Self::with_data(
            STREAM_END,
            object(json!({ "request": request, "pages": pages, "records": records })),
        )
    }

    /// Completion frame for a failed session
    pub fn stream_error(request: &str, message: impl Into<String>) -> Self {
        Self::with_data(
            STREAM_ERROR,
            object(json!({ "request": request, "message": message.into() })),
        )
    }

    /// Decode a text frame
    ///
    /// The frame must be a JSON object with a non-empty string `type`; a
    /// `data` member, when present and not null, must be an object.
    pub fn decode(text: &str) -> Result<Self> {
        let message: Self = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("Frame is not a channel message: {e}")))?;
        if message.kind.trim().is_empty() {
            return Err(Error::protocol("Message type cannot be empty"));
        }
        Ok(message)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// String member of the payload
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

fn object(value: JsonValue) -> JsonObject {
    match value {
        JsonValue::Object(map) => map,
        _ => JsonObject::new(),
    }
}

// ============================================================================
// Routing
// ============================================================================

/// Resolved route: which upstream endpoint answers a request type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Inbound request type
    pub request: String,
    /// Upstream endpoint path
    pub endpoint: String,
    /// Key of the record array in page bodies and outbound frames
    pub record_key: String,
    /// Outbound message type
    pub response: String,
}

impl From<&RouteDefinition> for Route {
    fn from(def: &RouteDefinition) -> Self {
        Self {
            request: def.request.clone(),
            endpoint: def.endpoint.clone(),
            record_key: def.record_key.clone(),
            response: def.response_type().to_string(),
        }
    }
}

/// What the relay should do with an inbound text frame
#[derive(Debug)]
pub enum FrameOutcome {
    /// Start a session on this route
    Dispatch(Route),
    /// The frame could not be decoded
    Malformed(Error),
    /// Valid message of a type no route answers
    Unrecognized(String),
}

/// Request type → route lookup
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    /// Build from route definitions; later duplicates replace earlier ones
    pub fn new(definitions: &[RouteDefinition]) -> Self {
        let routes = definitions
            .iter()
            .map(|def| (def.request.clone(), Route::from(def)))
            .collect();
        Self { routes }
    }

    /// Route for a request type
    pub fn get(&self, request: &str) -> Option<&Route> {
        self.routes.get(request)
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Request types, sorted
    pub fn request_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Decode an inbound text frame and decide what to do with it
    pub fn resolve(&self, text: &str) -> FrameOutcome {
        match ChannelMessage::decode(text) {
            Ok(message) => match self.get(&message.kind) {
                Some(route) => FrameOutcome::Dispatch(route.clone()),
                None => FrameOutcome::Unrecognized(message.kind),
            },
            Err(e) => FrameOutcome::Malformed(e),
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(&RelaySettings::default().routes)
    }
}

// ============================================================================
// Consumer Side
// ============================================================================

/// How a session ended, as announced by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// `stream-end` arrived
    Finished {
        /// Pages the relay reported
        pages: u64,
        /// Records the relay reported
        records: u64,
    },
    /// `stream-error` arrived
    Failed {
        /// Error text the relay reported
        message: String,
    },
}

/// Consumer model: collects the records of one request type
///
/// Each frame of the route's response type appends its records in arrival
/// order. Completion frames for the same request end the accumulation.
#[derive(Debug, Clone)]
pub struct Accumulator {
    route: Route,
    records: Vec<JsonValue>,
    frames: usize,
    completion: Option<Completion>,
}

impl Accumulator {
    /// Start accumulating for `route`
    pub fn new(route: Route) -> Self {
        Self {
            route,
            records: Vec::new(),
            frames: 0,
            completion: None,
        }
    }

    /// The request that starts this accumulation
    pub fn request(&self) -> ChannelMessage {
        ChannelMessage::new(self.route.request.clone())
    }

    /// Feed one message; returns whether it belonged to this accumulation
    pub fn accept(&mut self, message: &ChannelMessage) -> bool {
        if self.completion.is_some() {
            return false;
        }

        if message.kind == self.route.response {
            let Some(records) = message
                .data
                .as_ref()
                .and_then(|d| d.get(&self.route.record_key))
                .and_then(JsonValue::as_array)
            else {
                return false;
            };
            self.records.extend(records.iter().cloned());
            self.frames += 1;
            return true;
        }

        if message.data_str("request") != Some(self.route.request.as_str()) {
            return false;
        }

        match message.kind.as_str() {
            STREAM_END => {
                let count = |key: &str| {
                    message
                        .data
                        .as_ref()
                        .and_then(|d| d.get(key))
                        .and_then(JsonValue::as_u64)
                        .unwrap_or_default()
                };
                self.completion = Some(Completion::Finished {
                    pages: count("pages"),
                    records: count("records"),
                });
                true
            }
            STREAM_ERROR => {
                self.completion = Some(Completion::Failed {
                    message: message.data_str("message").unwrap_or_default().to_string(),
                });
                true
            }
            _ => false,
        }
    }

    /// Records collected so far, in arrival order
    pub fn records(&self) -> &[JsonValue] {
        &self.records
    }

    /// Number of page frames accepted
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// How the session ended, if announced
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Check if a completion frame arrived
    pub fn is_complete(&self) -> bool {
        self.completion.is_some()
    }

    /// Take the collected records
    pub fn into_records(self) -> Vec<JsonValue> {
        self.records
    }
}
