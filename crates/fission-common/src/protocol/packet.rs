use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::context::CallContext;
use crate::protocol::error::Result;
use crate::protocol::status::Status;

/// Whether a packet carries a request or the answer to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "REQUEST")]
    Request,
    #[serde(rename = "RESPONSE")]
    Response,
}

/// The unit of message exchange between the orchestrator and its workers.
///
/// # Fields
///
/// - `id`: globally unique per request; a response copies the id of the
///   request it answers, and correlation happens by id alone
/// - `direction`: request or response
/// - `target`: the fully qualified method address on a request
///   (`{package}.{Service}.{Method}`); empty and ignored on a response
/// - `context`: propagated call metadata, see [`CallContext`]
/// - `payload`: the serialized request or response body, opaque to routing
/// - `error`: present only on a response to indicate failure; authoritative
///   when present
///
/// # Example
///
/// ```
/// use fission_common::protocol::{CallContext, Packet};
///
/// let request = Packet::request("pkg.Svc.Ping", CallContext::default(), &()).unwrap();
/// let response = Packet::response(request.id.clone(), CallContext::default(),
///     Some(&"pong"), None).unwrap();
/// assert_eq!(request.id, response.id);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: String,
    pub direction: Direction,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub context: CallContext,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
}

impl Packet {
    /// Constructs a packet from already-serialized payload bytes.
    pub fn new(
        id: impl Into<String>,
        direction: Direction,
        target: impl Into<String>,
        context: CallContext,
        payload: Vec<u8>,
        error: Option<Status>,
    ) -> Self {
        Self {
            id: id.into(),
            direction,
            target: target.into(),
            context,
            payload,
            error,
        }
    }

    /// Serializes `payload` and constructs a request packet with a fresh id.
    pub fn request<T: Serialize>(
        target: impl Into<String>,
        context: CallContext,
        payload: &T,
    ) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::new(
            generate_packet_id(),
            Direction::Request,
            target,
            context,
            bytes,
            None,
        ))
    }

    /// Constructs the response to the request identified by `id`.
    ///
    /// The payload is empty when the handler produced no value, which is the
    /// case whenever `error` is the meaningful half of the response.
    pub fn response<T: Serialize>(
        id: impl Into<String>,
        context: CallContext,
        payload: Option<&T>,
        error: Option<Status>,
    ) -> Result<Self> {
        let bytes = match payload {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };
        Ok(Self::new(id, Direction::Response, "", context, bytes, error))
    }

    /// Decodes the payload and surfaces the carried error as a value.
    ///
    /// The outer `Result` is the transport-level outcome; the inner pair
    /// holds the decoded body (`None` for an empty payload) together with
    /// the logical error, so callers observe both at once.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<(Option<T>, Option<Status>)> {
        let value = if self.payload.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&self.payload)?)
        };
        Ok((value, self.error.clone()))
    }
}

/// Generates a globally unique packet id.
pub fn generate_packet_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
