//! Transport-neutral request handling.
//!
//! Requests and responses are JSON values, so any transport can carry them.
//! The relay binary reads one request per line on stdin and writes one
//! response per line on stdout.

use crate::error::{Error, Rejection, Result};
use crate::message::{ContentId, Envelope};
use crate::relay::RelayService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    /// Submit a signed envelope.
    Submit(Envelope),
    /// List the proposals of a token.
    Proposals {
        /// Community token.
        token: String,
    },
    /// List the votes on a proposal.
    Votes {
        /// Community token.
        token: String,
        /// Author content id of the proposal.
        proposal: ContentId,
    },
    /// Describe the relay.
    Info,
}

fn error_response(message: &str) -> Value {
    json!({ "error": message })
}

fn respond<T: Serialize>(result: Result<T>) -> Value {
    result
        .and_then(|value| serde_json::to_value(value).map_err(Error::from))
        .unwrap_or_else(|e| error_response(&e.client_message()))
}

/// Handle one request.
pub async fn handle(service: &RelayService, request: Request) -> Value {
    match request {
        Request::Submit(envelope) => respond(service.submit_message(&envelope).await),
        Request::Proposals { token } => respond(service.list_proposals(&token).await),
        Request::Votes { token, proposal } => {
            respond(service.list_votes(&token, &proposal).await)
        }
        Request::Info => respond(Ok(service.service_info())),
    }
}

/// Handle one serialized request, returning the serialized response.
///
/// A line that is not a valid request is answered like a malformed
/// submission.
pub async fn handle_line(service: &RelayService, line: &str) -> String {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => handle(service, request).await,
        Err(e) => {
            debug!("Malformed request: {e}");
            error_response(&Rejection::MessageBody.to_string())
        }
    };
    response.to_string()
}
