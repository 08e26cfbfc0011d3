//! Wire protocol between the embedding host and the worker.
//!
//! The host delivers events (intercepted fetches, sync wake-ups, push
//! payloads, notification clicks, window lifecycle) as JSON lines on
//! stdin. The worker answers fetch events and mirrors its broadcasts as
//! JSON lines on stdout. One object per line in each direction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;
use vowkeep_core::exchange::Destination;
use vowkeep_core::{HttpRequest, HttpResponse};

use crate::bridge::ClientCommand;
use crate::coordinator::FetchOutcome;

/// One host event as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WireEvent {
    /// An intercepted request; `id` correlates the eventual reply.
    Fetch { id: u64, request: WireRequest },
    /// A platform background-sync event.
    Sync { tag: String },
    /// A push payload, passed through verbatim.
    Push {
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// The host observed connectivity coming back.
    ConnectivityRestored,
    /// The user clicked a displayed notification.
    NotificationClick { action: Option<String>, url: String },
    /// A foreground window attached to this worker.
    ClientConnected { id: String, url: String },
    /// A foreground window navigated away or closed.
    ClientDisconnected { id: String },
    /// A command from a foreground client.
    Message {
        #[serde(flatten)]
        command: ClientCommand,
    },
}

/// A request descriptor as the host sends it. The URL may be absolute
/// or origin-relative.
#[derive(Debug, Deserialize)]
pub struct WireRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default)]
    pub navigation: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

impl WireRequest {
    /// Resolve the wire descriptor into a concrete request.
    pub fn into_request(self, origin: &Url) -> Result<HttpRequest, vowkeep_client::net::UrlError> {
        let url = vowkeep_client::net::resolve(origin, &self.url)?;
        Ok(HttpRequest {
            method: self.method.to_ascii_uppercase(),
            url,
            headers: self.headers,
            body: self.body,
            destination: self.destination,
            is_navigation: self.navigation,
        })
    }
}

/// Worker reply to a fetch event.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WireReply {
    /// The coordinator produced this response. Body is carried as
    /// (lossy) text; this channel is diagnostics and plumbing, not a
    /// byte-exact transport.
    FetchResponse {
        id: u64,
        status: u16,
        headers: HashMap<String, String>,
        body: String,
    },
    /// Not intercepted; the host should run its default fetch.
    FetchPassthrough { id: u64 },
}

impl WireReply {
    pub fn from_outcome(id: u64, outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Respond(response) => Self::from_response(id, response),
            FetchOutcome::Passthrough => WireReply::FetchPassthrough { id },
        }
    }

    fn from_response(id: u64, response: HttpResponse) -> Self {
        let body = String::from_utf8_lossy(&response.body).to_string();
        WireReply::FetchResponse { id, status: response.status, headers: response.headers, body }
    }
}
