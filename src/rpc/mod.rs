//! Signalling channel between this client and the SFU server.

mod protocol;

use std::rc::Rc;

use async_trait::async_trait;
use derive_more::Display;
use futures::stream::LocalBoxStream;
use serde_json::Value;
use tracerr::Traced;
use url::Url;

#[doc(inline)]
pub use self::protocol::{
    Command, ConsumerId, ConsumerScore, ConsumerSpec, ConsumerType, Event,
    EventHandler, ParticipantId, ProducerId, ProducerScore,
};

/// Errors of the signalling channel.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum SignallingError {
    /// Channel is closed and can't deliver anything.
    #[display(fmt = "Signalling channel is closed")]
    Closed,

    /// Server answered a request with an error.
    #[display(fmt = "Server rejected request: {}", _0)]
    Rejected(String),

    /// Server answered a request with an unexpected payload.
    #[display(fmt = "Malformed acknowledgement: {}", _0)]
    MalformedAck(String),

    /// Channel could not be opened.
    #[display(fmt = "Failed to open signalling channel: {}", _0)]
    ConnectionFailed(String),
}

/// Opened signalling channel.
///
/// Server events are delivered via [`Signalling::subscribe()`] stream, which
/// ends once the channel is closed.
#[async_trait(?Send)]
pub trait Signalling {
    /// Sends the provided [`Command`] without waiting for an acknowledgement.
    fn emit(&self, command: Command);

    /// Sends the provided [`Command`] and resolves with the server's
    /// acknowledgement payload.
    async fn request(
        &self,
        command: Command,
    ) -> Result<Value, Traced<SignallingError>>;

    /// Returns [`LocalBoxStream`] of all the [`Event`]s received from the
    /// server.
    fn subscribe(&self) -> LocalBoxStream<'static, Event>;

    /// Closes this channel.
    fn disconnect(&self);
}

/// Opener of [`Signalling`] channels.
#[async_trait(?Send)]
pub trait Connector {
    /// Opens a new [`Signalling`] channel described by the provided
    /// [`ConnectionInfo`].
    async fn connect(
        &self,
        info: ConnectionInfo,
    ) -> Result<Rc<dyn Signalling>, Traced<SignallingError>>;
}

/// Parameters of a [`Signalling`] channel to open.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionInfo {
    /// Server endpoint (`wss://host:port`).
    pub endpoint: String,

    /// Room to join.
    pub room_id: String,

    /// Domain the room belongs to.
    pub domain_id: String,

    /// Authorization token, if any.
    pub token: Option<String>,
}

impl ConnectionInfo {
    /// Builds the URL of the channel, carrying the room, domain and token as
    /// query parameters.
    ///
    /// # Errors
    ///
    /// If [`ConnectionInfo::endpoint`] is not a valid URL.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("roomId", &self.room_id)
                .append_pair("domainId", &self.domain_id);
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}
