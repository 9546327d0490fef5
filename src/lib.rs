//! Client of real-time audio/video rooms.
//!
//! Manages a single RTC session against an SFU: signalling handshake, media
//! engine device and transports negotiation, local media production and
//! remote media consumption. Everything here is `!Send` and is expected to be
//! driven from a single thread (see [`platform::spawn()`]).
//!
//! The UI layer talks to a [`Room`] via its [`RoomHandle`], issuing intents
//! (enable webcam, mute microphone, set participant volume) and observing
//! [`session::Session`] snapshots.

#![forbid(unsafe_code)]

pub mod utils;

pub mod conf;
pub mod media;
pub mod platform;
pub mod room;
pub mod rpc;
pub mod session;

#[doc(inline)]
pub use self::{
    conf::Conf,
    room::{HandleDetachedError, Platform, Room, RoomError, RoomHandle},
    session::Session,
};
