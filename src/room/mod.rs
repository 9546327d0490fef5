//! Session controller: the state machine of a single room membership.

mod events;
mod local;
mod remote;

use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::{Rc, Weak},
};

use derive_more::{Display, From};
use futures::{stream::LocalBoxStream, StreamExt as _};
use tracerr::Traced;

use crate::{
    conf::Conf,
    media::{LocalMediaType, MediaKind, MediaSlot, VideoOptions},
    platform::{
        self, EngineError, InputDeviceInfo, InputDeviceKind, MediaDevices,
        MediaDevicesError, MediaEngine, VideoConstraints,
    },
    rpc::{
        Command, ConnectionInfo, Connector, Event, ParticipantId,
        SignallingError,
    },
    session::{Epoch, ResourceError, Resources, Session, SessionStore},
    utils::Callback1,
};

/// Errors occurring in a [`Room`], all routed to the
/// [`RoomHandle::on_error()`] callback.
#[derive(Clone, Debug, Display, From)]
pub enum RoomError {
    /// Media engine device cannot produce media of this kind.
    #[display(fmt = "Device cannot produce {} media", _0)]
    #[from(ignore)]
    Capability(MediaKind),

    /// Capture device is missing or access to it is denied.
    #[display(fmt = "{}", _0)]
    MediaDevices(MediaDevicesError),

    /// Media engine failed.
    #[display(fmt = "{}", _0)]
    Engine(EngineError),

    /// Signalling channel failed.
    #[display(fmt = "{}", _0)]
    Signalling(SignallingError),

    /// Required session resource is missing.
    #[display(fmt = "{}", _0)]
    Resource(ResourceError),

    /// Connection to the server failed or was lost.
    #[display(fmt = "Connection error: {}", _0)]
    #[from(ignore)]
    Connection(String),

    /// Server rejected credentials (status `401`).
    #[display(fmt = "Not authenticated: {}", _0)]
    #[from(ignore)]
    Unauthenticated(String),

    /// Server denied access (status `403`).
    #[display(fmt = "Access forbidden: {}", _0)]
    #[from(ignore)]
    Forbidden(String),

    /// Server reported any other error.
    #[display(fmt = "Server error {}: {}", status, message)]
    #[from(ignore)]
    Server { status: u16, message: String },

    /// Local media track ended on its own (e.g. device was unplugged).
    #[display(fmt = "{} track ended", _0)]
    #[from(ignore)]
    TrackEnded(LocalMediaType),
}

impl RoomError {
    /// Maps an error reported by the server to a [`RoomError`].
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthenticated(message),
            403 => Self::Forbidden(message),
            _ => Self::Server { status, message },
        }
    }
}

/// Error of [`RoomHandle`]'s [`Weak`] pointer being detached.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Room is in detached state")]
pub struct HandleDetachedError;

macro_rules! upgrade_inner {
    ($v:expr) => {
        $v.upgrade()
            .ok_or_else(|| tracerr::new!(HandleDetachedError))
    };
}

/// Collaborators a [`Room`] drives.
pub struct Platform {
    /// Opener of signalling channels.
    pub connector: Rc<dyn Connector>,

    /// Factory of media engine devices.
    pub engine: Rc<dyn MediaEngine>,

    /// Source of local media tracks.
    pub media_devices: Rc<dyn MediaDevices>,
}

/// Client of a single room membership at a time.
///
/// Owns the session state and all the native resources, which are released
/// once the [`Room`] is dropped. The UI talks to it via [`RoomHandle`]s.
pub struct Room(Rc<InnerRoom>);

impl Room {
    /// Creates a new [`Room`] configured with the provided [`Conf`].
    #[must_use]
    pub fn new(conf: Conf, platform: Platform) -> Self {
        let session = Session {
            server_endpoint: conf.rpc.endpoint.clone(),
            video_options: conf.media.video.clone(),
            ..Session::default()
        };
        Self(Rc::new(InnerRoom {
            conf,
            connector: platform.connector,
            engine: platform.engine,
            media_devices: platform.media_devices,
            store: SessionStore::new(session),
            resources: Resources::default(),
            auth_token: RefCell::new(None),
            connecting: Cell::new(false),
            deafened_paused: RefCell::new(HashSet::new()),
            on_error: Callback1::default(),
        }))
    }

    /// Creates a new external handle to this [`Room`].
    #[inline]
    #[must_use]
    pub fn new_handle(&self) -> RoomHandle {
        RoomHandle(Rc::downgrade(&self.0))
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.0.resources.reset();
    }
}

/// Actual data of a [`Room`].
struct InnerRoom {
    /// Client configuration.
    conf: Conf,

    /// Opener of signalling channels.
    connector: Rc<dyn Connector>,

    /// Factory of media engine devices.
    engine: Rc<dyn MediaEngine>,

    /// Source of local media tracks.
    media_devices: Rc<dyn MediaDevices>,

    /// Observable session state.
    store: SessionStore,

    /// Native handles of the session.
    resources: Resources,

    /// Token authorizing the next signalling connection.
    auth_token: RefCell<Option<String>>,

    /// Signalling channel is being opened.
    connecting: Cell<bool>,

    /// Participants whose audio was paused locally before the session got
    /// deafened.
    deafened_paused: RefCell<HashSet<ParticipantId>>,

    /// Sink of all the errors.
    on_error: Callback1<Traced<RoomError>>,
}

impl InnerRoom {
    /// Logs the provided error and passes it to the error callback.
    fn report(&self, err: Traced<RoomError>) {
        match err.as_ref() {
            RoomError::TrackEnded(_) => log::warn!("{}", err),
            _ => log::error!("{}", err),
        }
        if !self.on_error.is_set() {
            log::debug!("`on_error` callback isn't set");
        }
        self.on_error.call1(err);
    }

    /// Reports the error of the provided operation result, if any.
    fn report_result(&self, result: Result<(), Traced<RoomError>>) {
        if let Err(err) = result {
            self.report(err);
        }
    }

    /// Sends the provided [`Command`] if the signalling channel is open.
    fn emit(&self, command: Command) {
        match self.resources.socket() {
            Some(socket) => socket.emit(command),
            None => log::debug!("Not connected, dropping {:?}", command),
        }
    }

    /// Connects to the provided room, leaving the current one first if it's
    /// a different one.
    async fn connect(
        self: &Rc<Self>,
        room_id: String,
        domain_id: String,
    ) -> Result<(), Traced<RoomError>> {
        let is_active =
            self.resources.socket().is_some() || self.connecting.get();
        if is_active && self.store.borrow().is_room(&room_id, &domain_id) {
            log::debug!("Already connected to room {}", room_id);
            return Ok(());
        }
        if is_active
            || self.store.borrow().joined
            || self.resources.holds_media()
        {
            self.disconnect();
        }

        self.store.update(|s| {
            *s = s.reconnecting(room_id.clone(), domain_id.clone());
        });
        let info = ConnectionInfo {
            endpoint: self.store.borrow().server_endpoint.clone(),
            room_id,
            domain_id,
            token: self.auth_token.borrow().clone(),
        };
        log::info!("Connecting to room {} at {}", info.room_id, info.endpoint);

        let epoch = self.resources.epoch();
        self.connecting.set(true);
        let socket = platform::timeout(
            self.conf.rpc.connect_timeout,
            self.connector.connect(info),
        )
        .await;
        if !self.resources.is_current(epoch) {
            if let Ok(Ok(socket)) = socket {
                log::debug!("Connection is established for a stale session");
                socket.disconnect();
            }
            return Ok(());
        }
        self.connecting.set(false);

        let socket = socket
            .map_err(|e| tracerr::new!(RoomError::Connection(e.to_string())))?
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        self.resources.set_socket(Rc::clone(&socket));
        self.spawn_event_loop(socket.subscribe(), epoch);
        Ok(())
    }

    /// Handles server [`Event`]s one by one until the channel is closed or
    /// the session is reset.
    fn spawn_event_loop(
        self: &Rc<Self>,
        mut events: LocalBoxStream<'static, Event>,
        epoch: Epoch,
    ) {
        let weak = Rc::downgrade(self);
        platform::spawn(async move {
            while let Some(event) = events.next().await {
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => break,
                };
                if !inner.resources.is_current(epoch)
                    || inner.resources.socket().is_none()
                {
                    break;
                }
                if let Err(e) = event.dispatch_with(&inner).await {
                    inner.report(e);
                }
            }
            log::debug!("Signalling event loop is finished");
        });
    }

    /// Closes all the resources and leaves the room, keeping the room
    /// identity and local intents.
    fn disconnect(&self) {
        self.connecting.set(false);
        self.resources.reset();
        self.deafened_paused.borrow_mut().clear();
        self.store.update(Session::detach);
        log::info!("Disconnected");
    }

    /// Closes the signalling channel only, keeping the session state.
    fn drop_socket(&self) {
        if let Some(socket) = self.resources.take_socket() {
            socket.disconnect();
        }
    }

    /// Lists available microphones.
    async fn enumerate_audio_inputs(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<RoomError>> {
        let devices = self
            .media_devices
            .enumerate_devices()
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        Ok(devices
            .into_iter()
            .filter(|d| d.kind == InputDeviceKind::AudioInput)
            .collect())
    }
}

/// External handle to a [`Room`].
///
/// All the intents report their failures to the [`RoomHandle::on_error()`]
/// callback instead of returning them. The only returned error is
/// [`HandleDetachedError`].
#[derive(Clone)]
pub struct RoomHandle(Weak<InnerRoom>);

impl RoomHandle {
    /// Sets the callback receiving all the [`RoomError`]s.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn on_error<F>(&self, f: F) -> Result<(), Traced<HandleDetachedError>>
    where
        F: Fn(Traced<RoomError>) + 'static,
    {
        upgrade_inner!(self.0).map(|inner| inner.on_error.set_func(f))
    }

    /// Sets the signalling server endpoint used by the next
    /// [`RoomHandle::connect()`].
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn set_server_endpoint(
        &self,
        endpoint: String,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        inner.store.update(|s| s.server_endpoint = endpoint);
        Ok(())
    }

    /// Sets the token authorizing the next [`RoomHandle::connect()`].
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn set_auth_token(
        &self,
        token: Option<String>,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        *inner.auth_token.borrow_mut() = token;
        Ok(())
    }

    /// Connects to the provided room and waits for the signalling channel to
    /// be opened.
    ///
    /// No-op if connected (or connecting) to the same room already. Leaves
    /// the current room first if it's a different one.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn connect(
        &self,
        room_id: String,
        domain_id: String,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.connect(room_id, domain_id).await;
        inner.report_result(result);
        Ok(())
    }

    /// Leaves the room closing all the resources. Safe to call when not
    /// connected.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn disconnect(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.disconnect())
    }

    /// Returns the latest [`Session`] snapshot.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn snapshot(&self) -> Result<Session, Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.store.snapshot())
    }

    /// Returns [`LocalBoxStream`] of [`Session`] snapshots, starting with the
    /// current one.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn subscribe(
        &self,
    ) -> Result<LocalBoxStream<'static, Session>, Traced<HandleDetachedError>>
    {
        upgrade_inner!(self.0).map(|inner| inner.store.subscribe())
    }

    /// Waits for a [`Session`] snapshot satisfying the provided predicate.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails or the
    /// [`Room`] is dropped while waiting.
    pub async fn when<F>(
        &self,
        predicate: F,
    ) -> Result<(), Traced<HandleDetachedError>>
    where
        F: Fn(&Session) -> bool + 'static,
    {
        let when = upgrade_inner!(self.0)?.store.when(predicate);
        when.await.map_err(|_| tracerr::new!(HandleDetachedError))
    }

    /// Lists available microphones. Lists nothing if enumeration fails.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn enumerate_audio_inputs(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        Ok(inner.enumerate_audio_inputs().await.unwrap_or_else(|e| {
            inner.report(e);
            Vec::new()
        }))
    }

    /// Returns a handle controlling the local microphone.
    #[inline]
    #[must_use]
    pub fn microphone(&self) -> MicrophoneHandle {
        MicrophoneHandle(Weak::clone(&self.0))
    }

    /// Returns a handle controlling the local webcam.
    #[inline]
    #[must_use]
    pub fn webcam(&self) -> WebcamHandle {
        WebcamHandle(Weak::clone(&self.0))
    }

    /// Returns a handle controlling the local screen sharing.
    #[inline]
    #[must_use]
    pub fn screenshare(&self) -> ScreenshareHandle {
        ScreenshareHandle(Weak::clone(&self.0))
    }

    /// Returns a handle controlling playback of the remote audio.
    #[inline]
    #[must_use]
    pub fn audio(&self) -> AudioHandle {
        AudioHandle(Weak::clone(&self.0))
    }

    /// Pauses playback of the provided participant's consumer locally.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn pause(
        &self,
        participant_id: &ParticipantId,
        slot: MediaSlot,
    ) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.pause(participant_id, slot))
    }

    /// Resumes playback of the provided participant's consumer locally.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn resume(
        &self,
        participant_id: &ParticipantId,
        slot: MediaSlot,
    ) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.resume(participant_id, slot))
    }
}

/// Handle controlling the local microphone of a [`Room`].
#[derive(Clone)]
pub struct MicrophoneHandle(Weak<InnerRoom>);

impl MicrophoneHandle {
    /// Starts producing the microphone audio. No-op if it's produced already.
    ///
    /// Before the room is joined only selects the device, the microphone is
    /// enabled automatically on join unless muted.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn enable(
        &self,
        device_id: Option<String>,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.enable_microphone(device_id).await;
        inner.report_result(result);
        Ok(())
    }

    /// Stops producing the microphone audio.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn disable(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0)
            .map(|inner| inner.disable_producer(LocalMediaType::Microphone))
    }

    /// Pauses the microphone producer. Remembered until unmuted, so a
    /// producer created later starts paused.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn mute(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.set_mic_muted(true))
    }

    /// Resumes the microphone producer.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn unmute(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.set_mic_muted(false))
    }

    /// Selects the microphone to capture from, recapturing if the
    /// microphone is enabled.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn set_device(
        &self,
        device_id: String,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.set_microphone_device(device_id).await;
        inner.report_result(result);
        Ok(())
    }
}

/// Handle controlling the local webcam of a [`Room`].
#[derive(Clone)]
pub struct WebcamHandle(Weak<InnerRoom>);

impl WebcamHandle {
    /// Starts producing the webcam video, optionally replacing the video
    /// preferences first. No-op if it's produced already.
    ///
    /// Before the room is joined only records the intent, the webcam is
    /// enabled automatically on join.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn enable(
        &self,
        options: Option<VideoOptions>,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.enable_webcam(options).await;
        inner.report_result(result);
        Ok(())
    }

    /// Stops producing the webcam video.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn disable(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.disable_webcam())
    }

    /// Replaces the video preferences, recreating the webcam producer if
    /// it's enabled.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn set_options(
        &self,
        options: VideoOptions,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.set_webcam_options(options).await;
        inner.report_result(result);
        Ok(())
    }
}

/// Handle controlling the local screen sharing of a [`Room`].
#[derive(Clone)]
pub struct ScreenshareHandle(Weak<InnerRoom>);

impl ScreenshareHandle {
    /// Starts producing a display capture. No-op if it's produced already.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub async fn enable(
        &self,
        constraints: Option<VideoConstraints>,
    ) -> Result<(), Traced<HandleDetachedError>> {
        let inner = upgrade_inner!(self.0)?;
        let result = inner.enable_screenshare(constraints).await;
        inner.report_result(result);
        Ok(())
    }

    /// Stops producing the display capture.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn disable(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0)
            .map(|inner| inner.disable_producer(LocalMediaType::Screenshare))
    }
}

/// Handle controlling playback of the remote audio in a [`Room`].
#[derive(Clone)]
pub struct AudioHandle(Weak<InnerRoom>);

impl AudioHandle {
    /// Pauses the audio of every participant.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn deafen(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.deafen())
    }

    /// Resumes the audio paused by [`AudioHandle::deafen()`], leaving paused
    /// the one that was paused before.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn undeafen(&self) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0).map(|inner| inner.undeafen())
    }

    /// Sets the local playback volume (`0..=100`) of the provided
    /// participant. Zero volume pauses the participant's audio.
    ///
    /// # Errors
    ///
    /// With [`HandleDetachedError`] if [`Weak`] pointer upgrade fails.
    pub fn set_volume(
        &self,
        participant_id: &ParticipantId,
        volume: u8,
    ) -> Result<(), Traced<HandleDetachedError>> {
        upgrade_inner!(self.0)
            .map(|inner| inner.set_volume(participant_id, volume))
    }
}
