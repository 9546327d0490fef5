//! Scenarios of a room session driven over in-memory signalling, media engine
//! and capture devices.

mod local_media;
mod remote_media;

use std::{cell::RefCell, future::Future, rc::Rc};

use huddle::{
    media::MediaKind,
    room::{Platform, Room, RoomError, RoomHandle},
    rpc::{Command, ConsumerSpec, Event, ParticipantId},
    utils::Responder,
    Conf, Session,
};
use serde_json::json;
use tracerr::Traced;

use self::fakes::{
    FakeConnector, FakeEngine, FakeMediaDevices, FakeSignalling,
};

/// Runs the provided test on a single-threaded runtime able to spawn local
/// tasks.
pub fn run<F: Future<Output = ()>>(test: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    tokio::task::LocalSet::new().block_on(&rt, test);
}

/// Lets all the spawned tasks run until they're stuck.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// [`Event::Config`] with distinguishable transport IDs.
pub fn config_event() -> Event {
    Event::Config {
        router_rtp_capabilities: json!({ "codecs": [] }),
        producer_transport_options: json!({ "id": "send-1" }),
        consumer_transport_options: json!({ "id": "recv-1" }),
    }
}

/// [`ConsumerSpec`] of a remote participant's track.
pub fn consumer_spec(
    participant_id: &str,
    consumer_id: &str,
    kind: MediaKind,
    share: bool,
) -> ConsumerSpec {
    serde_json::from_value(json!({
        "participantId": participant_id,
        "producerId": format!("remote-{}", consumer_id),
        "id": consumer_id,
        "kind": kind,
        "rtpParameters": {
            "codecs": [{ "mimeType": "video/VP9" }],
            "encodings": [{ "scalabilityMode": "L3T3" }],
        },
        "type": "svc",
        "appData": { "share": share },
    }))
    .unwrap()
}

/// [`Room`] wired to the fakes, collecting all its errors.
pub struct Harness {
    pub room: Room,
    pub handle: RoomHandle,
    pub connector: Rc<FakeConnector>,
    pub engine: Rc<FakeEngine>,
    pub devices: Rc<FakeMediaDevices>,
    errors: Rc<RefCell<Vec<RoomError>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_conf(Conf::default())
    }

    pub fn with_conf(conf: Conf) -> Self {
        let connector = Rc::new(FakeConnector::default());
        let engine = Rc::new(FakeEngine::default());
        let devices = Rc::new(FakeMediaDevices::default());
        let room = Room::new(
            conf,
            Platform {
                connector: Rc::clone(&connector) as _,
                engine: Rc::clone(&engine) as _,
                media_devices: Rc::clone(&devices) as _,
            },
        );
        let handle = room.new_handle();

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        handle
            .on_error(move |e: Traced<RoomError>| {
                sink.borrow_mut().push(e.into_inner());
            })
            .unwrap();

        Self {
            room,
            handle,
            connector,
            engine,
            devices,
            errors,
        }
    }

    /// The latest opened signalling channel.
    pub fn socket(&self) -> Rc<FakeSignalling> {
        self.connector.sockets().pop().expect("not connected")
    }

    pub fn session(&self) -> Session {
        self.handle.snapshot().unwrap()
    }

    /// All the errors reported so far.
    pub fn errors(&self) -> Vec<RoomError> {
        self.errors.borrow().clone()
    }

    pub async fn connect_to(&self, room_id: &str) {
        self.handle
            .connect(room_id.to_owned(), "domains:1".to_owned())
            .await
            .unwrap();
        settle().await;
    }

    pub async fn connect(&self) {
        self.connect_to("rooms:1").await;
    }

    /// Connects and passes the handshake with the provided participants
    /// present in the room.
    pub async fn join(&self, participants: &[&str]) {
        self.connect().await;
        let socket = self.socket();
        socket.send(config_event());
        let (ack, acked) = Responder::new();
        socket.send(Event::Joined {
            participant_ids: participants
                .iter()
                .map(|id| ParticipantId::from(*id))
                .collect(),
            ack,
        });
        settle().await;
        assert_eq!(acked.await, Ok(()));
    }

    /// Asks the client to consume a remote track, returning its answer.
    pub async fn consume(&self, spec: ConsumerSpec) -> bool {
        let (callback, answer) = Responder::new();
        self.socket().send(Event::MakeConsumer { spec, callback });
        settle().await;
        answer.await.unwrap()
    }

    /// Commands sent over the latest channel since the last call.
    pub fn take_commands(&self) -> Vec<Command> {
        let socket = self.socket();
        let commands = socket.commands();
        socket.clear_commands();
        commands
    }
}
