//! Handling of the server events and the media engine transport events.

use std::rc::Rc;

use async_trait::async_trait;
use futures::FutureExt as _;
use serde_json::Value;
use tracerr::Traced;

use crate::{
    platform::{self, ProduceParameters, Transport},
    rpc::{
        Command, ConsumerId, ConsumerScore, ConsumerSpec, EventHandler,
        ParticipantId, ProducerId, ProducerScore, Signalling, SignallingError,
    },
    session::Participant,
    utils::Responder,
};

use super::{InnerRoom, RoomError};

impl InnerRoom {
    /// Answers the provided [`Transport`]'s `connect` events over the
    /// signalling channel.
    fn wire_transport(self: &Rc<Self>, transport: &Rc<dyn Transport>) {
        let weak = Rc::downgrade(self);
        let transport_id = transport.id();
        transport.on_connect(Box::new(move |dtls_parameters| {
            let socket = weak.upgrade().and_then(|i| i.resources.socket());
            connect_transport(socket, transport_id.clone(), dtls_parameters)
                .boxed_local()
        }));
    }

    /// Answers the sending [`Transport`]'s `connect` and `produce` events
    /// over the signalling channel.
    fn wire_send_transport(self: &Rc<Self>, transport: &Rc<dyn Transport>) {
        self.wire_transport(transport);

        let weak = Rc::downgrade(self);
        let transport_id = transport.id();
        transport.on_produce(Box::new(move |params| {
            let socket = weak.upgrade().and_then(|i| i.resources.socket());
            request_producer(socket, transport_id.clone(), params)
                .boxed_local()
        }));
    }
}

/// Acknowledges local DTLS parameters of a transport.
async fn connect_transport(
    socket: Option<Rc<dyn Signalling>>,
    transport_id: String,
    dtls_parameters: Value,
) -> Result<(), Traced<SignallingError>> {
    let socket = socket.ok_or_else(|| tracerr::new!(SignallingError::Closed))?;
    socket
        .request(Command::ConnectTransport {
            transport_id,
            dtls_parameters,
        })
        .await
        .map(drop)
        .map_err(tracerr::wrap!(=> SignallingError))
}

/// Requests a server-side producer, resolving to its ID.
async fn request_producer(
    socket: Option<Rc<dyn Signalling>>,
    transport_id: String,
    params: ProduceParameters,
) -> Result<ProducerId, Traced<SignallingError>> {
    let socket = socket.ok_or_else(|| tracerr::new!(SignallingError::Closed))?;
    let ack = socket
        .request(Command::Produce {
            transport_id,
            kind: params.kind,
            rtp_parameters: params.rtp_parameters,
            app_data: params.app_data,
        })
        .await
        .map_err(tracerr::wrap!(=> SignallingError))?;
    ProducerId::from_ack(ack).map_err(tracerr::wrap!(=> SignallingError))
}

#[async_trait(?Send)]
impl EventHandler for Rc<InnerRoom> {
    type Output = Result<(), Traced<RoomError>>;

    /// Builds the device and both transports, then completes the handshake
    /// with the device's capabilities.
    async fn on_config(
        &self,
        router_rtp_capabilities: Value,
        producer_transport_options: Value,
        consumer_transport_options: Value,
    ) -> Self::Output {
        let epoch = self.resources.epoch();
        let device = self
            .engine
            .new_device()
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        device
            .load(router_rtp_capabilities)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        if !self.resources.is_current(epoch) {
            log::debug!("Device is loaded for a stale session");
            return Ok(());
        }

        let send = device
            .create_send_transport(producer_transport_options)
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        let recv = device
            .create_recv_transport(consumer_transport_options)
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        self.wire_send_transport(&send);
        self.wire_transport(&recv);
        self.resources.set_device(Rc::clone(&device));
        self.resources.set_transports(send, recv);

        self.emit(Command::Config {
            device: device.handler_name(),
            capabilities: device.rtp_capabilities(),
            sctp_capabilities: device.sctp_capabilities(),
        });
        log::info!("Device {} is loaded", device.handler_name());
        Ok(())
    }

    /// Marks the session as joined and applies the pending local intents:
    /// enables the microphone unless muted and the webcam if it's on.
    async fn on_joined(
        &self,
        participant_ids: Vec<ParticipantId>,
        ack: Responder<()>,
    ) -> Self::Output {
        self.store.update(|s| {
            s.joined = true;
            for id in participant_ids {
                s.participants
                    .entry(id.clone())
                    .or_insert_with(|| Participant::new(id));
            }
        });
        if let Err(e) = ack.respond(()) {
            log::warn!("Join is not acknowledged: {}", e);
        }
        log::info!("Joined room");

        let (enable_mic, enable_webcam) = {
            let session = self.store.borrow();
            (!session.is_mic_muted, session.is_webcam_on)
        };
        if enable_mic {
            let inner = Rc::clone(self);
            platform::spawn(async move {
                let result = inner.enable_microphone(None).await;
                inner.report_result(result);
            });
        }
        if enable_webcam {
            let inner = Rc::clone(self);
            platform::spawn(async move {
                let result = inner.enable_webcam(None).await;
                inner.report_result(result);
            });
        }
        Ok(())
    }

    /// Creates the requested consumer, answering whether it succeeded.
    async fn on_make_consumer(
        &self,
        spec: ConsumerSpec,
        callback: Responder<bool>,
    ) -> Self::Output {
        let result = self.make_consumer(spec).await;
        if let Err(e) = callback.respond(result.is_ok()) {
            log::warn!("Consumer creation is not answered: {}", e);
        }
        result
    }

    async fn on_participant_joined(
        &self,
        participant_id: ParticipantId,
    ) -> Self::Output {
        self.add_participant(participant_id);
        Ok(())
    }

    async fn on_participant_left(
        &self,
        participant_id: ParticipantId,
    ) -> Self::Output {
        self.remove_participant(&participant_id);
        Ok(())
    }

    async fn on_consumer_closed(
        &self,
        consumer_id: ConsumerId,
    ) -> Self::Output {
        self.forget_consumer(&consumer_id, true);
        Ok(())
    }

    async fn on_consumer_paused(
        &self,
        consumer_id: ConsumerId,
    ) -> Self::Output {
        self.update_consumer(&consumer_id, |c| c.paused.remote = true);
        Ok(())
    }

    async fn on_consumer_resumed(
        &self,
        consumer_id: ConsumerId,
    ) -> Self::Output {
        self.update_consumer(&consumer_id, |c| c.paused.remote = false);
        Ok(())
    }

    async fn on_consumer_layers_changed(
        &self,
        consumer_id: ConsumerId,
        spatial: Option<u8>,
        temporal: Option<u8>,
    ) -> Self::Output {
        self.update_consumer(&consumer_id, |c| {
            c.scalability.spatial.current = spatial;
            c.scalability.temporal.current = temporal;
        });
        Ok(())
    }

    async fn on_consumer_score(
        &self,
        consumer_id: ConsumerId,
        score: ConsumerScore,
    ) -> Self::Output {
        self.update_consumer(&consumer_id, |c| c.score = Some(score));
        Ok(())
    }

    async fn on_producer_score(
        &self,
        producer_id: ProducerId,
        scores: Vec<ProducerScore>,
    ) -> Self::Output {
        match self.resources.producer_kind(&producer_id) {
            Some(kind) => self.store.update(|s| {
                drop(s.producer_scores.insert(kind, scores));
            }),
            None => log::debug!("Producer {} is unknown", producer_id),
        }
        Ok(())
    }

    /// Closes the signalling channel, keeping the session state so the
    /// connection can be retried manually.
    async fn on_connect_error(&self, reason: String) -> Self::Output {
        self.drop_socket();
        Err(tracerr::new!(RoomError::Connection(reason)))
    }

    async fn on_error(&self, message: String, status: u16) -> Self::Output {
        Err(tracerr::new!(RoomError::from_status(status, message)))
    }
}
