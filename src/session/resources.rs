//! Owner of native media engine and signalling handles of a session.
//!
//! Handles are not part of the observable [`Session`] state, the controller
//! reaches them here by key to pause, resume and close them.
//!
//! [`Session`]: super::Session

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use derive_more::Display;
use tracerr::Traced;

use crate::{
    media::LocalMediaType,
    platform::{Consumer, Device, Producer, Transport},
    rpc::{ConsumerId, ParticipantId, ProducerId, Signalling},
};

/// Errors of accessing [`Resources`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ResourceError {
    /// Producer of this kind already exists or is being created.
    #[display(fmt = "{} producer already exists", _0)]
    ProducerExists(LocalMediaType),

    /// Sending transport is not created yet.
    #[display(fmt = "Send transport is not created")]
    NoSendTransport,

    /// Receiving transport is not created yet.
    #[display(fmt = "Receive transport is not created")]
    NoRecvTransport,

    /// Media engine device is not created yet.
    #[display(fmt = "Media device is not created")]
    NoDevice,
}

/// Generation of a session's resources.
///
/// Changes on every [`Resources::reset()`], so results of operations started
/// before a reset can be recognized as stale.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub struct Epoch(u64);

/// State of a producer slot.
enum ProducerSlot {
    /// Producer is being created by the reservation with this token.
    Pending(u64),

    /// Producer is created.
    Live(Rc<dyn Producer>),
}

/// Consumer along with the participant it belongs to.
#[derive(Clone)]
pub struct ConsumerEntry {
    /// Native consumer handle.
    pub consumer: Rc<dyn Consumer>,

    /// Participant owning the consumed producer.
    pub participant_id: ParticipantId,
}

/// Native handles of the current session.
#[derive(Default)]
pub struct Resources {
    /// Signalling channel.
    socket: RefCell<Option<Rc<dyn Signalling>>>,

    /// Media engine device.
    device: RefCell<Option<Rc<dyn Device>>>,

    /// Transport sending local media.
    send_transport: RefCell<Option<Rc<dyn Transport>>>,

    /// Transport receiving remote media.
    recv_transport: RefCell<Option<Rc<dyn Transport>>>,

    /// At most one producer per [`LocalMediaType`].
    producers: RefCell<HashMap<LocalMediaType, ProducerSlot>>,

    /// Consumers by their IDs.
    consumers: RefCell<HashMap<ConsumerId, ConsumerEntry>>,

    /// Current [`Epoch`] number.
    epoch: Cell<u64>,

    /// Source of [`ProducerReservation`] tokens.
    last_token: Cell<u64>,
}

impl Resources {
    /// Returns the current [`Epoch`].
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch.get())
    }

    /// Indicates whether no [`Resources::reset()`] happened since the
    /// provided [`Epoch`] was taken.
    #[inline]
    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch() == epoch
    }

    /// Returns the signalling channel, if connected.
    #[must_use]
    pub fn socket(&self) -> Option<Rc<dyn Signalling>> {
        self.socket.borrow().clone()
    }

    /// Stores the signalling channel, returning the previous one.
    pub fn set_socket(
        &self,
        socket: Rc<dyn Signalling>,
    ) -> Option<Rc<dyn Signalling>> {
        self.socket.borrow_mut().replace(socket)
    }

    /// Removes the signalling channel without disconnecting it.
    pub fn take_socket(&self) -> Option<Rc<dyn Signalling>> {
        self.socket.borrow_mut().take()
    }

    /// Returns the media engine device.
    ///
    /// # Errors
    ///
    /// With [`ResourceError::NoDevice`] if it's not created.
    pub fn device(&self) -> Result<Rc<dyn Device>, Traced<ResourceError>> {
        self.device
            .borrow()
            .clone()
            .ok_or_else(|| tracerr::new!(ResourceError::NoDevice))
    }

    /// Stores the media engine device.
    pub fn set_device(&self, device: Rc<dyn Device>) {
        self.device.borrow_mut().replace(device);
    }

    /// Returns the sending transport.
    ///
    /// # Errors
    ///
    /// With [`ResourceError::NoSendTransport`] if it's not created.
    pub fn send_transport(
        &self,
    ) -> Result<Rc<dyn Transport>, Traced<ResourceError>> {
        self.send_transport
            .borrow()
            .clone()
            .ok_or_else(|| tracerr::new!(ResourceError::NoSendTransport))
    }

    /// Returns the receiving transport.
    ///
    /// # Errors
    ///
    /// With [`ResourceError::NoRecvTransport`] if it's not created.
    pub fn recv_transport(
        &self,
    ) -> Result<Rc<dyn Transport>, Traced<ResourceError>> {
        self.recv_transport
            .borrow()
            .clone()
            .ok_or_else(|| tracerr::new!(ResourceError::NoRecvTransport))
    }

    /// Stores both transports, closing the replaced ones.
    pub fn set_transports(
        &self,
        send: Rc<dyn Transport>,
        recv: Rc<dyn Transport>,
    ) {
        let old_send = self.send_transport.borrow_mut().replace(send);
        let old_recv = self.recv_transport.borrow_mut().replace(recv);
        for transport in old_send.into_iter().chain(old_recv) {
            transport.close();
        }
    }

    /// Indicates whether the device or any transport is still held, e.g.
    /// after the signalling channel was dropped on its own.
    #[must_use]
    pub fn holds_media(&self) -> bool {
        self.device.borrow().is_some()
            || self.send_transport.borrow().is_some()
            || self.recv_transport.borrow().is_some()
    }

    /// Reserves the producer slot of the provided [`LocalMediaType`] for a
    /// producer being created.
    ///
    /// # Errors
    ///
    /// With [`ResourceError::ProducerExists`] if the slot is taken by a live
    /// producer or another reservation.
    pub fn reserve_producer(
        &self,
        kind: LocalMediaType,
    ) -> Result<ProducerReservation<'_>, Traced<ResourceError>> {
        let mut producers = self.producers.borrow_mut();
        if producers.contains_key(&kind) {
            return Err(tracerr::new!(ResourceError::ProducerExists(kind)));
        }
        let token = self.last_token.get() + 1;
        self.last_token.set(token);
        producers.insert(kind, ProducerSlot::Pending(token));
        Ok(ProducerReservation {
            resources: self,
            kind,
            token,
            epoch: self.epoch(),
        })
    }

    /// Indicates whether the producer slot of the provided [`LocalMediaType`]
    /// is taken by a live producer or a reservation.
    #[must_use]
    pub fn is_producer_slot_taken(&self, kind: LocalMediaType) -> bool {
        self.producers.borrow().contains_key(&kind)
    }

    /// Returns the live producer of the provided [`LocalMediaType`].
    #[must_use]
    pub fn producer(&self, kind: LocalMediaType) -> Option<Rc<dyn Producer>> {
        match self.producers.borrow().get(&kind) {
            Some(ProducerSlot::Live(producer)) => Some(Rc::clone(producer)),
            Some(ProducerSlot::Pending(_)) | None => None,
        }
    }

    /// Returns the kind of the live producer with the provided ID.
    #[must_use]
    pub fn producer_kind(
        &self,
        producer_id: &ProducerId,
    ) -> Option<LocalMediaType> {
        self.producers.borrow().iter().find_map(|(kind, slot)| match slot {
            ProducerSlot::Live(p) if &p.id() == producer_id => Some(*kind),
            _ => None,
        })
    }

    /// Empties the producer slot of the provided [`LocalMediaType`].
    ///
    /// Revokes a pending reservation, so its producer will be discarded on
    /// [`ProducerReservation::commit()`]. Returns the live producer, if any,
    /// without closing it.
    pub fn take_producer(
        &self,
        kind: LocalMediaType,
    ) -> Option<Rc<dyn Producer>> {
        match self.producers.borrow_mut().remove(&kind) {
            Some(ProducerSlot::Live(producer)) => Some(producer),
            Some(ProducerSlot::Pending(_)) | None => None,
        }
    }

    /// Stores the consumer, returning the one previously stored under the
    /// same ID.
    pub fn insert_consumer(
        &self,
        entry: ConsumerEntry,
    ) -> Option<ConsumerEntry> {
        self.consumers.borrow_mut().insert(entry.consumer.id(), entry)
    }

    /// Returns the consumer with the provided ID.
    #[must_use]
    pub fn consumer(&self, consumer_id: &ConsumerId) -> Option<ConsumerEntry> {
        self.consumers.borrow().get(consumer_id).cloned()
    }

    /// Removes the consumer with the provided ID without closing it.
    pub fn remove_consumer(
        &self,
        consumer_id: &ConsumerId,
    ) -> Option<ConsumerEntry> {
        self.consumers.borrow_mut().remove(consumer_id)
    }

    /// Returns all the consumers of the provided participant.
    #[must_use]
    pub fn consumers_of(
        &self,
        participant_id: &ParticipantId,
    ) -> Vec<Rc<dyn Consumer>> {
        self.consumers
            .borrow()
            .values()
            .filter(|e| &e.participant_id == participant_id)
            .map(|e| Rc::clone(&e.consumer))
            .collect()
    }

    /// Closes and forgets everything: disconnects the signalling channel,
    /// closes producers (stopping their tracks), consumers and transports,
    /// drops the device, and starts a new [`Epoch`].
    ///
    /// Safe to call repeatedly.
    pub fn reset(&self) {
        self.epoch.set(self.epoch.get() + 1);

        let producers: Vec<_> =
            self.producers.borrow_mut().drain().map(|(_, s)| s).collect();
        for slot in producers {
            if let ProducerSlot::Live(producer) = slot {
                producer.close();
                producer.track().stop();
            }
        }

        let consumers: Vec<_> = self
            .consumers
            .borrow_mut()
            .drain()
            .map(|(_, e)| e.consumer)
            .collect();
        for consumer in consumers {
            consumer.close();
        }

        let send = self.send_transport.borrow_mut().take();
        let recv = self.recv_transport.borrow_mut().take();
        for transport in send.into_iter().chain(recv) {
            transport.close();
        }

        drop(self.device.borrow_mut().take());

        if let Some(socket) = self.take_socket() {
            socket.disconnect();
        }
    }
}

/// Reservation of a producer slot while its producer is being created.
///
/// Releases the slot on drop, unless committed.
pub struct ProducerReservation<'a> {
    /// Owner of the reserved slot.
    resources: &'a Resources,

    /// Reserved slot.
    kind: LocalMediaType,

    /// Token the slot is marked with.
    token: u64,

    /// [`Epoch`] the reservation was made in.
    epoch: Epoch,
}

impl ProducerReservation<'_> {
    /// Returns the [`Epoch`] this reservation was made in.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Indicates whether the slot is still reserved by this reservation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.resources.is_current(self.epoch)
            && matches!(
                self.resources.producers.borrow().get(&self.kind),
                Some(ProducerSlot::Pending(t)) if *t == self.token,
            )
    }

    /// Puts the created producer into the reserved slot.
    ///
    /// # Errors
    ///
    /// Gives the producer back if the reservation has been revoked by
    /// [`Resources::take_producer()`] or [`Resources::reset()`].
    pub fn commit(
        self,
        producer: Rc<dyn Producer>,
    ) -> Result<(), Rc<dyn Producer>> {
        if !self.is_valid() {
            return Err(producer);
        }
        self.resources
            .producers
            .borrow_mut()
            .insert(self.kind, ProducerSlot::Live(producer));
        Ok(())
    }
}

impl Drop for ProducerReservation<'_> {
    fn drop(&mut self) {
        if self.is_valid() {
            self.resources.producers.borrow_mut().remove(&self.kind);
        }
    }
}
