//! Consumption of the remote media and local playback policy (pause,
//! volume, deafen).

use std::rc::Rc;

use tracerr::Traced;

use crate::{
    media::MediaSlot,
    platform::ConsumerOptions,
    rpc::{Command, ConsumerId, ConsumerSpec, ParticipantId},
    session::{ConsumerEntry, ConsumerInfo, Participant},
};

use super::{InnerRoom, RoomError};

impl InnerRoom {
    /// Creates a consumer of a remote producer and puts it into the owning
    /// participant's slot, replacing the one occupying it.
    pub(super) async fn make_consumer(
        self: &Rc<Self>,
        spec: ConsumerSpec,
    ) -> Result<(), Traced<RoomError>> {
        let epoch = self.resources.epoch();
        let transport = self
            .resources
            .recv_transport()
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        let consumer = transport
            .consume(ConsumerOptions {
                id: spec.id.clone(),
                producer_id: spec.producer_id.clone(),
                kind: spec.kind,
                rtp_parameters: spec.rtp_parameters.clone(),
                app_data: spec.app_data,
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        if !self.resources.is_current(epoch) {
            log::debug!("Consumer {} is created for a stale session", spec.id);
            consumer.close();
            return Ok(());
        }

        let consumer_id = consumer.id();
        let weak = Rc::downgrade(self);
        let closed_id = consumer_id.clone();
        consumer.on_transport_close(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.forget_consumer(&closed_id, false);
            }
        }));

        let slot = MediaSlot::infer(spec.kind, spec.app_data.share);
        let participant_id = spec.participant_id.clone();
        let mut info = ConsumerInfo::from_spec(&spec);
        let silenced = slot == MediaSlot::Audio && {
            let session = self.store.borrow();
            session.is_deafened
                || session
                    .participants
                    .get(&participant_id)
                    .map_or(false, |p| p.volume == 0)
        };
        info.paused.local = silenced;

        let replaced = self.store.update(|s| {
            s.participants
                .entry(participant_id.clone())
                .or_insert_with(|| Participant::new(participant_id.clone()))
                .slot_mut(slot)
                .replace(info)
        });
        if let Some(old) = replaced.filter(|old| old.id != consumer_id) {
            log::warn!(
                "Consumer {} replaces {} in {} slot of {}",
                consumer_id,
                old.id,
                slot,
                participant_id,
            );
            if let Some(entry) = self.resources.remove_consumer(&old.id) {
                entry.consumer.close();
            }
        }
        if let Some(old) = self.resources.insert_consumer(ConsumerEntry {
            consumer: Rc::clone(&consumer),
            participant_id,
        }) {
            if !Rc::ptr_eq(&old.consumer, &consumer) {
                old.consumer.close();
            }
        }

        if silenced {
            consumer.pause();
            self.emit(Command::ConsumersPaused {
                consumer_ids: vec![consumer_id.clone()],
            });
        }
        log::info!("Consumer {} is created", consumer_id);
        Ok(())
    }

    /// Removes the consumer from the resources and its owner's slot.
    ///
    /// No-op if the consumer is unknown.
    pub(super) fn forget_consumer(
        &self,
        consumer_id: &ConsumerId,
        close: bool,
    ) {
        let entry = match self.resources.remove_consumer(consumer_id) {
            Some(entry) => entry,
            None => {
                log::debug!("Consumer {} is unknown", consumer_id);
                return;
            }
        };
        if close {
            entry.consumer.close();
        }
        self.store.update(|s| {
            if let Some(p) = s.participants.get_mut(&entry.participant_id) {
                p.clear_consumer(consumer_id);
            }
        });
        log::info!("Consumer {} is closed", consumer_id);
    }

    /// Modifies the [`ConsumerInfo`] of the provided consumer.
    ///
    /// Returns `false` if the consumer is unknown.
    pub(super) fn update_consumer<F>(
        &self,
        consumer_id: &ConsumerId,
        f: F,
    ) -> bool
    where
        F: FnOnce(&mut ConsumerInfo),
    {
        let participant_id = match self.resources.consumer(consumer_id) {
            Some(entry) => entry.participant_id,
            None => {
                log::debug!("Consumer {} is unknown", consumer_id);
                return false;
            }
        };
        self.store.update(|s| {
            match s.consumer_mut(&participant_id, consumer_id) {
                Some(info) => {
                    f(info);
                    true
                }
                None => false,
            }
        })
    }

    /// Adds a participant, unless it's present already.
    pub(super) fn add_participant(&self, participant_id: ParticipantId) {
        self.store.update(|s| {
            s.participants
                .entry(participant_id.clone())
                .or_insert_with(|| Participant::new(participant_id));
        });
    }

    /// Removes a participant closing all its consumers.
    pub(super) fn remove_participant(&self, participant_id: &ParticipantId) {
        for consumer in self.resources.consumers_of(participant_id) {
            drop(self.resources.remove_consumer(&consumer.id()));
            consumer.close();
        }
        drop(self.deafened_paused.borrow_mut().remove(participant_id));
        self.store.update(|s| drop(s.participants.remove(participant_id)));
    }

    /// Pauses playback of the participant's consumer locally.
    pub(super) fn pause(
        &self,
        participant_id: &ParticipantId,
        slot: MediaSlot,
    ) {
        if slot == MediaSlot::Audio && self.store.borrow().is_deafened {
            drop(
                self.deafened_paused
                    .borrow_mut()
                    .insert(participant_id.clone()),
            );
        }
        self.set_paused_locally(participant_id, slot, true);
    }

    /// Resumes playback of the participant's consumer locally.
    ///
    /// Audio stays paused while deafened, but gets resumed on undeafen.
    pub(super) fn resume(
        &self,
        participant_id: &ParticipantId,
        slot: MediaSlot,
    ) {
        if slot == MediaSlot::Audio && self.store.borrow().is_deafened {
            drop(self.deafened_paused.borrow_mut().remove(participant_id));
            return;
        }
        self.set_paused_locally(participant_id, slot, false);
    }

    /// Pauses the audio of every participant, remembering which was paused
    /// already.
    pub(super) fn deafen(&self) {
        if self.store.borrow().is_deafened {
            return;
        }
        let (paused_before, to_pause) = self.store.update(|s| {
            s.is_deafened = true;
            let mut paused_before = Vec::new();
            let mut to_pause = Vec::new();
            for p in s.participants.values_mut() {
                if let Some(audio) = p.audio.as_mut() {
                    if audio.paused.local {
                        paused_before.push(p.id.clone());
                    } else {
                        audio.paused.local = true;
                        to_pause.push(audio.id.clone());
                    }
                }
            }
            (paused_before, to_pause)
        });
        *self.deafened_paused.borrow_mut() =
            paused_before.into_iter().collect();
        self.pause_consumers(to_pause);
    }

    /// Resumes the audio paused by [`InnerRoom::deafen()`].
    ///
    /// Audio paused before deafening or muted by zero volume stays paused.
    pub(super) fn undeafen(&self) {
        if !self.store.borrow().is_deafened {
            return;
        }
        let paused_before = self.deafened_paused.replace(Default::default());
        let to_resume = self.store.update(|s| {
            s.is_deafened = false;
            let mut to_resume = Vec::new();
            for p in s.participants.values_mut() {
                if p.volume == 0 || paused_before.contains(&p.id) {
                    continue;
                }
                if let Some(audio) = p.audio.as_mut() {
                    if audio.paused.local {
                        audio.paused.local = false;
                        to_resume.push(audio.id.clone());
                    }
                }
            }
            to_resume
        });
        self.resume_consumers(to_resume);
    }

    /// Sets the local playback volume, pausing the participant's audio at
    /// zero volume and resuming it when leaving zero.
    pub(super) fn set_volume(
        &self,
        participant_id: &ParticipantId,
        volume: u8,
    ) {
        let volume = volume.min(100);
        let previous = self.store.update(|s| {
            s.participants.get_mut(participant_id).map(|p| {
                let previous = p.volume;
                p.volume = volume;
                previous
            })
        });
        let previous = match previous {
            Some(previous) => previous,
            None => {
                log::debug!("Participant {} is unknown", participant_id);
                return;
            }
        };

        if previous > 0 && volume == 0 {
            self.pause(participant_id, MediaSlot::Audio);
        } else if previous == 0 && volume > 0 {
            self.resume(participant_id, MediaSlot::Audio);
        }
    }

    /// Pauses or resumes the consumer in the provided slot locally, unless
    /// it's in the requested state already.
    fn set_paused_locally(
        &self,
        participant_id: &ParticipantId,
        slot: MediaSlot,
        paused: bool,
    ) {
        let consumer_id = self.store.update(|s| {
            let info = s
                .participants
                .get_mut(participant_id)?
                .slot_mut(slot)
                .as_mut()
                .filter(|info| info.paused.local != paused)?;
            info.paused.local = paused;
            Some(info.id.clone())
        });
        let consumer_id = match consumer_id {
            Some(id) => id,
            None => {
                log::debug!(
                    "No {} consumer of {} to be {}",
                    slot,
                    participant_id,
                    if paused { "paused" } else { "resumed" },
                );
                return;
            }
        };
        if paused {
            self.pause_consumers(vec![consumer_id]);
        } else {
            self.resume_consumers(vec![consumer_id]);
        }
    }

    /// Pauses the provided consumers and notifies the server in one command.
    fn pause_consumers(&self, consumer_ids: Vec<ConsumerId>) {
        if consumer_ids.is_empty() {
            return;
        }
        for id in &consumer_ids {
            if let Some(entry) = self.resources.consumer(id) {
                entry.consumer.pause();
            }
        }
        self.emit(Command::ConsumersPaused { consumer_ids });
    }

    /// Resumes the provided consumers and notifies the server in one command.
    fn resume_consumers(&self, consumer_ids: Vec<ConsumerId>) {
        if consumer_ids.is_empty() {
            return;
        }
        for id in &consumer_ids {
            if let Some(entry) = self.resources.consumer(id) {
                entry.consumer.resume();
            }
        }
        self.emit(Command::ConsumersResumed { consumer_ids });
    }
}
