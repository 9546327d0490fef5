//! RTC session: observable state and native media resources.

pub mod resources;
pub mod state;
pub mod store;

#[doc(inline)]
pub use self::{
    resources::{
        ConsumerEntry, Epoch, ProducerReservation, ResourceError, Resources,
    },
    state::{ConsumerInfo, Layers, Participant, Paused, Scalability, Session},
    store::SessionStore,
};
