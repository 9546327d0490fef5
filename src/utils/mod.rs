//! Miscellaneous utility structs and functions.

mod callback;
mod responder;

#[doc(inline)]
pub use self::{
    callback::Callback1,
    responder::{Responder, ResponderDroppedError},
};
