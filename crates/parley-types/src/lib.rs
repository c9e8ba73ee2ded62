pub mod access;
pub mod api;
pub mod error;
pub mod events;
pub mod models;

pub use error::{ChatError, DomainRule, Entity};
