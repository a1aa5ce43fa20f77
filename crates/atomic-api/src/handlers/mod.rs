//! HTTP handlers, one module per resource.

pub mod annotations;
pub mod health;
pub mod notes;
pub mod search;
pub mod topics;
pub mod youtube;
