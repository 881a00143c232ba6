//! Almanac Storage crate - in-process record store.
//!
//! Holds sources, summary models, conversations and messages behind
//! `RwLock`s. Every write is applied under a single lock acquisition, so
//! readers see a record either before or after a change, never halfway.

pub mod conversations;
pub mod sources;
pub mod store;
pub mod summary_models;

pub use store::RecordStore;
