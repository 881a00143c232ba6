//! Shared record store and lock helpers.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use almanac_core::error::{AlmanacError, Result};
use almanac_core::types::{
    Conversation, ConversationId, Message, Source, SourceId, SummaryModel, SummaryModelId,
};

/// A conversation together with its append-only message log.
#[derive(Debug, Clone)]
pub(crate) struct ConversationRecord {
    pub(crate) conversation: Conversation,
    pub(crate) messages: Vec<Message>,
}

/// In-memory store for every persisted record of the core.
///
/// Updates are immediately visible to subsequent reads in the same process.
#[derive(Debug, Default)]
pub struct RecordStore {
    pub(crate) sources: RwLock<HashMap<SourceId, Source>>,
    pub(crate) summary_models: RwLock<HashMap<SummaryModelId, SummaryModel>>,
    pub(crate) conversations: RwLock<HashMap<ConversationId, ConversationRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read()
        .map_err(|e| AlmanacError::Storage(format!("{} lock poisoned: {}", what, e)))
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, what: &str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write()
        .map_err(|e| AlmanacError::Storage(format!("{} lock poisoned: {}", what, e)))
}
