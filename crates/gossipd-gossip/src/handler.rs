use std::collections::BTreeMap;

use gossipd_rumor_core::rumor::{ContentTypeTag, Rumor};

use crate::storage::RumorStorage;

/// Consumes a single dispatched rumor.
///
/// Returns `None` if the rumor, while validly signed, is malformed for this
/// handler's purposes (e.g. an undecodable payload) — the daemon logs and
/// moves on rather than treating it as a fatal error.
pub trait RumorHandler: Send + Sync + 'static {
    fn handle(&self, rumor: &Rumor, storage: &RumorStorage) -> Option<()>;
}

/// Maps a rumor's [`ContentTypeTag`] to the handler responsible for it.
#[derive(Default)]
pub struct RumorHandlerRegistry {
    handlers: BTreeMap<ContentTypeTag, Box<dyn RumorHandler>>,
}

impl RumorHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: ContentTypeTag, handler: impl RumorHandler) {
        self.handlers.insert(tag, Box::new(handler));
    }

    pub fn get(&self, tag: ContentTypeTag) -> Option<&dyn RumorHandler> {
        self.handlers.get(&tag).map(AsRef::as_ref)
    }
}
