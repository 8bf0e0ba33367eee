//! Bridges dispatched gossip into a [`ConsensusManager`]'s own `on_*_rumor`
//! callbacks.
//!
//! This crate never constructs a [`gossipd_gossip::handler::RumorHandlerRegistry`]
//! itself (wiring a daemon together is the embedding binary's job, mirroring
//! how [`ConsensusManager`]'s own collaborators are all injected); an
//! embedder registers one [`ConsensusRumorHandler`] per [`ConsensusRumorKind`]
//! against the matching [`gossipd_rumor_core::rumor::ContentTypeTag`].

use std::sync::Arc;

use bincode::{Decode, Encode};
use gossipd_consensus_core::key::Successor;
use gossipd_gossip::handler::RumorHandler;
use gossipd_gossip::storage::RumorStorage;
use gossipd_rumor_core::hash::Hashable;
use gossipd_rumor_core::rumor::Rumor;

use crate::manager::ConsensusManager;

/// Which of [`ConsensusManager`]'s six `on_*_rumor` callbacks a
/// [`ConsensusRumorHandler`] instance forwards to.
#[derive(Debug, Clone, Copy)]
pub enum ConsensusRumorKind {
    Facility,
    Proposal,
    Signature,
    Deregistration,
    Artifact,
    FinalArtifact,
}

pub struct ConsensusRumorHandler<Key, Artifact> {
    manager: Arc<ConsensusManager<Key, Artifact>>,
    kind: ConsensusRumorKind,
}

impl<Key, Artifact> ConsensusRumorHandler<Key, Artifact> {
    pub fn new(manager: Arc<ConsensusManager<Key, Artifact>>, kind: ConsensusRumorKind) -> Self {
        Self { manager, kind }
    }
}

impl<Key, Artifact> RumorHandler for ConsensusRumorHandler<Key, Artifact>
where
    Key: Successor + Ord + Clone + std::hash::Hash + Eq + std::fmt::Display + Encode + Decode<()> + Send + Sync + 'static,
    Artifact: Hashable + Clone + Encode + Decode<()> + Send + Sync + 'static,
{
    fn handle(&self, rumor: &Rumor, _storage: &RumorStorage) -> Option<()> {
        match self.kind {
            ConsensusRumorKind::Facility => self.manager.on_facility_rumor(rumor),
            ConsensusRumorKind::Proposal => self.manager.on_proposal_rumor(rumor),
            ConsensusRumorKind::Signature => self.manager.on_signature_rumor(rumor),
            ConsensusRumorKind::Deregistration => self.manager.on_deregistration_rumor(rumor),
            ConsensusRumorKind::Artifact => self.manager.on_artifact_rumor(rumor),
            ConsensusRumorKind::FinalArtifact => self.manager.on_final_artifact_rumor(rumor),
        }
    }
}
