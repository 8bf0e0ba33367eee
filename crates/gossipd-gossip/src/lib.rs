// SPDX-License-Identifier: MIT

//! Rumor storage and the gossip daemon: anti-entropy dissemination of signed
//! rumors over an abstract [`transport::GossipTransport`].

pub(crate) const LOG_TARGET: &str = "gossipd::gossip";

pub mod config;
pub mod daemon;
pub mod handler;
pub mod messages;
pub mod receiver;
pub mod storage;
pub mod transport;
