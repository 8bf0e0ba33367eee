// SPDX-License-Identifier: MIT

//! Per-peer liveness health-check rounds: proposal collection and
//! participant bookkeeping for a parallel mini-consensus, independent of
//! the epoch consensus ladder in `gossipd-consensus`.
//!
//! The outcome-selection policy itself is deliberately underspecified and
//! left to an injected [`outcome::HealthCheckOutcomeFn`]: this crate builds
//! the full shape around that boundary and stops there rather than
//! guessing a policy.

pub(crate) const LOG_TARGET: &str = "gossipd::healthcheck";

pub mod messages;
pub mod outcome;
pub mod round;
pub mod status;
pub mod storage;
pub mod transport;
