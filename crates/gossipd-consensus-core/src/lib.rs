// SPDX-License-Identifier: MIT

//! Generic data model for epoch consensus: the parts that are the same
//! regardless of what `Key` epochs are counted in or what `Artifact` a
//! round agrees on.

pub mod event;
pub mod facilitator_set;
pub mod functions;
pub mod key;
pub mod msg;
pub mod resources;
pub mod sign;
pub mod state;
pub mod timestamp;
