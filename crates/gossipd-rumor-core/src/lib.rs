// SPDX-License-Identifier: MIT

//! Signed envelope and data model for gossiped rumors.
//!
//! Focused on serialization, hashing, signing and validation of the core
//! wire types shared by the gossip and consensus layers.

pub mod bincode;
pub mod hash;
pub mod peer;
pub mod rumor;
pub mod signed;
pub mod validate;
