//! pkiguard - administrator authorization for certificate authorities
//!
//! This library decides which resources a CA administrator may reach and keeps
//! that decision consistent across instances sharing one group store.

pub mod authz;
pub mod group_sync;
pub mod settings;
pub mod startup;
