//! Business logic services.

pub mod duplicate_key;
pub mod firewall;
pub mod lookup;
pub mod notification;
pub mod rules;
pub mod workflow;
