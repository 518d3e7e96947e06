//! HTTP handlers organised by domain

pub mod automation;
pub mod health;
pub mod lifecycle;
pub mod overrides;
pub mod scheduling;
