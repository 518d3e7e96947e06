//! Collaborators of the automation engine
//!
//! [`traits`] defines the narrow contracts the engine consumes. [`client`]
//! talks to the real platform, [`matcher`] matches streams against a pattern
//! file and [`memory`] keeps everything in process.

pub mod client;
pub mod matcher;
pub mod memory;
pub mod traits;

pub use client::PlatformClient;
pub use matcher::RegexMatchProvider;
pub use memory::InMemoryPlatform;
pub use traits::*;
