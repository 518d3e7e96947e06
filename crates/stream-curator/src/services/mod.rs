//! Service implementations of the collaborator contracts that run locally

pub mod stream_prober;

pub use stream_prober::FfprobeStreamProbe;
