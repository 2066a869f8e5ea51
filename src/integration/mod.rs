//! Host integration: configuration and the orchestrator

pub mod config;
pub mod orchestrator;

pub use config::{ReadalongConfig, CONFIG_ENV};
pub use orchestrator::{
    MicrophoneFactory, Orchestrator, OrchestratorBuilder, OrchestratorCommand, OrchestratorEvent,
    OrchestratorHandle, SurfaceState,
};
