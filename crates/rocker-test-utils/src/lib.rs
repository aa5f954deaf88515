//! Shared test utilities for the rocker workspace.
//!
//! This crate provides fixtures shared by the crate test suites and the
//! integration tests. It is a dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`engine`]: [`RecordingEngine`], an in-memory [`ContainerEngine`]
//! - [`identity`]: fixed host identities
//!
//! [`ContainerEngine`]: rocker_core::ContainerEngine

pub mod engine;
pub mod identity;

pub use engine::{EngineCall, RecordingEngine};
pub use identity::{test_host, test_registry};
