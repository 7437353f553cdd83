//! Pipeline services: lifecycle orchestration, documentation extraction,
//! fingerprinting, and result upload.

pub mod extraction;
pub mod fingerprint;
pub mod orchestrator;
pub mod upload;
