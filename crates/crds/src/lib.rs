//! Confidential peer pods CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the confidential controller.

pub mod kata_config;
pub mod progress;

pub use kata_config::*;
pub use progress::*;
