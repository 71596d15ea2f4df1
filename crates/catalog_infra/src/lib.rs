//! Declarative infrastructure for the album catalog service.
//!
//! Stacks are declared in plain Rust, validated as a whole and synthesized
//! to CloudFormation JSON templates plus a deployment manifest. Deployment
//! itself is left to the external engine (see `xtask deploy`).

pub mod api;
pub mod app;
pub mod assets;
pub mod config;
pub mod error;
pub mod intrinsic;
pub mod monitoring;
pub mod naming;
pub mod pipeline;
pub mod registry;
pub mod stack;
pub mod table;
pub mod template;

pub use app::{compose, App, Assembly, Manifest};
pub use config::{AppSettings, DeployEnv, RepositorySettings};
pub use error::{Result, SynthError};
