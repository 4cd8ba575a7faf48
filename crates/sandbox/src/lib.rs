//! Runs an agent worker in isolation and streams its stdout back as
//! `AgentEvent`s, behind two interchangeable backends: a local subprocess
//! and a reusable remote container.

pub mod local;
pub mod remote;
mod types;

pub use remote::ContainerProvider;
pub use types::{AgentEvent, RunAgentRequest, SandboxError};
