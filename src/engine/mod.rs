//! Container execution engine
//!
//! [`ContainerRuntime`] is the seam to the container daemon; [`DockerRuntime`]
//! implements it over bollard. [`ContainerEngine`] owns per-task naming,
//! dataset mounting, exec timeouts and exec serialization.

pub mod container;
pub mod docker;
pub mod runtime;

pub use container::ContainerEngine;
pub use docker::DockerRuntime;
pub use runtime::{BindMount, ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput};
