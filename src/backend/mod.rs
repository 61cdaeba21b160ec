// Package backend provides the deployment drivers the dispatcher routes to.

pub mod command;
pub mod compose;
pub mod driver;
pub mod epm;
pub mod kube;
pub mod manifest;
pub mod noop;

#[cfg(test)]
mod compose_test;
#[cfg(test)]
mod epm_test;

pub use command::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner};
pub use compose::{ComposeDriver, ComposeSettings};
pub use driver::BackendDriver;
pub use epm::{EpmDriver, EpmSettings};
pub use kube::{KubeDriver, KubeSettings};
pub use noop::NoopDriver;

/// Canonical driver names.
pub const DRIVER_COMPOSE: &str = "docker";
pub const DRIVER_KUBE: &str = "kubernetes";
pub const DRIVER_EPM: &str = "epm";
pub const DRIVER_NOOP: &str = "dummy";

/// Built-in `alias -> canonical` pairs.
pub const DEFAULT_ALIASES: [(&str, &str); 2] =
    [("docker-compose", DRIVER_COMPOSE), ("k8s", DRIVER_KUBE)];
