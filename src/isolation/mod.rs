// src/isolation/mod.rs

//! Command isolation decorators.
//!
//! A decorator rewrites a shell command line before it reaches an executor,
//! typically by prefixing it with a resource-isolation tool invocation.
//!
//! - [`cpuset`] holds the `CpuSet` list type shared by the affinity tools.
//! - [`affinity`] wraps commands in `taskset` / `numactl`.
//! - [`cgroup`] wraps commands in `cgexec`.
//! - [`namespace`] runs commands in a fresh PID namespace.

pub mod affinity;
pub mod cgroup;
pub mod cpuset;
pub mod namespace;

use std::fmt;
use std::sync::Arc;

pub use affinity::{Numactl, Taskset};
pub use cgroup::{CgroupExec, CgroupSpec};
pub use cpuset::CpuSet;
pub use namespace::PidNamespace;

/// A pure command-string transformer.
pub trait Decorator: Send + Sync {
    fn decorate(&self, command: &str) -> String;
}

impl<F> Decorator for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn decorate(&self, command: &str) -> String {
        self(command)
    }
}

/// Ordered decorator chain.
///
/// Decorators are applied first to last, so each one wraps the output of the
/// previous: `[A, B]` turns `C` into `B(A(C))`.
#[derive(Clone, Default)]
pub struct Decorators {
    chain: Vec<Arc<dyn Decorator>>,
}

impl Decorators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decorator; it will wrap everything added before it.
    pub fn with(mut self, decorator: impl Decorator + 'static) -> Self {
        self.chain.push(Arc::new(decorator));
        self
    }

    pub fn push(&mut self, decorator: Arc<dyn Decorator>) {
        self.chain.push(decorator);
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn decorate(&self, command: &str) -> String {
        self.chain
            .iter()
            .fold(command.to_string(), |cmd, decorator| decorator.decorate(&cmd))
    }
}

impl FromIterator<Arc<dyn Decorator>> for Decorators {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Decorator>>>(iter: I) -> Self {
        Self {
            chain: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for Decorators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorators")
            .field("len", &self.chain.len())
            .finish()
    }
}
