// src/isolation/namespace.rs

use super::Decorator;

/// Runs the command as PID 1 of a new PID namespace, so every descendant
/// dies with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidNamespace;

impl Decorator for PidNamespace {
    fn decorate(&self, command: &str) -> String {
        format!("unshare --fork --pid --mount-proc {command}")
    }
}
