// src/isolation/affinity.rs

//! CPU / memory affinity decorators (`taskset`, `numactl`).

use super::{CpuSet, Decorator};

/// Pins the command to a set of CPUs: `taskset -c <cpus> <command>`.
#[derive(Debug, Clone)]
pub struct Taskset {
    cpus: CpuSet,
}

impl Taskset {
    pub fn new(cpus: CpuSet) -> Self {
        Self { cpus }
    }
}

impl Decorator for Taskset {
    fn decorate(&self, command: &str) -> String {
        format!("taskset -c {} {}", self.cpus, command)
    }
}

/// NUMA placement through `numactl`.
///
/// Unset fields are left to the kernel's default policy.
#[derive(Debug, Clone, Default)]
pub struct Numactl {
    cpu_nodes: Option<CpuSet>,
    memory_nodes: Option<CpuSet>,
    physical_cpus: Option<CpuSet>,
}

impl Numactl {
    /// Bind both CPU and memory to the same nodes.
    pub fn on_nodes(nodes: CpuSet) -> Self {
        Self {
            cpu_nodes: Some(nodes.clone()),
            memory_nodes: Some(nodes),
            physical_cpus: None,
        }
    }

    pub fn cpu_nodes(mut self, nodes: CpuSet) -> Self {
        self.cpu_nodes = Some(nodes);
        self
    }

    pub fn memory_nodes(mut self, nodes: CpuSet) -> Self {
        self.memory_nodes = Some(nodes);
        self
    }

    pub fn physical_cpus(mut self, cpus: CpuSet) -> Self {
        self.physical_cpus = Some(cpus);
        self
    }
}

impl Decorator for Numactl {
    fn decorate(&self, command: &str) -> String {
        let mut out = String::from("numactl");
        if let Some(nodes) = &self.cpu_nodes {
            out.push_str(&format!(" --cpunodebind={nodes}"));
        }
        if let Some(nodes) = &self.memory_nodes {
            out.push_str(&format!(" --membind={nodes}"));
        }
        if let Some(cpus) = &self.physical_cpus {
            out.push_str(&format!(" --physcpubind={cpus}"));
        }
        out.push_str(" -- ");
        out.push_str(command);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taskset_prefixes_cpu_list() {
        let deco = Taskset::new("0-3,8".parse().unwrap());
        assert_eq!(deco.decorate("memcached -p 1"), "taskset -c 0-3,8 memcached -p 1");
    }

    #[test]
    fn numactl_renders_only_configured_bindings() {
        let deco = Numactl::on_nodes(CpuSet::new([1]));
        assert_eq!(
            deco.decorate("redis-server"),
            "numactl --cpunodebind=1 --membind=1 -- redis-server"
        );

        let deco = Numactl::default().physical_cpus(CpuSet::new([2, 3]));
        assert_eq!(deco.decorate("x"), "numactl --physcpubind=2-3 -- x");
    }
}
