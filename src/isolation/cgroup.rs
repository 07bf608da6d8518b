// src/isolation/cgroup.rs

use std::fmt;
use std::str::FromStr;

use super::Decorator;

/// One `-g controllers:path` argument of `cgexec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupSpec {
    pub controllers: Vec<String>,
    pub path: String,
}

impl FromStr for CgroupSpec {
    type Err = String;

    /// Parses `cpu,cpuset:/swan/hp`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (controllers, path) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid cgroup '{s}': expected <controllers>:<path>"))?;

        let controllers: Vec<String> = controllers
            .split(',')
            .map(|c| c.trim().to_string())
            .collect();
        if controllers.iter().any(String::is_empty) {
            return Err(format!("invalid cgroup '{s}': empty controller name"));
        }
        if !path.starts_with('/') {
            return Err(format!("invalid cgroup '{s}': path must be absolute"));
        }

        Ok(Self {
            controllers,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for CgroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.controllers.join(","), self.path)
    }
}

/// Runs the command inside existing cgroups via libcgroup's `cgexec`.
#[derive(Debug, Clone)]
pub struct CgroupExec {
    groups: Vec<CgroupSpec>,
}

impl CgroupExec {
    pub fn new(groups: Vec<CgroupSpec>) -> Self {
        Self { groups }
    }
}

impl Decorator for CgroupExec {
    fn decorate(&self, command: &str) -> String {
        let mut out = String::from("cgexec");
        for group in &self.groups {
            out.push_str(&format!(" -g {group}"));
        }
        out.push(' ');
        out.push_str(command);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_group() {
        let spec: CgroupSpec = "cpu, cpuset:/swan/hp".parse().unwrap();
        assert_eq!(spec.controllers, vec!["cpu", "cpuset"]);
        assert_eq!(spec.to_string(), "cpu,cpuset:/swan/hp");
    }

    #[test]
    fn rejects_relative_path_and_missing_separator() {
        assert!("cpu:swan".parse::<CgroupSpec>().is_err());
        assert!("cpu".parse::<CgroupSpec>().is_err());
        assert!(",cpu:/x".parse::<CgroupSpec>().is_err());
    }

    #[test]
    fn emits_one_flag_per_group() {
        let deco = CgroupExec::new(vec![
            "cpu:/a".parse().unwrap(),
            "memory:/b".parse().unwrap(),
        ]);
        assert_eq!(deco.decorate("stress"), "cgexec -g cpu:/a -g memory:/b stress");
    }
}
