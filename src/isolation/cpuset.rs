// src/isolation/cpuset.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Highest id accepted when parsing; matches the kernel's largest `NR_CPUS`.
pub const MAX_CPU_ID: usize = 4095;

/// Set of CPU (or NUMA node) ids in kernel list notation, e.g. `0-3,6`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuSet {
    ids: BTreeSet<usize>,
}

impl CpuSet {
    pub fn new(ids: impl IntoIterator<Item = usize>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ids.iter().copied()
    }
}

impl FromStr for CpuSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ids = BTreeSet::new();

        for part in s.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(format!("invalid cpu list '{s}': empty element"));
            }

            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo = parse_id(lo, s)?;
                    let hi = parse_id(hi, s)?;
                    if lo > hi {
                        return Err(format!("invalid cpu list '{s}': range {lo}-{hi} is reversed"));
                    }
                    ids.extend(lo..=hi);
                }
                None => {
                    ids.insert(parse_id(part, s)?);
                }
            }
        }

        Ok(Self { ids })
    }
}

fn parse_id(raw: &str, whole: &str) -> Result<usize, String> {
    let id: usize = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid cpu list '{whole}': '{raw}': {e}"))?;
    if id > MAX_CPU_ID {
        return Err(format!(
            "invalid cpu list '{whole}': cpu id {id} out of range (max {MAX_CPU_ID})"
        ));
    }
    Ok(id)
}

impl fmt::Display for CpuSet {
    /// Renders consecutive ids as ranges: `{0,1,2,3,6}` -> `0-3,6`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for id in self.ids.iter().copied() {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == id => *end = id,
                _ => ranges.push((id, id)),
            }
        }

        let rendered: Vec<String> = ranges
            .into_iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect();

        write!(f, "{}", rendered.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_singletons() {
        let set: CpuSet = "4, 0-2,2".parse().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
        assert_eq!(set.to_string(), "0-2,4");
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<CpuSet>().is_err());
        assert!("3-1".parse::<CpuSet>().is_err());
        assert!("a,b".parse::<CpuSet>().is_err());
        assert!("1,,2".parse::<CpuSet>().is_err());
    }

    #[test]
    fn rejects_ids_past_the_cpu_limit() {
        let err = "0-4294967295".parse::<CpuSet>().unwrap_err();
        assert!(err.contains("out of range"), "got {err}");
        assert!("4096".parse::<CpuSet>().is_err());
        assert!("1,18446744073709551615".parse::<CpuSet>().is_err());

        let widest: CpuSet = format!("0-{MAX_CPU_ID}").parse().unwrap();
        assert_eq!(widest.len(), MAX_CPU_ID + 1);
    }
}
