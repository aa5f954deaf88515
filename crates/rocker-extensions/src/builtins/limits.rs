//! Resource limits: shared memory, CPUs and memory.

use std::sync::LazyLock;

use regex::Regex;

use crate::cliargs::CliArgs;
use crate::error::{Error, Result};
use crate::extension::{ArgumentSpec, BuildArgs, Extension};

static MEMORY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?[bkmgBKMG]?$").expect("Invalid memory regex"));

static CPUSET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(-\d+)?(,\d+(-\d+)?)*$").expect("Invalid cpuset regex"));

fn check_memory(key: &str, value: &str) -> Result<()> {
    if MEMORY_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid(
            key,
            format!("'{value}' is not a memory size such as 512m or 4g"),
        ))
    }
}

/// Sizes `/dev/shm` for the container, and for the build through the
/// `shm_size` build argument.
#[derive(Debug, Clone, Copy)]
pub struct ShmSize;

impl Extension for ShmSize {
    fn name(&self) -> &'static str {
        "shm_size"
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::value("shm_size", "size of /dev/shm in the container").with_default_from(defaults),
            ArgumentSpec::value("shm_size_build", "size of /dev/shm during the image build")
                .with_default_from(defaults),
        ]
    }

    fn is_active(&self, cliargs: &CliArgs) -> bool {
        cliargs.non_empty("shm_size").is_some() || cliargs.non_empty("shm_size_build").is_some()
    }

    fn build_args(&self, cliargs: &CliArgs) -> Result<BuildArgs> {
        let mut args = BuildArgs::new();
        if let Some(size) = cliargs.non_empty("shm_size_build") {
            check_memory("shm_size_build", size)?;
            args.insert("shm_size".to_string(), size.to_string());
        }
        Ok(args)
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        match cliargs.non_empty("shm_size") {
            Some(size) => {
                check_memory("shm_size", size)?;
                Ok(format!(" --shm-size {size}"))
            }
            None => Ok(String::new()),
        }
    }
}

/// `--cpus` and `--cpuset-cpus`.
#[derive(Debug, Clone, Copy)]
pub struct CpuLimits;

impl Extension for CpuLimits {
    fn name(&self) -> &'static str {
        "cpu_limits"
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::value("cpus", "number of CPUs the container may use, e.g. 1.5")
                .with_default_from(defaults),
            ArgumentSpec::value("cpuset_cpus", "CPUs the container may run on, e.g. 0-3 or 0,2")
                .with_default_from(defaults),
        ]
    }

    fn is_active(&self, cliargs: &CliArgs) -> bool {
        cliargs.non_empty("cpus").is_some() || cliargs.non_empty("cpuset_cpus").is_some()
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let mut args = String::new();
        if let Some(cpus) = cliargs.non_empty("cpus") {
            match cpus.parse::<f64>() {
                Ok(n) if n > 0.0 && n.is_finite() => args.push_str(&format!(" --cpus {cpus}")),
                _ => return Err(Error::invalid("cpus", format!("'{cpus}' is not a positive number"))),
            }
        }
        if let Some(set) = cliargs.non_empty("cpuset_cpus") {
            if !CPUSET_REGEX.is_match(set) {
                return Err(Error::invalid("cpuset_cpus", format!("'{set}' is not a CPU list")));
            }
            args.push_str(&format!(" --cpuset-cpus {set}"));
        }
        Ok(args)
    }
}

/// `--memory` and `--memory-swap`.
#[derive(Debug, Clone, Copy)]
pub struct MemoryLimits;

impl Extension for MemoryLimits {
    fn name(&self) -> &'static str {
        "memory_limits"
    }

    fn register_arguments(&self, defaults: &CliArgs) -> Vec<ArgumentSpec> {
        vec![
            ArgumentSpec::value("memory", "memory limit for the container, e.g. 4g")
                .with_default_from(defaults),
            ArgumentSpec::value(
                "memory_swap",
                "memory plus swap limit for the container, -1 for unlimited swap",
            )
            .with_default_from(defaults),
        ]
    }

    fn is_active(&self, cliargs: &CliArgs) -> bool {
        cliargs.non_empty("memory").is_some() || cliargs.non_empty("memory_swap").is_some()
    }

    fn docker_args(&self, cliargs: &CliArgs) -> Result<String> {
        let mut args = String::new();
        if let Some(memory) = cliargs.non_empty("memory") {
            check_memory("memory", memory)?;
            args.push_str(&format!(" --memory {memory}"));
        }
        if let Some(swap) = cliargs.non_empty("memory_swap") {
            if swap != "-1" {
                check_memory("memory_swap", swap)?;
            }
            args.push_str(&format!(" --memory-swap {swap}"));
        }
        Ok(args)
    }
}
