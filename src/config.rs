use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{HarnessError, Result};

pub const DEFAULT_BASE_DIR: &str = "/tmp/dentry01";

const MIN_PRIORITY: i64 = -20;
const MAX_PRIORITY: i64 = 19;

/// Thrash a directory from many processes while resolving paths with the
/// *at() calls, looking for dentry list corruption.
#[derive(Debug, Parser)]
#[command(name = "dentry-stress", version)]
pub struct Cli {
    /// Number of forked workers
    #[arg(short, long, default_value_t = 15, allow_negative_numbers = true)]
    pub workers: i64,

    /// Timeout until test passes in seconds
    #[arg(short, long, default_value_t = 120, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Workers priority value
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i64,

    /// Directory the workers race in; recreated at start, removed at exit
    #[arg(long, default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub duration: Duration,
    pub priority: i32,
    pub base_dir: PathBuf,
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        let max = i64::from(i32::MAX);

        if !(1..=max).contains(&self.workers) {
            return Err(HarnessError::InvalidWorkers(self.workers));
        }
        if !(1..=max).contains(&self.timeout) {
            return Err(HarnessError::InvalidTimeout(self.timeout));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(HarnessError::InvalidPriority(self.priority));
        }

        Ok(Config {
            workers: self.workers as usize,
            duration: Duration::from_secs(self.timeout as u64),
            priority: self.priority as i32,
            base_dir: self.base_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dentry-stress").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.workers, 15);
        assert_eq!(config.duration, Duration::from_secs(120));
        assert_eq!(config.priority, 0);
        assert_eq!(config.base_dir, PathBuf::from(DEFAULT_BASE_DIR));
    }

    #[test]
    fn negative_priority_is_accepted() {
        let config = parse(&["-w", "3", "-t", "1", "-p", "-20"]).into_config().unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.priority, -20);
    }

    #[test]
    fn out_of_range_priority() {
        let err = parse(&["-p", "20"]).into_config().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidPriority(20)));

        let err = parse(&["-p", "-21"]).into_config().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidPriority(-21)));
    }

    #[test]
    fn zero_workers_or_timeout() {
        assert!(matches!(
            parse(&["-w", "0"]).into_config(),
            Err(HarnessError::InvalidWorkers(0))
        ));
        assert!(matches!(
            parse(&["-t", "-1"]).into_config(),
            Err(HarnessError::InvalidTimeout(-1))
        ));
    }

    #[test]
    fn non_numeric_is_rejected_by_parser() {
        let args = ["dentry-stress", "-w", "many"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
