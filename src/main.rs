use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use tracing::{info, warn};

mod base_dir;
mod config;
mod dentry_stress;
mod error;
mod report;
mod shutdown;
mod workers;

use config::{Cli, Config};
use error::{HarnessError, Result};
use report::Verdict;

/// Setup, race, teardown. The directory is removed on every path once it
/// has been created.
fn run(config: &Config) -> Result<Verdict> {
    let mut workers = workers::allocate(config.workers)?;
    let base = CString::new(config.base_dir.as_os_str().as_bytes()).map_err(|err| {
        HarnessError::CreateBaseDir {
            path: config.base_dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        }
    })?;
    base_dir::recreate(&config.base_dir)?;

    let raced = race(config, &mut workers, &base);

    if let Err(err) = base_dir::remove(&config.base_dir) {
        warn!("Failed to remove base directory {}: {}", config.base_dir.display(), err);
    }
    raced?;

    Ok(report::pass("Did not compromise dentry lists"))
}

fn race(config: &Config, workers: &mut Vec<workers::Worker>, base: &CString) -> Result<()> {
    workers::set_priority(config.priority);
    workers::spawn_workers(workers, config.workers, base)?;
    thread::sleep(config.duration);
    shutdown::stop_workers(workers)?;

    let reaped = workers.iter().filter(|w| w.finished).count();
    let clean = workers
        .iter()
        .filter(|w| w.exit.is_some_and(|exit| exit.is_clean()))
        .count();
    info!("Reaped {}/{} workers, {} exited cleanly", reaped, config.workers, clean);

    // A worker killed by a signal still counts as reaped; one that never
    // started racing means the run did not happen as configured.
    if let Some(worker) = workers
        .iter()
        .find(|w| w.exit.is_some_and(|exit| exit.is_setup_failure()))
    {
        return Err(HarnessError::WorkerSetup {
            id: worker.id,
            pid: worker.pid,
        });
    }
    Ok(())
}

fn execute(cli: Cli) -> Verdict {
    let outcome = cli.into_config().and_then(|config| {
        info!(
            "Starting dentry stress test with {} workers on {} CPUs for {} seconds in {}...",
            config.workers,
            num_cpus::get(),
            config.duration.as_secs(),
            config.base_dir.display()
        );
        run(&config)
    });

    match outcome {
        Ok(verdict) => verdict,
        Err(err) => report::abort(&err),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DENTRY_STRESS_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let verdict = execute(Cli::parse());
    info!("Dentry stress test completed.");
    verdict.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn cli(base: &Path, args: &[&str]) -> Cli {
        let base = base.to_str().unwrap();
        let argv = ["dentry-stress", "--base-dir", base]
            .into_iter()
            .chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn single_worker_one_second_run_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("dentry01");

        let verdict = execute(cli(&base, &["-w", "1", "-t", "1"]));

        assert_eq!(verdict, Verdict::Pass);
        assert!(!base.exists());
    }

    #[test]
    fn contended_run_recovers_stale_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("dentry01");
        std::fs::create_dir(&base).unwrap();
        std::fs::File::create(base.join("f2")).unwrap();

        let verdict = execute(cli(&base, &["-w", "4", "-t", "1"]));

        assert_eq!(verdict, Verdict::Pass);
        assert!(!base.exists());
    }

    #[test]
    fn worker_setup_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let config = cli(&tmp.path().join("never-created"), &["-w", "2", "-t", "1"])
            .into_config()
            .unwrap();
        let base = CString::new(config.base_dir.as_os_str().as_bytes()).unwrap();
        let mut workers = workers::allocate(config.workers).unwrap();

        let err = race(&config, &mut workers, &base).unwrap_err();

        assert!(matches!(err, HarnessError::WorkerSetup { id: 0, .. }));
        assert_eq!(err.verdict(), Verdict::Broken);
        assert!(workers.iter().all(|w| w.finished));
    }

    #[test]
    fn invalid_priority_aborts_before_setup() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("dentry01");

        let verdict = execute(cli(&base, &["-p", "42"]));

        assert_eq!(verdict, Verdict::Broken);
        assert!(!base.exists());
    }

    #[test]
    fn unusable_base_dir_is_conf() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("absent").join("dentry01");

        let verdict = execute(cli(&base, &["-w", "1", "-t", "1"]));

        assert_eq!(verdict, Verdict::Conf);
    }
}
