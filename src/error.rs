use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::report::Verdict;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Invalid workers count (-w) argument: '{0}'")]
    InvalidWorkers(i64),

    #[error("Invalid timeout (-t) '{0}'")]
    InvalidTimeout(i64),

    #[error("Invalid priority (-p) '{0}'")]
    InvalidPriority(i64),

    #[error("Could not allocate workers array for {0} workers")]
    AllocWorkers(usize),

    #[error("Failed to remove existing base directory {}: {}", .path.display(), .source)]
    RemoveBaseDir { path: PathBuf, source: io::Error },

    #[error("Failed to create base directory {}: {}", .path.display(), .source)]
    CreateBaseDir { path: PathBuf, source: io::Error },

    #[error("fork() failed for worker {id}: {source}")]
    Spawn { id: usize, source: io::Error },

    #[error("waitpid({pid}) failed: {source}")]
    Reap { pid: libc::pid_t, source: io::Error },

    #[error("Worker {id} (pid {pid}) could not open the base directory")]
    WorkerSetup { id: usize, pid: libc::pid_t },
}

impl HarnessError {
    /// Broken means the run itself went wrong, Conf means the environment
    /// could not host it.
    pub fn verdict(&self) -> Verdict {
        match self {
            HarnessError::AllocWorkers(_)
            | HarnessError::RemoveBaseDir { .. }
            | HarnessError::CreateBaseDir { .. } => Verdict::Conf,
            HarnessError::InvalidWorkers(_)
            | HarnessError::InvalidTimeout(_)
            | HarnessError::InvalidPriority(_)
            | HarnessError::Spawn { .. }
            | HarnessError::Reap { .. }
            | HarnessError::WorkerSetup { .. } => Verdict::Broken,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_broken() {
        assert_eq!(HarnessError::InvalidPriority(42).verdict(), Verdict::Broken);
        assert_eq!(HarnessError::InvalidWorkers(0).verdict(), Verdict::Broken);
        assert_eq!(
            HarnessError::WorkerSetup { id: 0, pid: 1234 }.verdict(),
            Verdict::Broken
        );
    }

    #[test]
    fn directory_errors_are_conf() {
        let err = HarnessError::CreateBaseDir {
            path: PathBuf::from("/nope/dentry01"),
            source: io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert_eq!(err.verdict(), Verdict::Conf);
        assert!(err.to_string().starts_with("Failed to create base directory /nope/dentry01"));
    }

    #[test]
    fn message_names_the_bad_input() {
        assert_eq!(
            HarnessError::InvalidPriority(42).to_string(),
            "Invalid priority (-p) '42'"
        );
    }
}
