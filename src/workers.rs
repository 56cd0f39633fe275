use std::ffi::CStr;
use std::fmt;
use std::io;

use tracing::{debug, warn};

use crate::dentry_stress::Workload;
use crate::error::{HarnessError, Result};
use crate::shutdown::{self, StopSignalBlock};

/// Exit status of a worker that could not open the shared directory.
pub const SETUP_FAILED: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(i32),
    Signaled(i32),
}

impl WorkerExit {
    pub fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            WorkerExit::Signaled(libc::WTERMSIG(status))
        } else {
            WorkerExit::Exited(libc::WEXITSTATUS(status))
        }
    }

    pub fn is_clean(&self) -> bool {
        *self == WorkerExit::Exited(0)
    }

    /// The worker never reached its race loop.
    pub fn is_setup_failure(&self) -> bool {
        *self == WorkerExit::Exited(SETUP_FAILED)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited(code) => write!(f, "exited with status {}", code),
            WorkerExit::Signaled(sig) => write!(f, "was killed by signal {}", sig),
        }
    }
}

/// Parent-side record of a forked worker. `finished` mirrors nothing in the
/// child; it is set once the worker has been reaped.
#[derive(Debug)]
pub struct Worker {
    pub id: usize,
    pub pid: libc::pid_t,
    pub finished: bool,
    pub exit: Option<WorkerExit>,
}

impl Worker {
    fn new(id: usize, pid: libc::pid_t) -> Self {
        Worker {
            id,
            pid,
            finished: false,
            exit: None,
        }
    }
}

pub fn allocate(count: usize) -> Result<Vec<Worker>> {
    let mut workers = Vec::new();
    workers
        .try_reserve_exact(count)
        .map_err(|_| HarnessError::AllocWorkers(count))?;
    Ok(workers)
}

/// Applied to the parent before forking so every worker inherits it.
pub fn set_priority(priority: i32) {
    if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, priority) } != 0 {
        warn!(
            "setpriority({}) failed: {}",
            priority,
            io::Error::last_os_error()
        );
    }
}

/// Forks `count` workers racing in `base_dir`. If any fork fails, the ones
/// already running are stopped and reaped before the error is returned.
pub fn spawn_workers(workers: &mut Vec<Worker>, count: usize, base_dir: &CStr) -> Result<()> {
    spawn_workers_with(workers, count, base_dir, || unsafe { libc::fork() })
}

fn spawn_workers_with(
    workers: &mut Vec<Worker>,
    count: usize,
    base_dir: &CStr,
    mut fork: impl FnMut() -> libc::pid_t,
) -> Result<()> {
    let _blocked = StopSignalBlock::new();

    for id in 0..count {
        let pid = fork();
        if pid == 0 {
            worker_main(base_dir);
        }
        if pid < 0 {
            let source = io::Error::last_os_error();
            shutdown::stop_workers(workers)?;
            return Err(HarnessError::Spawn { id, source });
        }
        debug!("Spawned worker {} as pid {}", id, pid);
        workers.push(Worker::new(id, pid));
    }

    Ok(())
}

// Runs in the child. Must not log or return into the parent's code.
fn worker_main(base_dir: &CStr) -> ! {
    shutdown::arm_worker();

    let pid = unsafe { libc::getpid() };
    let code = match Workload::open_at(base_dir, pid as u64) {
        Ok(mut workload) => {
            workload.run(&shutdown::STOP);
            0
        }
        Err(_) => SETUP_FAILED,
    };
    unsafe { libc::_exit(code) }
}
