use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::workers::{Worker, WorkerExit};

pub const STOP_SIGNAL: libc::c_int = libc::SIGUSR1;

/// Only meaningful inside a worker, where `on_stop` is the installed
/// handler. The parent never sets it.
pub static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_stop(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn stop_sigset() -> libc::sigset_t {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), STOP_SIGNAL);
        set.assume_init()
    }
}

/// Holds the stop signal blocked on the calling thread while workers are
/// forked, so a child inherits it pending-but-blocked until its handler is
/// in place.
pub struct StopSignalBlock {
    previous: libc::sigset_t,
}

impl StopSignalBlock {
    pub fn new() -> Self {
        let set = stop_sigset();
        let mut previous = MaybeUninit::<libc::sigset_t>::uninit();
        unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, previous.as_mut_ptr());
            StopSignalBlock {
                previous: previous.assume_init(),
            }
        }
    }
}

impl Drop for StopSignalBlock {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut());
        }
    }
}

/// Called in the child right after fork. No SA_RESTART: a worker parked in a
/// syscall gets EINTR and sees the flag on its next iteration.
pub fn arm_worker() {
    STOP.store(false, Ordering::SeqCst);
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_stop as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(STOP_SIGNAL, &action, ptr::null_mut());

        let set = stop_sigset();
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, ptr::null_mut());
    }
}

fn reap(pid: libc::pid_t) -> Result<WorkerExit> {
    loop {
        let mut status: libc::c_int = 0;
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret == pid {
            return Ok(WorkerExit::from_wait_status(status));
        }
        let source = io::Error::last_os_error();
        if source.raw_os_error() != Some(libc::EINTR) {
            return Err(HarnessError::Reap { pid, source });
        }
    }
}

/// Signals every worker, then waits for each in turn. Nothing is killed
/// forcibly; workers leave their loop on their own.
pub fn stop_workers(workers: &mut [Worker]) -> Result<()> {
    for worker in workers.iter() {
        info!("Stopping {}...", worker.pid);
        if unsafe { libc::kill(worker.pid, STOP_SIGNAL) } != 0 {
            warn!(
                "Could not signal worker {} (pid {}): {}",
                worker.id,
                worker.pid,
                io::Error::last_os_error()
            );
        }
    }

    // Reap everyone before reporting a failure; the directory is torn
    // down right after this returns.
    let mut first_err = None;
    for worker in workers.iter_mut() {
        info!("Waiting {}...", worker.pid);
        match reap(worker.pid) {
            Ok(exit) => {
                if !exit.is_clean() {
                    warn!("Worker {} (pid {}) {}", worker.id, worker.pid, exit);
                }
                worker.exit = Some(exit);
                worker.finished = true;
            }
            Err(err) => {
                warn!("{}", err);
                first_err.get_or_insert(err);
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
