use std::ffi::CStr;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A logical file with the name it is created under and the name it is
/// renamed to.
#[derive(Debug)]
pub struct Slot {
    pub resting: &'static CStr,
    pub moved: &'static CStr,
}

pub static SLOTS: [Slot; 10] = [
    Slot { resting: c".f1", moved: c"f1" },
    Slot { resting: c".f2", moved: c"f2" },
    Slot { resting: c".f3", moved: c"f3" },
    Slot { resting: c".f4", moved: c"f4" },
    Slot { resting: c".f5", moved: c"f5" },
    Slot { resting: c".f6", moved: c"f6" },
    Slot { resting: c".f7", moved: c"f7" },
    Slot { resting: c".f8", moved: c"f8" },
    Slot { resting: c".f9", moved: c"f9" },
    Slot { resting: c".f10", moved: c"f10" },
];

const DIR_FLAGS: libc::c_int = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC | libc::O_PATH;
const FILE_FLAGS: libc::c_int = libc::O_RDWR | libc::O_CREAT | libc::O_CLOEXEC;
const FILE_MODE: libc::c_uint = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateFailed,
    Renamed,
    RenameFailed,
}

/// One worker's create/rename/unlink loop against the shared directory.
pub struct Workload {
    dir: OwnedFd,
    rng: StdRng,
}

impl Workload {
    /// Allocation-free, so it is usable right after fork.
    pub fn open_at(base: &CStr, seed: u64) -> io::Result<Self> {
        let fd = unsafe { libc::open(base.as_ptr(), DIR_FLAGS) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Workload {
            dir: unsafe { OwnedFd::from_raw_fd(fd) },
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn step(&mut self) -> Step {
        let slot = &SLOTS[self.rng.random_range(0..SLOTS.len())];
        let dirfd = self.dir.as_raw_fd();

        let fd = unsafe { libc::openat(dirfd, slot.resting.as_ptr(), FILE_FLAGS, FILE_MODE) };
        if fd < 0 {
            return Step::CreateFailed;
        }
        let _file = unsafe { OwnedFd::from_raw_fd(fd) };

        // Unlink failures mean another worker got there first.
        unsafe {
            if libc::renameat(dirfd, slot.resting.as_ptr(), dirfd, slot.moved.as_ptr()) != 0 {
                libc::unlinkat(dirfd, slot.resting.as_ptr(), 0);
                Step::RenameFailed
            } else {
                libc::unlinkat(dirfd, slot.moved.as_ptr(), 0);
                Step::Renamed
            }
        }
    }

    pub fn run(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            self.step();
        }
    }
}
