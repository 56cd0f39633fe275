use std::process::ExitCode;

use tracing::{error, info};

use crate::error::HarnessError;

/// Outcome of a run, with the exit statuses test runners already know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Broken,
    Conf,
}

impl Verdict {
    pub fn exit_status(self) -> u8 {
        match self {
            Verdict::Pass => 0,
            Verdict::Broken => 2,
            Verdict::Conf => 32,
        }
    }
}

impl From<Verdict> for ExitCode {
    fn from(verdict: Verdict) -> Self {
        ExitCode::from(verdict.exit_status())
    }
}

pub fn pass(message: &str) -> Verdict {
    info!("PASS: {}", message);
    Verdict::Pass
}

pub fn abort(err: &HarnessError) -> Verdict {
    let verdict = err.verdict();
    match verdict {
        Verdict::Conf => error!("CONF: {}", err),
        _ => error!("BROK: {}", err),
    }
    verdict
}
