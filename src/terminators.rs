//! Terminators for controlling and interrupting long-running driver runs.
//!
//! This module provides several implementations of the [`Terminator`] trait, including:
//! - [`InterruptTerminator`]: Responds to Ctrl-C (SIGINT) or programmatic interrupts.
//! - [`WallClockTerminator`]: Terminates after a specified wall-clock time limit.
//! - [`CpuTimeTerminator`]: Terminates after a specified CPU time limit.
//! - [`MultipleTerminators`]: Combines multiple terminators.
//!
//! # Note
//! [`InterruptTerminator`] installs a global signal handler and **can only be constructed once** per process. Attempting to create multiple instances will result in a panic.

use std::sync::{atomic::AtomicBool, Arc};

use crate::ExitFlag;

pub trait Terminator {
    fn initialize(&mut self) {}

    fn terminate(&mut self) -> Option<ExitFlag>;
}

/// Terminator that responds to Ctrl-C (SIGINT) or programmatic interrupts.
///
/// # Note
/// Only one instance of `InterruptTerminator` can be constructed per process, as it installs a global signal handler.
/// Creating more than one will panic.
pub struct InterruptTerminator {
    interrupted: Arc<AtomicBool>,
}

impl InterruptTerminator {
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler({
            let interrupted_clone = interrupted.clone();
            move || {
                interrupted_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        })
        .expect("Error setting Ctrl-C handler");
        Self { interrupted }
    }

    pub fn interrupt(&mut self) {
        self.interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for InterruptTerminator {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminator for InterruptTerminator {
    fn terminate(&mut self) -> Option<ExitFlag> {
        if self.interrupted.load(std::sync::atomic::Ordering::SeqCst) {
            Some(ExitFlag::Interrupted)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a specified number of wall-clock seconds.
pub struct WallClockTerminator {
    max_time_secs: u64,
    start_time: std::time::Instant,
}

impl WallClockTerminator {
    pub fn new(max_time_secs: u64) -> Self {
        Self {
            max_time_secs,
            start_time: std::time::Instant::now(),
        }
    }
}

impl Terminator for WallClockTerminator {
    fn initialize(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    fn terminate(&mut self) -> Option<ExitFlag> {
        if self.start_time.elapsed().as_secs() >= self.max_time_secs {
            Some(ExitFlag::ExceedMaxWallclockTime)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a specified number of CPU seconds,
/// measured via [`std::time::Instant`] at the process level (a reasonable
/// proxy for CPU time on the single-threaded driver loop this crate runs,
/// spec §6).
pub struct CpuTimeTerminator {
    max_cpu_secs: u64,
    start_time: std::time::Instant,
}

impl CpuTimeTerminator {
    pub fn new(max_cpu_secs: u64) -> Self {
        Self {
            max_cpu_secs,
            start_time: std::time::Instant::now(),
        }
    }
}

impl Terminator for CpuTimeTerminator {
    fn initialize(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    fn terminate(&mut self) -> Option<ExitFlag> {
        if self.start_time.elapsed().as_secs() >= self.max_cpu_secs {
            Some(ExitFlag::ExceedMaxCpuTime)
        } else {
            None
        }
    }
}

/// Terminator that combines multiple terminators and triggers if any of them do.
pub struct MultipleTerminators {
    terminators: Vec<Box<dyn Terminator>>,
}

impl MultipleTerminators {
    pub fn new(terminators: Vec<Box<dyn Terminator>>) -> Self {
        Self { terminators }
    }
}

impl Terminator for MultipleTerminators {
    fn initialize(&mut self) {
        for terminator in &mut self.terminators {
            terminator.initialize();
        }
    }

    fn terminate(&mut self) -> Option<ExitFlag> {
        for terminator in &mut self.terminators {
            if let Some(status) = terminator.as_mut().terminate() {
                return Some(status);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    mod platform {
        pub fn send_sigint() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = std::process::id() as i32;
            signal::kill(Pid::from_raw(pid), Signal::SIGINT).expect("Failed to send SIGINT");
        }
    }

    #[cfg(windows)]
    mod platform {
        pub fn send_sigint() {
            use windows_sys::Win32::System::Console::{CTRL_C_EVENT, GenerateConsoleCtrlEvent};

            unsafe {
                GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0);
            }
        }
    }

    #[test]
    fn test_interruption_terminator_ctrlc() {
        let mut terminator = InterruptTerminator::new();

        std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_secs(2));
            platform::send_sigint();
        });

        println!("Press Ctrl-C to test interruption terminator...");
        loop {
            if let Some(status) = terminator.terminate() {
                assert_eq!(status, ExitFlag::Interrupted);
                break;
            }
        }
    }

    #[test]
    fn wall_clock_terminator_fires_after_limit() {
        let mut t = WallClockTerminator::new(0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(t.terminate(), Some(ExitFlag::ExceedMaxWallclockTime));
    }

    #[test]
    fn multiple_terminators_reports_first_firing() {
        let mut t = MultipleTerminators::new(vec![
            Box::new(WallClockTerminator::new(0)),
            Box::new(CpuTimeTerminator::new(1000)),
        ]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(t.terminate(), Some(ExitFlag::ExceedMaxWallclockTime));
    }
}
