//! Unified logging and progress UI.
//!
//! [`Notifier`] puts `env_logger` (text logs) and an `indicatif` spinner behind
//! a single verbosity switch:
//! - [`VerbosityLevel::Quiet`] → only warnings are logged; pipeline stages are
//!   shown on a live spinner.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`]
//!   → stages become ordinary log lines at the selected level.
//!
//! `RUST_LOG` still overrides the filter, as with any `env_logger` setup.

use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, warnings only
    Info = 1,
    Debug = 2,
    Trace = 3,
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    total_stages: usize,
    spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    /// Creates a notifier and installs the global logger. Installing twice
    /// (as happens in tests) keeps the first logger.
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let _ = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .try_init();

        Self::without_logger(verbosity)
    }

    /// A notifier that never draws a spinner and leaves logger setup alone.
    pub fn silent() -> Self {
        Self::without_logger(VerbosityLevel::Info)
    }

    fn without_logger(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            total_stages: 0,
            spinner: RefCell::new(None),
        }
    }

    pub fn with_total_stages(mut self, total: usize) -> Self {
        self.total_stages = total;
        self
    }

    /// Reports the start of pipeline stage `index` (1-based).
    pub fn stage(&self, index: usize, message: &str) {
        let line = if self.total_stages > 0 {
            format!("[{}/{}] {}", index, self.total_stages, message)
        } else {
            message.to_string()
        };
        self.info(&line);
    }

    pub fn info(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => {
                let mut spinner = self.spinner.borrow_mut();
                let spinner = spinner.get_or_insert_with(|| {
                    let bar = ProgressBar::new_spinner();
                    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
                    {
                        bar.set_style(style);
                    }
                    bar.enable_steady_tick(Duration::from_millis(100));
                    bar
                });
                spinner.set_message(message.to_string());
            }
            _ => info!("{}", message),
        }
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", message);
    }

    pub fn warn(&self, message: &str) {
        match self.spinner.borrow().as_ref() {
            Some(spinner) => spinner.suspend(|| warn!("{}", message)),
            None => warn!("{}", message),
        }
    }

    /// Clears the spinner, if any, and prints `message` on its own line.
    pub fn finish(&self, message: &str) {
        match self.spinner.borrow_mut().take() {
            Some(spinner) => {
                spinner.finish_and_clear();
                println!("{}", message);
            }
            None => info!("{}", message),
        }
    }

    /// Drops the spinner without a final message, e.g. before reporting an error.
    pub fn abandon(&self) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }

    pub fn verbosity_level(&self) -> VerbosityLevel {
        self.verbosity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from(0), VerbosityLevel::Quiet);
        assert_eq!(VerbosityLevel::from(1), VerbosityLevel::Info);
        assert_eq!(VerbosityLevel::from(2), VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::from(7), VerbosityLevel::Trace);
    }

    #[test]
    fn test_silent_notifier_never_spins() {
        let notifier = Notifier::silent().with_total_stages(11);
        notifier.stage(1, "Starting");
        assert!(notifier.spinner.borrow().is_none());
        assert_eq!(notifier.verbosity_level(), VerbosityLevel::Info);
    }
}
