//! Colored status lines on stdout.

use simply_colored::*;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Turns [`log_debug`] output on or off for the rest of the process.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn log_debug(message: &str) {
    if verbose() {
        println!("{WHITE}[DEBUG]{RESET} {message}");
    }
}

pub fn log_info(message: &str) {
    println!("{BLUE}[INFO]{RESET} {message}");
}

pub fn log_warning(message: &str) {
    println!("{YELLOW}[WARNING]{RESET} {message}");
}

pub fn log_success(message: &str) {
    println!("{GREEN}[SUCCESS]{RESET} {message}");
}

pub fn log_error(message: &str) {
    println!("{RED}[ERROR]{RESET} {message}");
}
