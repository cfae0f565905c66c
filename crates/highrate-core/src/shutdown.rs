//! Graceful shutdown support via atomic flag

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code used when a second signal forces termination
const FORCED_EXIT_CODE: i32 = 130;

/// Global shutdown flag, set by SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown as a signal would
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Install SIGINT/SIGTERM handlers.
///
/// First signal: set the shutdown flag, the batch stops between items and
/// an in-flight transfer aborts at its next chunk.
/// Second signal: exit immediately.
pub fn install_signal_handlers() -> io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and low_level::exit (`_exit`, no atexit
        // handlers) are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(FORCED_EXIT_CODE);
                }
            })?;
        }
    }
    Ok(())
}
