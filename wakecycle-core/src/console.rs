//! Best-effort diagnostic console
//!
//! The scheduler emits one-line duty-cycle traces ("wake up!", "entering low
//! power", clock fault notes). Output is best-effort: a sink must never block
//! the main loop, and dropped lines are acceptable. The alarm callback never
//! logs directly; its messages travel through the wake signal and are
//! emitted here on the main loop's next pass.

/// Sink for one-line diagnostic text
pub trait ConsoleSink {
    /// Emit a line. Must not block; dropping the line is allowed.
    fn log(&self, line: &str);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConsole;

impl ConsoleSink for NullConsole {
    fn log(&self, _line: &str) {}
}

/// Routes lines to the `log` crate (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsole;

#[cfg(feature = "std")]
impl ConsoleSink for LogConsole {
    fn log(&self, line: &str) {
        log::info!(target: "wakecycle", "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_console_swallows_lines() {
        NullConsole.log("wake up!");
    }
}
