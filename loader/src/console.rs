//! Console logger
//!
//! Routes the `log` facade to the operator's console. The sink is set once,
//! before the first pass; until then every log line is dropped.
//!
//! ```text
//!   error!  ──►  "ERROR: <msg>"
//!   warn!   ──►  "- WARNING: <msg>"
//!   info!   ──►  "<msg>"
//!   debug!  ──►  "[target] <msg>"
//! ```

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Where console text goes (the CLI window, a serial port, a test buffer).
pub trait ConsoleSink: Sync {
    fn write_str(&self, s: &str);
}

struct SinkWriter(&'static dyn ConsoleSink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

struct ConsoleLogger {
    sink: Mutex<Option<&'static dyn ConsoleSink>>,
}

static LOGGER: ConsoleLogger = ConsoleLogger { sink: Mutex::new(None) };

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let guard = self.sink.lock();
        let Some(sink) = *guard else {
            return;
        };
        let mut out = SinkWriter(sink);
        let _ = match record.level() {
            Level::Error => out.write_str("ERROR: "),
            Level::Warn => out.write_str("- WARNING: "),
            Level::Info => Ok(()),
            Level::Debug | Level::Trace => write!(out, "[{}] ", record.target()),
        };
        let _ = writeln!(out, "{}", record.args());
    }

    fn flush(&self) {}
}

/// Register the console sink. `debug` enables debug-level output.
///
/// Safe to call more than once; the latest sink wins.
pub fn init_console(sink: &'static dyn ConsoleSink, debug: bool) {
    *LOGGER.sink.lock() = Some(sink);
    let _ = log::set_logger(&LOGGER);
    set_debug(debug);
}

/// Raise or lower the console verbosity.
pub fn set_debug(debug: bool) {
    log::set_max_level(if debug { LevelFilter::Debug } else { LevelFilter::Info });
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    struct Capture(Mutex<String>);

    impl ConsoleSink for Capture {
        fn write_str(&self, s: &str) {
            self.0.lock().push_str(s);
        }
    }

    static CAPTURE: Capture = Capture(Mutex::new(String::new()));

    #[test]
    fn test_prefixes() {
        init_console(&CAPTURE, true);
        log::error!(target: "loader", "Pass #1 marker");
        log::warn!(target: "loader", "warning marker");
        log::info!(target: "loader", "plain marker");
        log::debug!(target: "mmu", "debug marker");
        let text = CAPTURE.0.lock().clone();
        assert!(text.contains("ERROR: Pass #1 marker\n"));
        assert!(text.contains("- WARNING: warning marker\n"));
        assert!(text.contains("\nplain marker\n") || text.starts_with("plain marker\n"));
        assert!(text.contains("[mmu] debug marker\n"));
    }
}
