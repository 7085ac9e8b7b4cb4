//! A *very* simple [`slog`] drain, plus the root logger constructor used
//! throughout the kernel.
//!
//! Kernel code logs through `slog`'s macros (`trace!`, `debug!`, `warn!`)
//! the way the original kernel logs through its `XBT_DEBUG`/`XBT_WARN`
//! macros: at actor creation/termination, simcall dispatch, resource
//! turn-off, and route resolution. This module only builds the drain; it
//! does not attempt to be a configurable multi-backend logging framework.

use slog::{Drain, OwnedKVList, Record};
use std::cell::RefCell;
use std::io;
use std::io::Write;

/// Writes one line per record: `<level> <message>`.
pub struct LineLogger<W: io::Write> {
    io: RefCell<W>,
}

impl<W> LineLogger<W>
where
    W: io::Write,
{
    /// Wraps `io` in a drain that writes one line per log record.
    pub fn new(io: W) -> LineLogger<W> {
        LineLogger {
            io: RefCell::new(io),
        }
    }
}

impl<W> slog::Drain for LineLogger<W>
where
    W: io::Write,
{
    type Ok = ();
    type Err = io::Error;

    fn log(&self, rinfo: &Record, _logger_values: &OwnedKVList) -> io::Result<()> {
        let mut io = self.io.borrow_mut();
        writeln!(io, "{} {}", rinfo.level().as_short_str(), rinfo.msg())
    }
}

/// Builds the crate's root logger, writing to stderr.
///
/// Callers that want a different sink (a file, a null drain for tests) can
/// build their own `slog::Logger` around [`LineLogger`] or any other
/// `slog::Drain` and pass it to [`crate::engine::Engine::new`].
pub fn root_logger() -> slog::Logger {
    let drain = LineLogger::new(io::stderr()).fuse();
    let drain = slog::Mutex::new(drain).fuse();
    slog::Logger::root(drain, slog::o!())
}

/// A logger that discards everything; handy for tests that don't want
/// stderr noise but still need a `slog::Logger` to hand to the engine.
pub fn null_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
