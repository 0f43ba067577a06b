use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;

use crate::format_registry::Formatter;
use crate::loggable::{LogArguments, PayloadReader, PayloadWriter};
use crate::thread_queue::{self, QueueRegistry};

/// Byte capacity of a slot payload: one level byte plus the encoded
/// argument stream. Messages that encode larger than this are refused at
/// the producer.
pub const PAYLOAD_CAPACITY: usize = 1024;

/// How long the drain thread sleeps between passes.
const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Message severity, ordered. Producers enqueue only messages at or above
/// the logger's threshold.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Error = 2,
    Fatal = 3,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Parses a level name. Unknown names map to `Fatal` so that a
    /// misconfigured level never filters messages out.
    pub fn from_name(name: &str) -> LogLevel {
        match name {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }

    fn from_tag(tag: u8) -> LogLevel {
        match tag {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open log file {path:?}: {source}")]
    OpenSink { path: PathBuf, source: io::Error },
    #[error("failed to spawn drain thread: {0}")]
    SpawnDrain(io::Error),
}

/// The unit of transfer through a ring buffer: a formatter handle plus a
/// fixed-size payload. The payload layout is:
///
/// ```text
/// [1 byte level | encoded argument stream]
/// ```
///
/// The argument stream is opaque; only the formatter recorded alongside it
/// knows the type sequence needed to decode it.
#[derive(Clone, Copy)]
pub struct MessageSlot {
    formatter: &'static Formatter,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl MessageSlot {
    pub fn new(formatter: &'static Formatter, level: LogLevel) -> Self {
        let mut slot = Self {
            formatter,
            payload: [0; PAYLOAD_CAPACITY],
        };
        slot.payload[0] = level as u8;
        slot
    }

    /// Encodes `args` into the payload after the level byte. The caller
    /// checks `args.encoded_len()` against the capacity first.
    pub fn encode_args<A: LogArguments>(&mut self, args: &A) {
        let mut writer = PayloadWriter::new(&mut self.payload[1..]);
        args.encode(&mut writer);
    }

    pub fn formatter(&self) -> &'static Formatter {
        self.formatter
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_tag(self.payload[0])
    }

    pub fn arg_bytes(&self) -> &[u8] {
        &self.payload[1..]
    }
}

/// Fired at most once per process, on the first refused oversized message.
static OVERSIZE: Once = Once::new();

struct LoggerCore {
    registry: Arc<QueueRegistry>,
    threshold: AtomicU8,
    /// Touched only while draining; the lock also serializes concurrent
    /// `drain_once` callers so each queue ever has a single consumer.
    sink: Mutex<File>,
    keep_draining: AtomicBool,
    drain_interval: Duration,
}

/// Configuration for a [`Logger`].
pub struct LoggerBuilder {
    path: PathBuf,
    threshold: LogLevel,
    drain_interval: Duration,
    background: bool,
}

impl LoggerBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            threshold: LogLevel::Info,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            background: true,
        }
    }

    pub fn level(mut self, threshold: LogLevel) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Whether `build` spawns the background drain thread. With `false`
    /// the caller drives consumption through [`Logger::drain_once`].
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn build(self) -> Result<Logger, Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| Error::OpenSink {
                path: self.path.clone(),
                source,
            })?;

        let core = Arc::new(LoggerCore {
            registry: Arc::new(QueueRegistry::new()),
            threshold: AtomicU8::new(self.threshold as u8),
            sink: Mutex::new(file),
            keep_draining: AtomicBool::new(self.background),
            drain_interval: self.drain_interval,
        });

        let drain_thread = if self.background {
            let core = Arc::clone(&core);
            let handle = thread::Builder::new()
                .name("fastlog-drain".into())
                .spawn(move || drain_loop(&core))
                .map_err(Error::SpawnDrain)?;
            Some(handle)
        } else {
            None
        };

        Ok(Logger { core, drain_thread })
    }
}

/// Asynchronous logger: producers encode messages into their thread's ring
/// buffer, a single drainer formats them and appends text lines to the log
/// file. Line format:
///
/// ```text
/// [YYYY-MM-DD HH:MM:SS] [LEVEL] <call-site>:<rendered template>\n
/// ```
///
/// The timestamp is taken at drain time. Lines from one thread appear in
/// the order that thread produced them; lines from different threads may
/// interleave arbitrarily.
pub struct Logger {
    core: Arc<LoggerCore>,
    drain_thread: Option<JoinHandle<()>>,
}

impl Logger {
    pub fn builder(path: impl Into<PathBuf>) -> LoggerBuilder {
        LoggerBuilder::new(path)
    }

    /// Opens `path` in append mode and starts the background drainer with
    /// default settings.
    pub fn create(path: impl Into<PathBuf>) -> Result<Logger, Error> {
        LoggerBuilder::new(path).build()
    }

    pub fn set_level(&self, threshold: LogLevel) {
        self.core.threshold.store(threshold as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_tag(self.core.threshold.load(Ordering::Relaxed))
    }

    /// Records one message. Filtered messages cost a single atomic load; a
    /// recorded message costs encoding its arguments into a stack slot plus
    /// one ring-buffer publish, never a syscall or a heap allocation.
    ///
    /// Call sites normally go through [`fast_log!`](crate::fast_log) or the
    /// level macros, which intern the formatter and enforce that the
    /// placeholder count matches the argument count at compile time.
    pub fn log<A: LogArguments>(&self, formatter: &'static Formatter, level: LogLevel, args: A) {
        if (level as u8) < self.core.threshold.load(Ordering::Relaxed) {
            return;
        }

        let encoded_len = 1 + args.encoded_len();
        if encoded_len > PAYLOAD_CAPACITY {
            // Programmer error: refuse the message instead of corrupting the
            // slot. One diagnostic per process, not one per call.
            OVERSIZE.call_once(|| {
                eprintln!(
                    "fastlog: dropped message needing {} bytes (slot payload is {} bytes)",
                    encoded_len, PAYLOAD_CAPACITY
                );
            });
            return;
        }

        let mut slot = MessageSlot::new(formatter, level);
        slot.encode_args(&args);
        thread_queue::with_thread_queue(&self.core.registry, |queue| {
            queue.queue().enqueue(slot);
        });
    }

    /// Runs one drain pass on the caller's thread. This is the whole drain
    /// story for loggers built with `background(false)`.
    pub fn drain_once(&self) {
        drain_pass(&self.core);
    }

    /// Stops the background drainer: clears the keep-running flag and joins
    /// the thread, which performs one final pass on its way out. Messages
    /// enqueued after that pass stay in their queues. Idempotent.
    pub fn stop(&mut self) {
        self.core.keep_draining.store(false, Ordering::Release);
        if let Some(handle) = self.drain_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.stop();
        if let Ok(mut sink) = self.core.sink.lock() {
            let _ = sink.flush();
        }
    }
}

fn drain_loop(core: &LoggerCore) {
    while core.keep_draining.load(Ordering::Acquire) {
        drain_pass(core);
        thread::sleep(core.drain_interval);
    }
    // Final pass: messages enqueued before stop() still reach the sink.
    drain_pass(core);
}

/// One pass over every queue: dequeue until empty, render, write, flush.
/// The registry mutex is released before any formatting happens; the sink
/// lock is held for the whole pass.
fn drain_pass(core: &LoggerCore) {
    let (active, retired) = core.registry.snapshot();
    if active.is_empty() && retired.is_empty() {
        return;
    }

    let mut sink = match core.sink.lock() {
        Ok(sink) => sink,
        Err(_) => return,
    };

    let mut line = String::new();
    for queue in active.iter().chain(retired.iter()) {
        while let Some(slot) = queue.queue().dequeue() {
            line.clear();
            render_line(&slot, &mut line);
            // Best effort: a full disk must not take the host down with it.
            if sink.write_all(line.as_bytes()).is_ok() {
                let _ = sink.flush();
            }
        }
    }
    // Retired queues are fully drained now and dropped here.
}

fn render_line(slot: &MessageSlot, out: &mut String) {
    use std::fmt::Write as _;

    let now = Local::now();
    let _ = write!(
        out,
        "[{}] [{}] ",
        now.format("%Y-%m-%d %H:%M:%S"),
        slot.level()
    );
    let mut reader = PayloadReader::new(slot.arg_bytes());
    slot.formatter().format(&mut reader, out);
    out.push('\n');
}

/// Records one message through `logger`.
///
/// The format template must be a string literal whose `{}` placeholder
/// count equals the argument count; both are checked at compile time. The
/// template seen by the formatter is prefixed with the enclosing module
/// path, so every line names its origin without the caller passing it.
#[macro_export]
macro_rules! fast_log {
    ($logger:expr, $level:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        const _: () = {
            assert!(
                $crate::format_registry::validate_template($fmt),
                "malformed placeholder in format template"
            );
            assert!(
                $crate::format_registry::placeholder_count($fmt)
                    == <[()]>::len(&[$($crate::__fastlog_unit!($arg)),*]),
                "placeholder count must equal argument count"
            );
        };
        static __SITE: ::std::sync::OnceLock<&'static $crate::Formatter> =
            ::std::sync::OnceLock::new();
        let __args = ($(&$arg,)*);
        let __formatter = *__SITE.get_or_init(|| {
            $crate::Formatter::intern_for(concat!(module_path!(), ":", $fmt), &__args)
        });
        $logger.log(__formatter, $level, __args);
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __fastlog_unit {
    ($arg:expr) => {
        ()
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fast_log!($logger, $crate::LogLevel::Debug, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fast_log!($logger, $crate::LogLevel::Info, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fast_log!($logger, $crate::LogLevel::Error, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fast_log!($logger, $crate::LogLevel::Fatal, $fmt $(, $arg)*)
    };
}
