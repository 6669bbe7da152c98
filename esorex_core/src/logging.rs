//! Leveled messaging for the terminal and the log file.
//!
//! The [`Messenger`] is the `log` backend of the program. Every record is
//! sent to two sinks with independent thresholds:
//!
//! - the terminal, formatted by an `env_logger` logger as
//!   `[ LEVEL ] domain: message`,
//! - the scratch log file, with a wall clock time stamp in front.
//!
//! The *domain* is the name of the component currently talking. It is
//! `esorex` for the caller and the recipe name while recipe callbacks run;
//! [`DomainGuard`] restores the previous domain when dropped.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// Message severity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
    Off,
}

impl MessageLevel {
    /// True when a record of `level` passes this threshold
    pub fn allows(self, level: Level) -> bool {
        let rank = match level {
            Level::Error => MessageLevel::Error,
            Level::Warn => MessageLevel::Warning,
            Level::Info => MessageLevel::Info,
            Level::Debug | Level::Trace => MessageLevel::Debug,
        };
        self != MessageLevel::Off && rank >= self
    }

    pub fn to_filter(self) -> LevelFilter {
        match self {
            MessageLevel::Debug => LevelFilter::Trace,
            MessageLevel::Info => LevelFilter::Info,
            MessageLevel::Warning => LevelFilter::Warn,
            MessageLevel::Error => LevelFilter::Error,
            MessageLevel::Off => LevelFilter::Off,
        }
    }
}

impl FromStr for MessageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(MessageLevel::Debug),
            "info" => Ok(MessageLevel::Info),
            "warning" => Ok(MessageLevel::Warning),
            "error" => Ok(MessageLevel::Error),
            "off" => Ok(MessageLevel::Off),
            other => Err(format!("unknown message level '{other}'")),
        }
    }
}

fn label(level: Level) -> &'static str {
    match level {
        Level::Error => "[ ERROR ]",
        Level::Warn => "[WARNING]",
        Level::Info => "[ INFO  ]",
        Level::Debug | Level::Trace => "[ DEBUG ]",
    }
}

struct MessengerState {
    terminal_level: Mutex<MessageLevel>,
    file_level: Mutex<MessageLevel>,
    domain: Arc<Mutex<String>>,
    log_file: Mutex<Option<(PathBuf, BufWriter<File>)>>,
    terminal: env_logger::Logger,
}

/// Shared handle to the messenger state.
///
/// Cloning is cheap; recipes receive a clone in their context so they can
/// report through the same sinks as the caller.
#[derive(Clone)]
pub struct MessengerHandle(Arc<MessengerState>);

impl fmt::Debug for MessengerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessengerHandle")
            .field("terminal_level", &self.terminal_level())
            .field("file_level", &self.file_level())
            .field("domain", &self.domain())
            .finish()
    }
}

impl Default for MessengerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MessengerHandle {
    pub fn new() -> Self {
        let domain = Arc::new(Mutex::new(crate::PACKAGE.to_string()));
        let format_domain = Arc::clone(&domain);
        let terminal = env_logger::Builder::new()
            .filter_level(LevelFilter::Trace)
            .format(move |buf, record| {
                let domain = format_domain.lock();
                if domain.is_empty() {
                    writeln!(buf, "{} {}", label(record.level()), record.args())
                } else {
                    writeln!(buf, "{} {}: {}", label(record.level()), domain, record.args())
                }
            })
            .build();

        Self(Arc::new(MessengerState {
            terminal_level: Mutex::new(MessageLevel::Info),
            file_level: Mutex::new(MessageLevel::Info),
            domain,
            log_file: Mutex::new(None),
            terminal,
        }))
    }

    /// Install a [`Messenger`] on this handle as the global `log` backend.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(Messenger(self.clone())))?;
        log::set_max_level(self.max_filter());
        Ok(())
    }

    fn max_filter(&self) -> LevelFilter {
        self.terminal_level()
            .to_filter()
            .max(self.file_level().to_filter())
    }

    pub fn terminal_level(&self) -> MessageLevel {
        *self.0.terminal_level.lock()
    }

    pub fn set_terminal_level(&self, level: MessageLevel) {
        *self.0.terminal_level.lock() = level;
        log::set_max_level(self.max_filter());
    }

    pub fn file_level(&self) -> MessageLevel {
        *self.0.file_level.lock()
    }

    pub fn set_file_level(&self, level: MessageLevel) {
        *self.0.file_level.lock() = level;
        log::set_max_level(self.max_filter());
    }

    pub fn domain(&self) -> String {
        self.0.domain.lock().clone()
    }

    /// Replace the domain, returning the previous one
    pub fn set_domain(&self, domain: &str) -> String {
        std::mem::replace(&mut *self.0.domain.lock(), domain.to_string())
    }

    /// Switch to `domain` until the returned guard is dropped
    pub fn domain_guard(&self, domain: &str) -> DomainGuard {
        let previous = self.set_domain(domain);
        DomainGuard {
            messenger: self.clone(),
            previous,
        }
    }

    /// Start writing the log file at `path`, replacing any earlier one.
    pub fn open_log_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        if let Some((_, mut old)) = self.0.log_file.lock().replace((path, BufWriter::new(file))) {
            old.flush()?;
        }
        Ok(())
    }

    /// Flush and close the log file, returning its path
    pub fn close_log_file(&self) -> Option<PathBuf> {
        let (path, mut writer) = self.0.log_file.lock().take()?;
        if let Err(e) = writer.flush() {
            eprintln!("Unable to flush log file {}: {}", path.display(), e);
        }
        Some(path)
    }

    /// Write a line to the log file only, regardless of the domain
    pub fn file_only(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.file_level().allows(level) {
            self.write_file(level, args);
        }
    }

    fn write_file(&self, level: Level, args: fmt::Arguments<'_>) {
        let mut guard = self.0.log_file.lock();
        if let Some((_, writer)) = guard.as_mut() {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            let domain = self.0.domain.lock().clone();
            let _ = writeln!(writer, "{} {} {}: {}", stamp, label(level), domain, args);
        }
    }

    /// Send one message to both sinks, each filtered by its own threshold.
    pub fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.terminal_level().allows(level) {
            self.0.terminal.log(
                &Record::builder()
                    .level(level)
                    .target(crate::PACKAGE)
                    .args(args)
                    .build(),
            );
        }
        if self.file_level().allows(level) {
            self.write_file(level, args);
        }
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.emit(Level::Debug, format_args!("{msg}"));
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.emit(Level::Info, format_args!("{msg}"));
    }

    pub fn warning(&self, msg: impl fmt::Display) {
        self.emit(Level::Warn, format_args!("{msg}"));
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.emit(Level::Error, format_args!("{msg}"));
    }

    pub fn flush(&self) {
        self.0.terminal.flush();
        if let Some((_, writer)) = self.0.log_file.lock().as_mut() {
            let _ = writer.flush();
        }
    }
}

/// Restores the previous log domain on drop
pub struct DomainGuard {
    messenger: MessengerHandle,
    previous: String,
}

impl Drop for DomainGuard {
    fn drop(&mut self) {
        self.messenger.set_domain(&self.previous);
    }
}

/// `log` backend dispatching to a [`MessengerHandle`]
pub struct Messenger(pub MessengerHandle);

impl Log for Messenger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.0.terminal_level().allows(metadata.level()) || self.0.file_level().allows(metadata.level())
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.0.emit(record.level(), *record.args());
        }
    }

    fn flush(&self) {
        self.0.flush();
    }
}
