//! Debug/crash channel - logging and fatal-error reporting.
//!
//! One [`DebugChannel`] is created per application root and carried down
//! through the scope chain. Log calls forward to `tracing` events and fan
//! out to any installed sinks (tests observe warnings through a sink, no
//! subscriber needed). [`DebugChannel::crash`] routes a [`CrashReport`] to
//! the installed crash collector; the core's obligation is to call it
//! rather than let a setup failure escape silently.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::component::inputs::InputError;
use crate::component::store::StoreError;

// =============================================================================
// Errors
// =============================================================================

/// A fatal error attributed to one component. Usage errors from the inputs
/// and store layers convert into this so setup functions can propagate them
/// with `?`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrashError {
    /// A component's setup function failed.
    #[error("component setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CrashError {
    pub fn setup(message: impl Into<String>) -> Self {
        CrashError::Setup(message.into())
    }
}

/// What the crash collector receives: the error plus the identity of the
/// component it originated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub component: String,
    pub error: CrashError,
}

// =============================================================================
// Channel
// =============================================================================

/// Severity of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

#[derive(Default)]
struct ChannelInner {
    sinks: RefCell<Vec<Rc<dyn Fn(LogLevel, &str)>>>,
    crash_collector: RefCell<Option<Rc<dyn Fn(&CrashReport)>>>,
}

/// Process-wide (per application root) debug and crash reporting channel.
#[derive(Clone, Default)]
pub struct DebugChannel {
    inner: Rc<ChannelInner>,
}

impl DebugChannel {
    pub fn new() -> Self {
        DebugChannel::default()
    }

    /// Attach an additional message sink. Sinks see every log/warn/error.
    pub fn add_sink(&self, sink: impl Fn(LogLevel, &str) + 'static) {
        self.inner.sinks.borrow_mut().push(Rc::new(sink));
    }

    /// Install the crash collector. Replaces any previous collector.
    pub fn install_crash_collector(&self, collector: impl Fn(&CrashReport) + 'static) {
        *self.inner.crash_collector.borrow_mut() = Some(Rc::new(collector));
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "tether_ui", "{message}");
        self.fan_out(LogLevel::Log, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(target: "tether_ui", "{message}");
        self.fan_out(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(target: "tether_ui", "{message}");
        self.fan_out(LogLevel::Error, message);
    }

    /// Deliver a crash report to the collector. Without a collector the
    /// report is logged at error level so it cannot vanish silently.
    pub fn crash(&self, report: &CrashReport) {
        tracing::error!(
            target: "tether_ui",
            component = %report.component,
            "component crashed: {}",
            report.error
        );
        let collector = self.inner.crash_collector.borrow().clone();
        match collector {
            Some(collector) => collector(report),
            None => self.fan_out(
                LogLevel::Error,
                &format!("[{}] {}", report.component, report.error),
            ),
        }
    }

    fn fan_out(&self, level: LogLevel, message: &str) {
        let sinks: Vec<_> = self.inner.sinks.borrow().clone();
        for sink in sinks {
            sink(level, message);
        }
    }
}
