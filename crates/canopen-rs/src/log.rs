use alloc::format;
use alloc::string::String;

/// Trait for structs that provide metadata for logging
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Identifies the component and the remote node a log line is about.
#[derive(Debug, Clone, Copy)]
pub struct LogContext {
    pub component: &'static str,
    pub node: u8,
}

impl LogContext {
    pub const fn new(component: &'static str, node: u8) -> Self {
        Self { component, node }
    }
}

impl LogMetadata for LogContext {
    fn meta(&self) -> String {
        format!("{} node={}", self.component, self.node)
    }
}

// =============================================
// Logging Macros (namespaced under crate::log)
// =============================================

/// Prefixes a log line with the context metadata, e.g. `[SDO-Q node=5] ...`.
macro_rules! log_with_context {
    ($level:ident, $ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::$level!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
}

macro_rules! my_info {
    ($($t:tt)+) => { $crate::log::log_with_context!(info, $($t)+) };
}

macro_rules! my_warn {
    ($($t:tt)+) => { $crate::log::log_with_context!(warn, $($t)+) };
}

macro_rules! my_error {
    ($($t:tt)+) => { $crate::log::log_with_context!(error, $($t)+) };
}

macro_rules! my_debug {
    ($($t:tt)+) => { $crate::log::log_with_context!(debug, $($t)+) };
}

macro_rules! my_trace {
    ($($t:tt)+) => { $crate::log::log_with_context!(trace, $($t)+) };
}

// Re-export macros for use in other files
pub(crate) use log_with_context;
pub(crate) use my_debug;
pub(crate) use my_error;
pub(crate) use my_info;
pub(crate) use my_trace;
pub(crate) use my_warn;
