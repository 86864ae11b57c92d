//! Logging macros for the Lattice graph runtime.
//!
//! Thin wrappers over `tracing` events that tag every record with the
//! emitting module, so a subscriber configured per binary can filter on it.

#[macro_export]
macro_rules! log_error {
    ($module:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::ERROR, module = $module, $($arg)*);
    }
}

#[macro_export]
macro_rules! log_warn {
    ($module:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::WARN, module = $module, $($arg)*);
    }
}

#[macro_export]
macro_rules! log_info {
    ($module:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::INFO, module = $module, $($arg)*);
    }
}

#[macro_export]
macro_rules! log_debug {
    ($module:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::DEBUG, module = $module, $($arg)*);
    }
}

#[macro_export]
macro_rules! log_trace {
    ($module:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::TRACE, module = $module, $($arg)*);
    }
}
