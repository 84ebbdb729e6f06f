//! Logging macros that capture the calling module along with file and line
//!
//! ```rust,no_run
//! # async fn demo(logger: quill_core::Logger) {
//! quill_core::info!(logger, "listening on {}", 8080);
//! quill_core::critical!(logger, "out of disk space");
//! # }
//! ```

/// Log at an explicit level; evaluates to `Result<()>`
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at(
            $level,
            $crate::CallSite::caller().with_module(::std::module_path!()),
            ::std::format!($($arg)+),
        )
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        {
            let _ = $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        {
            let _ = $crate::log!($logger, $crate::LogLevel::Info, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        {
            let _ = $crate::log!($logger, $crate::LogLevel::Warn, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        {
            let _ = $crate::log!($logger, $crate::LogLevel::Error, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        {
            let _ = $crate::log!($logger, $crate::LogLevel::Critical, $($arg)+);
        }
    };
}
