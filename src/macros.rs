/// Path of the enclosing function, e.g. `my_app::handlers::index`.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::__private::enclosing_function(type_name_of(__f))
    }};
}

/// Logs a formatted message at `level` through an [`ApiLogger`](crate::ApiLogger).
///
/// With traceback enabled the entry carries the file, line and enclosing function of the
/// macro call.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_apilog::{ApiLogger, Level, log};
///
/// let logger = ApiLogger::new();
/// log!(logger, Level::Warn, "disk usage at {}%", 91);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at(
            $level,
            ::std::format_args!($($arg)+),
            $crate::CallSite::new(::std::file!(), ::std::line!(), $crate::function_name!()),
        )
    };
}

/// Logs a formatted message at debug level. See [`log!`](crate::log).
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Debug, $($arg)+)
    };
}

/// Logs a formatted message at info level. See [`log!`](crate::log).
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Info, $($arg)+)
    };
}

/// Logs a formatted message at warn level. See [`log!`](crate::log).
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Warn, $($arg)+)
    };
}

/// Logs a formatted message at error level. See [`log!`](crate::log).
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::Error, $($arg)+)
    };
}
