/*
 * macros.rs
 *
 * Call-site conveniences over global.rs. They capture file!() and line!()
 * and format lazily. Without a package argument they log under the
 * built-in package.
 *
 *   sc_global_info!("{} cells", n);          rank 0 only
 *   sc_info!("local residual {r}");          every rank, [sc <rank>] prefix
 *   sc_log!(pkg, Category::Normal, Priority::Debug, "x = {x}");
 *   sc_check_abort!(n > 0, "empty mesh");
 */

/// Abort at the call site with a formatted message.
#[macro_export]
macro_rules! sc_abort {
    ($($arg:tt)+) => {{
        $crate::global::abort_verbose(file!(), line!(), format_args!($($arg)+))
    }};
}

/// Abort because control reached code that must be unreachable.
#[macro_export]
macro_rules! sc_abort_not_reached {
    () => {{
        $crate::sc_abort!("Unreachable code reached")
    }};
}

/// Abort unless `cond` holds. Checked in every build.
#[macro_export]
macro_rules! sc_check_abort {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            $crate::sc_abort!($($arg)+);
        }
    }};
}

/// Abort unless a communicator call returned `MPI_SUCCESS`.
#[macro_export]
macro_rules! sc_check_mpi {
    ($code:expr) => {{
        let code: i32 = $code;
        if code != $crate::comm::MPI_SUCCESS {
            $crate::sc_abort!("{}", $crate::error::ScError::Mpi(code));
        }
    }};
}

/// Abort unless `cond` holds. Debug builds only; release builds do not
/// evaluate `cond`.
#[macro_export]
macro_rules! sc_assert {
    ($cond:expr $(,)?) => {{
        if cfg!(debug_assertions) && !$cond {
            $crate::sc_abort!("Assertion '{}'", stringify!($cond));
        }
    }};
}

/// Log under an explicit package, category and priority.
#[macro_export]
macro_rules! sc_log {
    ($package:expr, $category:expr, $priority:expr, $($arg:tt)+) => {{
        $crate::global::log(
            file!(),
            line!(),
            $package,
            $category,
            $priority,
            format_args!($($arg)+),
        )
    }};
}

/// Global-category record from the built-in package.
#[macro_export]
macro_rules! sc_global_log {
    ($priority:expr, $($arg:tt)+) => {{
        $crate::sc_log!(
            $crate::package::PackageId::SC,
            $crate::priority::Category::Global,
            $priority,
            $($arg)+
        )
    }};
}

/// Normal-category record from the built-in package.
#[macro_export]
macro_rules! sc_normal_log {
    ($priority:expr, $($arg:tt)+) => {{
        $crate::sc_log!(
            $crate::package::PackageId::SC,
            $crate::priority::Category::Normal,
            $priority,
            $($arg)+
        )
    }};
}

#[macro_export]
macro_rules! sc_global_trace {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Trace, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_global_debug {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Debug, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_global_verbose {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Verbose, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_global_info {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Info, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_global_statistics {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Statistics, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_global_production {
    ($($arg:tt)+) => {{ $crate::sc_global_log!($crate::priority::Priority::Production, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_trace {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Trace, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_debug {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Debug, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_verbose {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Verbose, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_info {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Info, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_statistics {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Statistics, $($arg)+) }};
}

#[macro_export]
macro_rules! sc_production {
    ($($arg:tt)+) => {{ $crate::sc_normal_log!($crate::priority::Priority::Production, $($arg)+) }};
}
