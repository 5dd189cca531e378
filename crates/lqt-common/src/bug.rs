use std::{
    fmt,
    panic::{Location, UnwindSafe},
};

use lqt_config as config;

/// Payload of a panic raised through [`bug!`]. Lets [`catch_bugs`] tell invariant violations
/// apart from arbitrary panics.
#[derive(Debug)]
pub struct ExplicitBug(pub String);

impl fmt::Display for ExplicitBug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[macro_export]
macro_rules! bug {
    () => ( $crate::bug!("impossible case reached") );
    ($msg:expr) => ({ $crate::bug::bug_fmt(::std::format_args!($msg)) });
    ($msg:expr,) => ({ $crate::bug!($msg) });
    ($fmt:expr, $($arg:tt)+) => ({
        $crate::bug::bug_fmt(::std::format_args!($fmt, $($arg)+))
    });
}

#[track_caller]
pub fn bug_fmt(args: fmt::Arguments<'_>) -> ! {
    let location = Location::caller();
    let msg = format!("{location}: {args}");
    tracing::error!(bug = msg.as_str());
    std::panic::panic_any(ExplicitBug(msg))
}

/// Runs `f`, converting a [`bug!`] raised inside it into an `Err` carrying the bug message.
/// Panics that did not originate from [`bug!`] are resumed.
pub fn catch_bugs<R>(msg: &str, f: impl FnOnce() -> R + UnwindSafe) -> Result<R, String> {
    if config::catch_bugs() { catch_bugs_always(msg, f) } else { Ok(f()) }
}

pub fn catch_bugs_always<R>(msg: &str, f: impl FnOnce() -> R + UnwindSafe) -> Result<R, String> {
    match std::panic::catch_unwind(f) {
        Ok(v) => Ok(v),
        Err(payload) => {
            match payload.downcast::<ExplicitBug>() {
                Ok(bug) => {
                    eprintln!("note: bug caught [{msg}]\n");
                    Err(bug.0)
                }
                Err(payload) => {
                    eprintln!("note: uncaught panic [{msg}]\n");
                    std::panic::resume_unwind(payload)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_is_caught_with_location() {
        let err = catch_bugs_always("test", || -> u32 { crate::bug!("broken {}", 42) }).unwrap_err();
        assert!(err.contains("broken 42"));
        assert!(err.contains("bug.rs"));
    }

    #[test]
    fn ok_values_pass_through() {
        assert_eq!(catch_bugs_always("test", || 7), Ok(7));
    }

    #[test]
    #[should_panic(expected = "plain panic")]
    fn foreign_panics_are_resumed() {
        let _ = catch_bugs_always("test", || -> u8 { panic!("plain panic") });
    }
}
