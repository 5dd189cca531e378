//! This file contains functions and macros to log debugging information meant for developers.
use std::{
    fmt, fs,
    io::{self, Write},
};

use lqt_config as config;

pub fn writer_for_item(name: &str, ext: impl AsRef<str>) -> io::Result<impl io::Write> {
    fs::create_dir_all(config::log_dir())?;
    let path = config::log_dir().join(dump_base_name(name, ext));
    let file = fs::File::create(path)?;
    let buf = std::io::BufWriter::new(file);
    Ok(buf)
}

/// Writes the [`fmt::Display`] rendering of `val` to `<log_dir>/<name>.<ext>`.
pub fn dump_item_info<T: fmt::Display>(
    name: &str,
    ext: impl AsRef<str>,
    val: &T,
) -> io::Result<()> {
    let mut writer = writer_for_item(name, ext)?;
    write!(writer, "{val}")
}

#[macro_export]
macro_rules! _check_decl_span {
    ($name:expr) => {{ tracing::info_span!("check_decl", decl = $name) }};
}
pub use crate::_check_decl_span as check_decl_span;

#[macro_export]
macro_rules! _solve_span {
    ($query_id:expr) => {{ tracing::debug_span!("solve", query_id = $query_id) }};
}
pub use crate::_solve_span as solve_span;

fn dump_base_name(name: &str, ext: impl AsRef<str>) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("{name}.{}", ext.as_ref())
}
