pub use toml::Value;
pub mod flags;

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use flags::FLAGS;
use serde::Deserialize;

pub fn log_dir() -> &'static PathBuf {
    &FLAGS.log_dir
}

pub fn work_dir() -> &'static PathBuf {
    &FLAGS.work_dir
}

pub fn dump_query() -> bool {
    FLAGS.dump_query
}

pub fn dump_trace() -> bool {
    FLAGS.dump_trace
}

pub fn verbose() -> bool {
    FLAGS.verbose
}

pub fn catch_bugs() -> bool {
    FLAGS.catch_bugs
}

pub fn delta_iterations() -> usize {
    FLAGS.delta_iterations
}

pub fn seed() -> u64 {
    FLAGS.seed
}

/// Returns `true` if the declaration named `name` should be analyzed.
pub fn is_included(name: &str) -> bool {
    FLAGS.include.as_ref().is_none_or(|set| set.is_match(name))
}

/// Flags passed to the fixpoint binary on every invocation.
pub const FIXPOINT_FLAGS: [&str; 3] = ["--eliminate=none", "--minimalsol", "--save"];

/// Everything the solver adapters need to run an external process. Built once per run, either
/// from the global [`flags`] or explicitly by the caller.
#[derive(Clone, Debug)]
pub struct SolverOpts {
    /// Path or name of the Horn-clause solver executable.
    pub fixpoint: PathBuf,
    /// Arguments placed before the query file on the solver's command line.
    pub fixpoint_flags: Vec<String>,
    /// Path or name of the SMT solver used to discharge safety obligations.
    pub smt_solver: PathBuf,
    /// Arguments for the SMT solver. The script is piped through stdin.
    pub smt_flags: Vec<String>,
    /// Directory where numbered query files and their solutions are written.
    pub work_dir: PathBuf,
    /// Upper bound for a single solver process.
    pub timeout: Duration,
    /// Remove stale query files the first time the working directory is used.
    pub clear_work_dir: bool,
}

impl SolverOpts {
    pub fn from_flags() -> Self {
        SolverOpts {
            fixpoint: FLAGS.fixpoint.clone(),
            fixpoint_flags: FIXPOINT_FLAGS.iter().map(|s| s.to_string()).collect(),
            smt_solver: FLAGS.smt_solver.clone(),
            smt_flags: vec!["-in".to_string(), "-smt2".to_string()],
            work_dir: FLAGS.work_dir.clone(),
            timeout: Duration::from_millis(FLAGS.timeout_ms),
            clear_work_dir: FLAGS.clear_work_dir,
        }
    }
}

/// Flags that can be set in a configuration file. Command line arguments take precedence.
#[derive(Clone, Default, Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct PartialFlags {
    pub log_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub fixpoint: Option<PathBuf>,
    pub smt_solver: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub dump_query: Option<bool>,
    pub dump_trace: Option<bool>,
    pub verbose: Option<bool>,
    pub catch_bugs: Option<bool>,
    pub clear_work_dir: Option<bool>,
    pub delta_iterations: Option<usize>,
    pub seed: Option<u64>,
    pub include: Option<Vec<String>>,
}

fn config_path() -> Option<PathBuf> {
    // find config file in current or parent directories
    let mut path = std::env::current_dir().ok()?;
    loop {
        for name in ["lqt.toml", ".lqt.toml"] {
            let file = path.join(name);
            if file.exists() {
                return Some(file);
            }
        }
        if !path.pop() {
            return None;
        }
    }
}

pub(crate) fn read_config_file(path: &Path) -> Result<PartialFlags, String> {
    let contents = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let table: toml::Table = toml::from_str(&contents).map_err(|err| err.to_string())?;
    // settings may live at the top level or under an `[lqt]` table
    let value = match table.get("lqt") {
        Some(section) => section.clone(),
        None => Value::Table(table),
    };
    value.try_into().map_err(|err: toml::de::Error| err.to_string())
}

pub static CONFIG_FILE: LazyLock<PartialFlags> = LazyLock::new(|| {
    let Some(path) = config_path() else { return PartialFlags::default() };
    match read_config_file(&path) {
        Ok(flags) => flags,
        Err(err) => {
            eprintln!("warning: ignoring malformed config file `{}`: {err}", path.display());
            PartialFlags::default()
        }
    }
});

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn config_file_accepts_top_level_and_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout-ms = 250\nverbose = true").unwrap();
        let flags = read_config_file(file.path()).unwrap();
        assert_eq!(flags.timeout_ms, Some(250));
        assert_eq!(flags.verbose, Some(true));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[lqt]\nwork-dir = \"q\"\ninclude = [\"max*\"]").unwrap();
        let flags = read_config_file(file.path()).unwrap();
        assert_eq!(flags.work_dir, Some(PathBuf::from("q")));
        assert_eq!(flags.include, Some(vec!["max*".to_string()]));
    }
}
