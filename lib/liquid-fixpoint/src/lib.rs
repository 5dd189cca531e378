//! This crate implements an interface to the [liquid-fixpoint] binary: the Horn-clause query IR
//! and its serialization, the solver round trip, an SMT-LIB2 adapter for closed obligations, and
//! tools to shrink failing queries.
//!
//! [liquid-fixpoint]: https://github.com/ucsd-progsys/liquid-fixpoint
mod constraint;
pub mod delta;
mod format;
pub mod minimize;
mod process;
mod sexp;
pub mod smt;
mod solution;

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    process::Command,
    sync::{LazyLock, Mutex, PoisonError},
};

pub use constraint::{
    Bind, BindId, ConstantDecl, Constraint, ConstraintId, Environment, Predicate, Qualifier, Query,
    Type, WfConstraint, WfId,
};
use lqt_common::dbg::solve_span;
use lqt_config::SolverOpts;
use lqt_term::ParseError;
use process::{ProcessOutcome, run_with_timeout};
use rustc_hash::FxHashMap;
pub use solution::{Solution, parse_solutions};
use tracing::{debug, error, warn};

/// Text the solver prints when it crashes instead of answering.
pub const CRASH_PATTERN: &str = "Crash!";

/// Extension appended to a query file to find its solution.
pub const SOLUTION_SUFFIX: &str = ".fqout";

#[derive(Debug)]
pub enum SolverError {
    Io(io::Error),
    /// The solution file did not follow the solution grammar.
    Parse(ParseError),
    /// The solver answered with something we cannot interpret.
    Protocol(String),
    /// A term has no rendering in the solver's language.
    Unsupported(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Io(err) => write!(f, "i/o error: {err}"),
            SolverError::Parse(err) => write!(f, "malformed solution: {err}"),
            SolverError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            SolverError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for SolverError {}

impl From<io::Error> for SolverError {
    fn from(err: io::Error) -> Self {
        SolverError::Io(err)
    }
}

impl From<ParseError> for SolverError {
    fn from(err: ParseError) -> Self {
        SolverError::Parse(err)
    }
}

#[derive(Debug)]
pub enum SolveOutcome {
    Solved(Vec<Solution>),
    /// The solver ran but left no solution file.
    NoSolution,
    /// The solver output matched [`CRASH_PATTERN`].
    Crashed(String),
    TimedOut,
}

impl SolveOutcome {
    pub fn into_solutions(self) -> Vec<Solution> {
        match self {
            SolveOutcome::Solved(solutions) => solutions,
            SolveOutcome::NoSolution | SolveOutcome::Crashed(_) | SolveOutcome::TimedOut => vec![],
        }
    }
}

pub struct Solver {
    opts: SolverOpts,
}

impl Solver {
    pub fn new(opts: SolverOpts) -> Self {
        Solver { opts }
    }

    pub fn opts(&self) -> &SolverOpts {
        &self.opts
    }

    /// Solves `query`, mapping every failure to an empty solution list.
    pub fn solve(&self, query: &Query) -> Vec<Solution> {
        match self.run(query) {
            Ok(outcome) => outcome.into_solutions(),
            Err(err) => {
                error!(%err, "fixpoint invocation failed");
                vec![]
            }
        }
    }

    /// Writes `query` to the next numbered file in the working directory, runs the solver on it
    /// and reads back the solution file.
    pub fn run(&self, query: &Query) -> Result<SolveOutcome, SolverError> {
        let id = next_query_id(&self.opts.work_dir, self.opts.clear_work_dir)?;
        let _span = solve_span!(id).entered();

        let path = self.opts.work_dir.join(format!("{id}.fq"));
        remove_if_exists(&solution_path(&path))?;
        fs::write(&path, query.to_string())?;
        debug!(path = %path.display(), "serialized");

        let mut cmd = Command::new(&self.opts.fixpoint);
        cmd.args(&self.opts.fixpoint_flags).arg(&path);
        debug!("invoked");
        let output = match run_with_timeout(cmd, None, self.opts.timeout)? {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut => {
                warn!(timeout = ?self.opts.timeout, "timed out");
                return Ok(SolveOutcome::TimedOut);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stdout.contains(CRASH_PATTERN) || stderr.contains(CRASH_PATTERN) {
            warn!(%stderr, "solver crashed");
            let report = if stderr.trim().is_empty() { stdout } else { stderr };
            return Ok(SolveOutcome::Crashed(report.into_owned()));
        }

        match fs::read_to_string(solution_path(&path)) {
            Ok(text) => {
                let solutions = parse_solutions(&text)?;
                debug!(solutions = solutions.len(), "succeeded");
                Ok(SolveOutcome::Solved(solutions))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(status = %output.status, "no solution file");
                Ok(SolveOutcome::NoSolution)
            }
            Err(err) => Err(err.into()),
        }
    }
}

pub fn solution_path(query_path: &Path) -> PathBuf {
    let mut name = query_path.as_os_str().to_owned();
    name.push(SOLUTION_SUFFIX);
    PathBuf::from(name)
}

/// Next free query id per working directory. A directory is scanned, and optionally cleared, the
/// first time it is used in this process. Clearing assumes no other run shares the directory.
static QUERY_IDS: LazyLock<Mutex<FxHashMap<PathBuf, usize>>> = LazyLock::new(Default::default);

fn next_query_id(work_dir: &Path, clear: bool) -> io::Result<usize> {
    fs::create_dir_all(work_dir)?;
    let key = fs::canonicalize(work_dir)?;
    let mut ids = QUERY_IDS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(next) = ids.get_mut(&key) {
        let id = *next;
        *next += 1;
        return Ok(id);
    }
    if clear {
        clear_work_dir(work_dir)?;
    }
    let id = max_query_id(work_dir)?.map_or(0, |max| max + 1);
    ids.insert(key, id + 1);
    Ok(id)
}

/// Numeric stem of a file written by a previous run: `12.fq`, `12.fq.fqout`, `12.min.fq`.
fn query_id_of(file_name: &str) -> Option<usize> {
    let (stem, rest) = file_name.split_once('.')?;
    if !rest.contains("fq") {
        return None;
    }
    stem.parse().ok()
}

fn max_query_id(work_dir: &Path) -> io::Result<Option<usize>> {
    let mut max = None;
    for entry in fs::read_dir(work_dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
        if let Some(id) = query_id_of(&name) {
            max = max.max(Some(id));
        }
    }
    Ok(max)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn clear_work_dir(work_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(work_dir)? {
        let entry = entry?;
        let stale = entry.file_name().to_str().and_then(query_id_of).is_some();
        if stale && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ids_continue_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("4.fq"), "").unwrap();
        fs::write(dir.path().join("9.fq.fqout"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(next_query_id(dir.path(), false).unwrap(), 10);
        assert_eq!(next_query_id(dir.path(), false).unwrap(), 11);
    }

    #[test]
    fn clearing_removes_stale_queries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("4.fq"), "").unwrap();
        fs::write(dir.path().join("4.fq.fqout"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(next_query_id(dir.path(), true).unwrap(), 0);
        assert!(!dir.path().join("4.fq").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn solution_file_is_next_to_query() {
        assert_eq!(solution_path(Path::new("w/3.fq")), PathBuf::from("w/3.fq.fqout"));
    }
}
