use std::{env, path::PathBuf, process, sync::LazyLock};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::{CONFIG_FILE, PartialFlags};

const LQT_FLAG_PREFIX: &str = "-L";

/// Exit status code used for invalid flags.
pub const EXIT_FAILURE: i32 = 2;

pub struct Flags {
    /// Sets the directory to dump data. Defaults to `./log/`.
    pub log_dir: PathBuf,
    /// Directory holding numbered query files and solver output. Defaults to `./.lqt/`.
    pub work_dir: PathBuf,
    /// Horn-clause solver executable (default `fixpoint`).
    pub fixpoint: PathBuf,
    /// SMT solver executable used for safety obligations (default `z3`).
    pub smt_solver: PathBuf,
    /// Timeout in milliseconds for a single solver process.
    pub timeout_ms: u64,
    /// Dump the query generated for each declaration to [`Self::log_dir`] (debugging)
    pub dump_query: bool,
    /// Saves a json trace of the analysis to [`Self::log_dir`] (debugging)
    pub dump_trace: bool,
    pub verbose: bool,
    /// Turn invariant violations inside a declaration into a skipped result instead of aborting
    /// the whole run.
    pub catch_bugs: bool,
    /// Delete stale query files the first time the working directory is used. Only safe when a
    /// single run owns the directory.
    pub clear_work_dir: bool,
    /// Iteration cap for the delta debugger.
    pub delta_iterations: usize,
    /// Seed for the delta debugger's random choices.
    pub seed: u64,
    /// If present, only check declarations whose name matches one of the glob patterns. This flag
    /// can be specified multiple times.
    pub include: Option<GlobSet>,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./log/"),
            work_dir: PathBuf::from("./.lqt/"),
            fixpoint: PathBuf::from("fixpoint"),
            smt_solver: PathBuf::from("z3"),
            timeout_ms: 30_000,
            dump_query: false,
            dump_trace: false,
            verbose: false,
            catch_bugs: true,
            clear_work_dir: false,
            delta_iterations: 100,
            seed: 0,
            include: None,
        }
    }
}

impl Flags {
    fn apply(&mut self, partial: &PartialFlags, include: &mut Option<GlobSetBuilder>) {
        if let Some(v) = &partial.log_dir {
            self.log_dir = v.clone();
        }
        if let Some(v) = &partial.work_dir {
            self.work_dir = v.clone();
        }
        if let Some(v) = &partial.fixpoint {
            self.fixpoint = v.clone();
        }
        if let Some(v) = &partial.smt_solver {
            self.smt_solver = v.clone();
        }
        self.timeout_ms = partial.timeout_ms.unwrap_or(self.timeout_ms);
        self.dump_query = partial.dump_query.unwrap_or(self.dump_query);
        self.dump_trace = partial.dump_trace.unwrap_or(self.dump_trace);
        self.verbose = partial.verbose.unwrap_or(self.verbose);
        self.catch_bugs = partial.catch_bugs.unwrap_or(self.catch_bugs);
        self.clear_work_dir = partial.clear_work_dir.unwrap_or(self.clear_work_dir);
        self.delta_iterations = partial.delta_iterations.unwrap_or(self.delta_iterations);
        self.seed = partial.seed.unwrap_or(self.seed);
        for pattern in partial.include.iter().flatten() {
            if let Err(reason) = parse_include(include, Some(pattern)) {
                eprintln!("error: incorrect value for lqt option `include` - `{reason}`");
                process::exit(EXIT_FAILURE);
            }
        }
    }
}

pub(crate) static FLAGS: LazyLock<Flags> = LazyLock::new(|| {
    let mut flags = Flags::default();
    let mut include: Option<GlobSetBuilder> = None;
    flags.apply(&CONFIG_FILE, &mut include);
    for arg in env::args() {
        let Some((key, value)) = parse_lqt_arg(&arg) else { continue };

        let result = match key {
            "log-dir" => parse_path_buf(&mut flags.log_dir, value),
            "work-dir" => parse_path_buf(&mut flags.work_dir, value),
            "fixpoint" => parse_path_buf(&mut flags.fixpoint, value),
            "smt-solver" => parse_path_buf(&mut flags.smt_solver, value),
            "timeout-ms" => parse_number(&mut flags.timeout_ms, value),
            "dump-query" => parse_bool(&mut flags.dump_query, value),
            "dump-trace" => parse_bool(&mut flags.dump_trace, value),
            "verbose" => parse_bool(&mut flags.verbose, value),
            "catch-bugs" => parse_bool(&mut flags.catch_bugs, value),
            "clear-work-dir" => parse_bool(&mut flags.clear_work_dir, value),
            "delta-iterations" => parse_number(&mut flags.delta_iterations, value),
            "seed" => parse_number(&mut flags.seed, value),
            "include" => parse_include(&mut include, value),
            _ => {
                eprintln!("error: unknown lqt option: `{key}`");
                process::exit(EXIT_FAILURE);
            }
        };
        if let Err(reason) = result {
            eprintln!("error: incorrect value for lqt option `{key}` - `{reason}`");
            process::exit(1);
        }
    }
    if let Some(include) = include {
        let include = include.build().unwrap_or_else(|err| {
            eprintln!("error: invalid include pattern: {err:?}");
            process::exit(1);
        });
        flags.include = Some(include);
    }
    flags
});

pub fn is_lqt_arg(arg: &str) -> bool {
    parse_lqt_arg(arg).is_some()
}

fn parse_lqt_arg(arg: &str) -> Option<(&str, Option<&str>)> {
    let arg = arg.strip_prefix(LQT_FLAG_PREFIX)?;
    if arg.is_empty() {
        return None;
    }
    if let Some((k, v)) = arg.split_once('=') { Some((k, Some(v))) } else { Some((arg, None)) }
}

fn parse_bool(slot: &mut bool, v: Option<&str>) -> Result<(), &'static str> {
    match v {
        Some("y") | Some("yes") | Some("on") | Some("true") | None => {
            *slot = true;
            Ok(())
        }
        Some("n") | Some("no") | Some("off") | Some("false") => {
            *slot = false;
            Ok(())
        }
        _ => {
            Err(
                "expected no value or one of `y`, `yes`, `on`, `true`, `n`, `no`, `off`, or `false`",
            )
        }
    }
}

fn parse_path_buf(slot: &mut PathBuf, v: Option<&str>) -> Result<(), &'static str> {
    match v {
        Some(s) => {
            *slot = PathBuf::from(s);
            Ok(())
        }
        None => Err("a path"),
    }
}

fn parse_number<N: std::str::FromStr>(slot: &mut N, v: Option<&str>) -> Result<(), &'static str> {
    match v.map(str::parse) {
        Some(Ok(n)) => {
            *slot = n;
            Ok(())
        }
        _ => Err("a non-negative integer"),
    }
}

fn parse_include(slot: &mut Option<GlobSetBuilder>, v: Option<&str>) -> Result<(), &'static str> {
    match v {
        Some(s) => {
            for pattern in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                slot.get_or_insert_with(GlobSetBuilder::new)
                    .add(Glob::new(pattern).map_err(|_| "invalid glob pattern")?);
            }
            Ok(())
        }
        None => Err("a comma separated list of patterns"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_key_and_value() {
        assert_eq!(parse_lqt_arg("-Ltimeout-ms=10"), Some(("timeout-ms", Some("10"))));
        assert_eq!(parse_lqt_arg("-Lverbose"), Some(("verbose", None)));
        assert_eq!(parse_lqt_arg("-L"), None);
        assert_eq!(parse_lqt_arg("check"), None);
    }

    #[test]
    fn include_patterns_match_declaration_names() {
        let mut builder = None;
        parse_include(&mut builder, Some("max*, sum")).unwrap();
        let set = builder.unwrap().build().unwrap();
        assert!(set.is_match("max2"));
        assert!(set.is_match("sum"));
        assert!(!set.is_match("min"));
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut slot = 0u64;
        assert!(parse_number(&mut slot, Some("abc")).is_err());
        assert!(parse_number(&mut slot, Some("42")).is_ok());
        assert_eq!(slot, 42);
    }
}
