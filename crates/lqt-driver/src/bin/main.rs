use std::{env, fs, io::Write, path::Path, process::exit};

use anyhow::{Context, bail};
use liquid_fixpoint::minimize;
use lqt_config::flags::is_lqt_arg;
use lqt_driver::{Driver, Outcome};
use lqt_graph::hir::Program;

mod logger;

const USAGE: &str = "usage: lqt [-L<flag>[=<value>]...] (check <program.json> | minimize <query.fq>)";

fn main() -> anyhow::Result<()> {
    logger::install().context("installing the logger")?;

    let args: Vec<String> = env::args().skip(1).filter(|arg| !is_lqt_arg(arg)).collect();
    let exit_code = match args.as_slice() {
        [cmd, path] if cmd == "check" => check(Path::new(path))?,
        [cmd, path] if cmd == "minimize" => {
            let minimized = minimize::minimize(Path::new(path))
                .with_context(|| format!("minimizing `{path}`"))?;
            println!("{}", minimized.display());
            0
        }
        _ => bail!(USAGE),
    };
    exit(exit_code)
}

/// Prints one JSON report per declaration. Returns 1 if any declaration is violated.
fn check(path: &Path) -> anyhow::Result<i32> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading `{}`", path.display()))?;
    let program: Program = serde_json::from_str(&text)
        .with_context(|| format!("parsing program `{}`", path.display()))?;

    let reports = Driver::from_flags().check_program(&program);
    let mut stdout = std::io::stdout().lock();
    let mut violated = false;
    for report in &reports {
        violated |= matches!(report.outcome, Outcome::Violated(_));
        serde_json::to_writer(&mut stdout, report)?;
        writeln!(stdout)?;
    }
    Ok(if violated { 1 } else { 0 })
}
