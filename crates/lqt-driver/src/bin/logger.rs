use std::{fs, io, sync::Arc};

use lqt_config as config;
use tracing::{Dispatch, Level};
use tracing_subscriber::{Registry, filter::Targets, fmt::writer::BoxMakeWriter, prelude::*};

const TRACE_FILE: &str = "trace";

const TARGETS: [&str; 5] = ["lqt_driver", "lqt_graph", "lqt_infer", "liquid_fixpoint", "lqt_common"];

fn targets(level: Level) -> Targets {
    TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| targets.with_target(*target, level))
}

pub fn install() -> io::Result<()> {
    let level = if config::verbose() { Level::DEBUG } else { Level::WARN };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(targets(level));

    let json_layer = if config::dump_trace() {
        let log_dir = config::log_dir();
        fs::create_dir_all(log_dir)?;
        let file = fs::File::create(log_dir.join(TRACE_FILE))?;
        let writer = BoxMakeWriter::new(Arc::new(file));
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .json()
            .with_filter(targets(Level::DEBUG));
        Some(layer)
    } else {
        None
    };

    let dispatch = Dispatch::new(Registry::default().with(stderr_layer).with(json_layer));
    dispatch.init();
    Ok(())
}
