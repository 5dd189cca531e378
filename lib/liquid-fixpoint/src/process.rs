use std::{
    io::{self, Read, Write},
    process::{Child, Command, Output, Stdio},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) enum ProcessOutcome {
    Exited(Output),
    TimedOut,
}

/// Spawns `cmd`, feeds it `stdin` and waits at most `timeout` for it to exit and for its output
/// to be collected. Output pipes are drained on helper threads so a chatty child cannot block on
/// a full pipe.
pub(crate) fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> io::Result<ProcessOutcome> {
    let deadline = Instant::now() + timeout;
    let mut child = cmd
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, rx) = mpsc::channel();
    let mut pending = 0;
    if let Some(pipe) = child.stdout.take() {
        drain(pipe, Stream::Stdout, tx.clone());
        pending += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        drain(pipe, Stream::Stderr, tx.clone());
        pending += 1;
    }
    drop(tx);

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        if let Err(err) = pipe.write_all(input.as_bytes()) {
            kill(&mut child);
            return Err(err);
        }
    }

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            kill(&mut child);
            return Ok(ProcessOutcome::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    };

    // The pipes close only when every process holding them exits, grandchildren included.
    let mut output = Output { status, stdout: vec![], stderr: vec![] };
    for _ in 0..pending {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, buf)) => output.stdout = buf?,
            Ok((Stream::Stderr, buf)) => output.stderr = buf?,
            Err(RecvTimeoutError::Timeout) => return Ok(ProcessOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io::Error::other("output reader thread panicked"));
            }
        }
    }
    Ok(ProcessOutcome::Exited(output))
}

enum Stream {
    Stdout,
    Stderr,
}

/// Reads `pipe` to the end on a detached thread and sends the bytes back tagged with `stream`.
fn drain<R: Read + Send + 'static>(
    mut pipe: R,
    stream: Stream,
    tx: Sender<(Stream, io::Result<Vec<u8>>)>,
) {
    thread::spawn(move || {
        let mut buf = vec![];
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send((stream, result));
    });
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
