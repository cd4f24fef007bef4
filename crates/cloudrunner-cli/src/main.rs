//! Headless terminal for the Cloudrunner engine.
//!
//! Reads command lines from stdin. After each line the engine is advanced by
//! `--settle-ms` of virtual time in fixed frames, so casts typed on one line
//! resolve before the next is read. At end of input the remaining queue is
//! drained. Engine output goes to stdout; toasts are prefixed with `!`.

#![deny(unsafe_code)]

use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cloudrunner_engine::prelude::*;
use tracing::{debug, info};

/// Upper bound on frames run while draining at end of input.
const MAX_DRAIN_FRAMES: u64 = 100_000;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Engine config JSON. Defaults apply to anything it leaves out.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the config's RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Frame step in milliseconds. Defaults to the config's max frame dt.
    #[arg(long, value_name = "MS")]
    step_ms: Option<u64>,

    /// Virtual time advanced after each input line.
    #[arg(long, value_name = "MS", default_value_t = 1_000)]
    settle_ms: u64,

    /// Write a replay log of the session to this file.
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Print the HUD state as JSON when the session ends.
    #[arg(long)]
    hud: bool,
}

// ---------------------------------------------------------------------------
// WriterSink
// ---------------------------------------------------------------------------

/// Sink that prints to any writer and keeps the first I/O error.
struct WriterSink<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> WriterSink<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn emit(&mut self, prefix: &str, message: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{prefix}{message}") {
            self.error = Some(e);
        }
    }

    fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> OutputSink for WriterSink<W> {
    fn write(&mut self, message: &str) {
        self.emit("", message);
    }

    fn toast(&mut self, message: &str) {
        self.emit("! ", message);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session<'a, S: OutputSink> {
    engine: &'a mut Engine<S>,
    driver: &'a FrameDriver,
    step: Duration,
    recorder: Option<ReplayRecorder>,
    frame: u64,
}

impl<S: OutputSink> Session<'_, S> {
    fn run_frame(&mut self, input: FrameInput) {
        if let Some(recorder) = &mut self.recorder {
            recorder.record_frame(self.frame, &input, Some(self.engine.state_hash()));
        }
        self.driver.step(self.engine, &input);
        self.frame += 1;
    }

    /// Feed one line, then idle until `settle` has passed.
    fn feed(&mut self, line: String, settle: Duration) {
        let mut input = FrameInput::idle(self.step);
        input.lines.push(line);
        self.run_frame(input);

        let mut elapsed = self.step;
        while elapsed < settle {
            self.run_frame(FrameInput::idle(self.step));
            elapsed += self.step;
        }
    }

    /// Idle until nothing is queued.
    fn drain(&mut self) -> u64 {
        let mut frames = 0;
        while !self.engine.scheduler().is_empty() && frames < MAX_DRAIN_FRAMES {
            self.run_frame(FrameInput::idle(self.step));
            frames += 1;
        }
        frames
    }
}

fn run<R: BufRead, S: OutputSink>(
    input: R,
    engine: &mut Engine<S>,
    driver: &FrameDriver,
    step: Duration,
    settle: Duration,
    recorder: Option<ReplayRecorder>,
) -> Result<Option<ReplayLog>> {
    let mut session = Session {
        engine,
        driver,
        step,
        recorder,
        frame: 0,
    };
    for line in input.lines() {
        let line = line.context("failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        session.feed(line, settle);
    }
    let drained = session.drain();
    debug!(frames = session.frame, drained, "session finished");
    Ok(session.recorder.map(ReplayRecorder::finish))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let step = args.step_ms.map_or(config.max_frame_dt, Duration::from_millis);
    if step.is_zero() {
        anyhow::bail!("--step-ms must be positive");
    }
    info!(seed = config.seed, step_ms = step.as_millis() as u64, "starting session");

    let driver = FrameDriver::from_config(&config);
    let sink = WriterSink::new(BufWriter::new(io::stdout().lock()));
    let mut engine = Engine::new(CommandRegistry::heist(), &config, sink);
    engine.sink_mut().write("Rogue Terminal: Cloudrunner - Heist mode");
    engine.sink_mut().write("type 'help' to list commands.");

    let recorder = args
        .record
        .as_ref()
        .map(|_| ReplayRecorder::new(engine.capture_snapshot(), 60));

    let log = run(
        io::stdin().lock(),
        &mut engine,
        &driver,
        step,
        Duration::from_millis(args.settle_ms),
        recorder,
    )?;

    if args.hud {
        let hud = serde_json::to_string_pretty(&engine.hud()).context("failed to encode HUD")?;
        engine.sink_mut().write(&hud);
    }

    if let (Some(path), Some(log)) = (&args.record, log) {
        let file = File::create(path)
            .with_context(|| format!("failed to create replay log {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &log)
            .map_err(anyhow::Error::from)
            .and_then(|()| writer.flush().map_err(anyhow::Error::from))
            .with_context(|| format!("failed to write replay log {}", path.display()))?;
    }

    engine
        .into_sink()
        .finish()
        .context("failed to write output")?;
    Ok(())
}
