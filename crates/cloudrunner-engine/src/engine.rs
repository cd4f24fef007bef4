//! The command engine.
//!
//! [`Engine`] owns every piece of mutable simulation state: the scheduler
//! (virtual time plus pending tasks), the resource ledger, the cast gate, the
//! job table, and the game state. Callers mutate it only through
//! [`Engine::invoke`], [`Engine::kill`], [`Engine::connect`],
//! [`Engine::execute_line`], and [`Engine::tick`]; everything else is a read.
//!
//! # Invocation order
//!
//! 1. Unknown command id → [`EngineError::UnknownCommand`].
//! 2. Arguments that do not parse → [`EngineError::InvalidArgument`].
//! 3. Foreground cast while the gate is closed → [`EngineError::GateBlocked`].
//! 4. Cost that does not fit the ledger → [`EngineError::InsufficientResources`].
//! 5. Accepted: the gate closes (foreground only), a task is scheduled, and an
//!    acknowledgment is written.
//!
//! Rejections leave all state untouched and are written to the sink as well as
//! returned.
//!
//! ```
//! use std::time::Duration;
//! use cloudrunner_engine::prelude::*;
//!
//! let mut engine = Engine::new(CommandRegistry::heist(), &EngineConfig::default(), RecordingSink::new());
//! engine.execute_line("breach");
//! engine.tick(Duration::ZERO);
//! assert!(engine.game().enemy.is_some());
//!
//! // The gate is closed for 600 ms after `breach`.
//! let rejected = engine.invoke("scan", &[], "scan", false);
//! assert!(matches!(rejected, Err(EngineError::GateBlocked { .. })));
//! ```

use std::time::Duration;

use cloudrunner_sched::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::effect::{Effect, EffectContext, EffectError};
use crate::game::GameState;
use crate::gate::CastGate;
use crate::jobs::{Job, JobTable, JobView};
use crate::ledger::{Gauge, Ledger, Resource};
use crate::map::{RouteChoice, RoutePolicy};
use crate::output::OutputSink;
use crate::registry::CommandRegistry;
use crate::shell::{parse_line, CommandLine};
use crate::EngineError;

// ---------------------------------------------------------------------------
// PendingTask
// ---------------------------------------------------------------------------

/// What a scheduled task does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingTask {
    /// Resolve a foreground cast.
    Cast {
        /// Command id.
        command: String,
        /// Parsed effect.
        effect: Effect,
    },
    /// Resolve a background job, unless it was killed.
    JobCompletion {
        /// Job to complete.
        job_id: u64,
        /// Command id.
        command: String,
        /// Parsed effect.
        effect: Effect,
    },
}

/// Queue key of a background job's completion task.
pub fn job_key(job_id: u64) -> String {
    format!("job:{job_id}")
}

/// Queue key of a foreground cast's resolution task.
pub fn cast_key(command: &str, started_at: Duration) -> String {
    format!("cast:{command}:{}", started_at.as_millis())
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// An accepted invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// The cast closed the gate and resolves at `resolves_at`.
    Foreground {
        /// Scheduled task.
        task_id: TaskId,
        /// Virtual time the effect fires.
        resolves_at: Duration,
        /// Virtual time the gate reopens.
        gcd_until: Duration,
    },
    /// The cast runs as a tracked job.
    Background {
        /// Assigned job id.
        job_id: u64,
        /// Scheduled completion task.
        task_id: TaskId,
        /// Virtual time the job completes.
        ends_at: Duration,
    },
}

/// Result of one command from [`Engine::execute_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executed {
    /// A built-in (`help`, `credits`, `jobs`, `kill`, `connect`, `route`,
    /// `map`) ran.
    Builtin,
    /// A cast was accepted.
    Cast(CastOutcome),
}

/// Read-only state for a HUD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudView {
    /// Current virtual time.
    pub time: Duration,
    /// Time until the gate reopens.
    pub gcd_remaining: Duration,
    /// Every gauge in ledger order.
    pub gauges: Vec<(Resource, Gauge)>,
    /// Live background jobs.
    pub jobs: Vec<JobView>,
    /// Id of the node under attack.
    pub target_id: String,
    /// Name of the node under attack.
    pub target: String,
    /// Whether the target's weak window is open now.
    pub weak_window_open: bool,
    /// Time until the weak window next opens.
    pub weak_window_in: Duration,
    /// Player credits.
    pub credits: u64,
    /// Player hit points.
    pub hp: u32,
    /// Player shield.
    pub shield: u32,
    /// Player trace level.
    pub trace: u32,
    /// Enemy hit points, when engaged.
    pub enemy_hp: Option<i64>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The simulation core.
pub struct Engine<S: OutputSink> {
    pub(crate) registry: CommandRegistry,
    pub(crate) scheduler: Scheduler<PendingTask>,
    pub(crate) ledger: Ledger,
    pub(crate) gate: CastGate,
    pub(crate) jobs: JobTable,
    pub(crate) game: GameState,
    pub(crate) background_multiplier: u32,
    pub(crate) sink: S,
}

impl<S: OutputSink> Engine<S> {
    /// Build an engine at time zero.
    ///
    /// # Panics
    ///
    /// Panics if `config.fire_cap` is zero. [`EngineConfig::validate`]
    /// rejects that value.
    pub fn new(registry: CommandRegistry, config: &EngineConfig, sink: S) -> Self {
        Self {
            registry,
            scheduler: Scheduler::with_fire_cap(config.fire_cap),
            ledger: config.resources.to_ledger(),
            gate: CastGate::new(),
            jobs: JobTable::new(),
            game: GameState::new(config.seed, config.map.clone()),
            background_multiplier: config.background_multiplier.max(1),
            sink,
        }
    }

    // -- invocation -----------------------------------------------------------

    /// Invoke a registered command.
    ///
    /// `raw_line` is kept as the job's source line for background casts.
    pub fn invoke(
        &mut self,
        command_id: &str,
        args: &[String],
        raw_line: &str,
        background: bool,
    ) -> Result<CastOutcome, EngineError> {
        let result = self.try_invoke(command_id, args, raw_line, background);
        self.report(result)
    }

    fn try_invoke(
        &mut self,
        command_id: &str,
        args: &[String],
        raw_line: &str,
        background: bool,
    ) -> Result<CastOutcome, EngineError> {
        let spec = self
            .registry
            .get(command_id)
            .ok_or_else(|| EngineError::UnknownCommand(command_id.to_owned()))?;
        let effect = spec
            .effect
            .parse(args)
            .map_err(|reason| EngineError::InvalidArgument {
                command: spec.id.clone(),
                reason,
            })?;

        let now = self.scheduler.time();
        if !background {
            self.gate
                .check(now)
                .map_err(|remaining| EngineError::GateBlocked { remaining })?;
        }
        self.ledger.try_consume(&spec.cost)?;

        if background {
            let duration = spec.cast.saturating_mul(self.background_multiplier);
            let ends_at = now.saturating_add(duration);
            let job_id = self.jobs.allocate_id();
            self.jobs.insert(Job {
                job_id,
                source_line: raw_line.to_owned(),
                command: spec.id.clone(),
                started_at: now,
                ends_at,
                canceled: false,
            });
            let task_id = self.scheduler.schedule(
                duration,
                job_key(job_id),
                PendingTask::JobCompletion {
                    job_id,
                    command: spec.id.clone(),
                    effect,
                },
            );
            debug!(job_id, command = %spec.id, ends_at_ms = ends_at.as_millis() as u64, "background job started");
            self.sink.write(&format!(
                "[job %{job_id}] started: {} {:.2}s",
                spec.id,
                duration.as_secs_f64()
            ));
            Ok(CastOutcome::Background {
                job_id,
                task_id,
                ends_at,
            })
        } else {
            self.gate.start(now, spec.gcd);
            let task_id = self.scheduler.schedule(
                spec.cast,
                cast_key(&spec.id, now),
                PendingTask::Cast {
                    command: spec.id.clone(),
                    effect,
                },
            );
            debug!(command = %spec.id, gcd_until_ms = self.gate.gcd_until().as_millis() as u64, "foreground cast started");
            self.sink.write(&format!(
                "cast {} {:.2}s",
                spec.id,
                spec.cast.as_secs_f64()
            ));
            Ok(CastOutcome::Foreground {
                task_id,
                resolves_at: now.saturating_add(spec.cast),
                gcd_until: self.gate.gcd_until(),
            })
        }
    }

    /// Kill a background job. Its effect will not run.
    pub fn kill(&mut self, job_id: u64) -> Result<(), EngineError> {
        let result = match self.jobs.cancel(job_id) {
            Some(_) => {
                self.scheduler.cancel(&job_key(job_id));
                debug!(job_id, "background job killed");
                self.sink.write(&format!("job killed: %{job_id}"));
                Ok(())
            }
            None => Err(EngineError::UnknownJob(job_id)),
        };
        self.report(result)
    }

    /// Move the attack to a neighbor of the current node.
    ///
    /// Pending casts and jobs are not touched; their effects resolve against
    /// whichever node is current when they fire.
    pub fn connect(&mut self, node_id: &str) -> Result<(), EngineError> {
        let result = match self.game.map.connect(node_id) {
            Ok(node) => {
                debug!(node = %node.id, "connected");
                let message = format!("connected -> {}", node.name);
                self.sink.write(&message);
                Ok(())
            }
            Err(e) => Err(EngineError::from(e)),
        };
        self.report(result)
    }

    /// Best neighbor to move to next under `policy`.
    pub fn route(&self, policy: RoutePolicy) -> Option<RouteChoice> {
        self.game.map.recommend(self.time(), policy)
    }

    /// Live jobs at the current time, ordered by id.
    pub fn list_jobs(&self) -> Vec<JobView> {
        self.jobs.views(self.scheduler.time())
    }

    fn report<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            debug!(error = %e, "invocation rejected");
            self.sink.write(&e.to_string());
        }
        result
    }

    // -- terminal -------------------------------------------------------------

    /// Parse and run one terminal line. Returns one result per command.
    pub fn execute_line(&mut self, line: &str) -> Vec<Result<Executed, EngineError>> {
        parse_line(line)
            .into_iter()
            .map(|cmd| self.execute_command(&cmd))
            .collect()
    }

    fn execute_command(&mut self, cmd: &CommandLine) -> Result<Executed, EngineError> {
        match cmd.name.as_str() {
            "help" => {
                let ids: Vec<&str> = self.registry.ids().collect();
                let message = format!(
                    "commands: {}, jobs, kill %<id>, connect <node>, route [--policy profit|fast], map, credits, help",
                    ids.join(", ")
                );
                self.sink.write(&message);
                Ok(Executed::Builtin)
            }
            "credits" => {
                let message = format!("Credits: {}", self.game.player.credits);
                self.sink.write(&message);
                Ok(Executed::Builtin)
            }
            "jobs" => {
                let views = self.list_jobs();
                if views.is_empty() {
                    self.sink.write("(no jobs)");
                }
                for view in views {
                    self.sink.write(&format!(
                        "%{}\t{}\t{:.0}%",
                        view.job_id, view.source_line, view.progress_percent
                    ));
                }
                Ok(Executed::Builtin)
            }
            "kill" => {
                let id = cmd
                    .args
                    .first()
                    .and_then(|token| token.strip_prefix('%'))
                    .and_then(|digits| digits.parse::<u64>().ok());
                match id {
                    Some(id) => self.kill(id).map(|()| Executed::Builtin),
                    None => {
                        self.sink.write("usage: kill %<id>");
                        Ok(Executed::Builtin)
                    }
                }
            }
            "connect" => match cmd.args.first() {
                Some(node_id) => self.connect(node_id).map(|()| Executed::Builtin),
                None => {
                    self.sink.write("usage: connect <node>");
                    Ok(Executed::Builtin)
                }
            },
            "route" => {
                let raw = match cmd.args.first().map(String::as_str) {
                    Some("--policy") => cmd.args.get(1).map_or("profit", String::as_str),
                    _ => "profit",
                };
                let Some(policy) = RoutePolicy::parse(raw) else {
                    return self.report(Err(EngineError::InvalidArgument {
                        command: "route".to_owned(),
                        reason: format!("unknown policy '{raw}' (expected profit or fast)"),
                    }));
                };
                let message = match self.route(policy) {
                    Some(choice) => format!(
                        "route[{policy}] -> {} (wait {:.1}s)",
                        choice.name,
                        choice.wait.as_secs_f64()
                    ),
                    None => format!("route[{policy}]: no neighbors"),
                };
                self.sink.write(&message);
                Ok(Executed::Builtin)
            }
            "map" => {
                let now = self.time();
                let current = self.game.target().id.clone();
                let lines: Vec<String> = self
                    .game
                    .map
                    .nodes()
                    .map(|node| {
                        format!(
                            "{} {} {} ({}, tier {}) -> {}{}",
                            if node.id == current { ">" } else { " " },
                            node.id,
                            node.name,
                            node.kind,
                            node.tier,
                            node.neighbors.join(", "),
                            if node.weak_window.is_open(now) { " *" } else { "" },
                        )
                    })
                    .collect();
                for line in lines {
                    self.sink.write(&line);
                }
                Ok(Executed::Builtin)
            }
            name => self
                .invoke(name, &cmd.args, &cmd.raw, cmd.background)
                .map(Executed::Cast),
        }
    }

    // -- time -----------------------------------------------------------------

    /// Advance virtual time by `dt` and resolve every due task.
    ///
    /// Effect errors are logged, written to the sink, and counted in the
    /// report's `failed`; they never stop later tasks.
    pub fn tick(&mut self, dt: Duration) -> AdvanceReport {
        let Self {
            scheduler,
            ledger,
            jobs,
            game,
            sink,
            ..
        } = self;
        scheduler.advance(dt, |now, task| fire(now, task.payload, ledger, jobs, game, sink))
    }

    // -- accessors ------------------------------------------------------------

    /// Current virtual time.
    pub fn time(&self) -> Duration {
        self.scheduler.time()
    }

    /// The resource ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Regenerate or decay a gauge, clamped. Used by the frame driver.
    pub fn drift(&mut self, resource: Resource, delta: f64) {
        self.ledger.drift(resource, delta);
    }

    /// The cast gate.
    pub fn gate(&self) -> &CastGate {
        &self.gate
    }

    /// The game state.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// The scheduler, for inspecting pending tasks.
    pub fn scheduler(&self) -> &Scheduler<PendingTask> {
        &self.scheduler
    }

    /// The output sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the output sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the engine and hand back its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Gather the HUD view.
    pub fn hud(&self) -> HudView {
        let now = self.time();
        let target = self.game.target();
        let window = target.weak_window;
        HudView {
            time: now,
            gcd_remaining: self.gate.remaining(now),
            gauges: self.ledger.iter().collect(),
            jobs: self.list_jobs(),
            target_id: target.id.clone(),
            target: target.name.clone(),
            weak_window_open: window.is_open(now),
            weak_window_in: window.wait_until_open(now),
            credits: self.game.player.credits,
            hp: self.game.player.hp,
            shield: self.game.player.shield,
            trace: self.game.player.trace,
            enemy_hp: self.game.enemy.as_ref().map(|e| e.hp),
        }
    }
}

/// Resolve one fired task.
fn fire<S: OutputSink>(
    now: Duration,
    pending: PendingTask,
    ledger: &Ledger,
    jobs: &mut JobTable,
    game: &mut GameState,
    sink: &mut S,
) -> Result<(), EffectError> {
    match pending {
        PendingTask::Cast { command, effect } => {
            let result = apply(&effect, now, ledger, game, sink);
            if let Err(e) = &result {
                sink.write(&format!("{command}: {e}"));
            }
            result
        }
        PendingTask::JobCompletion {
            job_id,
            command,
            effect,
        } => {
            if !jobs.is_live(job_id) {
                debug!(job_id, "completion fired for a job that is gone");
                return Ok(());
            }
            let result = apply(&effect, now, ledger, game, sink);
            jobs.complete(job_id);
            match &result {
                Ok(()) => {
                    debug!(job_id, command = %command, "background job done");
                    sink.write(&format!("[job %{job_id}] done: {command}"));
                }
                Err(e) => sink.write(&format!("[job %{job_id}] failed: {command}: {e}")),
            }
            result
        }
    }
}

fn apply<S: OutputSink>(
    effect: &Effect,
    now: Duration,
    ledger: &Ledger,
    game: &mut GameState,
    sink: &mut S,
) -> Result<(), EffectError> {
    let mut ctx = EffectContext {
        now,
        game,
        ledger,
        out: sink,
    };
    effect.apply(&mut ctx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
