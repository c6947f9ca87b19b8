use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::audio_bridge::RecordingSoundBank;
use crate::blocking::BlockingMode;
use crate::character::{Character, Collaborators, EngineEvent, Facing, RunState, TimedEvent};
use crate::collaborators::{KinematicBody, RecordingMarkers};
use crate::maze::{GridPosition, MazeModel, ScreenPoint};
use crate::program::ProgramSet;
use crate::scenario::Scenario;

/// Frame length used when the host does not pick one (roughly 60 fps).
pub const DEFAULT_FRAME_MS: u64 = 16;
pub const DEFAULT_MAX_FRAMES: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scenario: PathBuf,
    pub frame_ms: u64,
    pub max_frames: u64,
    /// Overrides the scenario's own blocking mode.
    pub blocking: Option<BlockingMode>,
    pub event_log_json: Option<PathBuf>,
    pub audio_log_json: Option<PathBuf>,
    pub body_log_json: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Stalled { program: String },
    /// Frame budget ran out with the run still active.
    Unfinished,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub scenario: String,
    pub outcome: Outcome,
    pub frames: u64,
    pub elapsed_ms: u64,
    pub position: GridPosition,
    pub facing: Facing,
    pub steps_started: usize,
    pub moves: usize,
    pub blocked: usize,
    pub turns: usize,
}

/// Headless host: a scenario's character wired to recording collaborators
/// and stepped at a fixed frame rate.
pub struct Simulation {
    label: String,
    character: Character,
    programs: Option<ProgramSet>,
    body: KinematicBody,
    sounds: RecordingSoundBank,
    frame_ms: u64,
    frames: u64,
}

impl Simulation {
    pub fn from_scenario(
        scenario: &Scenario,
        blocking: Option<BlockingMode>,
        frame_ms: u64,
    ) -> Result<Self> {
        ensure!(frame_ms > 0, "frame length must be positive");
        let maze = scenario
            .maze()
            .with_context(|| format!("building maze for {}", scenario.label()))?;
        let programs = scenario
            .programs()
            .with_context(|| format!("loading programs for {}", scenario.label()))?;
        for (caller, callee) in programs.unresolved_calls() {
            warn!("program `{caller}` calls `{callee}`, which is not defined");
        }
        let spawn = maze
            .point_at(scenario.start)
            .unwrap_or(ScreenPoint::new(0.0, 0.0));

        let body = KinematicBody::new(spawn);
        let sounds = RecordingSoundBank::new();
        let stage = Collaborators {
            body: Rc::new(body.clone()),
            markers: Rc::new(RecordingMarkers::new()),
            sounds: Rc::new(sounds.clone()),
        };
        let rule = blocking.unwrap_or(scenario.blocking).rule();
        let character = Character::new(Box::new(maze), scenario.start, scenario.facing, stage)
            .with_blocking_rule(rule);

        Ok(Self {
            label: scenario.label().to_string(),
            character,
            programs: Some(programs),
            body,
            sounds,
            frame_ms,
            frames: 0,
        })
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn body(&self) -> &KinematicBody {
        &self.body
    }

    pub fn sounds(&self) -> &RecordingSoundBank {
        &self.sounds
    }

    /// Hands the scenario's programs to the character. Only the first call
    /// has an effect.
    pub fn start(&mut self) {
        if let Some(programs) = self.programs.take() {
            self.character.execute(programs);
        }
    }

    /// Physics first, then audio playback, then the engine's timers and poll.
    pub fn step_frame(&mut self) {
        self.body.integrate(self.frame_ms);
        self.sounds.advance(self.frame_ms);
        self.character.tick(self.frame_ms);
        self.frames += 1;
    }

    /// Runs frames until the character settles or `max_frames` elapse.
    /// A stalled run is settled: nothing can resume it.
    pub fn run(&mut self, max_frames: u64) -> RunSummary {
        self.start();
        while self.frames < max_frames && self.is_live() {
            self.step_frame();
        }
        self.summary()
    }

    fn is_live(&self) -> bool {
        self.character.is_running() && !matches!(self.character.state(), RunState::Stalled { .. })
    }

    pub fn summary(&self) -> RunSummary {
        let events = self.character.events();
        let count = |is_kind: fn(&EngineEvent) -> bool| {
            events.iter().filter(|timed| is_kind(&timed.event)).count()
        };
        let outcome = match self.character.state() {
            RunState::Completed => Outcome::Completed,
            RunState::Stalled { program } => Outcome::Stalled {
                program: program.clone(),
            },
            _ => Outcome::Unfinished,
        };
        RunSummary {
            scenario: self.label.clone(),
            outcome,
            frames: self.frames,
            elapsed_ms: self.character.now_ms(),
            position: self.character.position(),
            facing: self.character.facing(),
            steps_started: count(|event| matches!(event, EngineEvent::StepStarted { .. })),
            moves: count(|event| matches!(event, EngineEvent::Moved { .. })),
            blocked: count(|event| matches!(event, EngineEvent::Blocked { .. })),
            turns: count(|event| matches!(event, EngineEvent::Turned { .. })),
        }
    }

    pub fn events(&self) -> &[TimedEvent] {
        self.character.events()
    }
}

#[derive(Serialize)]
struct EventLog<'a> {
    summary: &'a RunSummary,
    events: &'a [TimedEvent],
}

pub fn execute(options: RunOptions) -> Result<()> {
    let RunOptions {
        scenario,
        frame_ms,
        max_frames,
        blocking,
        event_log_json,
        audio_log_json,
        body_log_json,
        verbose,
    } = options;

    let loaded = Scenario::from_file(&scenario)
        .with_context(|| format!("loading scenario {}", scenario.display()))?;
    info!(
        "loaded {} ({} programs) from {}",
        loaded.label(),
        loaded.programs.len(),
        scenario.display()
    );

    let mut simulation = Simulation::from_scenario(&loaded, blocking, frame_ms)?;
    let summary = simulation.run(max_frames);

    if verbose {
        for timed in simulation.events() {
            println!("  [{:>6} ms] {}", timed.at_ms, describe_event(&timed.event));
        }
    }

    match &summary.outcome {
        Outcome::Completed => {}
        Outcome::Stalled { program } => {
            warn!("run stalled waiting on undefined program `{program}`")
        }
        Outcome::Unfinished => warn!(
            "run still active after {} frames ({} ms)",
            summary.frames, summary.elapsed_ms
        ),
    }

    println!("Scenario: {}", summary.scenario);
    println!(
        "Outcome: {} after {} frames ({} ms)",
        describe_outcome(&summary.outcome),
        summary.frames,
        summary.elapsed_ms
    );
    println!(
        "Final cell: ({}, {}) facing {:?}",
        summary.position.row, summary.position.col, summary.facing
    );
    println!(
        "Steps -> started: {} | moved: {} | blocked: {} | turned: {}",
        summary.steps_started, summary.moves, summary.blocked, summary.turns
    );

    if let Some(path) = event_log_json.as_ref() {
        let log = EventLog {
            summary: &summary,
            events: simulation.events(),
        };
        write_json(path, &log, "engine event log")?;
    }
    if let Some(path) = audio_log_json.as_ref() {
        write_json(path, &simulation.sounds().events(), "audio event log")?;
    }
    if let Some(path) = body_log_json.as_ref() {
        write_json(path, &simulation.body().events(), "body event log")?;
    }

    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, label: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {label} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {label} to {}", path.display()))?;
    println!("Saved {label} to {}", path.display());
    Ok(())
}

fn describe_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed => "completed".to_string(),
        Outcome::Stalled { program } => format!("stalled on `{program}`"),
        Outcome::Unfinished => "unfinished".to_string(),
    }
}

fn describe_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::RunStarted { program } => format!("run started with {program}"),
        EngineEvent::ProgramStarted { program, steps } => {
            format!("program {program} ({steps} steps)")
        }
        EngineEvent::StepStarted {
            program,
            index,
            action,
        } => format!("{program}[{index}] {action}"),
        EngineEvent::Moved { from, to } => {
            format!("moved ({}, {}) -> ({}, {})", from.row, from.col, to.row, to.col)
        }
        EngineEvent::Blocked { from, target } => format!(
            "blocked at ({}, {}) toward ({}, {})",
            from.row, from.col, target.row, target.col
        ),
        EngineEvent::Turned { from, to } => format!("turned {from:?} -> {to:?}"),
        EngineEvent::BranchEntered { program, depth } => {
            format!("branch into {program} (depth {depth})")
        }
        EngineEvent::BranchReturned { program } => format!("returned from {program}"),
        EngineEvent::MissingProgram { program } => format!("missing program {program}"),
        EngineEvent::RunCompleted { position, facing } => format!(
            "run completed at ({}, {}) facing {facing:?}",
            position.row, position.col
        ),
        EngineEvent::Stopped => "stopped".to_string(),
    }
}
