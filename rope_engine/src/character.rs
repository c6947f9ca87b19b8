//! Character controller: owns the character's cell, facing and the active
//! run, and drives steps one at a time on the virtual clock.
//!
//! A run starts `PROGRAM_START_DELAY_MS` after [`Character::execute`]. Each
//! step either walks to a neighbouring cell (completing when the body reports
//! arrival through [`Character::update`]), turns in place, bumps into a
//! blocked cell, or branches into another program. Branches suspend the
//! caller on a LIFO stack and resume it once the callee's chain runs out.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::audio_bridge::{Cue, SoundBank};
use crate::blocking::{BlockingRule, ObstaclesOnly};
use crate::collaborators::{CharacterBody, InstructionMarkers, BLOCKED_TINT, HIGHLIGHT_TINT};
use crate::maze::{GridPosition, MazeModel};
use crate::program::{Action, InstructionId, ProgramSet};
use crate::scheduler::{TimerId, TimerScheduler};
use crate::step::{
    resolve, Branch, BranchStack, Resolution, Step, StepArena, StepId, ARRIVAL_TOLERANCE,
    BLOCKED_DELAY_MS, HIGHLIGHT_DELAY_MS, PROGRAM_START_DELAY_MS, TURN_DELAY_MS, WALK_SPEED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    Up,
    Right,
    #[default]
    Down,
}

/// Turn order; a left turn walks it backwards, a right turn forwards.
const FACING_CYCLE: [Facing; 4] = [Facing::Left, Facing::Up, Facing::Right, Facing::Down];

impl Facing {
    /// Directional animation an action plays, if any.
    pub fn for_action(action: &Action) -> Option<Facing> {
        match action {
            Action::MoveLeft => Some(Facing::Left),
            Action::MoveUp => Some(Facing::Up),
            Action::MoveRight => Some(Facing::Right),
            Action::MoveDown => Some(Facing::Down),
            Action::Call(_) | Action::Unknown(_) => None,
        }
    }

    fn cycle_index(self) -> usize {
        match self {
            Facing::Left => 0,
            Facing::Up => 1,
            Facing::Right => 2,
            Facing::Down => 3,
        }
    }

    pub fn turned(self, direction: TurnDirection) -> Facing {
        let len = FACING_CYCLE.len();
        let index = self.cycle_index();
        let next = match direction {
            TurnDirection::Left => (index + len - 1) % len,
            TurnDirection::Right => (index + 1) % len,
        };
        FACING_CYCLE[next]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
}

/// Where the current run is. Only `Translating` polls the body for arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Scheduled { program: String },
    Translating { step: StepId },
    Turning { step: StepId },
    Blocked { step: StepId },
    Branching { program: String },
    /// A call named a program that is not loaded; its branch never resumes.
    Stalled { program: String },
    Completed,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted { program: String },
    ProgramStarted { program: String, steps: usize },
    StepStarted { program: String, index: usize, action: String },
    Moved { from: GridPosition, to: GridPosition },
    Blocked { from: GridPosition, target: GridPosition },
    Turned { from: Facing, to: Facing },
    BranchEntered { program: String, depth: usize },
    BranchReturned { program: String },
    MissingProgram { program: String },
    RunCompleted { position: GridPosition, facing: Facing },
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

#[derive(Debug, Clone)]
enum TimerEvent {
    StartProgram { generation: u64, program: String },
    CompleteStep { generation: u64, step: StepId },
    /// Cosmetic; survives `stop` so a lit instruction is always cleared.
    ClearHighlight { instruction: InstructionId },
}

/// Rendering, marker and audio capabilities injected into the controller.
#[derive(Clone)]
pub struct Collaborators {
    pub body: Rc<dyn CharacterBody>,
    pub markers: Rc<dyn InstructionMarkers>,
    pub sounds: Rc<dyn SoundBank>,
}

type StepObserver = Box<dyn FnMut(usize, &Step)>;

pub struct Character {
    maze: Box<dyn MazeModel>,
    rule: Box<dyn BlockingRule>,
    stage: Collaborators,
    position: GridPosition,
    facing: Facing,
    /// Cells stood on during the current run, for trail-aware blocking rules.
    trail: BTreeSet<GridPosition>,
    programs: ProgramSet,
    steps: StepArena,
    branches: BranchStack,
    current: Option<StepId>,
    state: RunState,
    timers: TimerScheduler<TimerEvent>,
    /// Tokens of the pending start/completion timers; `stop` cancels them.
    run_timers: Vec<TimerId>,
    /// Bumped whenever a run is cancelled; timers from older runs are ignored.
    generation: u64,
    observer: Option<StepObserver>,
    events: Vec<TimedEvent>,
}

impl Character {
    pub fn new(
        maze: Box<dyn MazeModel>,
        start: GridPosition,
        facing: Facing,
        stage: Collaborators,
    ) -> Self {
        if let Some(point) = maze.point_at(start) {
            stage.body.reset_to(point);
        }
        stage.body.play_animation(facing);
        Self {
            maze,
            rule: Box::new(ObstaclesOnly),
            stage,
            position: start,
            facing,
            trail: BTreeSet::from([start]),
            programs: ProgramSet::new(),
            steps: StepArena::new(),
            branches: BranchStack::new(),
            current: None,
            state: RunState::Idle,
            timers: TimerScheduler::new(),
            run_timers: Vec::new(),
            generation: 0,
            observer: None,
            events: Vec::new(),
        }
    }

    pub fn with_blocking_rule(mut self, rule: Box<dyn BlockingRule>) -> Self {
        self.rule = rule;
        self
    }

    /// Registers a hook fired each time a step begins, with the step's index
    /// inside its chain.
    pub fn on_step_change<F>(&mut self, observer: F)
    where
        F: FnMut(usize, &Step) + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn position(&self) -> GridPosition {
        self.position
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current.and_then(|id| self.steps.get(id))
    }

    pub fn steps(&self) -> &StepArena {
        &self.steps
    }

    pub fn branch_depth(&self) -> usize {
        self.branches.depth()
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub fn can_move_to(&self, row: i32, col: i32) -> bool {
        let cell = GridPosition::new(row, col);
        self.maze.contains(cell) && self.rule.allows(self.maze.as_ref(), cell, &self.trail)
    }

    /// Replaces any in-flight run and schedules the first program. Returns
    /// immediately; progress happens in [`Character::tick`].
    pub fn execute(&mut self, programs: ProgramSet) {
        self.stop();
        self.steps.clear();
        self.programs = programs;
        for program in self.programs.iter() {
            for instruction in program.instructions() {
                self.stage.markers.disanimate(instruction.id());
            }
        }
        self.trail = BTreeSet::from([self.position]);

        let entry = self.programs.entry().map(|program| program.name().to_string());
        let Some(entry) = entry else {
            warn!("execute called with no programs loaded");
            self.finish_run();
            return;
        };
        info!(
            "running `{entry}` from ({}, {}) facing {:?}",
            self.position.row, self.position.col, self.facing
        );
        self.record(EngineEvent::RunStarted {
            program: entry.clone(),
        });
        self.state = RunState::Scheduled {
            program: entry.clone(),
        };
        self.schedule_program(&entry);
    }

    /// Cancels the in-flight run, if any. Calling it again, or with nothing
    /// running, has no effect.
    pub fn stop(&mut self) {
        let mut cancelled = 0;
        for id in self.run_timers.drain(..) {
            if self.timers.cancel(id) {
                cancelled += 1;
            }
        }
        let had_step = self.current.take().is_some();
        let was_active = self.state.is_active() || had_step || cancelled > 0;
        self.generation += 1;
        self.branches.clear();
        if !was_active {
            return;
        }
        self.stage.body.stop();
        self.steps.clear();
        self.state = RunState::Idle;
        info!("run stopped");
        self.record(EngineEvent::Stopped);
    }

    /// Advances the virtual clock, firing due timers, then polls for arrival.
    pub fn tick(&mut self, delta_ms: u64) {
        let deadline = self.timers.now_ms().saturating_add(delta_ms);
        while let Some((id, event)) = self.timers.pop_due(deadline) {
            self.run_timers.retain(|pending| *pending != id);
            self.dispatch(event);
        }
        self.timers.settle(deadline);
        self.update();
    }

    /// Per-frame poll: completes a walking step once the body is within
    /// `ARRIVAL_TOLERANCE` of its target point.
    pub fn update(&mut self) {
        let step = match self.state {
            RunState::Translating { step } => step,
            _ => return,
        };
        let Some(point) = self.steps.get(step).and_then(Step::point) else {
            return;
        };
        if self.stage.body.distance_to(point) <= ARRIVAL_TOLERANCE {
            self.complete_step(step);
        }
    }

    fn dispatch(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::ClearHighlight { instruction } => {
                self.stage.markers.clear_highlight(instruction);
            }
            TimerEvent::StartProgram {
                generation,
                program,
            } if generation == self.generation => self.start_program(&program),
            TimerEvent::CompleteStep { generation, step }
                if generation == self.generation && self.current == Some(step) =>
            {
                self.complete_step(step)
            }
            stale => debug!("discarding stale timer {stale:?}"),
        }
    }

    fn schedule_program(&mut self, name: &str) {
        if let Some(program) = self.programs.get(name) {
            for instruction in program.instructions() {
                self.stage.markers.disanimate(instruction.id());
            }
        }
        let id = self.timers.schedule(
            PROGRAM_START_DELAY_MS,
            TimerEvent::StartProgram {
                generation: self.generation,
                program: name.to_string(),
            },
        );
        self.run_timers.push(id);
    }

    fn start_program(&mut self, name: &str) {
        let Some(program) = self.programs.get(name) else {
            return;
        };
        let steps = program.len();
        let head = self.steps.build_chain(program);
        debug!("program `{name}` starts with {steps} steps");
        self.record(EngineEvent::ProgramStarted {
            program: name.to_string(),
            steps,
        });

        self.current = head;
        if self.current.is_none() {
            self.current = self.resume_branch();
        }
        match self.current {
            Some(step) => self.execute_step(step, None),
            None => self.finish_run(),
        }
    }

    /// Executes `id`, resolving its target from `previous`'s resulting cell or,
    /// without a previous step, from the character's live position.
    fn execute_step(&mut self, id: StepId, previous: Option<StepId>) {
        let base = previous
            .and_then(|prev| self.steps.get(prev))
            .and_then(Step::resulting_position)
            .unwrap_or(self.position);
        let Some(step) = self.steps.get_mut(id) else {
            return;
        };
        step.executing = true;
        step.origin = Some(base);
        let action = step.action().clone();
        let instruction = step.instruction().id();
        let continuation = step.next();

        self.notify_step_change(id);
        self.stage.markers.animate(instruction);
        self.stage.markers.highlight(instruction, HIGHLIGHT_TINT);
        self.timers.schedule(
            HIGHLIGHT_DELAY_MS,
            TimerEvent::ClearHighlight { instruction },
        );

        match resolve(&action, base) {
            Resolution::Turn { direction, target } => {
                if let Some(step) = self.steps.get_mut(id) {
                    step.target = Some(target);
                }
                self.state = RunState::Turning { step: id };
                self.schedule_completion(id, TURN_DELAY_MS);
                self.turn(direction);
            }
            Resolution::Branch { program } => {
                let branch = Branch {
                    program: program.clone(),
                    continuation,
                    call_instruction: instruction,
                };
                self.on_branch(program, branch);
            }
            Resolution::Translate { target } => self.translate(id, &action, base, target),
        }
    }

    fn translate(
        &mut self,
        id: StepId,
        action: &Action,
        origin: GridPosition,
        target: GridPosition,
    ) {
        // Standing still is never a revisit.
        let legal = target == origin || self.can_move_to(target.row, target.col);
        let point = if legal {
            self.maze.point_at(target)
        } else {
            None
        };
        if let Some(step) = self.steps.get_mut(id) {
            step.target = Some(target);
            step.point = point;
            step.could_execute = point.is_some();
        }
        let facing = Facing::for_action(action);

        match point {
            Some(point) => {
                self.stage.body.clear_tint();
                self.stage.sounds.play_cue(Cue::Start);
                if let Some(facing) = facing {
                    self.play_animation(facing);
                }
                self.stage.body.move_toward(point, WALK_SPEED);
                self.state = RunState::Translating { step: id };
            }
            None => {
                if let Some(facing) = facing {
                    self.play_animation(facing);
                }
                self.stage.sounds.play_cue(Cue::Blocked);
                self.stage.body.set_tint(BLOCKED_TINT);
                debug!(
                    "blocked moving from ({}, {}) to ({}, {})",
                    origin.row, origin.col, target.row, target.col
                );
                self.record(EngineEvent::Blocked {
                    from: origin,
                    target,
                });
                self.state = RunState::Blocked { step: id };
                self.schedule_completion(id, BLOCKED_DELAY_MS);
            }
        }
    }

    fn schedule_completion(&mut self, step: StepId, delay_ms: u64) {
        let id = self.timers.schedule(
            delay_ms,
            TimerEvent::CompleteStep {
                generation: self.generation,
                step,
            },
        );
        self.run_timers.push(id);
    }

    fn complete_step(&mut self, id: StepId) {
        let Some(step) = self.steps.get_mut(id) else {
            return;
        };
        step.executing = false;
        let instruction = step.instruction().id();
        let next = step.next();
        let origin = step.origin();
        let arrival = if step.could_execute() {
            step.target().zip(step.point())
        } else {
            None
        };

        self.stage.markers.disanimate(instruction);
        self.stage.body.clear_tint();

        self.current = next;
        if self.current.is_none() {
            self.current = self.resume_branch();
        }
        if let Some((target, point)) = arrival {
            let from = origin.unwrap_or(self.position);
            self.position = target;
            self.trail.insert(target);
            self.stage.body.reset_to(point);
            self.record(EngineEvent::Moved { from, to: target });
        }

        match self.current {
            Some(step) => self.execute_step(step, Some(id)),
            None => self.finish_run(),
        }
    }

    fn on_branch(&mut self, program: String, branch: Branch) {
        self.branches.push(branch);
        let depth = self.branches.depth();
        self.record(EngineEvent::BranchEntered {
            program: program.clone(),
            depth,
        });

        if self.programs.contains(&program) {
            self.schedule_program(&program);
            self.state = RunState::Branching { program };
        } else {
            // The branch stays pushed: nothing will ever resume it.
            warn!("call to unknown program `{program}`; run stalls at branch depth {depth}");
            self.record(EngineEvent::MissingProgram {
                program: program.clone(),
            });
            self.state = RunState::Stalled { program };
        }
    }

    fn resume_branch(&mut self) -> Option<StepId> {
        let markers = &self.stage.markers;
        let mut returned = Vec::new();
        let resumed = self.branches.unwind(|branch| {
            branch.complete(markers.as_ref());
            returned.push(branch.program.clone());
        });
        for program in returned {
            debug!("returned from `{program}`");
            self.record(EngineEvent::BranchReturned { program });
        }
        resumed
    }

    fn turn(&mut self, direction: TurnDirection) {
        let from = self.facing;
        let to = from.turned(direction);
        self.play_animation(to);
        self.record(EngineEvent::Turned { from, to });
    }

    fn play_animation(&mut self, facing: Facing) {
        self.facing = facing;
        self.stage.body.play_animation(facing);
    }

    fn notify_step_change(&mut self, id: StepId) {
        let Some(step) = self.steps.get(id) else {
            return;
        };
        debug!(
            "step {} of `{}`: {}",
            step.index(),
            step.program(),
            step.action()
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(step.index(), step);
        }
        let event = EngineEvent::StepStarted {
            program: step.program().to_string(),
            index: step.index(),
            action: step.action().tag().to_string(),
        };
        self.record(event);
    }

    fn finish_run(&mut self) {
        self.current = None;
        self.state = RunState::Completed;
        info!(
            "run completed at ({}, {}) facing {:?}",
            self.position.row, self.position.col, self.facing
        );
        self.record(EngineEvent::RunCompleted {
            position: self.position,
            facing: self.facing,
        });
    }

    fn record(&mut self, event: EngineEvent) {
        self.events.push(TimedEvent {
            at_ms: self.timers.now_ms(),
            event,
        });
    }
}
