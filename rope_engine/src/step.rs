//! Runtime steps derived from instructions, the chain that links them and the
//! branch stack that suspends callers while a called program runs.

use serde::Serialize;

use crate::character::TurnDirection;
use crate::collaborators::InstructionMarkers;
use crate::maze::{GridPosition, ScreenPoint};
use crate::program::{Action, Instruction, InstructionId, Program};

/// Debounce before a program's first step, applied to callees as well.
pub const PROGRAM_START_DELAY_MS: u64 = 200;
pub const BLOCKED_DELAY_MS: u64 = 500;
pub const TURN_DELAY_MS: u64 = 600;
pub const HIGHLIGHT_DELAY_MS: u64 = 80;
/// Pixels per second.
pub const WALK_SPEED: f32 = 40.0;
pub const ARRIVAL_TOLERANCE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StepId(usize);

impl StepId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    id: StepId,
    program: String,
    index: usize,
    instruction: Instruction,
    pub(crate) origin: Option<GridPosition>,
    pub(crate) target: Option<GridPosition>,
    pub(crate) point: Option<ScreenPoint>,
    pub(crate) executing: bool,
    pub(crate) could_execute: bool,
    next: Option<StepId>,
}

impl Step {
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Name of the program this step was built from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Position of the step inside its chain.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    pub fn action(&self) -> &Action {
        self.instruction.action()
    }

    pub fn origin(&self) -> Option<GridPosition> {
        self.origin
    }

    pub fn target(&self) -> Option<GridPosition> {
        self.target
    }

    pub fn point(&self) -> Option<ScreenPoint> {
        self.point
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn could_execute(&self) -> bool {
        self.could_execute
    }

    pub fn next(&self) -> Option<StepId> {
        self.next
    }

    /// Where the character stands once this step has completed: the target
    /// of a legal move, otherwise the cell it started from.
    pub fn resulting_position(&self) -> Option<GridPosition> {
        if self.could_execute {
            self.target.or(self.origin)
        } else {
            self.origin
        }
    }
}

/// Steps of every chain built during one run. Chains are linked by
/// [`StepId`]; suspended callers stay alive here while their callee runs.
#[derive(Debug, Default)]
pub struct StepArena {
    steps: Vec<Step>,
}

impl StepArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one fresh step per instruction, links them in order and
    /// returns the head of the chain (`None` for an empty program).
    pub fn build_chain(&mut self, program: &Program) -> Option<StepId> {
        let first = self.steps.len();
        let count = program.len();
        for (index, instruction) in program.instructions().iter().enumerate() {
            let id = StepId(first + index);
            let next = (index + 1 < count).then(|| StepId(first + index + 1));
            self.steps.push(Step {
                id,
                program: program.name().to_string(),
                index,
                instruction: instruction.clone(),
                origin: None,
                target: None,
                point: None,
                executing: false,
                could_execute: false,
                next,
            });
        }
        (count > 0).then_some(StepId(first))
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.get(id.0)
    }

    pub fn get_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.steps.get_mut(id.0)
    }

    /// Every step in creation order, across all chains of the run.
    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

/// What executing an action means relative to a starting cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Translate { target: GridPosition },
    Turn { direction: TurnDirection, target: GridPosition },
    Branch { program: String },
}

pub fn resolve(action: &Action, base: GridPosition) -> Resolution {
    match action {
        Action::MoveDown => Resolution::Translate {
            target: base.offset(1, 0),
        },
        Action::MoveUp => Resolution::Translate {
            target: base.offset(-1, 0),
        },
        Action::MoveLeft => Resolution::Turn {
            direction: TurnDirection::Left,
            target: base,
        },
        Action::MoveRight => Resolution::Turn {
            direction: TurnDirection::Right,
            target: base,
        },
        Action::Call(program) => Resolution::Branch {
            program: program.clone(),
        },
        Action::Unknown(_) => Resolution::Translate { target: base },
    }
}

/// A suspended caller. Completing it clears the call instruction's marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub program: String,
    pub continuation: Option<StepId>,
    pub call_instruction: InstructionId,
}

impl Branch {
    pub fn complete(&self, markers: &dyn InstructionMarkers) {
        markers.disanimate(self.call_instruction);
    }
}

#[derive(Debug, Default)]
pub struct BranchStack {
    frames: Vec<Branch>,
}

impl BranchStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, branch: Branch) {
        self.frames.push(branch);
    }

    /// Pops frames innermost first, handing each to `on_complete`, until one
    /// carries a continuation. Returns that continuation, or `None` once the
    /// stack is exhausted.
    pub fn unwind<F>(&mut self, mut on_complete: F) -> Option<StepId>
    where
        F: FnMut(&Branch),
    {
        while let Some(branch) = self.frames.pop() {
            on_complete(&branch);
            if branch.continuation.is_some() {
                return branch.continuation;
            }
        }
        None
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
