use std::cell::RefCell;
use std::rc::Rc;

use rope_engine::audio_bridge::{Cue, RecordingSoundBank};
use rope_engine::collaborators::{BodyEvent, KinematicBody, RecordingMarkers};
use rope_engine::maze::{IsometricMaze, IsometricProjection};
use rope_engine::step::Step;
use rope_engine::{
    Character, Collaborators, EngineEvent, Facing, GridPosition, ProgramSet, RunState,
};

const FRAME_MS: u64 = 16;

struct Harness {
    character: Character,
    body: KinematicBody,
    markers: RecordingMarkers,
    sounds: RecordingSoundBank,
}

impl Harness {
    fn open(rows: usize, cols: usize, start: GridPosition) -> Self {
        Self::with_occupancy(&vec![vec![true; cols]; rows], start)
    }

    fn with_occupancy(occupancy: &[Vec<bool>], start: GridPosition) -> Self {
        let maze = IsometricMaze::from_occupancy(occupancy, IsometricProjection::default())
            .expect("rectangular occupancy");
        let body = KinematicBody::new(IsometricProjection::default().project(0, 0));
        let markers = RecordingMarkers::new();
        let sounds = RecordingSoundBank::new();
        let stage = Collaborators {
            body: Rc::new(body.clone()),
            markers: Rc::new(markers.clone()),
            sounds: Rc::new(sounds.clone()),
        };
        Self {
            character: Character::new(Box::new(maze), start, Facing::Down, stage),
            body,
            markers,
            sounds,
        }
    }

    fn frame(&mut self) {
        self.body.integrate(FRAME_MS);
        self.sounds.advance(FRAME_MS);
        self.character.tick(FRAME_MS);
    }

    fn run_to_rest(&mut self) {
        for _ in 0..50_000 {
            if !self.character.is_running()
                || matches!(self.character.state(), RunState::Stalled { .. })
            {
                return;
            }
            self.frame();
        }
        panic!("run never settled: {:?}", self.character.state());
    }

    fn events(&self) -> Vec<EngineEvent> {
        self.character
            .events()
            .iter()
            .map(|timed| timed.event.clone())
            .collect()
    }

    fn steps(&self) -> Vec<Step> {
        self.character.steps().iter().cloned().collect()
    }
}

fn programs(entries: &[(&str, &str)]) -> ProgramSet {
    let mut set = ProgramSet::new();
    for (name, actions) in entries {
        set.add(*name, actions.split_whitespace())
            .expect("program names are unique");
    }
    set
}

#[test]
fn call_free_program_builds_one_step_per_instruction() {
    let mut harness = Harness::open(10, 10, GridPosition::new(5, 5));
    harness.character.execute(programs(&[("prog_0", "moveDown moveDown moveRight moveDown")]));
    harness.run_to_rest();

    let steps = harness.steps();
    assert_eq!(steps.len(), 4);
    let targets: Vec<GridPosition> = steps.iter().filter_map(Step::target).collect();
    assert_eq!(
        targets,
        vec![
            GridPosition::new(6, 5),
            GridPosition::new(7, 5),
            GridPosition::new(7, 5),
            GridPosition::new(8, 5),
        ]
    );
    assert!(steps.iter().all(|step| !step.is_executing()));
    assert!(harness.character.current_step().is_none());
    assert_eq!(harness.character.state(), &RunState::Completed);
    assert_eq!(harness.character.position(), GridPosition::new(8, 5));
}

#[test]
fn blocked_move_keeps_position_and_advances_chain() {
    let mut occupancy = vec![vec![true; 10]; 10];
    occupancy[6][5] = false;
    let mut harness = Harness::with_occupancy(&occupancy, GridPosition::new(5, 5));
    harness.character.execute(programs(&[("prog_0", "moveDown moveRight moveUp")]));
    harness.run_to_rest();

    let steps = harness.steps();
    assert!(!steps[0].could_execute());
    assert_eq!(steps[0].resulting_position(), Some(GridPosition::new(5, 5)));
    assert_eq!(steps[2].origin(), Some(GridPosition::new(5, 5)));
    assert_eq!(harness.character.position(), GridPosition::new(4, 5));
    assert!(harness.events().contains(&EngineEvent::Blocked {
        from: GridPosition::new(5, 5),
        target: GridPosition::new(6, 5),
    }));
    assert_eq!(harness.body.tint(), None);
    assert_eq!(harness.sounds.played(), vec![Cue::Blocked, Cue::Start]);
}

#[test]
fn caller_resumes_from_callee_position() {
    let mut harness = Harness::open(5, 5, GridPosition::new(0, 0));
    harness.character.execute(programs(&[
        ("prog_a", "prog_b moveDown"),
        ("prog_b", "moveDown"),
    ]));
    harness.run_to_rest();

    assert_eq!(harness.character.position(), GridPosition::new(2, 0));
    let continuation = harness
        .steps()
        .into_iter()
        .find(|step| step.program() == "prog_a" && step.index() == 1)
        .expect("caller continuation ran");
    assert_eq!(continuation.origin(), Some(GridPosition::new(1, 0)));
    assert_eq!(harness.character.branch_depth(), 0);
    assert!(harness.markers.animated().is_empty());
}

#[test]
fn nested_calls_unwind_innermost_first() {
    let mut harness = Harness::open(6, 2, GridPosition::new(0, 0));
    harness.character.execute(programs(&[
        ("prog_a", "prog_b moveDown"),
        ("prog_b", "moveDown prog_c"),
        ("prog_c", "moveDown"),
    ]));
    harness.run_to_rest();

    let branch_events: Vec<EngineEvent> = harness
        .events()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                EngineEvent::BranchEntered { .. } | EngineEvent::BranchReturned { .. }
            )
        })
        .collect();
    assert_eq!(
        branch_events,
        vec![
            EngineEvent::BranchEntered {
                program: "prog_b".to_string(),
                depth: 1,
            },
            EngineEvent::BranchEntered {
                program: "prog_c".to_string(),
                depth: 2,
            },
            EngineEvent::BranchReturned {
                program: "prog_c".to_string(),
            },
            EngineEvent::BranchReturned {
                program: "prog_b".to_string(),
            },
        ]
    );
    assert_eq!(harness.character.position(), GridPosition::new(3, 0));
    assert!(harness.markers.animated().is_empty());
}

#[test]
fn step_observer_sees_chain_indices() {
    let mut harness = Harness::open(5, 5, GridPosition::new(0, 0));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    harness.character.on_step_change(move |index, step| {
        sink.borrow_mut().push((step.program().to_string(), index));
    });
    harness.character.execute(programs(&[
        ("prog_a", "prog_b moveDown"),
        ("prog_b", "moveLeft"),
    ]));
    harness.run_to_rest();

    assert_eq!(
        seen.borrow().as_slice(),
        &[
            ("prog_a".to_string(), 0),
            ("prog_b".to_string(), 0),
            ("prog_a".to_string(), 1),
        ]
    );
}

#[test]
fn stop_is_idempotent() {
    let mut harness = Harness::open(5, 5, GridPosition::new(0, 0));
    harness.character.stop();
    assert!(harness.events().is_empty());

    harness.character.execute(programs(&[("prog_0", "moveDown moveDown")]));
    for _ in 0..20 {
        harness.frame();
    }
    harness.character.stop();
    harness.character.stop();

    let stops = harness
        .events()
        .into_iter()
        .filter(|event| *event == EngineEvent::Stopped)
        .count();
    assert_eq!(stops, 1);
    let body_stops = harness
        .body
        .events()
        .into_iter()
        .filter(|event| *event == BodyEvent::Stop)
        .count();
    assert_eq!(body_stops, 1);
    assert_eq!(harness.character.state(), &RunState::Idle);
    assert!(!harness.body.is_moving());
}

#[test]
fn missing_program_stalls_with_branch_pushed() {
    let mut harness = Harness::open(5, 5, GridPosition::new(0, 0));
    harness
        .character
        .execute(programs(&[("prog_a", "moveDown prog_missing moveDown")]));
    harness.run_to_rest();

    assert_eq!(
        harness.character.state(),
        &RunState::Stalled {
            program: "prog_missing".to_string()
        }
    );
    assert_eq!(harness.character.branch_depth(), 1);
    assert_eq!(harness.character.position(), GridPosition::new(1, 0));
    assert!(harness.events().contains(&EngineEvent::MissingProgram {
        program: "prog_missing".to_string()
    }));

    harness.character.execute(programs(&[("prog_a", "moveUp")]));
    assert_eq!(harness.character.branch_depth(), 0);
    harness.run_to_rest();
    assert_eq!(harness.character.position(), GridPosition::new(0, 0));
}

#[test]
fn empty_entry_program_completes_without_steps() {
    let mut harness = Harness::open(3, 3, GridPosition::new(1, 1));
    harness.character.execute(programs(&[("prog_a", "")]));
    harness.run_to_rest();

    assert_eq!(harness.character.state(), &RunState::Completed);
    assert!(harness.steps().is_empty());
    assert_eq!(
        harness.events(),
        vec![
            EngineEvent::RunStarted {
                program: "prog_a".to_string(),
            },
            EngineEvent::ProgramStarted {
                program: "prog_a".to_string(),
                steps: 0,
            },
            EngineEvent::RunCompleted {
                position: GridPosition::new(1, 1),
                facing: Facing::Down,
            },
        ]
    );
    assert!(harness.sounds.played().is_empty());
}

#[test]
fn empty_callee_returns_to_caller_immediately() {
    let mut harness = Harness::open(3, 3, GridPosition::new(0, 0));
    harness.character.execute(programs(&[
        ("prog_a", "prog_b moveDown"),
        ("prog_b", ""),
    ]));
    harness.run_to_rest();

    assert_eq!(harness.character.state(), &RunState::Completed);
    assert_eq!(harness.character.position(), GridPosition::new(1, 0));
    assert_eq!(harness.character.branch_depth(), 0);
    let continuation = harness
        .steps()
        .into_iter()
        .find(|step| step.program() == "prog_a" && step.index() == 1)
        .expect("caller continuation ran");
    assert_eq!(continuation.origin(), Some(GridPosition::new(0, 0)));
    assert!(harness.events().contains(&EngineEvent::BranchReturned {
        program: "prog_b".to_string(),
    }));
    assert!(harness.markers.animated().is_empty());
}
