//! Program execution engine for an isometric maze puzzle.
//!
//! Players author small programs (`moveDown`, `moveLeft`, calls such as
//! `prog_1`); [`character::Character`] turns each program into a chain of
//! steps and plays them back against a [`maze::MazeModel`], one step at a
//! time on a virtual clock. Rendering, markers and audio are injected
//! through the traits in [`collaborators`] and [`audio_bridge`].

pub mod audio_bridge;
pub mod blocking;
pub mod character;
pub mod collaborators;
pub mod maze;
pub mod program;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod step;

pub use character::{Character, Collaborators, EngineEvent, Facing, RunState};
pub use maze::{GridPosition, IsometricMaze, MazeModel, ScreenPoint};
pub use program::{Action, ProgramSet};
pub use scenario::Scenario;
