//! JSON scenario files: one maze phase plus the programs to run on it.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blocking::BlockingMode;
use crate::character::Facing;
use crate::maze::{GridPosition, IsometricMaze, IsometricProjection, MazeError, MazeModel};
use crate::program::{Action, ProgramError, ProgramSet};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scenario JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid maze: {0}")]
    Maze(#[from] MazeError),
    #[error("invalid program list: {0}")]
    Program(#[from] ProgramError),
    #[error("scenario defines no programs")]
    NoPrograms,
    #[error("start cell ({row}, {col}) is not occupiable")]
    StartBlocked { row: i32, col: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramSource {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Tile keys per cell; `"null"` or `""` marks a hole.
    pub ground: Vec<Vec<String>>,
    #[serde(default)]
    pub obstacles: Vec<Vec<String>>,
    pub start: GridPosition,
    #[serde(default)]
    pub facing: Facing,
    #[serde(default)]
    pub projection: IsometricProjection,
    #[serde(default)]
    pub blocking: BlockingMode,
    /// Authored order; the first entry is the program `execute` starts with.
    pub programs: Vec<ProgramSource>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed scenario")
    }

    pub fn maze(&self) -> Result<IsometricMaze, ScenarioError> {
        Ok(IsometricMaze::from_layers(
            &self.ground,
            &self.obstacles,
            self.projection,
        )?)
    }

    /// Builds the run's program set. Calls to programs the scenario does not
    /// define are accepted; they stall the run when reached.
    pub fn programs(&self) -> Result<ProgramSet, ScenarioError> {
        let mut set = ProgramSet::new();
        for source in &self.programs {
            set.add(source.name.clone(), source.actions.iter().cloned())?;
        }
        Ok(set)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if self.programs.is_empty() {
            return Err(ScenarioError::NoPrograms);
        }
        let maze = self.maze()?;
        if !maze.is_occupiable(self.start) {
            return Err(ScenarioError::StartBlocked {
                row: self.start.row,
                col: self.start.col,
            });
        }
        self.programs().map(|_| ())
    }
}
