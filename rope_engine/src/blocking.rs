use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::maze::{GridPosition, MazeModel};

/// Phase-specific legality rule consulted before every translation.
pub trait BlockingRule {
    /// `trail` holds every cell the character has stood on during the current run.
    fn allows(
        &self,
        maze: &dyn MazeModel,
        cell: GridPosition,
        trail: &BTreeSet<GridPosition>,
    ) -> bool;
}

/// Only the maze's obstacle/ground data blocks movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObstaclesOnly;

impl BlockingRule for ObstaclesOnly {
    fn allows(
        &self,
        maze: &dyn MazeModel,
        cell: GridPosition,
        _trail: &BTreeSet<GridPosition>,
    ) -> bool {
        maze.is_occupiable(cell)
    }
}

/// Obstacles block, and so does any cell already visited this run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevisit;

impl BlockingRule for NoRevisit {
    fn allows(
        &self,
        maze: &dyn MazeModel,
        cell: GridPosition,
        trail: &BTreeSet<GridPosition>,
    ) -> bool {
        maze.is_occupiable(cell) && !trail.contains(&cell)
    }
}

/// Serialisable selector for the built-in rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    #[default]
    ObstaclesOnly,
    NoRevisit,
}

impl BlockingMode {
    pub fn rule(self) -> Box<dyn BlockingRule> {
        match self {
            BlockingMode::ObstaclesOnly => Box::new(ObstaclesOnly),
            BlockingMode::NoRevisit => Box::new(NoRevisit),
        }
    }
}
