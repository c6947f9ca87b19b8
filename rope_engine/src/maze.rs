//! Isometric maze model: maps grid cells to screen points and answers whether a
//! cell can be occupied by the character.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical cell coordinate. Signed so that a move off the top or left edge
/// resolves to a coordinate the legality check can reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: i32,
    pub col: i32,
}

impl GridPosition {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn offset(self, rows: i32, cols: i32) -> Self {
        Self {
            row: self.row + rows,
            col: self.col + cols,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: ScreenPoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Read-only view of a phase's grid.
pub trait MazeModel {
    /// `(rows, cols)` fixed at construction.
    fn dimensions(&self) -> (usize, usize);

    fn point_at(&self, position: GridPosition) -> Option<ScreenPoint>;

    fn is_occupiable(&self, position: GridPosition) -> bool;

    fn contains(&self, position: GridPosition) -> bool {
        let (rows, cols) = self.dimensions();
        position.row >= 0
            && position.col >= 0
            && (position.row as usize) < rows
            && (position.col as usize) < cols
    }
}

/// Screen placement of the grid. The origin cell `(0, 0)` lands on
/// `(center_x, center_y)`; columns run down-right and rows run down-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsometricProjection {
    pub center_x: f32,
    pub center_y: f32,
    pub cell_width: f32,
}

impl Default for IsometricProjection {
    fn default() -> Self {
        Self {
            center_x: 485.0,
            center_y: 485.0,
            cell_width: 64.0,
        }
    }
}

impl IsometricProjection {
    pub fn project(&self, row: usize, col: usize) -> ScreenPoint {
        let row = row as f32;
        let col = col as f32;
        ScreenPoint {
            x: self.center_x + (col - row) * self.cell_width / 2.0,
            y: self.center_y + (col + row) * self.cell_width / 4.0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MazeError {
    #[error("maze has no cells")]
    Empty,
    #[error("{layer} layer row {row} has {found} cells (expected {expected})")]
    RaggedRow {
        layer: &'static str,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("obstacle layer is {obstacles:?} but ground layer is {ground:?}")]
    LayerMismatch {
        ground: (usize, usize),
        obstacles: (usize, usize),
    },
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    point: ScreenPoint,
    occupiable: bool,
}

#[derive(Debug, Clone)]
pub struct IsometricMaze {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl IsometricMaze {
    /// Builds the maze from ground and obstacle tile layers. A cell is
    /// occupiable when it has ground and no obstacle. An empty obstacle layer
    /// means the phase has no obstacles.
    pub fn from_layers<S: AsRef<str>>(
        ground: &[Vec<S>],
        obstacles: &[Vec<S>],
        projection: IsometricProjection,
    ) -> Result<Self, MazeError> {
        let (rows, cols) = layer_dimensions("ground", ground)?;
        if !obstacles.is_empty() {
            let obstacle_dims = layer_dimensions("obstacle", obstacles)?;
            if obstacle_dims != (rows, cols) {
                return Err(MazeError::LayerMismatch {
                    ground: (rows, cols),
                    obstacles: obstacle_dims,
                });
            }
        }

        let occupancy = (0..rows)
            .map(|row| {
                (0..cols)
                    .map(|col| {
                        let has_ground = has_tile(ground[row][col].as_ref());
                        let has_obstacle = obstacles
                            .get(row)
                            .map(|cells| has_tile(cells[col].as_ref()))
                            .unwrap_or(false);
                        has_ground && !has_obstacle
                    })
                    .collect()
            })
            .collect::<Vec<Vec<bool>>>();

        Self::from_occupancy(&occupancy, projection)
    }

    pub fn from_occupancy(
        occupancy: &[Vec<bool>],
        projection: IsometricProjection,
    ) -> Result<Self, MazeError> {
        let (rows, cols) = layer_dimensions("occupancy", occupancy)?;
        let mut cells = Vec::with_capacity(rows * cols);
        for (row, line) in occupancy.iter().enumerate() {
            for (col, occupiable) in line.iter().enumerate() {
                cells.push(Cell {
                    point: projection.project(row, col),
                    occupiable: *occupiable,
                });
            }
        }
        Ok(Self { rows, cols, cells })
    }

    fn cell(&self, position: GridPosition) -> Option<&Cell> {
        if !self.contains(position) {
            return None;
        }
        self.cells
            .get(position.row as usize * self.cols + position.col as usize)
    }
}

impl MazeModel for IsometricMaze {
    fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn point_at(&self, position: GridPosition) -> Option<ScreenPoint> {
        self.cell(position).map(|cell| cell.point)
    }

    fn is_occupiable(&self, position: GridPosition) -> bool {
        self.cell(position).map(|cell| cell.occupiable).unwrap_or(false)
    }
}

/// Tile keys use `"null"` (or nothing) for an empty slot.
fn has_tile(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != "null"
}

fn layer_dimensions<T>(
    layer: &'static str,
    cells: &[Vec<T>],
) -> Result<(usize, usize), MazeError> {
    let rows = cells.len();
    let cols = cells.first().map(Vec::len).unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Err(MazeError::Empty);
    }
    for (row, line) in cells.iter().enumerate() {
        if line.len() != cols {
            return Err(MazeError::RaggedRow {
                layer,
                row,
                expected: cols,
                found: line.len(),
            });
        }
    }
    Ok((rows, cols))
}
