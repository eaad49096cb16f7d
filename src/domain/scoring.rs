// Deterministic comparison of a build grid against its target.

use crate::domain::block::BlockType;
use crate::domain::grid::Grid;

/// Outcome for one counted (row, col, height) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellScore {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub expected: BlockType,
    pub actual: BlockType,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoreResult {
    pub percentage: u32,
    pub correct: u32,
    pub total: u32,
    pub cells: Vec<CellScore>,
}

/// Scores `build` against `target`.
///
/// Every solid target layer counts toward the total and is correct only on an exact
/// type match. A solid build layer over an empty target layer also counts, as a miss.
/// `air` is a spacer on both sides and is never counted.
pub fn calculate_score(build: &Grid, target: &Grid) -> ScoreResult {
    let size = build.size().max(target.size());
    let max_height = build.max_height().max(target.max_height());

    let mut cells = Vec::new();
    for row in 0..size {
        for col in 0..size {
            let layers = build
                .height_of(row, col)
                .max(target.height_of(row, col))
                .min(max_height);
            for height in 0..layers {
                let expected = normalize(target.block_at(row, col, height));
                let actual = normalize(build.block_at(row, col, height));
                if expected == BlockType::Empty && actual == BlockType::Empty {
                    continue;
                }
                cells.push(CellScore {
                    row,
                    col,
                    height,
                    expected,
                    actual,
                    correct: expected != BlockType::Empty && expected == actual,
                });
            }
        }
    }

    let total = cells.len() as u32;
    let correct = cells.iter().filter(|cell| cell.correct).count() as u32;
    ScoreResult {
        percentage: percentage(correct, total),
        correct,
        total,
        cells,
    }
}

fn normalize(block: BlockType) -> BlockType {
    if block.is_solid() {
        block
    } else {
        BlockType::Empty
    }
}

fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    // Integer round-half-up of 100 * correct / total.
    (200 * correct + total) / (2 * total)
}
