// Built-in target structures, grouped into the round-1 and round-2 pools.

use crate::domain::block::BlockType::{self, *};
use crate::domain::grid::Grid;
use crate::domain::notation::parse_cell;

#[derive(Debug)]
pub struct TargetSpec {
    pub name: &'static str,
    pub theme: &'static str,
    pub stacks: &'static [(&'static str, &'static [BlockType])],
}

impl TargetSpec {
    pub fn build(&self) -> Grid {
        let mut grid = Grid::default();
        for (cell, blocks) in self.stacks {
            if let Some((row, col)) = parse_cell(cell) {
                let _ = grid.set_stack(row, col, blocks);
            }
        }
        grid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    One,
    Two,
}

pub const ROUND_ONE: &[TargetSpec] = &[
    TargetSpec {
        name: "cottage",
        theme: "house",
        stacks: &[
            ("B2", &[Wall, Wall, Roof]),
            ("C2", &[Door, Door, Roof]),
            ("D2", &[Wall, Window, Roof]),
            ("B3", &[Wall, Wall, Roof]),
            ("C3", &[Floor]),
            ("D3", &[Wall, Wall, Roof]),
            ("E5", &[Plant]),
        ],
    },
    TargetSpec {
        name: "pump station",
        theme: "industrial",
        stacks: &[
            ("A1", &[Concrete, Concrete]),
            ("B1", &[Concrete, Metal]),
            ("C1", &[Pipe, Pipe, Pipe]),
            ("C2", &[Pipe]),
            ("D4", &[Barrel]),
            ("E4", &[Barrel, Barrel]),
        ],
    },
    TargetSpec {
        name: "greenhouse",
        theme: "garden",
        stacks: &[
            ("B2", &[Window, Window]),
            ("C2", &[Window, Window]),
            ("B3", &[Door, Door]),
            ("C3", &[Window, Window]),
            ("D5", &[Plant]),
            ("E5", &[Table, Plant]),
        ],
    },
];

pub const ROUND_TWO: &[TargetSpec] = &[
    TargetSpec {
        name: "townhouse",
        theme: "house",
        stacks: &[
            ("C1", &[Wall, Wall, Wall, Roof]),
            ("D1", &[Wall, Window, Wall, Roof]),
            ("C2", &[Door, Door, Window, Roof]),
            ("D2", &[Wall, Wall, Wall, Roof]),
            ("E2", &[Floor, Table]),
            ("E3", &[Plant]),
        ],
    },
    TargetSpec {
        name: "refinery",
        theme: "industrial",
        stacks: &[
            ("A4", &[Metal, Metal, Metal, Pipe]),
            ("B4", &[Pipe]),
            ("C4", &[Pipe, Air, Pipe]),
            ("D4", &[Metal, Metal]),
            ("F6", &[Barrel]),
            ("E6", &[Concrete, Barrel]),
        ],
    },
    TargetSpec {
        name: "courtyard",
        theme: "garden",
        stacks: &[
            ("A1", &[Wall]),
            ("B1", &[Wall]),
            ("C1", &[Door, Door]),
            ("D1", &[Wall]),
            ("C3", &[Floor, Table]),
            ("B4", &[Plant]),
            ("D4", &[Plant]),
        ],
    },
];

/// Targets for a round, narrowed to the theme when the theme matches any of them.
pub fn pool(round: Round, theme: Option<&str>) -> Vec<&'static TargetSpec> {
    let all = match round {
        Round::One => ROUND_ONE,
        Round::Two => ROUND_TWO,
    };
    let themed: Vec<&'static TargetSpec> = match theme {
        Some(theme) => all
            .iter()
            .filter(|t| t.theme.eq_ignore_ascii_case(theme.trim()))
            .collect(),
        None => Vec::new(),
    };
    if themed.is_empty() {
        all.iter().collect()
    } else {
        themed
    }
}
