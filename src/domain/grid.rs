// Per-team 3D block grid: a fixed 2D array of contiguous block stacks.

use crate::domain::block::BlockType;

pub const GRID_SIZE: usize = 6;
pub const MAX_HEIGHT: usize = 5;

/// A single changed layer produced by a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerChange {
    pub row: usize,
    pub col: usize,
    pub height: usize,
    pub block: BlockType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    OutOfBounds { row: i64, col: i64 },
    StackFull { row: usize, col: usize },
    StackEmpty { row: usize, col: usize },
    InvalidHeight { height: usize },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::OutOfBounds { row, col } => write!(f, "cell ({row}, {col}) is out of bounds"),
            GridError::StackFull { row, col } => write!(f, "stack at ({row}, {col}) is full"),
            GridError::StackEmpty { row, col } => write!(f, "stack at ({row}, {col}) is empty"),
            GridError::InvalidHeight { height } => write!(f, "height {height} is not writable"),
        }
    }
}

impl std::error::Error for GridError {}

/// Square grid of stacks. Stacks never hold `Empty` and never have gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: usize,
    max_height: usize,
    stacks: Vec<Vec<BlockType>>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(GRID_SIZE, MAX_HEIGHT)
    }
}

impl Grid {
    pub fn new(size: usize, max_height: usize) -> Self {
        Self {
            size,
            max_height,
            stacks: vec![Vec::new(); size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_height(&self) -> usize {
        self.max_height
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size
    }

    /// Converts signed wire coordinates into a checked cell index.
    pub fn checked_cell(&self, row: i64, col: i64) -> Result<(usize, usize), GridError> {
        let out_of_bounds = GridError::OutOfBounds { row, col };
        let r = usize::try_from(row).map_err(|_| out_of_bounds)?;
        let c = usize::try_from(col).map_err(|_| out_of_bounds)?;
        if !self.in_bounds(r, c) {
            return Err(out_of_bounds);
        }
        Ok((r, c))
    }

    pub fn stack(&self, row: usize, col: usize) -> &[BlockType] {
        if !self.in_bounds(row, col) {
            return &[];
        }
        &self.stacks[row * self.size + col]
    }

    pub fn height_of(&self, row: usize, col: usize) -> usize {
        self.stack(row, col).len()
    }

    pub fn block_at(&self, row: usize, col: usize, height: usize) -> BlockType {
        self.stack(row, col)
            .get(height)
            .copied()
            .unwrap_or(BlockType::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.iter().all(Vec::is_empty)
    }

    pub fn block_count(&self) -> usize {
        self.stacks.iter().map(Vec::len).sum()
    }

    /// Iterates `(row, col, stack)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, &[BlockType])> {
        self.stacks
            .iter()
            .enumerate()
            .map(|(idx, stack)| (idx / self.size, idx % self.size, stack.as_slice()))
    }

    pub fn clear(&mut self) {
        for stack in &mut self.stacks {
            stack.clear();
        }
    }

    /// Stack push/pop placement used by players and by AI actions without a height.
    ///
    /// Ordinary blocks land on the lowest empty layer, `empty` pops the top layer,
    /// and `door` adds one auto-filled door above itself when that layer is free,
    /// unless the door was itself placed on a door.
    pub fn place_block(
        &mut self,
        row: usize,
        col: usize,
        block: BlockType,
    ) -> Result<Vec<LayerChange>, GridError> {
        if !self.in_bounds(row, col) {
            return Err(GridError::OutOfBounds {
                row: row as i64,
                col: col as i64,
            });
        }

        if block == BlockType::Empty {
            return self.pop(row, col).map(|change| vec![change]);
        }

        let placed = self.push(row, col, block)?;
        let mut changes = vec![placed];
        if block == BlockType::Door && self.should_auto_fill_door(row, col, placed.height) {
            changes.push(self.push(row, col, BlockType::Door)?);
        }
        Ok(changes)
    }

    /// Explicit-height placement. Heights above the stack fall to the top of it.
    pub fn place_at(
        &mut self,
        row: usize,
        col: usize,
        height: usize,
        block: BlockType,
    ) -> Result<Vec<LayerChange>, GridError> {
        if !self.in_bounds(row, col) {
            return Err(GridError::OutOfBounds {
                row: row as i64,
                col: col as i64,
            });
        }
        if height >= self.max_height {
            return Err(GridError::InvalidHeight { height });
        }

        let len = self.height_of(row, col);
        if block == BlockType::Empty {
            // Only the top layer can be erased.
            if height + 1 != len {
                return Err(GridError::InvalidHeight { height });
            }
            return self.pop(row, col).map(|change| vec![change]);
        }
        if height >= len {
            return self.place_block(row, col, block);
        }

        let idx = row * self.size + col;
        self.stacks[idx][height] = block;
        Ok(vec![LayerChange {
            row,
            col,
            height,
            block,
        }])
    }

    /// Replaces a whole stack; used when building targets and designs.
    pub fn set_stack(
        &mut self,
        row: usize,
        col: usize,
        blocks: &[BlockType],
    ) -> Result<(), GridError> {
        if !self.in_bounds(row, col) {
            return Err(GridError::OutOfBounds {
                row: row as i64,
                col: col as i64,
            });
        }
        if blocks.len() > self.max_height {
            return Err(GridError::StackFull { row, col });
        }
        if let Some(height) = blocks.iter().position(|b| *b == BlockType::Empty) {
            return Err(GridError::InvalidHeight { height });
        }
        let idx = row * self.size + col;
        self.stacks[idx] = blocks.to_vec();
        Ok(())
    }

    fn push(&mut self, row: usize, col: usize, block: BlockType) -> Result<LayerChange, GridError> {
        let idx = row * self.size + col;
        let stack = &mut self.stacks[idx];
        if stack.len() >= self.max_height {
            return Err(GridError::StackFull { row, col });
        }
        let height = stack.len();
        stack.push(block);
        Ok(LayerChange {
            row,
            col,
            height,
            block,
        })
    }

    fn pop(&mut self, row: usize, col: usize) -> Result<LayerChange, GridError> {
        let idx = row * self.size + col;
        let stack = &mut self.stacks[idx];
        if stack.pop().is_none() {
            return Err(GridError::StackEmpty { row, col });
        }
        Ok(LayerChange {
            row,
            col,
            height: stack.len(),
            block: BlockType::Empty,
        })
    }

    fn should_auto_fill_door(&self, row: usize, col: usize, door_height: usize) -> bool {
        let above = door_height + 1;
        if above >= self.max_height || self.block_at(row, col, above) != BlockType::Empty {
            return false;
        }
        // A door resting on a door is already the upper half; never cascade.
        door_height == 0 || self.block_at(row, col, door_height - 1) != BlockType::Door
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_blocks_push_onto_the_lowest_empty_layer() {
        let mut grid = Grid::default();
        let first = grid.place_block(1, 2, BlockType::Wall).expect("place");
        let second = grid.place_block(1, 2, BlockType::Roof).expect("place");

        assert_eq!(first[0].height, 0);
        assert_eq!(second[0].height, 1);
        assert_eq!(grid.stack(1, 2), &[BlockType::Wall, BlockType::Roof]);
    }

    #[test]
    fn empty_pops_the_top_layer() {
        let mut grid = Grid::default();
        grid.place_block(0, 0, BlockType::Wall).expect("place");
        grid.place_block(0, 0, BlockType::Window).expect("place");

        let changes = grid.place_block(0, 0, BlockType::Empty).expect("pop");
        assert_eq!(
            changes,
            vec![LayerChange {
                row: 0,
                col: 0,
                height: 1,
                block: BlockType::Empty
            }]
        );
        assert_eq!(grid.stack(0, 0), &[BlockType::Wall]);
        assert_eq!(
            Grid::default().place_block(0, 0, BlockType::Empty),
            Err(GridError::StackEmpty { row: 0, col: 0 })
        );
    }

    #[test]
    fn full_stack_rejects_push() {
        let mut grid = Grid::new(2, 2);
        grid.place_block(0, 0, BlockType::Wall).expect("place");
        grid.place_block(0, 0, BlockType::Wall).expect("place");
        assert_eq!(
            grid.place_block(0, 0, BlockType::Wall),
            Err(GridError::StackFull { row: 0, col: 0 })
        );
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut grid = Grid::default();
        assert!(matches!(
            grid.place_block(GRID_SIZE, 0, BlockType::Wall),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(grid.checked_cell(-1, 0).is_err());
        assert!(grid.checked_cell(0, GRID_SIZE as i64).is_err());
        assert_eq!(grid.checked_cell(2, 3), Ok((2, 3)));
    }

    #[test]
    fn door_auto_fills_exactly_one_layer() {
        let mut grid = Grid::default();
        let changes = grid.place_block(3, 3, BlockType::Door).expect("door");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].height, 1);
        assert_eq!(grid.stack(3, 3), &[BlockType::Door, BlockType::Door]);
    }

    #[test]
    fn door_on_top_of_door_does_not_cascade() {
        let mut grid = Grid::default();
        grid.place_block(0, 0, BlockType::Door).expect("door");
        let changes = grid.place_block(0, 0, BlockType::Door).expect("door");
        assert_eq!(changes.len(), 1);
        assert_eq!(grid.height_of(0, 0), 3);
    }

    #[test]
    fn door_at_the_ceiling_has_no_room_to_fill() {
        let mut grid = Grid::new(1, 2);
        grid.place_block(0, 0, BlockType::Floor).expect("floor");
        let changes = grid.place_block(0, 0, BlockType::Door).expect("door");
        assert_eq!(changes.len(), 1);
        assert_eq!(grid.stack(0, 0), &[BlockType::Floor, BlockType::Door]);
    }

    #[test]
    fn repeated_door_placements_never_auto_fill_more_than_once_each() {
        let blocks = [
            BlockType::Door,
            BlockType::Door,
            BlockType::Wall,
            BlockType::Door,
            BlockType::Empty,
            BlockType::Door,
            BlockType::Door,
        ];
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                let mut grid = Grid::default();
                for (step, block) in blocks.iter().cycle().take(20).enumerate() {
                    let before = grid.stack(row, col).to_vec();
                    let Ok(changes) = grid.place_block(row, col, *block) else {
                        continue;
                    };
                    assert!(changes.len() <= 2, "step {step} changed too many layers");
                    if changes.len() == 2 {
                        // The auto-filled layer sits directly above a manual door
                        // that itself did not rest on a door.
                        let base = changes[0].height;
                        assert_eq!(changes[1].height, base + 1);
                        assert!(base == 0 || before[base - 1] != BlockType::Door);
                    }
                }
            }
        }
    }

    #[test]
    fn place_at_replaces_existing_layer() {
        let mut grid = Grid::default();
        grid.place_block(2, 2, BlockType::Wall).expect("place");
        grid.place_block(2, 2, BlockType::Wall).expect("place");

        let changes = grid.place_at(2, 2, 0, BlockType::Concrete).expect("replace");
        assert_eq!(changes.len(), 1);
        assert_eq!(grid.stack(2, 2), &[BlockType::Concrete, BlockType::Wall]);
    }

    #[test]
    fn place_at_above_the_stack_falls_to_the_top() {
        let mut grid = Grid::default();
        let changes = grid.place_at(4, 1, 3, BlockType::Pipe).expect("place");
        assert_eq!(changes[0].height, 0);
    }

    #[test]
    fn place_at_only_erases_the_top_layer() {
        let mut grid = Grid::default();
        grid.place_block(0, 1, BlockType::Wall).expect("place");
        grid.place_block(0, 1, BlockType::Roof).expect("place");
        assert_eq!(
            grid.place_at(0, 1, 0, BlockType::Empty),
            Err(GridError::InvalidHeight { height: 0 })
        );
        assert_eq!(
            grid.place_at(0, 1, 4, BlockType::Empty),
            Err(GridError::InvalidHeight { height: 4 })
        );
        assert_eq!(grid.height_of(0, 1), 2);
        assert!(grid.place_at(0, 1, 1, BlockType::Empty).is_ok());
        assert_eq!(
            grid.place_at(3, 3, 0, BlockType::Empty),
            Err(GridError::InvalidHeight { height: 0 })
        );
        assert_eq!(
            grid.place_at(0, 1, MAX_HEIGHT, BlockType::Wall),
            Err(GridError::InvalidHeight { height: MAX_HEIGHT })
        );
    }

    #[test]
    fn clones_are_independent_snapshots() {
        let mut grid = Grid::default();
        grid.place_block(0, 0, BlockType::Wall).expect("place");
        let snapshot = grid.clone();
        grid.place_block(0, 0, BlockType::Roof).expect("place");
        grid.clear();
        assert_eq!(snapshot.stack(0, 0), &[BlockType::Wall]);
        assert!(grid.is_empty());
    }
}
