// Isometric grid <-> screen projection with camera rotation and height-aware picking.
//
// The viewport is a plain value threaded through callers; nothing here is global.

use crate::domain::grid::Grid;

/// Camera rotation in 90 degree steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn clockwise(self) -> Self {
        match self {
            Rotation::R0 => Rotation::R90,
            Rotation::R90 => Rotation::R180,
            Rotation::R180 => Rotation::R270,
            Rotation::R270 => Rotation::R0,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        match self {
            Rotation::R0 => Rotation::R270,
            Rotation::R90 => Rotation::R0,
            Rotation::R180 => Rotation::R90,
            Rotation::R270 => Rotation::R180,
        }
    }

    fn inverse(self) -> Self {
        match self {
            Rotation::R90 => Rotation::R270,
            Rotation::R270 => Rotation::R90,
            other => other,
        }
    }
}

/// Maps a grid cell into the rotated view's (row, col).
///
/// Cells outside `0..size` are clamped to the nearest edge first.
pub fn rotate(row: usize, col: usize, size: usize, rotation: Rotation) -> (usize, usize) {
    let last = size.saturating_sub(1);
    let (row, col) = (row.min(last), col.min(last));
    match rotation {
        Rotation::R0 => (row, col),
        Rotation::R90 => (col, last - row),
        Rotation::R180 => (last - row, last - col),
        Rotation::R270 => (last - col, row),
    }
}

/// Inverse of [`rotate`].
pub fn unrotate(row: usize, col: usize, size: usize, rotation: Rotation) -> (usize, usize) {
    rotate(row, col, size, rotation.inverse())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Full width of a tile's top-face diamond in pixels.
    pub tile_width: f32,
    /// Full height of a tile's top-face diamond in pixels (2:1 iso => width / 2).
    pub tile_height: f32,
    /// Vertical pixels per stacked layer.
    pub layer_height: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub grid_size: usize,
    pub rotation: Rotation,
}

impl Viewport {
    pub fn new(tile_width: f32, layer_height: f32, grid_size: usize) -> Self {
        Self {
            tile_width,
            tile_height: tile_width / 2.0,
            layer_height,
            origin_x: 0.0,
            origin_y: 0.0,
            grid_size,
            rotation: Rotation::R0,
        }
    }

    pub fn with_origin(mut self, x: f32, y: f32) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Centre of the ground-level top-face diamond for a cell.
    pub fn grid_to_screen(&self, row: usize, col: usize) -> ScreenPoint {
        let (r, c) = rotate(row, col, self.grid_size, self.rotation);
        let (r, c) = (r as f32, c as f32);
        ScreenPoint {
            x: self.origin_x + (c - r) * self.tile_width / 2.0,
            y: self.origin_y + (c + r) * self.tile_height / 2.0,
        }
    }

    /// Centre of the face `height` layers above the ground.
    pub fn grid_to_screen_at(&self, row: usize, col: usize, height: usize) -> ScreenPoint {
        let ground = self.grid_to_screen(row, col);
        ScreenPoint {
            x: ground.x,
            y: ground.y - height as f32 * self.layer_height,
        }
    }

    /// Flat ground-plane inverse; `None` outside the grid.
    pub fn screen_to_grid(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        if !x.is_finite() || !y.is_finite() || self.tile_width <= 0.0 || self.tile_height <= 0.0 {
            return None;
        }
        let a = (x - self.origin_x) / (self.tile_width / 2.0);
        let b = (y - self.origin_y) / (self.tile_height / 2.0);
        let col = ((a + b) / 2.0).round();
        let row = ((b - a) / 2.0).round();

        let size = self.grid_size as f32;
        if row < 0.0 || col < 0.0 || row >= size || col >= size {
            return None;
        }
        Some(unrotate(
            row as usize,
            col as usize,
            self.grid_size,
            self.rotation,
        ))
    }

    /// Picks the cell under a screen point, accounting for stack heights.
    ///
    /// Occupied stacks are tried tallest first (nearest to the camera on ties) against
    /// the top-face diamond of their highest block. Without a hit the flat ground-plane
    /// inverse decides.
    pub fn hit_test(&self, x: f32, y: f32, grid: &Grid) -> Option<(usize, usize)> {
        let mut candidates: Vec<(usize, usize, usize)> = grid
            .cells()
            .filter(|(_, _, stack)| !stack.is_empty())
            .map(|(row, col, stack)| (row, col, stack.len()))
            .collect();

        candidates.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| self.depth(b.0, b.1).cmp(&self.depth(a.0, a.1)))
                .then_with(|| (a.0, a.1).cmp(&(b.0, b.1)))
        });

        candidates
            .into_iter()
            .find(|(row, col, height)| self.in_top_face(x, y, *row, *col, *height))
            .map(|(row, col, _)| (row, col))
            .or_else(|| self.screen_to_grid(x, y))
    }

    /// Back-to-front painter's order for the current rotation.
    pub fn draw_order(&self) -> Vec<(usize, usize)> {
        let mut cells: Vec<(usize, usize)> = (0..self.grid_size)
            .flat_map(|row| (0..self.grid_size).map(move |col| (row, col)))
            .collect();
        cells.sort_by_key(|(row, col)| {
            let (r, c) = rotate(*row, *col, self.grid_size, self.rotation);
            (r + c, r)
        });
        cells
    }

    fn depth(&self, row: usize, col: usize) -> usize {
        let (r, c) = rotate(row, col, self.grid_size, self.rotation);
        r + c
    }

    fn in_top_face(&self, x: f32, y: f32, row: usize, col: usize, height: usize) -> bool {
        let centre = self.grid_to_screen_at(row, col, height);
        let dx = (x - centre.x).abs() / (self.tile_width / 2.0);
        let dy = (y - centre.y).abs() / (self.tile_height / 2.0);
        dx + dy <= 1.0
    }
}
