// Chess-style cell names: column letter then 1-based row number ("A1" is row 0, col 0).

use crate::domain::grid::Grid;

pub fn cell_name(row: usize, col: usize) -> String {
    let letter = (b'A' + (col % 26) as u8) as char;
    format!("{letter}{}", row + 1)
}

pub fn parse_cell(name: &str) -> Option<(usize, usize)> {
    let name = name.trim();
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !letter.is_ascii_uppercase() {
        return None;
    }
    let number: usize = chars.as_str().parse().ok()?;
    if number == 0 {
        return None;
    }
    Some((number - 1, (letter as u8 - b'A') as usize))
}

/// One line per occupied stack, bottom layer first, e.g. `B3: wall, wall, roof`.
pub fn describe_grid(grid: &Grid) -> String {
    let lines: Vec<String> = grid
        .cells()
        .filter(|(_, _, stack)| !stack.is_empty())
        .map(|(row, col, stack)| {
            let layers: Vec<&str> = stack.iter().map(|b| b.as_str()).collect();
            format!("{}: {}", cell_name(row, col), layers.join(", "))
        })
        .collect();
    if lines.is_empty() {
        return "(empty)".to_string();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::block::BlockType;

    #[test]
    fn names_round_trip() {
        for row in 0..8 {
            for col in 0..8 {
                assert_eq!(parse_cell(&cell_name(row, col)), Some((row, col)));
            }
        }
        assert_eq!(cell_name(0, 0), "A1");
        assert_eq!(cell_name(2, 1), "B3");
        assert_eq!(parse_cell("b3"), Some((2, 1)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("A0"), None);
        assert_eq!(parse_cell("3B"), None);
        assert_eq!(parse_cell("A-1"), None);
    }

    #[test]
    fn describes_stacks_bottom_up() {
        let mut grid = Grid::default();
        assert_eq!(describe_grid(&grid), "(empty)");
        grid.set_stack(2, 1, &[BlockType::Wall, BlockType::Roof])
            .expect("stack");
        grid.set_stack(0, 0, &[BlockType::Door, BlockType::Door])
            .expect("stack");
        assert_eq!(describe_grid(&grid), "A1: door, door\nB3: wall, roof");
    }
}
