// Closed block vocabulary shared by grids, targets, scoring and AI actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Wall,
    Floor,
    Roof,
    Window,
    Door,
    Plant,
    Table,
    Metal,
    Concrete,
    Barrel,
    Pipe,
    // Invisible spacer that occupies a layer so blocks can sit above it.
    Air,
    // Erase instruction; never stored inside a stack.
    Empty,
}

impl BlockType {
    pub const ALL: [BlockType; 13] = [
        BlockType::Wall,
        BlockType::Floor,
        BlockType::Roof,
        BlockType::Window,
        BlockType::Door,
        BlockType::Plant,
        BlockType::Table,
        BlockType::Metal,
        BlockType::Concrete,
        BlockType::Barrel,
        BlockType::Pipe,
        BlockType::Air,
        BlockType::Empty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Wall => "wall",
            BlockType::Floor => "floor",
            BlockType::Roof => "roof",
            BlockType::Window => "window",
            BlockType::Door => "door",
            BlockType::Plant => "plant",
            BlockType::Table => "table",
            BlockType::Metal => "metal",
            BlockType::Concrete => "concrete",
            BlockType::Barrel => "barrel",
            BlockType::Pipe => "pipe",
            BlockType::Air => "air",
            BlockType::Empty => "empty",
        }
    }

    /// True for blocks that are visible and count as a placement when scoring.
    pub fn is_solid(self) -> bool {
        !matches!(self, BlockType::Air | BlockType::Empty)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBlock(pub String);

impl fmt::Display for UnknownBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown block type '{}'", self.0)
    }
}

impl std::error::Error for UnknownBlock {}

impl FromStr for BlockType {
    type Err = UnknownBlock;

    // Whitelist lookup; whitespace and case are forgiven, nothing else is.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        BlockType::ALL
            .iter()
            .copied()
            .find(|block| block.as_str() == needle)
            .ok_or_else(|| UnknownBlock(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_block_name() {
        for block in BlockType::ALL {
            assert_eq!(block.as_str().parse::<BlockType>(), Ok(block));
        }
        assert_eq!(" Door ".parse::<BlockType>(), Ok(BlockType::Door));
    }

    #[test]
    fn rejects_names_outside_the_vocabulary() {
        assert!("lava".parse::<BlockType>().is_err());
        assert!("".parse::<BlockType>().is_err());
        assert!("wall;drop".parse::<BlockType>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&BlockType::Concrete).expect("serialize");
        assert_eq!(json, "\"concrete\"");
    }
}
