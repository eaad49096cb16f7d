// Four-letter room codes drawn from an alphabet without look-alike letters.

use rand::Rng;
use std::fmt;

pub const ROOM_CODE_LEN: usize = 4;
// No I or O: they read as 1 and 0 when codes are shared aloud or on screen.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Case-insensitive parse; surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self, RoomCodeError> {
        let normalized = value.trim().to_ascii_uppercase();
        let found = normalized.chars().count();
        if found != ROOM_CODE_LEN {
            return Err(RoomCodeError::InvalidLength {
                expected: ROOM_CODE_LEN,
                found,
            });
        }
        for (index, ch) in normalized.chars().enumerate() {
            if !ROOM_CODE_ALPHABET.contains(ch) {
                return Err(RoomCodeError::InvalidCharacter { ch, index });
            }
        }
        Ok(Self(normalized))
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let alphabet = ROOM_CODE_ALPHABET.as_bytes();
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCodeError {
    InvalidLength { expected: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
}

impl fmt::Display for RoomCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomCodeError::InvalidLength { expected, found } => {
                write!(f, "room code must be {expected} letters, got {found}")
            }
            RoomCodeError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
        }
    }
}

impl std::error::Error for RoomCodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(RoomCode::parse(" abcd ").map(|c| c.0), Ok("ABCD".to_string()));
    }

    #[test]
    fn rejects_ambiguous_letters_and_bad_lengths() {
        assert_eq!(
            RoomCode::parse("ABIO"),
            Err(RoomCodeError::InvalidCharacter { ch: 'I', index: 2 })
        );
        assert!(matches!(
            RoomCode::parse("ABC"),
            Err(RoomCodeError::InvalidLength { found: 3, .. })
        ));
        assert!(RoomCode::parse("AB1D").is_err());
    }

    #[test]
    fn generated_codes_parse() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = RoomCode::generate(&mut rng);
            assert_eq!(RoomCode::parse(code.as_str()), Ok(code));
        }
    }
}
