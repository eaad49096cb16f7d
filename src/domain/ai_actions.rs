// Extraction of block-placement actions embedded in untrusted assistant text.
//
// Grammar: any number of `<actions>JSON-ARRAY</actions>` regions inside free text.
// Every region is stripped from the displayed text. Each array entry gets its own
// verdict; a bad entry never takes its siblings down with it.

use crate::domain::block::BlockType;
use crate::domain::grid::Grid;
use serde_json::Value;

const OPEN_TAG: &str = "<actions>";
const CLOSE_TAG: &str = "</actions>";

/// Upper bound on accepted actions per reply to keep one reply's broadcast bounded.
pub const MAX_ACTIONS_PER_REPLY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildAction {
    pub row: usize,
    pub col: usize,
    pub block: BlockType,
    pub height: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionBounds {
    pub size: usize,
    pub max_height: usize,
}

impl From<&Grid> for ActionBounds {
    fn from(grid: &Grid) -> Self {
        Self {
            size: grid.size(),
            max_height: grid.max_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Region body was not JSON at all.
    MalformedJson,
    /// Region body parsed but was not an array.
    NotAnArray,
    /// `<actions>` without a closing tag; the tail was dropped.
    Unterminated,
    NotAnObject,
    MissingField(&'static str),
    NotAnInteger(&'static str),
    UnknownBlock(String),
    OutOfBounds { row: i64, col: i64 },
    InvalidHeight(i64),
    TooMany,
}

/// Why a region or an entry inside a region was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAction {
    pub region: usize,
    /// Entry index inside the region's array; `None` for region-level failures.
    pub index: Option<usize>,
    pub reason: Rejection,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedReply {
    pub display_text: String,
    pub actions: Vec<BuildAction>,
    pub rejected: Vec<RejectedAction>,
}

/// Splits an assistant reply into chat text and validated build actions. Never panics.
pub fn parse_reply(text: &str, bounds: ActionBounds) -> ParsedReply {
    let (display, regions, unterminated) = split_regions(text);

    let mut reply = ParsedReply {
        display_text: tidy_display(&display),
        ..ParsedReply::default()
    };

    for (region_idx, body) in regions.iter().enumerate() {
        parse_region(region_idx, body, bounds, &mut reply);
    }

    if unterminated {
        reply.rejected.push(RejectedAction {
            region: regions.len(),
            index: None,
            reason: Rejection::Unterminated,
        });
    }

    reply
}

// Returns (text outside regions, region bodies, saw an unclosed open tag).
fn split_regions(text: &str) -> (String, Vec<&str>, bool) {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let mut display = String::with_capacity(text.len());
    let mut regions = Vec::new();
    let mut cursor = 0;

    loop {
        let Some(open) = lower[cursor..].find(OPEN_TAG).map(|i| cursor + i) else {
            display.push_str(&remove_stray_close_tags(&text[cursor..]));
            return (display, regions, false);
        };
        display.push_str(&remove_stray_close_tags(&text[cursor..open]));

        let body_start = open + OPEN_TAG.len();
        let Some(close) = lower[body_start..].find(CLOSE_TAG).map(|i| body_start + i) else {
            return (display, regions, true);
        };
        regions.push(&text[body_start..close]);
        cursor = close + CLOSE_TAG.len();
    }
}

fn remove_stray_close_tags(segment: &str) -> String {
    let lower = segment.to_ascii_lowercase();
    let mut out = String::with_capacity(segment.len());
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(CLOSE_TAG).map(|i| cursor + i) {
        out.push_str(&segment[cursor..pos]);
        cursor = pos + CLOSE_TAG.len();
    }
    out.push_str(&segment[cursor..]);
    out
}

fn tidy_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out.trim().to_string()
}

// Models often wrap JSON in markdown fences even inside the tags.
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    let rest = rest.trim_start();
    rest.strip_prefix("json").unwrap_or(rest).trim()
}

fn parse_region(region: usize, body: &str, bounds: ActionBounds, reply: &mut ParsedReply) {
    let value = match serde_json::from_str::<Value>(strip_code_fence(body)) {
        Ok(value) => value,
        Err(_) => {
            reply.rejected.push(RejectedAction {
                region,
                index: None,
                reason: Rejection::MalformedJson,
            });
            return;
        }
    };

    let Value::Array(entries) = value else {
        reply.rejected.push(RejectedAction {
            region,
            index: None,
            reason: Rejection::NotAnArray,
        });
        return;
    };

    for (index, entry) in entries.iter().enumerate() {
        let verdict = if reply.actions.len() >= MAX_ACTIONS_PER_REPLY {
            Err(Rejection::TooMany)
        } else {
            validate_entry(entry, bounds)
        };
        match verdict {
            Ok(action) => reply.actions.push(action),
            Err(reason) => reply.rejected.push(RejectedAction {
                region,
                index: Some(index),
                reason,
            }),
        }
    }
}

/// Whitelist validation for one candidate action.
pub fn validate_entry(entry: &Value, bounds: ActionBounds) -> Result<BuildAction, Rejection> {
    let Value::Object(fields) = entry else {
        return Err(Rejection::NotAnObject);
    };

    let block = match fields.get("block") {
        Some(Value::String(name)) => name
            .parse::<BlockType>()
            .map_err(|_| Rejection::UnknownBlock(name.clone()))?,
        Some(_) => return Err(Rejection::UnknownBlock(String::new())),
        None => return Err(Rejection::MissingField("block")),
    };

    let row = integer_field(fields, "row")?;
    let col = integer_field(fields, "col")?;
    let in_range = |v: i64| v >= 0 && (v as u64) < bounds.size as u64;
    if !in_range(row) || !in_range(col) {
        return Err(Rejection::OutOfBounds { row, col });
    }

    let height = match fields.get("height") {
        None | Some(Value::Null) => None,
        Some(_) => {
            let height = integer_field(fields, "height")?;
            if height < 0 || (height as u64) >= bounds.max_height as u64 {
                return Err(Rejection::InvalidHeight(height));
            }
            Some(height as usize)
        }
    };

    Ok(BuildAction {
        row: row as usize,
        col: col as usize,
        block,
        height,
    })
}

fn integer_field(
    fields: &serde_json::Map<String, Value>,
    name: &'static str,
) -> Result<i64, Rejection> {
    match fields.get(name) {
        Some(value) => value.as_i64().ok_or(Rejection::NotAnInteger(name)),
        None => Err(Rejection::MissingField(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid::{GRID_SIZE, MAX_HEIGHT};

    fn bounds() -> ActionBounds {
        ActionBounds {
            size: GRID_SIZE,
            max_height: MAX_HEIGHT,
        }
    }

    #[test]
    fn plain_text_passes_through() {
        let reply = parse_reply("Put a wall at B3, then a roof.", bounds());
        assert_eq!(reply.display_text, "Put a wall at B3, then a roof.");
        assert!(reply.actions.is_empty());
        assert!(reply.rejected.is_empty());
    }

    #[test]
    fn extracts_actions_and_strips_the_region() {
        let text = r#"On it!
<actions>[{"row": 2, "col": 1, "block": "wall"}, {"row": 0, "col": 0, "block": "door", "height": 0}]</actions>
Placed two blocks."#;
        let reply = parse_reply(text, bounds());
        assert_eq!(reply.display_text, "On it!\n\nPlaced two blocks.");
        assert_eq!(
            reply.actions,
            vec![
                BuildAction {
                    row: 2,
                    col: 1,
                    block: BlockType::Wall,
                    height: None
                },
                BuildAction {
                    row: 0,
                    col: 0,
                    block: BlockType::Door,
                    height: Some(0)
                },
            ]
        );
    }

    #[test]
    fn valid_siblings_survive_invalid_entries() {
        let text = r#"<actions>[
            {"row": 1, "col": 1, "block": "roof"},
            {"row": 99, "col": 1, "block": "roof"},
            {"row": 1, "col": 2, "block": "lava"},
            {"row": 1.5, "col": 2, "block": "wall"},
            "wall",
            {"col": 3, "block": "wall"},
            {"row": 2, "col": 2, "block": "PIPE"}
        ]</actions>"#;
        let reply = parse_reply(text, bounds());
        assert_eq!(reply.actions.len(), 2);
        assert_eq!(reply.actions[1].block, BlockType::Pipe);
        let reasons: Vec<_> = reply.rejected.iter().map(|r| r.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                Rejection::OutOfBounds { row: 99, col: 1 },
                Rejection::UnknownBlock("lava".to_string()),
                Rejection::NotAnInteger("row"),
                Rejection::NotAnObject,
                Rejection::MissingField("row"),
            ]
        );
        assert_eq!(reply.display_text, "");
    }

    #[test]
    fn malformed_region_is_skipped_not_fatal() {
        let text = r#"a <actions>not json</actions> b <actions>[{"row":0,"col":0,"block":"wall"}]</actions> c"#;
        let reply = parse_reply(text, bounds());
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(reply.rejected.len(), 1);
        assert_eq!(reply.rejected[0].reason, Rejection::MalformedJson);
        assert_eq!(reply.display_text, "a  b  c");
    }

    #[test]
    fn object_region_is_not_an_array() {
        let reply = parse_reply(r#"<actions>{"row":0,"col":0,"block":"wall"}</actions>"#, bounds());
        assert!(reply.actions.is_empty());
        assert_eq!(reply.rejected[0].reason, Rejection::NotAnArray);
    }

    #[test]
    fn unterminated_tag_hides_the_tail() {
        let reply = parse_reply(r#"Building now <actions>[{"row":0,"col":0"#, bounds());
        assert_eq!(reply.display_text, "Building now");
        assert!(reply.actions.is_empty());
        assert_eq!(reply.rejected[0].reason, Rejection::Unterminated);
    }

    #[test]
    fn stray_close_tags_and_mixed_case_are_removed() {
        let text = r#"Done</actions> ok <ACTIONS>[{"row":0,"col":0,"block":"plant"}]</Actions>"#;
        let reply = parse_reply(text, bounds());
        assert_eq!(reply.display_text, "Done ok");
        assert_eq!(reply.actions.len(), 1);
        assert!(!reply.display_text.contains('<'));
    }

    #[test]
    fn code_fences_inside_regions_are_tolerated() {
        let text = "<actions>\n```json\n[{\"row\":3,\"col\":4,\"block\":\"window\"}]\n```\n</actions>";
        let reply = parse_reply(text, bounds());
        assert_eq!(reply.actions.len(), 1);
    }

    #[test]
    fn height_must_be_below_max() {
        let text = format!(
            r#"<actions>[{{"row":0,"col":0,"block":"wall","height":{MAX_HEIGHT}}},{{"row":0,"col":0,"block":"wall","height":null}}]</actions>"#
        );
        let reply = parse_reply(&text, bounds());
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(
            reply.rejected[0].reason,
            Rejection::InvalidHeight(MAX_HEIGHT as i64)
        );
    }

    #[test]
    fn reply_size_is_capped() {
        let entries: Vec<String> = (0..MAX_ACTIONS_PER_REPLY + 5)
            .map(|_| r#"{"row":0,"col":0,"block":"wall"}"#.to_string())
            .collect();
        let text = format!("<actions>[{}]</actions>", entries.join(","));
        let reply = parse_reply(&text, bounds());
        assert_eq!(reply.actions.len(), MAX_ACTIONS_PER_REPLY);
        assert_eq!(reply.rejected.len(), 5);
    }

    #[test]
    fn never_panics_on_hostile_input() {
        let samples = [
            "",
            "<actions>",
            "</actions>",
            "<actions></actions>",
            "<actions><actions>[]</actions></actions>",
            "<actions>[{\"row\": -1, \"col\": 0, \"block\": \"wall\"}]</actions>",
            "<actions>[{\"row\": 18446744073709551615, \"col\": 0, \"block\": \"wall\"}]</actions>",
            "<actions>[null, [], {}, 3, \"x\"]</actions>",
            "émoji 🧱 <actions>[{\"row\":0,\"col\":0,\"block\":\"wäll\"}]</actions> ünïcode",
            "<actio",
            "<<actions>>[]<</actions>>",
        ];
        for sample in samples {
            let reply = parse_reply(sample, bounds());
            assert!(!reply.display_text.to_ascii_lowercase().contains("<actions>"));
            assert!(!reply.display_text.to_ascii_lowercase().contains("</actions>"));
        }
    }
}
