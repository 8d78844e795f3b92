use std::io::{self, BufRead, BufReader, Read};

use serde::Deserialize;

use super::RecordSet;
use crate::types::{GameRecord, parse_color};

#[derive(Deserialize)]
struct RawRow {
    #[serde(alias = "moves", alias = "AN")]
    move_text: String,
    #[serde(alias = "new_pl_color")]
    subject_color: String,
}

/// Read one JSON object per line. Blank lines are ignored; any other line
/// takes a row, even when it cannot be decoded.
pub fn parse_json_lines<R: Read>(input: R) -> io::Result<RecordSet> {
    let mut rows = Vec::new();
    for line in BufReader::new(input).split(b'\n') {
        let line = line?;
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        rows.push(decode_row(text));
    }
    Ok(RecordSet::new(rows))
}

fn decode_row(text: &str) -> Result<GameRecord, String> {
    let raw: RawRow = serde_json::from_str(text).map_err(|e| format!("undecodable row: {e}"))?;
    let color = parse_color(&raw.subject_color)
        .ok_or_else(|| format!("unknown subject colour '{}'", raw.subject_color))?;
    Ok(GameRecord::new(raw.move_text, color))
}
