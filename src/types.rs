use serde::{Deserialize, Serialize};
use shakmaty::Color;
use smallvec::SmallVec;

/// Clean SAN tokens of one game, in play order.
pub type MoveSequence = SmallVec<[String; 128]>;

/// One row of the input dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub move_text: String,
    /// The side played by the subject ("new") player.
    pub subject_color: Color,
}

impl GameRecord {
    pub fn new(move_text: impl Into<String>, subject_color: Color) -> Self {
        Self {
            move_text: move_text.into(),
            subject_color,
        }
    }
}

/// Parse `white`/`black` (or `w`/`b`), case-insensitive.
pub fn parse_color(raw: &str) -> Option<Color> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Some(Color::White),
        "black" | "b" => Some(Color::Black),
        _ => None,
    }
}

/// Engine score, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Evaluation {
    #[serde(rename = "cp")]
    Centipawns(i32),
    /// Moves to mate; positive when White mates.
    #[serde(rename = "mate")]
    Mate(i32),
}

impl Evaluation {
    /// The same score seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::Centipawns(cp) => Self::Centipawns(-cp),
            Self::Mate(n) => Self::Mate(-n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMove {
    #[serde(rename = "move")]
    pub uci: String,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyRecord {
    pub ply_index: usize,
    /// FEN of the position before the move was played.
    pub position: String,
    /// The move actually played from `position`, in SAN.
    pub san: String,
    pub evaluation: Evaluation,
    /// Engine's best moves, best first; only on the subject's turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_candidates: Option<Vec<EngineMove>>,
}

/// All ply records of one game, indexed by ply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    #[serde(with = "color_name")]
    pub subject_color: Color,
    pub plies: Vec<PlyRecord>,
}

impl GameResult {
    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    pub fn ply(&self, index: usize) -> Option<&PlyRecord> {
        self.plies.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlyRecord> {
        self.plies.iter()
    }
}

pub(crate) mod color_name {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if color.is_white() { "white" } else { "black" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_color(&raw)
            .ok_or_else(|| de::Error::custom(format!("unknown color '{raw}'")))
    }
}
