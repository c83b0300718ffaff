//! Mood enumeration shared with the face renderer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Discrete facial expression state
///
/// The lowercase variant name is the wire value. The client-side renderer
/// keys its expression table by exactly these names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Love,
    Dizzy,
    Doubtful,
    Wink,
    Scared,
    Disappointed,
    Innocent,
    Worried,
    Thinking,
    Sleepy,
}

impl Mood {
    /// Every mood in declaration order
    pub const ALL: [Mood; 15] = [
        Mood::Neutral,
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Surprised,
        Mood::Love,
        Mood::Dizzy,
        Mood::Doubtful,
        Mood::Wink,
        Mood::Scared,
        Mood::Disappointed,
        Mood::Innocent,
        Mood::Worried,
        Mood::Thinking,
        Mood::Sleepy,
    ];

    /// Wire name of the mood
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Surprised => "surprised",
            Mood::Love => "love",
            Mood::Dizzy => "dizzy",
            Mood::Doubtful => "doubtful",
            Mood::Wink => "wink",
            Mood::Scared => "scared",
            Mood::Disappointed => "disappointed",
            Mood::Innocent => "innocent",
            Mood::Worried => "worried",
            Mood::Thinking => "thinking",
            Mood::Sleepy => "sleepy",
        }
    }

    /// Moods cycled by demo mode: everything except neutral, in declaration order
    pub fn demo_sequence() -> impl Iterator<Item = Mood> {
        Self::ALL.into_iter().filter(|mood| *mood != Mood::Neutral)
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name is not part of the enumeration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mood '{0}'")]
pub struct UnknownMood(pub String);

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mood| mood.as_str() == s)
            .ok_or_else(|| UnknownMood(s.to_string()))
    }
}
