//! Vocabulary loading
//!
//! The vocabulary file holds one `english,italian` pair per line. Both
//! directions are built from the same file: the forward table maps the first
//! field to the second, the reverse table the other way round.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Dictionary, HashTable};
use crate::error::{RelayError, Result};

/// Translation direction served by a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    EnglishToItalian,
    ItalianToEnglish,
}

impl Direction {
    /// Language label of the speaker, as used in `"<user> (<language>): ..."` prefixes
    pub fn source_language(&self) -> &'static str {
        match self {
            Direction::EnglishToItalian => "english",
            Direction::ItalianToEnglish => "italian",
        }
    }

    pub fn reversed(&self) -> Direction {
        match self {
            Direction::EnglishToItalian => Direction::ItalianToEnglish,
            Direction::ItalianToEnglish => Direction::EnglishToItalian,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::EnglishToItalian => write!(f, "english -> italian"),
            Direction::ItalianToEnglish => write!(f, "italian -> english"),
        }
    }
}

/// Forward and reverse dictionaries, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct Vocab {
    english_to_italian: Dictionary,
    italian_to_english: Dictionary,
}

impl Vocab {
    /// Load and parse a vocabulary file. A missing file or zero pairs is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::vocab(format!("failed to read {}: {}", path.display(), e))
        })?;

        let vocab = Self::parse(&contents)
            .map_err(|e| RelayError::vocab(format!("{}: {}", path.display(), e)))?;

        info!(
            "Loaded {} word pairs from {}",
            vocab.english_to_italian.len(),
            path.display()
        );
        Ok(vocab)
    }

    /// Parse `source,target` lines. Empty fields are skipped and lines with
    /// fewer than two fields ignored; a later pair for the same word wins.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut forward = HashTable::new();
        let mut reverse = HashTable::new();

        for (line_no, line) in contents.lines().enumerate() {
            let mut fields = line.split(',').filter(|field| !field.is_empty());
            match (fields.next(), fields.next()) {
                (Some(source), Some(target)) => {
                    if forward.contains_key(source) {
                        debug!("Vocabulary line {}: '{}' redefined", line_no + 1, source);
                    }
                    forward.insert(source, target);
                    reverse.insert(target, source);
                }
                _ => debug!("Skipping vocabulary line {}: {:?}", line_no + 1, line),
            }
        }

        if forward.is_empty() {
            return Err(RelayError::vocab("no word pairs found"));
        }

        Ok(Self {
            english_to_italian: forward.into(),
            italian_to_english: reverse.into(),
        })
    }

    /// Dictionary used by rooms translating in `direction`
    pub fn dictionary(&self, direction: Direction) -> &Dictionary {
        match direction {
            Direction::EnglishToItalian => &self.english_to_italian,
            Direction::ItalianToEnglish => &self.italian_to_english,
        }
    }
}
