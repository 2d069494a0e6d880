//! Reply parsing: first choice's content → five positional fields.
//!
//! The split is a plain `split(',')` with no quoting. A comma inside a
//! field shifts every later field one slot to the right and anything past
//! the fifth slot is dropped. The instruction text asks the model not to
//! emit commas inside values; nothing here tries to repair it.

use super::types::InferenceResponse;
use serde::Serialize;
use thiserror::Error;

/// Score used when the reply has no fourth field.
pub const DEFAULT_SCORE: &str = "0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("response contained no choices")]
    NoChoices,
}

/// The five fields the model was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedResult {
    pub name: String,
    pub job: String,
    pub species: String,
    /// Numeric-looking, not guaranteed to parse as an integer.
    pub score: String,
    pub rationale: String,
}

impl ParsedResult {
    /// Label shown to the user: the name, or `species(job)` when the
    /// model reported the name as unknown.
    pub fn display_label(&self, unknown_sentinel: &str) -> String {
        if self.name == unknown_sentinel {
            format!("{}({})", self.species, self.job)
        } else {
            self.name.clone()
        }
    }
}

/// Parse `choices[0].message.content`.
pub fn parse(response: &InferenceResponse) -> Result<ParsedResult, ParseError> {
    let choice = response.choices.first().ok_or(ParseError::NoChoices)?;
    Ok(parse_content(choice.message.text()))
}

/// Split one reply line into the five fields. Missing trailing fields
/// become empty, except the score which becomes `"0"`. Only the trailing
/// line break is stripped; fields are otherwise kept verbatim.
pub fn parse_content(content: &str) -> ParsedResult {
    let mut fields = content.trim_end_matches(['\r', '\n']).split(',');
    let mut next = || fields.next().map(str::to_string);

    let name = next().unwrap_or_default();
    let job = next().unwrap_or_default();
    let species = next().unwrap_or_default();
    let score = next().unwrap_or_else(|| DEFAULT_SCORE.to_string());
    let rationale = next().unwrap_or_default();

    ParsedResult {
        name,
        job,
        species,
        score,
        rationale,
    }
}
