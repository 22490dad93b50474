//! Grant citation token normalization.
//!
//! PubMed lists funding as free-text tokens such as
//! `"U54 CA209997/CA/NCI NIH HHS/United States"`. Only consortium program codes
//! are of interest; everything after the first `/` (institute, agency, country)
//! is discarded.
//!
//! Tokens come in a handful of observed shapes, so parsing is a small ordered
//! list of [`TokenShape`] matchers rather than a general grammar. A token that
//! fits none of them is rejected, never guessed at, and the rejection is kept so
//! it can be audited by hand.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Consortium program codes recognized in grant tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramCode {
    /// Specialized center cooperative agreement
    U54,
    /// Research project cooperative agreement
    U01,
}

impl ProgramCode {
    /// All recognized codes, in matching order
    pub const ALL: [ProgramCode; 2] = [ProgramCode::U54, ProgramCode::U01];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramCode::U54 => "U54",
            ProgramCode::U01 => "U01",
        }
    }

    /// Detect the program code a token starts with (case-sensitive)
    pub fn detect(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| token.starts_with(code.as_str()))
    }
}

impl fmt::Display for ProgramCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized `(grant_type, grant_number)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantCitation {
    /// Program code, e.g. `U54`
    pub grant_type: String,
    /// Grant serial without separators or suffix, e.g. `CA209997`
    pub grant_number: String,
}

impl fmt::Display for GrantCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.grant_type, self.grant_number)
    }
}

/// Why a raw token produced no citation.
///
/// These are not errors: tokens are dropped on a best-effort basis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRejection {
    /// Token does not start with a recognized program code
    UnrecognizedProgram,
    /// Whitespace token count matched no known shape
    UnrecognizedShape { token_count: usize },
    /// Shape matched but no usable grant number could be cut out
    MalformedNumber,
}

impl GrantRejection {
    /// Whether the dropped token belongs to the consortium and deserves a manual look.
    ///
    /// Grants from other programs are expected noise.
    pub fn needs_review(&self) -> bool {
        !matches!(self, GrantRejection::UnrecognizedProgram)
    }
}

impl fmt::Display for GrantRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantRejection::UnrecognizedProgram => f.write_str("unrecognized program code"),
            GrantRejection::UnrecognizedShape { token_count } => {
                write!(f, "unrecognized shape ({} whitespace tokens)", token_count)
            }
            GrantRejection::MalformedNumber => f.write_str("malformed grant number"),
        }
    }
}

/// Token after separator cleanup, ready for shape matching
#[derive(Debug)]
pub struct ShapeInput<'a> {
    /// Recognized program code
    pub program: ProgramCode,
    /// Whitespace token count of the raw string (shape dispatch key)
    pub raw_token_count: usize,
    /// Whitespace tokens of the cleaned string
    pub tokens: Vec<&'a str>,
}

/// One observed grant token layout.
pub trait TokenShape: Send + Sync {
    /// Short name used in diagnostics
    fn name(&self) -> &'static str;

    /// Try to read a citation out of the token.
    ///
    /// `None` means "not my shape", letting the next matcher try.
    fn try_match(&self, input: &ShapeInput<'_>) -> Option<Result<GrantCitation, GrantRejection>>;
}

/// Four raw tokens: the code was glued to the number, e.g.
/// `U54CA209997/CA/NCI NIH HHS/United States`.
pub struct CompactShape;

impl TokenShape for CompactShape {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn try_match(&self, input: &ShapeInput<'_>) -> Option<Result<GrantCitation, GrantRejection>> {
        if input.raw_token_count != 4 || input.tokens.len() < 2 {
            return None;
        }
        Some(emit(input.program, input.tokens[0], input.tokens[1]))
    }
}

/// Five raw tokens, code and number already separated, e.g.
/// `U54 CA209997/CA/NCI NIH HHS/United States`.
pub struct StandardShape;

impl TokenShape for StandardShape {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn try_match(&self, input: &ShapeInput<'_>) -> Option<Result<GrantCitation, GrantRejection>> {
        if input.raw_token_count != 5 || input.tokens.len() < 2 || !input.tokens[1].contains('/') {
            return None;
        }
        Some(emit(input.program, input.tokens[0], input.tokens[1]))
    }
}

/// Five raw tokens where the institute prefix was split off the serial, e.g.
/// `U01 CA 215709/CA/NCI NIH/United States`.
///
/// Known defect pattern in PubMed listings: tokens 1 and 2 are rejoined.
pub struct SplitNumberShape;

impl TokenShape for SplitNumberShape {
    fn name(&self) -> &'static str {
        "split-number"
    }

    fn try_match(&self, input: &ShapeInput<'_>) -> Option<Result<GrantCitation, GrantRejection>> {
        if input.raw_token_count != 5 || input.tokens.len() < 3 {
            return None;
        }
        if input.tokens[1].contains('/') || !input.tokens[2].contains('/') {
            return None;
        }
        let joined = format!("{}{}", input.tokens[1], input.tokens[2]);
        Some(emit(input.program, input.tokens[0], &joined))
    }
}

/// Build the citation from the code token and the number token (suffix still attached)
fn emit(
    program: ProgramCode,
    code_token: &str,
    number_token: &str,
) -> Result<GrantCitation, GrantRejection> {
    if code_token != program.as_str() {
        return Err(GrantRejection::MalformedNumber);
    }

    let number = number_token
        .split_once('/')
        .map(|(number, _suffix)| number)
        .unwrap_or(number_token);

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GrantRejection::MalformedNumber);
    }

    Ok(GrantCitation {
        grant_type: program.as_str().to_string(),
        grant_number: number.to_string(),
    })
}

/// Strip hyphens from the grant-number segment and make sure the program code
/// is followed by exactly one space.
///
/// Only the part before the first `/` is touched; the suffix is discarded later anyway.
fn clean_separators(raw: &str, program: ProgramCode) -> String {
    let (head, tail) = match raw.find('/') {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };

    let mut head = head.replace('-', "");

    if !head.contains(char::is_whitespace) {
        let code_len = program.as_str().len();
        if head.len() > code_len {
            head.insert(code_len, ' ');
        }
    }

    format!("{}{}", head, tail)
}

/// Outcome of normalizing all grant tokens of one publication
#[derive(Debug, Clone, Default)]
pub struct NormalizedGrants {
    /// Unique citations, in order of first appearance
    pub citations: Vec<GrantCitation>,
    /// Raw tokens that produced nothing, with the reason
    pub rejected: Vec<(String, GrantRejection)>,
}

/// Ordered list of shape matchers
pub struct GrantNormalizer {
    shapes: Vec<Box<dyn TokenShape>>,
}

impl GrantNormalizer {
    /// Normalizer with no shapes at all; add them with [`GrantNormalizer::with_shape`]
    pub fn empty() -> Self {
        Self { shapes: Vec::new() }
    }

    /// Append a shape matcher; earlier shapes win
    pub fn with_shape(mut self, shape: impl TokenShape + 'static) -> Self {
        self.shapes.push(Box::new(shape));
        self
    }

    /// Normalize a single raw token.
    pub fn normalize_token(&self, raw: &str) -> Result<GrantCitation, GrantRejection> {
        let raw = raw.trim();
        let program = ProgramCode::detect(raw).ok_or(GrantRejection::UnrecognizedProgram)?;
        let raw_token_count = raw.split_whitespace().count();

        let cleaned = clean_separators(raw, program);
        let input = ShapeInput {
            program,
            raw_token_count,
            tokens: cleaned.split_whitespace().collect(),
        };

        for shape in &self.shapes {
            if let Some(result) = shape.try_match(&input) {
                trace!(token = raw, shape = shape.name(), ok = result.is_ok(), "Grant shape matched");
                return result;
            }
        }

        Err(GrantRejection::UnrecognizedShape {
            token_count: raw_token_count,
        })
    }

    /// Normalize every grant token of one publication, deduplicating citations.
    pub fn normalize_tokens<S: AsRef<str>>(&self, raw_tokens: &[S]) -> NormalizedGrants {
        let mut seen = HashSet::new();
        let mut out = NormalizedGrants::default();

        for raw in raw_tokens {
            let raw = raw.as_ref();
            match self.normalize_token(raw) {
                Ok(citation) => {
                    if seen.insert(citation.clone()) {
                        out.citations.push(citation);
                    }
                }
                Err(reason) => {
                    if reason.needs_review() {
                        debug!(token = raw, reason = %reason, "Dropped grant token");
                    } else {
                        trace!(token = raw, reason = %reason, "Dropped grant token");
                    }
                    out.rejected.push((raw.to_string(), reason));
                }
            }
        }

        out
    }
}

impl Default for GrantNormalizer {
    fn default() -> Self {
        Self::empty()
            .with_shape(CompactShape)
            .with_shape(StandardShape)
            .with_shape(SplitNumberShape)
    }
}

/// Normalize one raw token with the default shapes
pub fn normalize_token(raw: &str) -> Result<GrantCitation, GrantRejection> {
    GrantNormalizer::default().normalize_token(raw)
}
