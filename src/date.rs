//! Partial citation date resolution.
//!
//! PubMed citation lines look like `"Nature. 2015 Jun 3;521(7553):..."`. Not all
//! publications carry a full date, so the fragment may hold only a year or a
//! year and month. Missing parts default to January and the 1st.

use crate::error::{CsbcError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Three-letter month abbreviations, January first
const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// A fully populated calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolvedDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ResolvedDate {
    /// Validate the components as a real calendar date
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|_| Self { year, month, day })
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// `YYYY-MM-DD`
    pub fn to_iso_string(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

fn resolution_error(fragment: &str, reason: impl Into<String>) -> CsbcError {
    CsbcError::DateResolution {
        fragment: fragment.to_string(),
        reason: reason.into(),
    }
}

/// Cut the date fragment out of a citation line.
///
/// The fragment starts after the first `.` and ends at the first `;` after it,
/// or at the next `.` when there is no `;`.
pub fn date_fragment(citation: &str) -> Result<&str> {
    let start = citation
        .find('.')
        .ok_or_else(|| resolution_error(citation, "citation has no '.' delimiter"))?;
    let rest = &citation[start + 1..];

    let end = rest
        .find(';')
        .or_else(|| rest.find('.'))
        .ok_or_else(|| resolution_error(citation, "citation has no closing ';' or '.'"))?;

    Ok(rest[..end].trim())
}

/// Map a month token to its number.
///
/// Anything longer than three characters (`"Spring"`, `"Jan-Feb"`) or not in
/// the abbreviation table resolves to January.
fn parse_month(token: &str) -> u32 {
    if token.chars().count() > 3 {
        return 1;
    }
    let lower = token.to_ascii_lowercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|abbr| *abbr == lower)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(1)
}

/// Resolve a whitespace-separated `year [month [day]]` fragment.
///
/// Tokens past the third are ignored.
pub fn resolve_fragment(fragment: &str) -> Result<ResolvedDate> {
    let tokens: Vec<&str> = fragment.split_whitespace().collect();

    let year_token = tokens
        .first()
        .ok_or_else(|| resolution_error(fragment, "no date tokens"))?;
    let year: i32 = year_token
        .parse()
        .map_err(|_| resolution_error(fragment, format!("invalid year {:?}", year_token)))?;

    let month = tokens.get(1).map(|m| parse_month(m)).unwrap_or(1);

    let day = match tokens.get(2) {
        Some(day_token) => day_token
            .parse::<u32>()
            .map_err(|_| resolution_error(fragment, format!("invalid day {:?}", day_token)))?,
        None => 1,
    };

    ResolvedDate::new(year, month, day).ok_or_else(|| {
        resolution_error(
            fragment,
            format!("{}-{}-{} is not a calendar date", year, month, day),
        )
    })
}

/// Locate and resolve the date inside a full citation line
pub fn resolve_citation_date(citation: &str) -> Result<ResolvedDate> {
    resolve_fragment(date_fragment(citation)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> ResolvedDate {
        ResolvedDate { year, month, day }
    }

    #[test]
    fn test_year_only() {
        assert_eq!(resolve_fragment("2014").expect("resolve"), ymd(2014, 1, 1));
    }

    #[test]
    fn test_year_month() {
        assert_eq!(resolve_fragment("2014 Jan").expect("resolve"), ymd(2014, 1, 1));
        assert_eq!(resolve_fragment("2014 Sep").expect("resolve"), ymd(2014, 9, 1));
    }

    #[test]
    fn test_year_month_day() {
        assert_eq!(resolve_fragment("2014 Jan 15").expect("resolve"), ymd(2014, 1, 15));
        assert_eq!(resolve_fragment("2015 Jun 3").expect("resolve"), ymd(2015, 6, 3));
    }

    #[test]
    fn test_long_month_falls_back_to_january() {
        assert_eq!(resolve_fragment("2014 Spring").expect("resolve"), ymd(2014, 1, 1));
        assert_eq!(resolve_fragment("2016 Jan-Feb").expect("resolve"), ymd(2016, 1, 1));
        assert_eq!(resolve_fragment("2016 Xyz 4").expect("resolve"), ymd(2016, 1, 4));
    }

    #[test]
    fn test_invalid_calendar_date_is_an_error() {
        let err = resolve_fragment("2015 Apr 31").expect_err("April has 30 days");
        assert!(matches!(err, CsbcError::DateResolution { .. }));
        assert!(resolve_fragment("2015 Feb 29").is_err());
        assert!(resolve_fragment("2016 Feb 29").is_ok());
    }

    #[test]
    fn test_empty_fragment_is_an_error() {
        assert!(matches!(
            resolve_fragment("   "),
            Err(CsbcError::DateResolution { .. })
        ));
        assert!(resolve_fragment("Epub 2015").is_err());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let first = resolve_fragment("2017 Mar 2").expect("resolve");
        let second = resolve_fragment("2017 Mar 2").expect("resolve");
        assert_eq!(first, second);
    }

    #[test]
    fn test_fragment_extraction() {
        assert_eq!(
            date_fragment("Nature. 2015 Jun 3;521(7553):E1-2.").expect("fragment"),
            "2015 Jun 3"
        );
        assert_eq!(
            date_fragment("Sci Rep. 2017 Mar 2. doi: 10.1038/srep43626.").expect("fragment"),
            "2017 Mar 2"
        );
        assert!(date_fragment("no delimiters at all").is_err());
        assert!(date_fragment("Only one dot. and nothing after").is_err());
    }

    #[test]
    fn test_resolve_citation_date() {
        let date = resolve_citation_date("Cancer Res. 2016 Jan 15;76(2):1-10.").expect("resolve");
        assert_eq!(date.to_iso_string(), "2016-01-15");
        assert!(resolve_citation_date("Cell. ;12(3):1-2.").is_err());
    }
}
