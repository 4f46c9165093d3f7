use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display, ops::RangeInclusive, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use jiff::{civil::Date, Timestamp};

pub mod decode;
pub mod extract;
pub mod fetch;
mod text;

pub use decode::{DecodeError, DecodePolicy, Encoding};
pub use extract::{extract_bytes, extract_courses};
pub use fetch::{FetchError, Fetcher, ScheduleQuery};

/// Purdue publishes its schedule in Indiana local time
const CAMPUS_TZ: &str = "America/Indiana/Indianapolis";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    Fall,
    Spring,
    Summer,
}

impl Season {
    const ALL: [Self; 3] = [Self::Fall, Self::Spring, Self::Summer];

    fn code(self) -> u8 {
        match self {
            Season::Fall => 10,
            Season::Spring => 20,
            Season::Summer => 30,
        }
    }
}

impl TryFrom<u8> for Season {
    type Error = anyhow::Error;

    fn try_from(code: u8) -> Result<Season> {
        Ok(match code {
            10 => Season::Fall,
            20 => Season::Spring,
            30 => Season::Summer,
            _ => bail!("term season must be 10, 20, or 30, but was {} instead", code),
        })
    }
}

impl Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Academic years a four digit term code can name
const TERM_YEARS: RangeInclusive<i16> = 1900..=9999;

/// A Banner term code. `year` is the academic year the term belongs to, so
/// Fall 2024 is `202510` while Spring 2025 is `202520`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    year: i16,
    season: Season,
}

impl Term {
    pub fn new(season: Season, calendar_year: i16) -> Self {
        let year = match season {
            Season::Fall => calendar_year + 1,
            Season::Spring | Season::Summer => calendar_year,
        };
        Term { year, season }
    }

    pub fn season(self) -> Season {
        self.season
    }

    /// The year the term is actually taught in
    pub fn calendar_year(self) -> i16 {
        match self.season {
            Season::Fall => self.year - 1,
            Season::Spring | Season::Summer => self.year,
        }
    }

    /// Term in session on `date`: January through April is spring, May through
    /// July is summer, and the rest of the year is fall
    pub fn containing(date: Date) -> Self {
        let season = match date.month() {
            1..=4 => Season::Spring,
            5..=7 => Season::Summer,
            _ => Season::Fall,
        };
        Term::new(season, date.year())
    }

    pub fn current() -> Result<Self> {
        let now = Timestamp::now()
            .intz(CAMPUS_TZ)
            .context("failed to resolve campus timezone")?;
        Ok(Term::containing(now.date()))
    }

    pub fn human_display(self) -> String {
        format!("{} {}", self.season, self.calendar_year())
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.year, self.season.code())
    }
}

impl FromStr for Term {
    type Err = anyhow::Error;

    /// Accepts either a Banner code (`202510`) or a season and calendar year
    /// (`fall2024`, `Fall 2024`)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            let (year, season) = s.split_at(4);
            let year: i16 = year.parse().context("failed to parse term year")?;
            if !TERM_YEARS.contains(&year) {
                bail!("term year {year} is out of range");
            }
            let season = season
                .parse::<u8>()?
                .try_into()
                .map_err(|e| anyhow!("failed to parse term season: {e}"))?;
            return Ok(Term { year, season });
        }

        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        for season in Season::ALL {
            let prefix = season.to_string().to_ascii_lowercase();
            if let Some(year) = compact.strip_prefix(&prefix) {
                let calendar_year: i16 = year
                    .parse()
                    .with_context(|| anyhow!("failed to parse year in term {s:?}"))?;
                // fall belongs to the next academic year, which still has to fit the code
                let academic_year = match season {
                    Season::Fall => calendar_year.checked_add(1),
                    Season::Spring | Season::Summer => Some(calendar_year),
                };
                if !academic_year.is_some_and(|y| TERM_YEARS.contains(&y)) {
                    bail!("year {calendar_year} in term {s:?} is out of range");
                }
                return Ok(Term::new(season, calendar_year));
            }
        }
        bail!("term should be a 6 digit code like 202510 or a season and year like fall2024")
    }
}

/// Extra per-section fields whose set varies by term and page layout
pub type RawData = BTreeMap<String, serde_json::Value>;

/// One section row of the published schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: u64,
    pub subject: String,
    pub course_number: u32,
    pub name: String,
    pub raw_data: RawData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub total_rows_seen: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub courses: Vec<Course>,
    pub diagnostics: Diagnostics,
}
