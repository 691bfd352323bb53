use std::fmt;
use std::ops::RangeInclusive;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("No pages specified")]
    Empty,

    #[error("Page numbers must be >= 1")]
    ZeroPage,

    #[error("Invalid page range {from}-{to}: start is after end")]
    Reversed { from: u32, to: u32 },

    #[error("Page {page} exceeds total pages {total}")]
    OutOfBounds { page: u32, total: u32 },

    #[error("Invalid page range: {0}")]
    Invalid(String),
}

/// An inclusive, 1-indexed page interval. `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawPageRange")]
pub struct PageRange {
    from: u32,
    to: u32,
}

#[derive(Deserialize)]
struct RawPageRange {
    from: u32,
    to: u32,
}

impl TryFrom<RawPageRange> for PageRange {
    type Error = RangeError;

    fn try_from(raw: RawPageRange) -> Result<Self, Self::Error> {
        PageRange::new(raw.from, raw.to)
    }
}

impl PageRange {
    pub fn new(from: u32, to: u32) -> Result<Self, RangeError> {
        if from == 0 || to == 0 {
            return Err(RangeError::ZeroPage);
        }
        if from > to {
            return Err(RangeError::Reversed { from, to });
        }
        Ok(PageRange { from, to })
    }

    pub fn single(page: u32) -> Result<Self, RangeError> {
        Self::new(page, page)
    }

    pub fn from(&self) -> u32 {
        self.from
    }

    pub fn to(&self) -> u32 {
        self.to
    }

    pub fn len(&self) -> u32 {
        self.to - self.from + 1
    }

    pub fn pages(&self) -> RangeInclusive<u32> {
        self.from..=self.to
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// Merge overlapping and adjacent ranges into a minimal disjoint set,
/// sorted by start page.
///
/// The union of covered pages is preserved. For any two consecutive output
/// ranges `a` and `b`, `b.from() > a.to() + 1`.
pub fn merge_ranges(ranges: &[PageRange]) -> Vec<PageRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.from);

    let mut merged: Vec<PageRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.from <= last.to.saturating_add(1) => {
                last.to = last.to.max(range.to);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// The pages one output file should contain.
///
/// A `Pages` list is always sorted ascending and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    Range(PageRange),
    Pages(Vec<u32>),
}

impl PageSelection {
    /// Build a selection from an arbitrary list of page numbers
    pub fn from_pages(pages: &[u32]) -> Result<Self, RangeError> {
        if pages.is_empty() {
            return Err(RangeError::Empty);
        }
        if pages.contains(&0) {
            return Err(RangeError::ZeroPage);
        }

        let mut pages = pages.to_vec();
        pages.sort_unstable();
        pages.dedup();
        Ok(PageSelection::Pages(pages))
    }

    /// The covering range, if the selection has no gaps
    pub fn contiguous_range(&self) -> Option<PageRange> {
        match self {
            PageSelection::Range(range) => Some(*range),
            PageSelection::Pages(pages) => {
                let first = *pages.first()?;
                let last = *pages.last()?;
                let gapless = pages.windows(2).all(|w| w[1] == w[0] + 1);
                if gapless {
                    PageRange::new(first, last).ok()
                } else {
                    None
                }
            }
        }
    }

    pub fn pages(&self) -> Vec<u32> {
        match self {
            PageSelection::Range(range) => range.pages().collect(),
            PageSelection::Pages(pages) => pages.clone(),
        }
    }

    pub fn last_page(&self) -> u32 {
        match self {
            PageSelection::Range(range) => range.to(),
            PageSelection::Pages(pages) => pages.last().copied().unwrap_or_default(),
        }
    }

    pub fn page_count(&self) -> usize {
        match self {
            PageSelection::Range(range) => range.len() as usize,
            PageSelection::Pages(pages) => pages.len(),
        }
    }
}

impl From<PageRange> for PageSelection {
    fn from(range: PageRange) -> Self {
        PageSelection::Range(range)
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::Range(range) => write!(f, "{}", range),
            PageSelection::Pages(pages) => {
                let parts: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageRef {
    Number(u32),
    End,
}

impl PageRef {
    fn resolve(&self, total_pages: u32) -> u32 {
        match self {
            PageRef::Number(n) => *n,
            PageRef::End => total_pages,
        }
    }
}

fn parse_page_ref(s: &str) -> Result<PageRef, RangeError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("end") {
        Ok(PageRef::End)
    } else {
        s.parse::<u32>()
            .map(PageRef::Number)
            .map_err(|_| RangeError::Invalid(format!("invalid page number '{}'", s)))
    }
}

/// Parse a single range specification like "5", "1-5" or "3-end"
fn parse_one(s: &str, total_pages: u32) -> Result<PageRange, RangeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(RangeError::Empty);
    }

    let (start, end) = match s.find('-') {
        // "-5" is not a range
        Some(0) => return Err(RangeError::Invalid(s.to_string())),
        Some(dash_pos) => (
            parse_page_ref(&s[..dash_pos])?,
            parse_page_ref(&s[dash_pos + 1..])?,
        ),
        None => {
            let page = parse_page_ref(s)?;
            (page.clone(), page)
        }
    };

    let from = start.resolve(total_pages);
    let to = end.resolve(total_pages);
    let range = PageRange::new(from, to)?;

    if range.to > total_pages {
        return Err(RangeError::OutOfBounds {
            page: range.to,
            total: total_pages,
        });
    }

    Ok(range)
}

/// Parse a comma-separated list of page ranges like "1-5,10,15-end"
pub fn parse_page_ranges(s: &str, total_pages: u32) -> Result<Vec<PageRange>, RangeError> {
    if s.trim().is_empty() {
        return Err(RangeError::Empty);
    }
    s.split(',')
        .map(|part| parse_one(part, total_pages))
        .collect()
}
