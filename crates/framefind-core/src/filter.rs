//! Post-retrieval filters.
//!
//! - [`restrict_to_locators`] scopes one modality's hits to `(video, frame)`
//!   pairs surfaced by another (object detections refined by a visual search).
//! - [`by_publish_date`] keeps hits whose owning video was published on a
//!   matching day/month/year. Hits whose video has no metadata are dropped.

use chrono::{Datelike, NaiveDate};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::models::{FrameLocator, Modality, RawHit, ResolvedHit, VideoMetadata};

/// Invalid filter input supplied by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid date provided: {0}")]
    InvalidDate(String),
}

/// Anything that may carry a [`FrameLocator`] and an owning video.
pub trait Locatable {
    fn locator(&self) -> Option<FrameLocator>;
    fn owning_video(&self) -> &str;
}

impl Locatable for RawHit {
    fn locator(&self) -> Option<FrameLocator> {
        RawHit::locator(self)
    }

    fn owning_video(&self) -> &str {
        self.video_id()
    }
}

impl Locatable for ResolvedHit {
    fn locator(&self) -> Option<FrameLocator> {
        self.hit.locator()
    }

    fn owning_video(&self) -> &str {
        self.hit.video_id()
    }
}

impl<T: Locatable, S> Locatable for (T, S) {
    fn locator(&self) -> Option<FrameLocator> {
        self.0.locator()
    }

    fn owning_video(&self) -> &str {
        self.0.owning_video()
    }
}

/// Keep only hits whose locator is in `allowed`, preserving order.
///
/// Hits without a locator never pass.
pub fn restrict_to_locators<T: Locatable>(hits: Vec<T>, allowed: &HashSet<FrameLocator>) -> Vec<T> {
    hits.into_iter().filter(|hit| is_allowed(hit, allowed)).collect()
}

/// True if `hit` carries a locator that is in `allowed`.
pub fn is_allowed<T: Locatable>(hit: &T, allowed: &HashSet<FrameLocator>) -> bool {
    hit.locator().is_some_and(|loc| allowed.contains(&loc))
}

/// Locators of a result set, e.g. the visual-search hits used to scope an
/// object query.
pub fn locators_of<T: Locatable>(hits: &[T]) -> HashSet<FrameLocator> {
    hits.iter().filter_map(Locatable::locator).collect()
}

/// Day/month/year constraint on a publish date. Absent components match
/// anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilter {
    day: Option<u32>,
    month: Option<u32>,
    year: Option<i32>,
}

impl DateFilter {
    /// Validate the supplied components.
    ///
    /// Each component must be in range, and together they must name a real
    /// calendar date. A missing year is checked against a leap year so that
    /// `day=29, month=2` alone is accepted.
    pub fn new(day: Option<u32>, month: Option<u32>, year: Option<i32>) -> Result<Self, FilterError> {
        if let Some(d) = day {
            if !(1..=31).contains(&d) {
                return Err(FilterError::InvalidDate(format!("day {} out of range", d)));
            }
        }
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(FilterError::InvalidDate(format!("month {} out of range", m)));
            }
        }
        if let Some(y) = year {
            if !(1..=9999).contains(&y) {
                return Err(FilterError::InvalidDate(format!("year {} out of range", y)));
            }
        }

        let probe_year = year.unwrap_or(2000);
        let probe_month = month.unwrap_or(1);
        let probe_day = day.unwrap_or(1);
        if NaiveDate::from_ymd_opt(probe_year, probe_month, probe_day).is_none() {
            return Err(FilterError::InvalidDate(format!(
                "{:02}/{:02}/{} is not a calendar date",
                probe_day, probe_month, probe_year
            )));
        }

        Ok(Self { day, month, year })
    }

    /// True when no component was supplied.
    pub fn is_empty(&self) -> bool {
        self.day.is_none() && self.month.is_none() && self.year.is_none()
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.day.map_or(true, |d| date.day() == d)
            && self.month.map_or(true, |m| date.month() == m)
            && self.year.map_or(true, |y| date.year() == y)
    }
}

/// Keep hits whose video's publish date satisfies `filter`.
///
/// Fails closed: a hit whose video has no metadata entry is dropped.
pub fn by_publish_date(
    hits: Vec<ResolvedHit>,
    modality: Modality,
    filter: &DateFilter,
    metadata: &HashMap<String, VideoMetadata>,
) -> Vec<ResolvedHit> {
    let before = hits.len();
    let kept: Vec<ResolvedHit> = hits
        .into_iter()
        .filter(|hit| match metadata.get(hit.owning_video()) {
            Some(meta) => filter.matches(meta.publish_date),
            None => false,
        })
        .collect();
    tracing::debug!(%modality, before, after = kept.len(), "publish date filter applied");
    kept
}
