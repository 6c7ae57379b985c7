//! Temporal alignment of time-ranged hits to discrete frames.
//!
//! The corpus-wide [`FrameListing`] maps vector-search indices to keyframes.
//! A [`FrameIndex`] is the ascending, de-duplicated list of one video's frame
//! ids drawn from that listing; [`TemporalAligner`] builds them on demand and
//! keeps them for the lifetime of one request.

use std::collections::HashMap;

use crate::models::{FrameId, FrameLocator, FrameRecord};

/// Every indexed keyframe, keyed by its vector-search corpus index.
#[derive(Debug, Clone, Default)]
pub struct FrameListing {
    frames: HashMap<usize, FrameRecord>,
}

impl FrameListing {
    pub fn new(entries: impl IntoIterator<Item = (usize, FrameRecord)>) -> Self {
        Self {
            frames: entries.into_iter().collect(),
        }
    }

    /// Listing where each record's position is its corpus index.
    pub fn from_ordered(frames: Vec<FrameRecord>) -> Self {
        Self::new(frames.into_iter().enumerate())
    }

    pub fn get(&self, index: usize) -> Option<&FrameRecord> {
        self.frames.get(&index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame ids belonging to `video_id`, in no particular order.
    pub fn frames_of<'a>(&'a self, video_id: &'a str) -> impl Iterator<Item = FrameId> + 'a {
        self.frames
            .values()
            .filter(move |r| r.video_id == video_id)
            .map(|r| r.frame_id)
    }
}

/// Ascending, unique frame ids of a single video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    frames: Vec<FrameId>,
}

impl FrameIndex {
    pub fn new(frames: impl IntoIterator<Item = FrameId>) -> Self {
        let mut frames: Vec<FrameId> = frames.into_iter().collect();
        frames.sort_unstable();
        frames.dedup();
        Self { frames }
    }

    pub fn for_video(listing: &FrameListing, video_id: &str) -> Self {
        Self::new(listing.frames_of(video_id))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame strictly greater than `position` (upper bound).
    pub fn first_after(&self, position: f64) -> Option<FrameId> {
        if position.is_nan() {
            return None;
        }
        let idx = self.frames.partition_point(|&f| f as f64 <= position);
        self.frames.get(idx).copied()
    }
}

/// Request-scoped aligner; caches one [`FrameIndex`] per video it is asked about.
pub struct TemporalAligner<'a> {
    listing: &'a FrameListing,
    indexes: HashMap<String, FrameIndex>,
}

impl<'a> TemporalAligner<'a> {
    pub fn new(listing: &'a FrameListing) -> Self {
        Self {
            listing,
            indexes: HashMap::new(),
        }
    }

    /// The frame of `video_id` nearest after `position`, or `None` when the
    /// video has no indexed frames or none lies strictly after it.
    ///
    /// `position` is on the frame-number axis, not in seconds; convert a
    /// segment start with the video's fps before calling.
    pub fn closest_frame(&mut self, video_id: &str, position: f64) -> Option<FrameLocator> {
        let listing = self.listing;
        let index = self
            .indexes
            .entry(video_id.to_string())
            .or_insert_with(|| FrameIndex::for_video(listing, video_id));
        index
            .first_after(position)
            .map(|frame_id| FrameLocator::new(video_id, frame_id))
    }
}
