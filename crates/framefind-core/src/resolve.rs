//! Catalog-backed path resolution.
//!
//! Every modality resolves media URLs through the same two key builders,
//! [`image_key`] (`"{video_id}_{frame_id}.jpg"`) and [`video_key`]
//! (`"{video_id}.mp4"`). Keys are looked up in title→external-id catalogs and
//! the external id is substituted into a URL template. Lookups are soft: a
//! missing key leaves the corresponding field `None` and the hit is kept.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{FrameLocator, RawHit, ResolvedHit};

pub const DEFAULT_IMAGE_URL_TEMPLATE: &str =
    "https://drive.google.com/thumbnail?export=view&sz=w160-h160&id={id}";
pub const DEFAULT_VIDEO_URL_TEMPLATE: &str = "https://drive.google.com/file/d/{id}/preview";

/// Placeholder replaced by the external id in URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Catalog key of a frame image.
pub fn image_key(locator: &FrameLocator) -> String {
    format!("{}_{}.jpg", locator.video_id, locator.frame_id)
}

/// Catalog key of a video file; also the fps catalog key.
pub fn video_key(video_id: &str) -> String {
    format!("{}.mp4", video_id)
}

/// Title-keyed lookup tables for media ids and frame rates.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    /// Image file title → external id.
    pub images: HashMap<String, String>,
    /// Video file title → external id.
    pub videos: HashMap<String, String>,
    /// Video file title → frames per second.
    pub fps: HashMap<String, f64>,
}

impl Catalogs {
    pub fn fps_for(&self, video_id: &str) -> Option<f64> {
        self.fps.get(&video_key(video_id)).copied()
    }
}

/// Build a title→id map from a JSON array of `{title, id}` records.
///
/// Records missing either field are skipped; anything that is not an array
/// yields an empty map.
pub fn parse_id_catalog(value: &Value) -> HashMap<String, String> {
    let Some(items) = value.as_array() else {
        return HashMap::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?;
            let id = match item.get("id")? {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((title.to_string(), id))
        })
        .collect()
}

/// Build a title→fps map from a JSON array of `{title, fps}` records.
pub fn parse_fps_catalog(value: &Value) -> HashMap<String, f64> {
    let Some(items) = value.as_array() else {
        return HashMap::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get("title")?.as_str()?;
            let fps = item.get("fps")?.as_f64()?;
            Some((title.to_string(), fps))
        })
        .collect()
}

/// Resolved media fields for one locator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedPaths {
    pub image_path: Option<String>,
    pub video_path: Option<String>,
    pub fps: Option<f64>,
}

/// Turns locators into externally addressable URLs.
#[derive(Debug, Clone)]
pub struct PathResolver {
    image_url_template: String,
    video_url_template: String,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_URL_TEMPLATE, DEFAULT_VIDEO_URL_TEMPLATE)
    }
}

impl PathResolver {
    pub fn new(image_url_template: impl Into<String>, video_url_template: impl Into<String>) -> Self {
        Self {
            image_url_template: image_url_template.into(),
            video_url_template: video_url_template.into(),
        }
    }

    /// Resolve a locator. Never fails; unknown keys leave fields `None`.
    pub fn resolve(&self, locator: &FrameLocator, catalogs: &Catalogs) -> ResolvedPaths {
        let image_name = image_key(locator);
        let video_name = video_key(&locator.video_id);

        let image_path = match catalogs.images.get(&image_name) {
            Some(id) => Some(self.image_url_template.replace(ID_PLACEHOLDER, id)),
            None => {
                tracing::debug!(key = %image_name, "image not in catalog");
                None
            }
        };
        let video_path = match catalogs.videos.get(&video_name) {
            Some(id) => Some(self.video_url_template.replace(ID_PLACEHOLDER, id)),
            None => {
                tracing::debug!(key = %video_name, "video not in catalog");
                None
            }
        };

        ResolvedPaths {
            image_path,
            video_path,
            fps: catalogs.fps.get(&video_name).copied(),
        }
    }

    /// Attach resolved paths to a hit. Returns `None` only when the hit has
    /// no derivable locator.
    pub fn resolve_hit(
        &self,
        hit: RawHit,
        score: Option<f64>,
        catalogs: &Catalogs,
    ) -> Option<ResolvedHit> {
        let locator = hit.locator()?;
        let paths = self.resolve(&locator, catalogs);
        Some(ResolvedHit {
            hit,
            image_path: paths.image_path,
            video_path: paths.video_path,
            fps: paths.fps,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalogs() -> Catalogs {
        Catalogs {
            images: parse_id_catalog(&json!([
                {"title": "L01_V001_120.jpg", "id": "img-abc"},
                {"title": "broken"}
            ])),
            videos: parse_id_catalog(&json!([{"title": "L01_V001.mp4", "id": "vid-xyz"}])),
            fps: parse_fps_catalog(&json!([{"title": "L01_V001.mp4", "fps": 25.0}])),
        }
    }

    #[test]
    fn test_keys() {
        let loc = FrameLocator::new("L01_V001", 120);
        assert_eq!(image_key(&loc), "L01_V001_120.jpg");
        assert_eq!(video_key("L01_V001"), "L01_V001.mp4");
    }

    #[test]
    fn test_resolve_known_locator() {
        let paths = PathResolver::default().resolve(&FrameLocator::new("L01_V001", 120), &catalogs());
        assert_eq!(
            paths.image_path.as_deref(),
            Some("https://drive.google.com/thumbnail?export=view&sz=w160-h160&id=img-abc")
        );
        assert_eq!(
            paths.video_path.as_deref(),
            Some("https://drive.google.com/file/d/vid-xyz/preview")
        );
        assert_eq!(paths.fps, Some(25.0));
    }

    #[test]
    fn test_resolve_is_total() {
        let resolver = PathResolver::new("img:{id}", "vid:{id}");
        let paths = resolver.resolve(&FrameLocator::new("missing", 0), &Catalogs::default());
        assert_eq!(paths, ResolvedPaths::default());

        let paths = resolver.resolve(&FrameLocator::new("L01_V001", 7), &catalogs());
        assert!(paths.image_path.is_none());
        assert_eq!(paths.video_path.as_deref(), Some("vid:vid-xyz"));
    }

    #[test]
    fn test_malformed_catalog_is_empty() {
        assert!(parse_id_catalog(&json!({"title": "x", "id": "y"})).is_empty());
        assert!(parse_fps_catalog(&json!("nope")).is_empty());
        assert_eq!(catalogs().images.len(), 1);
    }
}
