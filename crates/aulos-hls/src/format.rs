//! Media format descriptions across the two HLS track spaces.
//!
//! A [`VariantFormat`] describes one bitrate variant of the master playlist;
//! a [`MediaFormat`] describes one elementary stream discovered inside a
//! segment. Track-group synthesis overlays variant information onto the
//! primary elementary stream's format, which is where
//! [`MediaFormat::with_variant_info`] comes in.

/// MIME family helpers used to rank elementary streams.
pub mod mime {
    pub fn is_video(mime_type: &str) -> bool {
        mime_type.starts_with("video/")
    }

    pub fn is_audio(mime_type: &str) -> bool {
        mime_type.starts_with("audio/")
    }
}

/// Format of one bitrate variant as declared by the chunk source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantFormat {
    pub id: String,
    pub mime_type: String,
    pub bitrate: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub language: Option<String>,
}

impl VariantFormat {
    pub fn new(id: impl Into<String>, mime_type: impl Into<String>, bitrate: u32) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            bitrate,
            width: None,
            height: None,
            language: None,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Format of one elementary stream inside a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaFormat {
    pub track_id: Option<String>,
    pub mime_type: String,
    pub bitrate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub language: Option<String>,
}

impl MediaFormat {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            track_id: None,
            mime_type: mime_type.into(),
            bitrate: None,
            width: None,
            height: None,
            language: None,
        }
    }

    /// Copy this format, overlaying the identifying fields of a variant.
    ///
    /// Used when expanding the primary track into one exposed format per
    /// variant: id, bitrate, dimensions, and language come from the variant;
    /// the MIME type stays with the elementary stream.
    #[must_use]
    pub fn with_variant_info(&self, variant: &VariantFormat) -> MediaFormat {
        MediaFormat {
            track_id: Some(variant.id.clone()),
            mime_type: self.mime_type.clone(),
            bitrate: Some(variant.bitrate),
            width: variant.width,
            height: variant.height,
            language: variant.language.clone(),
        }
    }
}

/// An externally visible group of interchangeable formats.
///
/// A non-adaptive group holds exactly one format. An adaptive group holds one
/// format per variant; selecting a subset biases the variant chosen by the
/// chunk source.
#[derive(Clone, Debug)]
pub struct TrackGroup {
    adaptive: bool,
    formats: Vec<MediaFormat>,
}

impl TrackGroup {
    /// A non-adaptive group carrying a single format.
    pub fn single(format: MediaFormat) -> Self {
        Self {
            adaptive: false,
            formats: vec![format],
        }
    }

    /// An adaptive group carrying one format per variant.
    ///
    /// # Panics
    ///
    /// Panics if `formats` is empty; groups are non-empty by contract.
    pub fn adaptive(formats: Vec<MediaFormat>) -> Self {
        assert!(!formats.is_empty(), "track group must not be empty");
        Self {
            adaptive: true,
            formats,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn format(&self, index: usize) -> &MediaFormat {
        &self.formats[index]
    }

    pub fn formats(&self) -> &[MediaFormat] {
        &self.formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_families() {
        assert!(mime::is_video("video/avc"));
        assert!(mime::is_audio("audio/mp4a-latm"));
        assert!(!mime::is_video("audio/mp4a-latm"));
        assert!(!mime::is_audio("application/id3"));
    }

    #[test]
    fn variant_overlay_replaces_identity_fields() {
        let media = MediaFormat::new("video/avc");
        let variant = VariantFormat::new("v1", "application/x-mpegURL", 1_280_000)
            .with_resolution(1280, 720)
            .with_language("en");

        let overlaid = media.with_variant_info(&variant);
        assert_eq!(overlaid.track_id.as_deref(), Some("v1"));
        assert_eq!(overlaid.mime_type, "video/avc");
        assert_eq!(overlaid.bitrate, Some(1_280_000));
        assert_eq!(overlaid.width, Some(1280));
        assert_eq!(overlaid.height, Some(720));
        assert_eq!(overlaid.language.as_deref(), Some("en"));
    }

    #[test]
    fn variant_overlay_keeps_missing_dimensions_unspecified() {
        let media = MediaFormat::new("audio/mp4a-latm");
        let variant = VariantFormat::new("a1", "application/x-mpegURL", 128_000);

        let overlaid = media.with_variant_info(&variant);
        assert_eq!(overlaid.width, None);
        assert_eq!(overlaid.height, None);
    }

    #[test]
    #[should_panic(expected = "track group must not be empty")]
    fn adaptive_group_rejects_empty_formats() {
        let _ = TrackGroup::adaptive(Vec::new());
    }
}
