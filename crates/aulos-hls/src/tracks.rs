//! Track-group synthesis.
//!
//! HLS mixes two orthogonal selection axes: bitrate variants from the master
//! playlist, and elementary streams inside each segment. The exposed track
//! groups combine them: the single "primary" elementary stream (the one
//! bitrate adaptation applies to) expands into one format per variant and is
//! marked adaptive; every other elementary stream maps to its own
//! single-format group.

use crate::chunk_source::ChunkSource;
use crate::extractor::ExtractorWrapper;
use crate::format::{mime, TrackGroup};

const PRIMARY_TYPE_NONE: u8 = 0;
const PRIMARY_TYPE_AUDIO: u8 = 1;
const PRIMARY_TYPE_VIDEO: u8 = 2;

pub(crate) struct TrackBuild {
    pub groups: Vec<TrackGroup>,
    pub primary_group_index: Option<usize>,
}

/// Synthesize the exposed track groups from a prepared extractor and the
/// chunk source's variants.
///
/// The primary type is the highest-ranked MIME family present (video over
/// audio over everything else). Only when exactly one track has that type
/// does an adaptive group exist; with several candidates there is no safe
/// track to retarget across variants, so all groups stay fixed.
pub(crate) fn build_track_groups(
    extractor: &ExtractorWrapper,
    chunk_source: &dyn ChunkSource,
) -> TrackBuild {
    let track_count = extractor.track_count();

    let mut primary_type = PRIMARY_TYPE_NONE;
    let mut primary_index: Option<usize> = None;
    for track in 0..track_count {
        let format = extractor
            .media_format(track)
            .expect("prepared extractor must expose a format per track");
        let track_type = if mime::is_video(&format.mime_type) {
            PRIMARY_TYPE_VIDEO
        } else if mime::is_audio(&format.mime_type) {
            PRIMARY_TYPE_AUDIO
        } else {
            PRIMARY_TYPE_NONE
        };
        if track_type > primary_type {
            primary_type = track_type;
            primary_index = Some(track);
        } else if track_type == primary_type && primary_index.is_some() {
            // A second track of the primary type: adaptation has no unique
            // target, so expose everything as fixed groups.
            primary_index = None;
        }
    }

    let variant_count = chunk_source.track_count();
    let mut groups = Vec::with_capacity(track_count);
    for track in 0..track_count {
        let format = extractor
            .media_format(track)
            .expect("prepared extractor must expose a format per track");
        if Some(track) == primary_index {
            let formats = (0..variant_count)
                .map(|variant| format.with_variant_info(chunk_source.track_format(variant)))
                .collect();
            groups.push(TrackGroup::adaptive(formats));
        } else {
            groups.push(TrackGroup::single(format));
        }
    }

    TrackBuild {
        groups,
        primary_group_index: primary_index,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aulos_pool::Allocator;

    use super::*;
    use crate::chunk::Trigger;
    use crate::fixture::{FakeChunkSource, ScriptedDemuxer, SegmentScript};
    use crate::format::{MediaFormat, VariantFormat};

    fn prepared_extractor(tracks: Vec<MediaFormat>) -> ExtractorWrapper {
        let demuxer = ScriptedDemuxer::new(tracks, Vec::new());
        let wrapper = ExtractorWrapper::new(
            Box::new(demuxer),
            VariantFormat::new("v0", "application/x-mpegURL", 1_000_000),
            Trigger::Initial,
            0,
        );
        wrapper.init(Arc::new(Allocator::new(4, 1024)));
        wrapper.consume(&[0u8; 1]).unwrap();
        wrapper
    }

    fn chunk_source(variants: Vec<VariantFormat>) -> FakeChunkSource {
        FakeChunkSource::new(variants, Vec::<SegmentScript>::new())
    }

    #[test]
    fn unique_video_track_becomes_adaptive_primary() {
        let extractor = prepared_extractor(vec![
            MediaFormat::new("video/avc"),
            MediaFormat::new("audio/mp4a-latm"),
        ]);
        let source = chunk_source(vec![
            VariantFormat::new("v0", "application/x-mpegURL", 800_000).with_resolution(640, 360),
            VariantFormat::new("v1", "application/x-mpegURL", 2_400_000).with_resolution(1280, 720),
        ]);

        let build = build_track_groups(&extractor, &source);

        assert_eq!(build.groups.len(), 2);
        assert_eq!(build.primary_group_index, Some(0));

        let primary = &build.groups[0];
        assert!(primary.is_adaptive());
        assert_eq!(primary.len(), 2);
        assert_eq!(primary.format(0).track_id.as_deref(), Some("v0"));
        assert_eq!(primary.format(0).bitrate, Some(800_000));
        assert_eq!(primary.format(1).width, Some(1280));
        assert_eq!(primary.format(0).mime_type, "video/avc");

        let secondary = &build.groups[1];
        assert!(!secondary.is_adaptive());
        assert_eq!(secondary.len(), 1);
        assert_eq!(secondary.format(0).mime_type, "audio/mp4a-latm");
    }

    #[test]
    fn audio_is_primary_without_video() {
        let extractor = prepared_extractor(vec![
            MediaFormat::new("audio/mp4a-latm"),
            MediaFormat::new("application/id3"),
        ]);
        let source = chunk_source(vec![VariantFormat::new(
            "v0",
            "application/x-mpegURL",
            128_000,
        )]);

        let build = build_track_groups(&extractor, &source);
        assert_eq!(build.primary_group_index, Some(0));
        assert!(build.groups[0].is_adaptive());
    }

    #[test]
    fn two_tracks_of_the_primary_type_disable_adaptation() {
        let extractor = prepared_extractor(vec![
            MediaFormat::new("video/avc"),
            MediaFormat::new("video/hevc"),
            MediaFormat::new("audio/mp4a-latm"),
        ]);
        let source = chunk_source(vec![VariantFormat::new(
            "v0",
            "application/x-mpegURL",
            1_000_000,
        )]);

        let build = build_track_groups(&extractor, &source);
        assert_eq!(build.primary_group_index, None);
        assert!(build.groups.iter().all(|g| !g.is_adaptive()));
    }

    #[test]
    fn metadata_only_tracks_have_no_primary() {
        let extractor = prepared_extractor(vec![MediaFormat::new("application/id3")]);
        let source = chunk_source(vec![VariantFormat::new(
            "v0",
            "application/x-mpegURL",
            128_000,
        )]);

        let build = build_track_groups(&extractor, &source);
        assert_eq!(build.primary_group_index, None);
        assert_eq!(build.groups.len(), 1);
        assert!(!build.groups[0].is_adaptive());
    }
}
