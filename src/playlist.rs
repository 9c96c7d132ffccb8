//! HLS playlist parsing and quality selection
//!
//! Two playlist flavors flow through a download: the master (variant)
//! playlist listing available qualities, and the media playlist listing
//! the segments of one chosen quality. Both are parsed with `m3u8-rs`.

use m3u8_rs::{MasterPlaylist, Playlist, parse_playlist_res};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{PlaylistVariant, SegmentDescriptor};

/// Sort key sentinel, large enough to dominate any real resolution height.
const SORT_MAX: u64 = 1_000_000;

/// Parse a master playlist into quality variants.
///
/// Variants are returned deterministically ordered: source quality first,
/// audio-only last, everything else descending by the resolution encoded in
/// the variant name (`"720p60"` sorts above `"480p"`).
pub fn parse_variants(text: &str) -> Result<Vec<PlaylistVariant>> {
    let master = match parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(master)) => master,
        Ok(Playlist::MediaPlaylist(_)) => {
            return Err(Error::MalformedPlaylist(
                "expected a master playlist, got a media playlist".to_string(),
            ));
        }
        Err(err) => return Err(Error::MalformedPlaylist(err.to_string())),
    };

    let mut variants: Vec<PlaylistVariant> = master
        .variants
        .iter()
        .map(|variant| {
            let group_id = variant.video.clone().unwrap_or_default();
            let resolution = variant
                .resolution
                .as_ref()
                .map(|r| format!("{}x{}", r.width, r.height));
            let name = alternative_name(&master, &group_id)
                .or_else(|| resolution.clone())
                .unwrap_or_else(|| group_id.clone());
            let is_source = group_id == "chunked";
            PlaylistVariant {
                name,
                group_id,
                resolution,
                url: variant.uri.clone(),
                is_source,
            }
        })
        .collect();

    variants.sort_by_key(variant_sort_key);
    Ok(variants)
}

/// The display name comes from the EXT-X-MEDIA entry the variant references.
fn alternative_name(master: &MasterPlaylist, group_id: &str) -> Option<String> {
    master
        .alternatives
        .iter()
        .find(|alt| alt.group_id == group_id)
        .map(|alt| alt.name.clone())
}

fn variant_sort_key(variant: &PlaylistVariant) -> u64 {
    if variant.is_source {
        return 0;
    }
    if variant.group_id == "audio_only" {
        return SORT_MAX;
    }
    // Names look like "720p60": sort descending by the leading height.
    variant
        .name
        .split('p')
        .next()
        .and_then(|height| height.parse::<u64>().ok())
        .map_or(SORT_MAX, |height| SORT_MAX - height)
}

/// Parse a media playlist into segment descriptors.
///
/// Relative segment URIs are resolved against `base_url`. A playlist with
/// no segments is rejected, there is nothing to download from it.
pub fn parse_segments(text: &str, base_url: &Url) -> Result<Vec<SegmentDescriptor>> {
    let media = match parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MediaPlaylist(media)) => media,
        Ok(Playlist::MasterPlaylist(_)) => {
            return Err(Error::MalformedPlaylist(
                "expected a media playlist, got a master playlist".to_string(),
            ));
        }
        Err(err) => return Err(Error::MalformedPlaylist(err.to_string())),
    };

    if media.segments.is_empty() {
        return Err(Error::MalformedPlaylist(
            "media playlist contains no segments".to_string(),
        ));
    }

    let mut descriptors = Vec::with_capacity(media.segments.len());
    // A byte range without an explicit offset continues where the previous
    // segment's range ended.
    let mut next_offset: Option<u64> = None;
    for (index, segment) in media.segments.iter().enumerate() {
        let url = base_url.join(&segment.uri).map_err(|err| {
            Error::MalformedPlaylist(format!("invalid segment URI '{}': {err}", segment.uri))
        })?;
        let byte_range = match &segment.byte_range {
            Some(range) => {
                if range.length == 0 {
                    return Err(Error::MalformedPlaylist(format!(
                        "segment {index} declares a zero-length byte range"
                    )));
                }
                let offset = range.offset.or(next_offset).ok_or_else(|| {
                    Error::MalformedPlaylist(format!(
                        "segment {index} has a byte range with no offset and no predecessor"
                    ))
                })?;
                next_offset = Some(offset + range.length);
                Some((offset, range.length))
            }
            None => {
                next_offset = None;
                None
            }
        };
        descriptors.push(SegmentDescriptor {
            index,
            url: url.to_string(),
            duration_secs: f64::from(segment.duration),
            expected_bytes: byte_range.map(|(_, length)| length),
            byte_range,
        });
    }
    Ok(descriptors)
}

/// Pick a variant by quality preference.
///
/// - `"source"` selects the source-quality variant.
/// - Any other label matches a variant name or group id exactly.
/// - No match fails with the available names listed.
/// - No preference is only valid when a single variant exists; with
///   multiple candidates the caller must disambiguate.
pub fn select_variant<'a>(
    variants: &'a [PlaylistVariant],
    quality: Option<&str>,
) -> Result<&'a PlaylistVariant> {
    let names = || variants.iter().map(|v| v.name.clone()).collect::<Vec<_>>();

    match quality {
        Some("source") => variants.iter().find(|v| v.is_source).ok_or_else(|| {
            Error::QualityUnavailable {
                requested: "source".to_string(),
                available: names(),
            }
        }),
        Some(label) => variants
            .iter()
            .find(|v| v.name == label || v.group_id == label)
            .ok_or_else(|| Error::QualityUnavailable {
                requested: label.to_string(),
                available: names(),
            }),
        None => match variants {
            [single] => Ok(single),
            _ => Err(Error::AmbiguousQuality { candidates: names() }),
        },
    }
}
