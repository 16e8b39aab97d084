//! Minimal fMP4/ISOBMFF helpers: init segment codec detection and AV1 fragment
//! sample validation, as used by the fMP4 flavor of the HLS segmenter.

mod box_utils;
pub mod fragment;
mod isobmff;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use fragment::{
    Av1MediaValidationSummary, Av1ValidationOptions, extract_av1_track_ids_from_init,
    validate_av1_media_segment_against_init, validate_av1_media_segment_against_init_with_options,
    validate_av1_media_segment_with_track_ids, validate_av1_media_segment_with_track_ids_and_options,
};
pub use isobmff::{
    InitSegmentInfo, ParseOptions, parse_init_segment, parse_init_segment_with_options,
};
pub use media_types::Resolution;
