use bytes::Bytes;
use m3u8_rs::MediaSegment;

use crate::profile::SegmentType;

/// MP4 segment types (init or media)
#[derive(Debug, Clone)]
pub enum M4sData {
    InitSegment(M4sInitSegmentData),
    Segment(M4sSegmentData),
}

impl M4sData {
    #[inline]
    pub fn segment_type(&self) -> SegmentType {
        match self {
            M4sData::InitSegment(_) => SegmentType::M4sInit,
            M4sData::Segment(_) => SegmentType::M4sMedia,
        }
    }

    #[inline]
    pub fn data(&self) -> &Bytes {
        match self {
            M4sData::InitSegment(init) => &init.data,
            M4sData::Segment(seg) => &seg.data,
        }
    }

    #[inline]
    pub fn media_segment(&self) -> Option<&MediaSegment> {
        match self {
            M4sData::InitSegment(init) => Some(&init.segment),
            M4sData::Segment(seg) => Some(&seg.segment),
        }
    }
}

/// MP4 initialization segment data
#[derive(Debug, Clone)]
pub struct M4sInitSegmentData {
    pub segment: MediaSegment,
    pub data: Bytes,
}

/// MP4 media segment data
#[derive(Debug, Clone)]
pub struct M4sSegmentData {
    pub segment: MediaSegment,
    pub data: Bytes,
}
