pub mod file_utils;

pub use file_utils::{
    DEFAULT_BUFFER_SIZE, FLV_HEADER_SIZE, FLV_PREVIOUS_TAG_SIZE, create_backup,
    shift_content_backward, shift_content_forward, write_flv_tag,
};
