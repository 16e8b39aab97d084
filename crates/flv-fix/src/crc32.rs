//! CRC32 helper shared by the split and duplicate-filter operators.

/// CRC32 (IEEE) of a byte slice, used to fingerprint sequence headers and
/// media tag payloads without holding onto the payload itself.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
