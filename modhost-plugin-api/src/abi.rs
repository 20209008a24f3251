//! ABI version encoding
//!
//! A plugin declares the loader ABI revision it was built against as a
//! packed `u32` with one byte per component: major, minor, micro, release.
//! Only the major byte is load-bearing for compatibility; the remaining
//! components are informational.

/// Pack a four-component ABI tag into a `u32`.
pub const fn abi_version(major: u8, minor: u8, micro: u8, release: u8) -> u32 {
    ((major as u32) << 24) | ((minor as u32) << 16) | ((micro as u32) << 8) | (release as u32)
}

/// Extract the major component of a packed ABI tag.
pub const fn abi_major(version: u32) -> u8 {
    (version >> 24) as u8
}

/// Two ABI tags are compatible when their major components match.
pub const fn abi_compatible(a: u32, b: u32) -> bool {
    abi_major(a) == abi_major(b)
}

/// Current plugin ABI version. Checked when loading plugins; a plugin built
/// against a different major revision is rejected at query time.
pub const ABI_VERSION: u32 = abi_version(1, 0, 0, 0);
