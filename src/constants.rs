/// The version of the crate.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const FLAG_KEY_PREFIX: &str = "flags/";
pub const SEGMENT_KEY_PREFIX: &str = "segments/";
