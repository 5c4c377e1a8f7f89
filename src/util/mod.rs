// ===========================================================================
// util - Small Parsing Helpers
// ===========================================================================

pub mod duration;

pub use duration::parse_duration;
