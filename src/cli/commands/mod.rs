// ===========================================================================
// cli/commands - Command Implementations
// ===========================================================================

pub mod change;
pub mod completions;
pub mod end_change;
pub mod get_affected_bookmarks;
pub mod start_change;

// Re-export argument types
pub use completions::CompletionsArgs;
pub use end_change::EndChangeArgs;
pub use get_affected_bookmarks::GetAffectedBookmarksArgs;
pub use start_change::StartChangeArgs;
