//! Browser automation: a single-page `BrowserAdapter` driven by CDP via
//! chromiumoxide.

pub mod adapter;

pub use adapter::{BrowserAdapter, BrowserError, LaunchConfig, OpOutcome};
