//! Browser tool catalogue, dispatch, and the underlying browser-control
//! facade. Grounded in the original's `tools/` package (`schemas.py`,
//! `executor.py`) and the teacher's `tools/browser/` module layout.

pub mod browser;
pub mod executor;
pub mod schemas;

pub use browser::{BrowserAdapter, BrowserError, LaunchConfig};
pub use executor::{ToolExecutor, ToolInvocation, ToolResult};
pub use schemas::{ToolCategory, ToolDefinition, ToolRegistry};
