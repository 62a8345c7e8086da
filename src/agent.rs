//! Agent orchestration: the LLM-driven observe/think/act loop that turns a
//! natural-language task plus a starting URL into a sequence of browser
//! actions, and the history of that run into generated test code.
//!
//! Grounded in the original's `core/agent.py` (`Agent`, `AgentConfig`,
//! `TaskStep`, decomposition/boost prompts) and `services/agent.py`
//! (history-to-test-step conversion), reshaped into the teacher's
//! module-per-concern style already used by `llm` and `tools`.

mod history;
mod prompts;
mod run;
mod types;

pub use run::AgentLoop;
pub use types::{AgentConfig, AgentEvent, AgentStep, Framework, Language, TaskStep, TestStep};
