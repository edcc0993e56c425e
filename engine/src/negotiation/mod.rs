//! Roadmap negotiation
//!
//! Everything between a user's utterance and a committed roadmap:
//!
//! - [`history`]: port for the bounded conversation log
//! - [`prompt`]: message list assembly, including the removal confirmation policy
//! - [`parser`]: decoding and validation of the model's answer
//! - [`sync`]: full replacement of a stored roadmap
//! - [`engine`]: the per-turn pipeline and its asking/finalizing branch

pub mod engine;
pub mod history;
pub mod parser;
pub mod prompt;
pub mod sync;

pub use engine::{NegotiationEngine, NegotiationSettings};
pub use history::HistoryStore;
pub use parser::ContractError;
pub use prompt::PromptBuilder;
pub use sync::{RoadmapStore, RoadmapSynchronizer};
