//! Context selection and model routing for a terminal AI assistant
//!
//! The engine decides, for every user turn, which pieces of terminal state
//! reach the model prompt (relevance ranking under a token budget, with a
//! short-TTL formatting cache), which model handles the request (complexity
//! routing with downward fallback chains), how conversation history is
//! compacted (fixed recent window plus summarization of the overflow), and
//! how the response is delivered (a batching stream buffer). The
//! [`orchestrator::RequestOrchestrator`] wires these stages into one request
//! lifecycle; everything underneath is usable on its own.
//!
//! Model providers and semantic retrieval plug in through the
//! [`transport::ModelTransport`] and [`transport::SemanticIndex`] traits.

pub mod config;
pub mod enhance;
pub mod error;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod ranking;
pub mod routing;
pub mod session;
pub mod stream;
pub mod tokens;
pub mod transport;

pub use config::{Config, SessionMode};
pub use error::{EngineError, Result};
pub use orchestrator::{CompletedRequest, EngineRequest, RequestOrchestrator};
pub use ranking::{ContextItem, ContextItemKind, InclusionMode, RankedContext};
pub use routing::{QueryType, RoutingDecision, Tier};
pub use session::SessionStore;
pub use transport::{CancelToken, ModelTransport, SemanticIndex, StreamEvent};
