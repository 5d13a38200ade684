//! Query complexity classification and model-tier routing

pub mod models;
pub mod patterns;
pub mod router;

pub use models::{QueryType, RoutingDecision, RoutingReasoning, ScoreFactors, Tier};
pub use patterns::detect_query_type;
pub use router::{classify, tier_for_score};
