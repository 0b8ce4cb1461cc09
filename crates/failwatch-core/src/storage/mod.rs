pub(crate) mod schema;
pub mod stats;
pub mod store;

pub use stats::{ReasonCount, StatsFilter};
pub use store::{FailureStore, SaveSummary};
