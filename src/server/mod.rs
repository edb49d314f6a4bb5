pub mod http;
pub mod metrics;
pub mod worker;

pub use http::{build_app, AppState};
pub use metrics::Metrics;
