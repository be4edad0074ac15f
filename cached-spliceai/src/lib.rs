pub mod logging;
pub mod scorer;

pub use logging::{init_logging, Verbosity};
pub use scorer::CommandScorer;
