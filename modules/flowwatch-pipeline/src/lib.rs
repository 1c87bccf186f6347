pub mod alert_log;
pub mod cursor;
pub mod extractor;
pub mod lock;
pub mod pipeline;
pub mod scorer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use alert_log::AlertLog;
pub use cursor::{CursorStore, FileCursorStore, MemoryCursorStore};
pub use extractor::{Extraction, Extractor};
pub use pipeline::{Pipeline, RunStats};
pub use scorer::Scorer;
pub use traits::{FlowScorer, FlowSource};
