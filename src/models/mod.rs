mod analysis;
mod daily_metric;
mod product;
mod tool_record;
mod user;

pub use analysis::{AnalysisSummary, SavedAnalysis};
pub use daily_metric::DailyMetric;
pub use product::Product;
pub use tool_record::{ChangeEvent, ChangeKind, ToolRecord};
pub use user::{User, UserId};
