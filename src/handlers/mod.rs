pub mod analyze;
pub mod sweeper;

pub use analyze::{AnalysisHandler, AnalyzeError};
pub use sweeper::SweeperService;
