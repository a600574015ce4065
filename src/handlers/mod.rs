pub mod analysis_handler;
pub mod log_handler;
pub mod stats_handler;

pub use analysis_handler::{AnalysisHandler, AnalysisResponse, ConfirmRequest};
pub use log_handler::{AddEntryRequest, LogHandler};
pub use stats_handler::StatsHandler;
