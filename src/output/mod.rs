pub mod csv_log;
pub mod display;

pub use csv_log::{ReadingsLog, SummaryLog};
pub use display::StatusContext;
