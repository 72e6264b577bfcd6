//! Trigger handlers that derive documents from incident and action changes.

pub mod fan_out;
pub mod history;

pub use fan_out::TemplateFanOut;
pub use history::StatusHistoryRecorder;
