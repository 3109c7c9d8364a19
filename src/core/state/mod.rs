// Source watermarks, adapted-record caches and the manager over them

pub mod adapted;
pub mod manager;
pub mod watermark;

pub use adapted::AdaptedRecords;
pub use manager::StateManager;
pub use watermark::{FetchStatus, SourceWatermark, SourceWatermarkBuilder};
