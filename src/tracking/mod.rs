/// 人员跟踪记忆 (Track memory)
pub mod store;

pub use store::{Track, TrackStore};
