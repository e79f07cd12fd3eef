/// 检测结果处理 (Detection post-processing)
///
/// 外部检测器 (人员/武器/物品) 的输出在这里统一成证据:
/// - types:  检测框与类别
/// - dedup:  多检测器结果去重 (NMS)
/// - memory: 武器短时记忆
pub mod dedup;
pub mod memory;
pub mod types;

pub use dedup::{dedupe, Candidate, DedupPolicy};
pub use memory::WeaponMemory;
pub use types::{BBox, Detection, FrameGeometry, ObjectClass, PersonDetection, Point, TrackId};
