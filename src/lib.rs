// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod analysis; // 行为评分与告警
pub mod config; // 会话配置参数
pub mod detection; // 检测结果处理
pub mod error;
pub mod evidence; // 威胁截图
pub mod replay; // JSON Lines 回放
pub mod runner; // 会话线程与控制
pub mod session; // 单帧处理流程
pub mod tracking; // 人员跟踪记忆

pub use crate::analysis::{
    AlertDecider, AlertDecision, AlertEvent, AlertLevel, CaptureRequest, CrowdNotice, Factor,
    ScoreRecord, ScoringEngine,
};
pub use crate::config::SessionConfig;
pub use crate::detection::{
    dedupe, BBox, Detection, FrameGeometry, ObjectClass, PersonDetection, Point, TrackId,
    WeaponMemory,
};
pub use crate::error::{ConfigError, EvidenceError, PipelineError};
pub use crate::evidence::EvidenceWriter;
pub use crate::replay::{FrameRecord, JsonlFrameSource};
pub use crate::runner::{
    run_session, spawn_session, CollectingSink, FrameSource, ReportSink, SessionControl,
    SessionHandle, SessionSummary,
};
pub use crate::session::{FrameInput, FramePixels, FrameReport, FrameStats, Session};
pub use crate::tracking::{Track, TrackStore};
