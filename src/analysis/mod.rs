/// 行为分析系统 (Behaviour analysis)
///
/// - history: 短时位置历史
/// - scoring: 多因子评分与告警等级
/// - alert:   场景级升级、告警限流与证据截图
pub mod alert;
pub mod history;
pub mod scoring;

pub use alert::{AlertDecider, AlertDecision, AlertEvent, CaptureRequest, CrowdNotice};
pub use history::{PositionHistory, PositionSample};
pub use scoring::{AlertLevel, Factor, ScoreRecord, ScoringEngine};
