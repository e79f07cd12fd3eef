//! 告警决策 (Alert decider)
//!
//! 在评分结果之上叠加场景级证据:
//! 1. 场景内出现任何武器时, 所有跟踪目标升级为 THREAT
//! 2. 非 NORMAL 目标按固定帧间隔发出告警事件
//! 3. 每个目标首次达到 THREAT 时请求一次证据截图
//! 4. 多人场景按固定帧间隔发出人群提示

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use super::scoring::{AlertLevel, Factor, ScoreRecord, THREAT_SCORE};
use crate::config::AlertConfig;
use crate::detection::types::TrackId;

/// 告警事件
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub level: AlertLevel,
    pub track_id: TrackId,
    pub score: u32,
    pub factors: Vec<String>,
    pub timestamp: DateTime<Local>,
}

/// 人群提示
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrowdNotice {
    pub person_count: usize,
    pub timestamp: DateTime<Local>,
}

/// 证据截图请求
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptureRequest {
    pub track_id: TrackId,
    pub score: u32,
    pub timestamp: DateTime<Local>,
}

/// 单帧决策结果
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AlertDecision {
    /// 升级后的评分
    pub scores: BTreeMap<TrackId, ScoreRecord>,
    pub events: Vec<AlertEvent>,
    pub crowd_notice: Option<CrowdNotice>,
    pub captures: Vec<CaptureRequest>,
}

/// 帧号是否命中间隔 (帧号从1开始计)
pub fn is_due(frame_number: u64, interval: u64) -> bool {
    interval > 0 && frame_number > 0 && frame_number % interval == 0
}

/// 告警决策器
///
/// 只保存"已截图"的身份集合; 目标被淘汰后可再次截图。
#[derive(Debug, Clone)]
pub struct AlertDecider {
    config: AlertConfig,
    captured: HashSet<TrackId>,
}

impl AlertDecider {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            captured: HashSet::new(),
        }
    }

    /// 场景级升级: 有武器即升级为 THREAT, 并附加场景武器数量
    pub fn escalate(record: &mut ScoreRecord, weapons_in_scene: usize) {
        if weapons_in_scene == 0 {
            return;
        }
        if record.alert_level != AlertLevel::Threat {
            record.score = record.score.max(THREAT_SCORE);
            record.alert_level = AlertLevel::Threat;
        }
        record.factors.push(Factor::WeaponsInScene(weapons_in_scene));
    }

    /// 对本帧评分做出告警决策
    pub fn decide(
        &mut self,
        frame_number: u64,
        mut scores: BTreeMap<TrackId, ScoreRecord>,
        weapons_in_scene: usize,
        timestamp: DateTime<Local>,
    ) -> AlertDecision {
        let alert_due = is_due(frame_number, self.config.alert_interval_frames);
        let mut events = Vec::new();
        let mut captures = Vec::new();

        for (track_id, record) in scores.iter_mut() {
            if weapons_in_scene > 0 && record.alert_level != AlertLevel::Threat {
                info!(track_id = %track_id, weapons = weapons_in_scene, "场景内有武器, 升级为 THREAT");
            }
            Self::escalate(record, weapons_in_scene);

            if alert_due && record.alert_level != AlertLevel::Normal {
                let factors = record.factor_labels();
                info!(
                    level = %record.alert_level,
                    track_id = %track_id,
                    score = record.score,
                    "告警: {}",
                    factors.join(", ")
                );
                events.push(AlertEvent {
                    level: record.alert_level,
                    track_id: *track_id,
                    score: record.score,
                    factors,
                    timestamp,
                });
            }

            if record.alert_level == AlertLevel::Threat && self.captured.insert(*track_id) {
                info!(track_id = %track_id, score = record.score, "请求威胁截图");
                captures.push(CaptureRequest {
                    track_id: *track_id,
                    score: record.score,
                    timestamp,
                });
            }
        }

        let person_count = scores.len();
        let crowd_notice = (person_count >= self.config.crowd_notice_min_persons
            && is_due(frame_number, self.config.crowd_notice_interval_frames))
        .then(|| {
            info!(persons = person_count, "人群提示: 检测到 {} 人", person_count);
            CrowdNotice {
                person_count,
                timestamp,
            }
        });

        AlertDecision {
            scores,
            events,
            crowd_notice,
            captures,
        }
    }

    /// 被淘汰的目标允许重新截图
    pub fn forget(&mut self, track_ids: &[TrackId]) {
        for track_id in track_ids {
            self.captured.remove(track_id);
        }
    }

    pub fn is_captured(&self, track_id: TrackId) -> bool {
        self.captured.contains(&track_id)
    }

    /// 会话重启时清空
    pub fn reset(&mut self) {
        self.captured.clear();
    }
}
