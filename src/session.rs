//! 分析会话 (Analytics session)
//!
//! 每个会话独立持有 TrackStore / ScoringEngine / AlertDecider / WeaponMemory,
//! 会话之间不共享任何状态。单帧处理顺序:
//! 校验 → 人员去重 → 跟踪更新 → 证据去重 → 评分 → 告警决策 → 定期淘汰

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::analysis::alert::{is_due, AlertDecider, AlertEvent, CaptureRequest, CrowdNotice};
use crate::analysis::scoring::{AlertLevel, ScoreRecord, ScoringEngine};
use crate::config::SessionConfig;
use crate::detection::memory::WeaponMemory;
use crate::detection::types::{BBox, Detection, FrameGeometry, PersonDetection, TrackId};
use crate::error::{Channel, PipelineError};
use crate::tracking::TrackStore;

/// 帧像素 (RGB, 用于证据截图)
#[derive(Clone, Debug)]
pub struct FramePixels {
    pub rgb: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
    pub width: u32,
    pub height: u32,
}

/// 单帧输入 (外部检测器 → 会话)
#[derive(Clone, Debug)]
pub struct FrameInput {
    /// 帧序号 (单调递增, 从1开始)
    pub frame_number: u64,
    pub geometry: FrameGeometry,
    pub persons: Vec<PersonDetection>,
    /// 武器检测 (None 表示本帧未运行武器检测器)
    pub weapons: Option<Vec<Detection>>,
    /// 可疑物品检测
    pub items: Option<Vec<Detection>>,
    /// 分析时钟
    pub captured_at: Instant,
    /// 事件时间戳
    pub wall_time: DateTime<Local>,
    pub pixels: Option<FramePixels>,
}

impl FrameInput {
    pub fn new(frame_number: u64, geometry: FrameGeometry, captured_at: Instant) -> Self {
        Self {
            frame_number,
            geometry,
            persons: Vec::new(),
            weapons: None,
            items: None,
            captured_at,
            wall_time: Local::now(),
            pixels: None,
        }
    }

    pub fn with_persons(mut self, persons: Vec<PersonDetection>) -> Self {
        self.persons = persons;
        self
    }

    pub fn with_weapons(mut self, weapons: Vec<Detection>) -> Self {
        self.weapons = Some(weapons);
        self
    }

    pub fn with_items(mut self, items: Vec<Detection>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_pixels(mut self, pixels: FramePixels) -> Self {
        self.pixels = Some(pixels);
        self
    }

    /// 入口校验: 帧尺寸非零, 所有检测框规范且置信度在 [0, 1]
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.geometry.is_empty() {
            return Err(PipelineError::InvalidFrame {
                width: self.geometry.width,
                height: self.geometry.height,
            });
        }

        let persons = self.persons.iter().map(|p| (p.bbox, p.confidence));
        check_channel(Channel::Person, persons)?;

        if let Some(weapons) = &self.weapons {
            check_channel(Channel::Weapon, weapons.iter().map(|d| (d.bbox, d.confidence)))?;
        }
        if let Some(items) = &self.items {
            check_channel(Channel::Item, items.iter().map(|d| (d.bbox, d.confidence)))?;
        }
        Ok(())
    }
}

fn check_channel(
    channel: Channel,
    detections: impl Iterator<Item = (BBox, f32)>,
) -> Result<(), PipelineError> {
    for (index, (bbox, confidence)) in detections.enumerate() {
        if !bbox.is_canonical() {
            return Err(PipelineError::MalformedBBox {
                channel,
                index,
                bbox,
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PipelineError::ConfidenceOutOfRange {
                channel,
                index,
                confidence,
            });
        }
    }
    Ok(())
}

/// 单帧统计 (当前帧计数)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub persons: usize,
    pub suspicious: usize,
    pub threats: usize,
    pub weapons: usize,
    pub items: usize,
}

impl FrameStats {
    fn collect(scores: &BTreeMap<TrackId, ScoreRecord>, weapons: usize, items: usize) -> Self {
        let persons = scores.len();
        let count = |level| scores.values().filter(|r| r.alert_level == level).count();
        let mut suspicious = count(AlertLevel::Suspicious);
        // 多人场景至少计 persons-1 个可疑
        if persons >= 2 {
            suspicious = suspicious.max(persons - 1);
        }
        Self {
            persons,
            suspicious,
            threats: count(AlertLevel::Threat),
            weapons,
            items,
        }
    }
}

/// 单帧处理结果
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub frame_number: u64,
    pub stats: FrameStats,
    pub scores: BTreeMap<TrackId, ScoreRecord>,
    pub events: Vec<AlertEvent>,
    pub crowd_notice: Option<CrowdNotice>,
    pub captures: Vec<CaptureRequest>,
    /// 本帧被淘汰的身份
    pub evicted: Vec<TrackId>,
}

impl FrameReport {
    /// 是否有需要外部处理的输出
    pub fn has_alerts(&self) -> bool {
        !self.events.is_empty() || self.crowd_notice.is_some() || !self.captures.is_empty()
    }
}

/// 分析会话
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    tracks: TrackStore,
    scoring: ScoringEngine,
    alerts: AlertDecider,
    weapon_memory: WeaponMemory,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let scoring = ScoringEngine::from_session_config(&config);
        let alerts = AlertDecider::new(config.alerts.clone());
        let weapon_memory = WeaponMemory::new(
            config.weapon_memory.retention_frames,
            config.weapon_memory.capacity,
        );
        Self {
            config,
            tracks: TrackStore::new(),
            scoring,
            alerts,
            weapon_memory,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn alerts(&self) -> &AlertDecider {
        &self.alerts
    }

    /// 处理一帧检测结果
    pub fn process_frame(&mut self, frame: &FrameInput) -> Result<FrameReport, PipelineError> {
        frame.validate()?;
        let frame_number = frame.frame_number;

        // 1. 人员去重 + 跟踪更新
        let persons = self.config.dedup.person_policy().apply(&frame.persons);
        self.tracks.update(&persons, frame_number, frame.captured_at);

        // 2. 武器记忆 + 证据去重
        let evidence_policy = self.config.dedup.evidence_policy();
        let fresh_weapons = frame.weapons.as_deref().unwrap_or_default();
        self.weapon_memory.observe(frame_number, fresh_weapons);
        let weapons = evidence_policy.apply(&self.weapon_memory.detections());
        let items = frame
            .items
            .as_deref()
            .map(|items| evidence_policy.apply(items))
            .unwrap_or_default();

        // 3. 评分 + 告警
        let scores = self.scoring.score(
            self.tracks.all(),
            &weapons,
            &items,
            frame.geometry,
            frame.captured_at,
        );
        let decision = self
            .alerts
            .decide(frame_number, scores, weapons.len(), frame.wall_time);
        let stats = FrameStats::collect(&decision.scores, weapons.len(), items.len());

        // 4. 定期淘汰
        let evicted = if is_due(frame_number, self.config.eviction_interval_frames) {
            self.evict(frame_number)
        } else {
            Vec::new()
        };

        debug!(
            frame = frame_number,
            persons = stats.persons,
            threats = stats.threats,
            weapons = stats.weapons,
            "帧处理完成"
        );

        Ok(FrameReport {
            frame_number,
            stats,
            scores: decision.scores,
            events: decision.events,
            crowd_notice: decision.crowd_notice,
            captures: decision.captures,
            evicted,
        })
    }

    /// 淘汰过期跟踪, 并同步清理位置历史与截图记录
    pub fn evict(&mut self, frame_number: u64) -> Vec<TrackId> {
        let evicted = self
            .tracks
            .evict_stale(frame_number, self.config.stale_track_timeout_frames);
        if !evicted.is_empty() {
            self.scoring.forget(&evicted);
            self.alerts.forget(&evicted);
        }
        evicted
    }

    /// 会话重启: 清空全部状态
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.scoring.reset();
        self.alerts.reset();
        self.weapon_memory.clear();
    }
}
