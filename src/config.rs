//! 会话配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::dedup::DedupPolicy;
use crate::detection::types::BBox;
use crate::error::ConfigError;

/// 会话参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // === 场景参数 ===
    pub restricted_zone: Option<BBox>, // 限制区域 (可选)
    pub crowd_threshold: usize,        // 人群判定人数

    // === 跟踪参数 ===
    pub stale_track_timeout_frames: u64, // 跟踪超时帧数
    pub eviction_interval_frames: u64,   // 淘汰检查间隔

    pub dedup: DedupConfig,
    pub weapon_memory: WeaponMemoryConfig,
    pub scoring: ScoringConfig,
    pub alerts: AlertConfig,
}

/// 去重参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub person_iou: f32,   // 人员去重IOU (不区分类别)
    pub evidence_iou: f32, // 武器/物品去重IOU (区分类别)
}

/// 武器短时记忆参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponMemoryConfig {
    pub retention_frames: u64, // 记忆保留帧数 (30fps下约5秒)
    pub capacity: usize,       // 最大条目数
}

/// 行为评分参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub dwell_secs: f64,            // 长时间停留阈值
    pub history_secs: f64,          // 位置历史保留时长
    pub stillness_window_secs: f64, // 静止回看窗口
    pub stillness_max_px: f32,      // 静止位移上限
    pub erratic_window_secs: f64,   // 异常移动回看窗口
    pub erratic_min_px: f32,        // 异常移动位移下限
    pub weapon_expansion: f32,      // 武器关联外扩比例
    pub item_expansion: f32,        // 可疑物品关联外扩比例
    pub edge_margin_px: f32,        // 画面边缘距离
}

/// 告警参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub alert_interval_frames: u64,        // 告警事件间隔
    pub crowd_notice_interval_frames: u64, // 人群提示间隔
    pub crowd_notice_min_persons: usize,   // 人群提示最少人数
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restricted_zone: None,
            crowd_threshold: 2,
            stale_track_timeout_frames: 90,
            eviction_interval_frames: 30,
            dedup: DedupConfig::default(),
            weapon_memory: WeaponMemoryConfig::default(),
            scoring: ScoringConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            person_iou: DedupPolicy::PERSON.iou_threshold,
            evidence_iou: DedupPolicy::EVIDENCE.iou_threshold,
        }
    }
}

impl Default for WeaponMemoryConfig {
    fn default() -> Self {
        Self {
            retention_frames: 150,
            capacity: 64,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dwell_secs: 30.0,
            history_secs: 10.0,
            stillness_window_secs: 5.0,
            stillness_max_px: 20.0,
            erratic_window_secs: 2.0,
            erratic_min_px: 100.0,
            weapon_expansion: 0.2,
            item_expansion: 0.3,
            edge_margin_px: 50.0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_interval_frames: 30,
            crowd_notice_interval_frames: 60,
            crowd_notice_min_persons: 2,
        }
    }
}

impl DedupConfig {
    pub fn person_policy(&self) -> DedupPolicy {
        DedupPolicy {
            iou_threshold: self.person_iou,
            ..DedupPolicy::PERSON
        }
    }

    pub fn evidence_policy(&self) -> DedupPolicy {
        DedupPolicy {
            iou_threshold: self.evidence_iou,
            ..DedupPolicy::EVIDENCE
        }
    }
}

impl ScoringConfig {
    pub fn dwell(&self) -> Duration {
        secs(self.dwell_secs)
    }

    pub fn history_retention(&self) -> Duration {
        secs(self.history_secs)
    }

    pub fn stillness_window(&self) -> Duration {
        secs(self.stillness_window_secs)
    }

    pub fn erratic_window(&self) -> Duration {
        secs(self.erratic_window_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

impl SessionConfig {
    /// 从JSON文件加载配置并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 加载配置, 文件不存在时写入默认配置
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        warn!("配置文件 {} 不存在, 创建默认配置", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("配置已保存到 {}", path.display());
        Ok(())
    }

    /// 参数合法性检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(zone) = &self.restricted_zone {
            if !zone.is_canonical() {
                return Err(invalid(format!("restricted_zone {zone} is not canonical")));
            }
        }
        if self.crowd_threshold == 0 {
            return Err(invalid("crowd_threshold must be at least 1"));
        }
        if self.eviction_interval_frames == 0 {
            return Err(invalid("eviction_interval_frames must be positive"));
        }
        if self.alerts.alert_interval_frames == 0 || self.alerts.crowd_notice_interval_frames == 0 {
            return Err(invalid("alert intervals must be positive"));
        }
        for (name, iou) in [
            ("dedup.person_iou", self.dedup.person_iou),
            ("dedup.evidence_iou", self.dedup.evidence_iou),
        ] {
            if !(0.0..=1.0).contains(&iou) {
                return Err(invalid(format!("{name} must lie in [0, 1], got {iou}")));
            }
        }

        let s = &self.scoring;
        for (name, value) in [
            ("scoring.dwell_secs", s.dwell_secs),
            ("scoring.history_secs", s.history_secs),
            ("scoring.stillness_window_secs", s.stillness_window_secs),
            ("scoring.erratic_window_secs", s.erratic_window_secs),
            ("scoring.stillness_max_px", s.stillness_max_px as f64),
            ("scoring.erratic_min_px", s.erratic_min_px as f64),
            ("scoring.weapon_expansion", s.weapon_expansion as f64),
            ("scoring.item_expansion", s.item_expansion as f64),
            ("scoring.edge_margin_px", s.edge_margin_px as f64),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        // 回看窗口必须落在历史保留时长内
        if s.stillness_window_secs > s.history_secs || s.erratic_window_secs > s.history_secs {
            return Err(invalid("lookback windows must not exceed scoring.history_secs"));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("当前会话配置:");
        match &self.restricted_zone {
            Some(zone) => info!("  限制区域: {}", zone),
            None => info!("  限制区域: 未配置"),
        }
        info!("  人群阈值: {}", self.crowd_threshold);
        info!("  跟踪超时帧数: {}", self.stale_track_timeout_frames);
        info!(
            "  去重IOU: 人员 {:.2} / 证据 {:.2}",
            self.dedup.person_iou, self.dedup.evidence_iou
        );
        info!("  武器记忆帧数: {}", self.weapon_memory.retention_frames);
        info!(
            "  告警间隔: {} 帧, 人群提示间隔: {} 帧",
            self.alerts.alert_interval_frames, self.alerts.crowd_notice_interval_frames
        );
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
