//! 行为评分引擎 (Behaviour scoring)
//!
//! 对每个跟踪目标累加独立因子的分数:
//! - 长时间停留            +1
//! - 进入限制区域          +2
//! - 可疑静止 (5秒<20像素) +1
//! - 异常移动 (2秒>100像素) +1
//! - 人群                  +1
//! - 附近有武器            +5
//! - 附近有可疑物品        +2
//! - 靠近画面边缘          +1
//!
//! 总分经固定阈值映射为告警等级。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use super::history::PositionHistory;
use crate::config::{ScoringConfig, SessionConfig};
use crate::detection::types::{BBox, Detection, FrameGeometry, ObjectClass, TrackId};
use crate::tracking::Track;

/// 可疑分数下限
pub const SUSPICIOUS_SCORE: u32 = 3;
/// 威胁分数下限
pub const THREAT_SCORE: u32 = 5;

/// 告警等级
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Normal,
    Suspicious,
    Threat,
}

impl AlertLevel {
    /// 分数到等级的阶梯函数
    pub fn from_score(score: u32) -> Self {
        if score >= THREAT_SCORE {
            AlertLevel::Threat
        } else if score >= SUSPICIOUS_SCORE {
            AlertLevel::Suspicious
        } else {
            AlertLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "NORMAL",
            AlertLevel::Suspicious => "SUSPICIOUS",
            AlertLevel::Threat => "THREAT",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 评分因子
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Factor {
    LongStay,
    RestrictedZone,
    Stillness,
    ErraticMovement,
    Crowd(usize),
    WeaponNearby(ObjectClass),
    ItemNearby(ObjectClass),
    FrameEdge,
    /// 场景内存在武器 (告警升级时附加, 不计分)
    WeaponsInScene(usize),
}

impl Factor {
    pub fn points(&self) -> u32 {
        match self {
            Factor::LongStay => 1,
            Factor::RestrictedZone => 2,
            Factor::Stillness => 1,
            Factor::ErraticMovement => 1,
            Factor::Crowd(_) => 1,
            Factor::WeaponNearby(_) => 5,
            Factor::ItemNearby(_) => 2,
            Factor::FrameEdge => 1,
            Factor::WeaponsInScene(_) => 0,
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factor::LongStay => f.write_str("long stay"),
            Factor::RestrictedZone => f.write_str("in restricted zone"),
            Factor::Stillness => f.write_str("suspicious stillness"),
            Factor::ErraticMovement => f.write_str("erratic movement"),
            Factor::Crowd(count) => write!(f, "crowd ({count} people)"),
            Factor::WeaponNearby(class) => write!(f, "weapon nearby ({class})"),
            Factor::ItemNearby(class) => write!(f, "suspicious item nearby ({class})"),
            Factor::FrameEdge => f.write_str("at frame edge"),
            Factor::WeaponsInScene(count) => write!(f, "{count} weapon(s) in scene"),
        }
    }
}

impl Serialize for Factor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 单个跟踪目标的评分结果 (每帧重新计算)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub score: u32,
    pub alert_level: AlertLevel,
    /// 停留时长 (秒)
    pub stay_duration: f64,
    pub factors: Vec<Factor>,
}

impl ScoreRecord {
    pub fn from_factors(factors: Vec<Factor>, stay_duration: f64) -> Self {
        let score = factors.iter().map(Factor::points).sum();
        Self {
            score,
            alert_level: AlertLevel::from_score(score),
            stay_duration,
            factors,
        }
    }

    /// 可读的因子描述
    pub fn factor_labels(&self) -> Vec<String> {
        self.factors.iter().map(ToString::to_string).collect()
    }
}

/// 检测是否与人员关联: 中心点落在外扩框内 (含边界), 或与原始框重叠
pub fn is_near(person: &BBox, other: &BBox, expansion: f32) -> bool {
    person.expanded(expansion).contains(&other.center()) || person.intersects(other)
}

/// 第一个与人员关联的检测 (按输入顺序)
pub fn find_nearby<'a>(
    person: &BBox,
    candidates: &'a [Detection],
    expansion: f32,
) -> Option<&'a Detection> {
    candidates
        .iter()
        .find(|candidate| is_near(person, &candidate.bbox, expansion))
}

/// 行为评分引擎
///
/// 持有每个跟踪的位置历史; 历史与 TrackStore 生命周期独立, 可随时丢弃重建。
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    restricted_zone: Option<BBox>,
    crowd_threshold: usize,
    history: HashMap<TrackId, PositionHistory>,
}

impl ScoringEngine {
    pub fn new(
        config: ScoringConfig,
        restricted_zone: Option<BBox>,
        crowd_threshold: usize,
    ) -> Self {
        Self {
            config,
            restricted_zone,
            crowd_threshold,
            history: HashMap::new(),
        }
    }

    pub fn from_session_config(config: &SessionConfig) -> Self {
        Self::new(
            config.scoring.clone(),
            config.restricted_zone,
            config.crowd_threshold,
        )
    }

    /// 计算所有跟踪的评分
    ///
    /// 不会失败; 没有武器/物品证据时传入空切片。
    /// 本帧未出现但尚未淘汰的跟踪同样评分, 位置沿用最后一次观测。
    pub fn score(
        &mut self,
        tracks: &BTreeMap<TrackId, Track>,
        weapons: &[Detection],
        items: &[Detection],
        frame: FrameGeometry,
        now: Instant,
    ) -> BTreeMap<TrackId, ScoreRecord> {
        let total_persons = tracks.len();
        let retention = self.config.history_retention();
        let mut records = BTreeMap::new();

        for (track_id, track) in tracks {
            // 先追加并淘汰历史, 再做回看判定
            let history = self.history.entry(*track_id).or_default();
            history.record(now, track.last_position, retention);

            let stay = track.dwell(now);
            let mut factors = Vec::new();

            if stay > self.config.dwell() {
                factors.push(Factor::LongStay);
            }

            if let Some(zone) = &self.restricted_zone {
                if zone.contains(&track.last_position) {
                    factors.push(Factor::RestrictedZone);
                }
            }

            if history
                .displacement_since(now, self.config.stillness_window())
                .is_some_and(|moved| moved < self.config.stillness_max_px)
            {
                factors.push(Factor::Stillness);
            }

            if history
                .displacement_since(now, self.config.erratic_window())
                .is_some_and(|moved| moved > self.config.erratic_min_px)
            {
                factors.push(Factor::ErraticMovement);
            }

            if total_persons >= self.crowd_threshold {
                factors.push(Factor::Crowd(total_persons));
            }

            let weapon_expansion = self.config.weapon_expansion;
            if let Some(weapon) = find_nearby(&track.last_bbox, weapons, weapon_expansion) {
                debug!(track_id = %track_id, class = %weapon.class_label, "武器与人员关联");
                factors.push(Factor::WeaponNearby(weapon.class_label.clone()));
            }

            if let Some(item) = find_nearby(&track.last_bbox, items, self.config.item_expansion) {
                factors.push(Factor::ItemNearby(item.class_label.clone()));
            }

            if frame.near_edge(&track.last_bbox, self.config.edge_margin_px) {
                factors.push(Factor::FrameEdge);
            }

            records.insert(*track_id, ScoreRecord::from_factors(factors, stay.as_secs_f64()));
        }

        // 已不存在的跟踪不再保留历史
        self.history.retain(|track_id, _| tracks.contains_key(track_id));
        records
    }

    /// 丢弃指定跟踪的位置历史
    pub fn forget(&mut self, track_ids: &[TrackId]) {
        for track_id in track_ids {
            self.history.remove(track_id);
        }
    }

    pub fn history(&self, track_id: TrackId) -> Option<&PositionHistory> {
        self.history.get(&track_id)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::PersonDetection;
    use crate::tracking::TrackStore;
    use std::time::Duration;

    const FRAME: FrameGeometry = FrameGeometry {
        width: 640,
        height: 480,
    };

    fn engine() -> ScoringEngine {
        ScoringEngine::from_session_config(&SessionConfig::default())
    }

    fn store_with(people: &[(u64, BBox)], frame: u64, at: Instant) -> TrackStore {
        let mut store = TrackStore::new();
        let detections: Vec<PersonDetection> = people
            .iter()
            .map(|(id, bbox)| PersonDetection::new(*id, *bbox, 0.9))
            .collect();
        store.update(&detections, frame, at);
        store
    }

    fn centre_box() -> BBox {
        BBox::new(200.0, 100.0, 300.0, 350.0)
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(AlertLevel::from_score(0), AlertLevel::Normal);
        assert_eq!(AlertLevel::from_score(2), AlertLevel::Normal);
        assert_eq!(AlertLevel::from_score(3), AlertLevel::Suspicious);
        assert_eq!(AlertLevel::from_score(4), AlertLevel::Suspicious);
        assert_eq!(AlertLevel::from_score(5), AlertLevel::Threat);
        assert_eq!(AlertLevel::from_score(10), AlertLevel::Threat);
    }

    #[test]
    fn test_long_stay_only() {
        let t0 = Instant::now();
        let store = store_with(&[(1, centre_box())], 1, t0);
        let now = t0 + Duration::from_secs(35);

        let scores = engine().score(store.all(), &[], &[], FRAME, now);
        let record = &scores[&TrackId(1)];
        assert_eq!(record.factor_labels(), vec!["long stay".to_string()]);
        assert_eq!(record.score, 1);
        assert_eq!(record.alert_level, AlertLevel::Normal);
        assert!((record.stay_duration - 35.0).abs() < 1e-6);
    }

    #[test]
    fn test_weapon_overlap_scores_five() {
        let t0 = Instant::now();
        let store = store_with(&[(1, centre_box())], 1, t0);
        let weapon = Detection::new(ObjectClass::Gun, BBox::new(280.0, 200.0, 340.0, 240.0), 0.7);

        let scores = engine().score(store.all(), &[weapon], &[], FRAME, t0);
        let record = &scores[&TrackId(1)];
        assert_eq!(record.factors, vec![Factor::WeaponNearby(ObjectClass::Gun)]);
        assert_eq!(record.alert_level, AlertLevel::Threat);
    }

    #[test]
    fn test_weapon_center_on_expanded_boundary() {
        let person = BBox::new(100.0, 100.0, 200.0, 300.0);
        // 外扩后 x2 = 220, 武器中心恰好在 x=220
        let on_edge = BBox::new(215.0, 190.0, 225.0, 210.0);
        assert!(is_near(&person, &on_edge, 0.2));

        let outside = BBox::new(400.0, 400.0, 420.0, 420.0);
        assert!(!is_near(&person, &outside, 0.2));
    }

    #[test]
    fn test_raw_overlap_counts_without_center() {
        let person = BBox::new(100.0, 100.0, 200.0, 300.0);
        // 大框: 中心在外扩框之外, 但与原框重叠
        let long_rifle = BBox::new(190.0, 150.0, 600.0, 160.0);
        assert!(is_near(&person, &long_rifle, 0.2));
    }

    #[test]
    fn test_first_matching_weapon_wins() {
        let person = BBox::new(100.0, 100.0, 200.0, 300.0);
        let weapons = vec![
            Detection::new(ObjectClass::Gun, BBox::new(500.0, 400.0, 520.0, 420.0), 0.9),
            Detection::new(ObjectClass::Knife, BBox::new(150.0, 150.0, 160.0, 170.0), 0.4),
            Detection::new(ObjectClass::Bat, BBox::new(140.0, 150.0, 160.0, 250.0), 0.8),
        ];
        let found = find_nearby(&person, &weapons, 0.2).unwrap();
        assert_eq!(found.class_label, ObjectClass::Knife);
    }

    #[test]
    fn test_restricted_zone_and_item() {
        let t0 = Instant::now();
        let store = store_with(&[(1, centre_box())], 1, t0);
        let mut engine = ScoringEngine::new(
            ScoringConfig::default(),
            Some(BBox::new(150.0, 150.0, 350.0, 400.0)),
            2,
        );
        let bag = Detection::new(ObjectClass::Backpack, BBox::new(300.0, 300.0, 360.0, 360.0), 0.6);

        let scores = engine.score(store.all(), &[], &[bag], FRAME, t0);
        let record = &scores[&TrackId(1)];
        assert_eq!(
            record.factors,
            vec![
                Factor::RestrictedZone,
                Factor::ItemNearby(ObjectClass::Backpack)
            ]
        );
        assert_eq!(record.score, 4);
        assert_eq!(record.alert_level, AlertLevel::Suspicious);
    }

    #[test]
    fn test_crowd_factor_names_count() {
        let t0 = Instant::now();
        let store = store_with(
            &[
                (1, BBox::new(100.0, 100.0, 150.0, 200.0)),
                (2, BBox::new(200.0, 100.0, 250.0, 200.0)),
                (3, BBox::new(300.0, 100.0, 350.0, 200.0)),
            ],
            1,
            t0,
        );
        let scores = engine().score(store.all(), &[], &[], FRAME, t0);
        for record in scores.values() {
            assert!(record.factors.contains(&Factor::Crowd(3)));
            assert_eq!(record.factor_labels(), vec!["crowd (3 people)".to_string()]);
        }
    }

    #[test]
    fn test_frame_edge() {
        let t0 = Instant::now();
        let store = store_with(&[(1, BBox::new(10.0, 100.0, 60.0, 200.0))], 1, t0);
        let scores = engine().score(store.all(), &[], &[], FRAME, t0);
        assert_eq!(scores[&TrackId(1)].factors, vec![Factor::FrameEdge]);
    }

    #[test]
    fn test_stillness_after_five_seconds() {
        let t0 = Instant::now();
        let mut engine = engine();
        let mut store = TrackStore::new();

        for step in 0..=6 {
            let at = t0 + Duration::from_secs(step);
            let x = 200.0 + step as f32;
            store.update(
                &[PersonDetection::new(1, BBox::new(x, 100.0, x + 100.0, 350.0), 0.9)],
                step + 1,
                at,
            );
            let scores = engine.score(store.all(), &[], &[], FRAME, at);
            let record = &scores[&TrackId(1)];
            if step < 5 {
                assert!(!record.factors.contains(&Factor::Stillness));
            } else {
                assert!(record.factors.contains(&Factor::Stillness));
            }
            assert!(!record.factors.contains(&Factor::ErraticMovement));
        }
    }

    #[test]
    fn test_erratic_movement() {
        let t0 = Instant::now();
        let mut engine = engine();
        let mut store = TrackStore::new();

        let positions = [(0u64, 100.0f32), (2, 300.0)];
        let mut last = BTreeMap::new();
        for (secs, x) in positions {
            let at = t0 + Duration::from_secs(secs);
            store.update(
                &[PersonDetection::new(1, BBox::new(x, 100.0, x + 100.0, 350.0), 0.9)],
                secs + 1,
                at,
            );
            last = engine.score(store.all(), &[], &[], FRAME, at);
        }
        assert!(last[&TrackId(1)].factors.contains(&Factor::ErraticMovement));
        assert_eq!(
            engine.history(TrackId(1)).map(|h| h.len()),
            Some(2)
        );
    }

    #[test]
    fn test_unseen_track_keeps_scoring_at_last_position() {
        let t0 = Instant::now();
        let mut engine = engine();
        let store = store_with(&[(1, centre_box())], 1, t0);

        // 之后不再出现, 跟踪仍在存储中
        let last = (0..=6)
            .map(|secs| engine.score(store.all(), &[], &[], FRAME, t0 + Duration::from_secs(secs)))
            .last()
            .unwrap();
        assert!(last[&TrackId(1)].factors.contains(&Factor::Stillness));
        assert_eq!(engine.history(TrackId(1)).map(|h| h.len()), Some(7));
    }

    #[test]
    fn test_history_dropped_for_missing_tracks() {
        let t0 = Instant::now();
        let mut engine = engine();
        let store = store_with(&[(1, centre_box())], 1, t0);
        engine.score(store.all(), &[], &[], FRAME, t0);
        assert!(engine.history(TrackId(1)).is_some());

        let empty = BTreeMap::new();
        engine.score(&empty, &[], &[], FRAME, t0 + Duration::from_secs(1));
        assert!(engine.history(TrackId(1)).is_none());
    }

    #[test]
    fn test_factor_json_is_text() {
        let record = ScoreRecord::from_factors(
            vec![Factor::LongStay, Factor::WeaponNearby(ObjectClass::Knife)],
            31.0,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["alert_level"], "THREAT");
        assert_eq!(json["factors"][1], "weapon nearby (knife)");
        assert_eq!(json["score"], 6);
    }
}
