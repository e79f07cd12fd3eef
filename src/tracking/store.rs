//! 跟踪记忆 (Track memory)
//!
//! 按身份保存每个人的首次出现时间与最近一次观测, 不保留历史框。
//! 超过超时帧数未出现的跟踪会被淘汰。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::detection::types::{BBox, PersonDetection, Point, TrackId};

/// 跟踪对象
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    /// 身份标识
    pub track_id: TrackId,

    /// 首次出现时间
    pub first_seen: Instant,

    /// 最近中心点
    pub last_position: Point,

    /// 最近边界框
    pub last_bbox: BBox,

    /// 最近出现的帧号
    pub last_seen_frame: u64,
}

impl Track {
    /// 停留时长
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen)
    }
}

/// 跟踪存储, 每个身份至多一个 Track
#[derive(Debug, Default, Clone)]
pub struct TrackStore {
    tracks: BTreeMap<TrackId, Track>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用本帧人员检测更新跟踪
    ///
    /// 新身份以 `now` 作为首次出现时间; 已有身份覆盖位置、框和帧号。
    pub fn update(&mut self, detections: &[PersonDetection], frame_number: u64, now: Instant) {
        for detection in detections {
            let position = detection.bbox.center();
            self.tracks
                .entry(detection.identity)
                .and_modify(|track| {
                    track.last_position = position;
                    track.last_bbox = detection.bbox;
                    track.last_seen_frame = track.last_seen_frame.max(frame_number);
                })
                .or_insert_with(|| {
                    debug!(track_id = %detection.identity, frame = frame_number, "新跟踪目标");
                    Track {
                        track_id: detection.identity,
                        first_seen: now,
                        last_position: position,
                        last_bbox: detection.bbox,
                        last_seen_frame: frame_number,
                    }
                });
        }
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// 所有跟踪 (借用视图)
    pub fn all(&self) -> &BTreeMap<TrackId, Track> {
        &self.tracks
    }

    /// 所有跟踪的拷贝, 与后续修改隔离
    pub fn snapshot(&self) -> BTreeMap<TrackId, Track> {
        self.tracks.clone()
    }

    /// 淘汰 `frame_number - last_seen_frame > timeout_frames` 的跟踪, 返回被淘汰的身份
    pub fn evict_stale(&mut self, frame_number: u64, timeout_frames: u64) -> Vec<TrackId> {
        let stale: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|track| frame_number.saturating_sub(track.last_seen_frame) > timeout_frames)
            .map(|track| track.track_id)
            .collect();

        for track_id in &stale {
            self.tracks.remove(track_id);
        }

        if !stale.is_empty() {
            debug!(frame = frame_number, evicted = stale.len(), "淘汰过期跟踪");
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
