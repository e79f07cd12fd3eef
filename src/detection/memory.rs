//! 武器短时记忆 (weapon short-term memory)
//!
//! 武器检测在相邻帧间容易闪烁, 记住最近一次检测到的武器若干帧。
//! 新的检测结果整体替换记忆; 没有新检测时按帧龄淘汰。

use std::collections::VecDeque;

use super::types::Detection;

/// 有界环形缓冲 `(frame_seen, Detection)`
#[derive(Debug, Clone)]
pub struct WeaponMemory {
    entries: VecDeque<(u64, Detection)>,
    /// 记忆保留帧数
    retention_frames: u64,
    /// 最大条目数, 超出时丢弃最旧
    capacity: usize,
}

impl WeaponMemory {
    pub fn new(retention_frames: u64, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            retention_frames,
            capacity,
        }
    }

    /// 记录本帧武器检测 (可能为空)
    pub fn observe(&mut self, frame_number: u64, detections: &[Detection]) {
        if !detections.is_empty() {
            self.entries.clear();
            for detection in detections {
                if self.entries.len() == self.capacity {
                    self.entries.pop_front();
                }
                self.entries.push_back((frame_number, detection.clone()));
            }
        }
        self.prune(frame_number);
    }

    /// 淘汰超过保留帧数的条目
    pub fn prune(&mut self, frame_number: u64) {
        let retention = self.retention_frames;
        self.entries
            .retain(|(seen, _)| frame_number.saturating_sub(*seen) < retention);
    }

    /// 当前记忆中的武器 (按记录顺序)
    pub fn detections(&self) -> Vec<Detection> {
        self.entries.iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, Detection)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
