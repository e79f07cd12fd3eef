//! 位置历史 (用于静止/异常移动判定)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::detection::types::Point;

/// 位置采样
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionSample {
    pub at: Instant,
    pub position: Point,
}

/// 单个跟踪的短时位置历史, 按时间有序
#[derive(Clone, Debug, Default)]
pub struct PositionHistory {
    samples: VecDeque<PositionSample>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加采样并淘汰超过保留时长的旧采样
    ///
    /// 早于最后一个采样的时间戳被忽略, 保持有序。
    pub fn record(&mut self, at: Instant, position: Point, retention: Duration) {
        let in_order = self.samples.back().map_or(true, |last| at >= last.at);
        if in_order {
            self.samples.push_back(PositionSample { at, position });
        }
        self.prune(at, retention);
    }

    /// 淘汰 `now - at > retention` 的采样
    pub fn prune(&mut self, now: Instant, retention: Duration) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > retention {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// 当前位置相对回看点的位移
    ///
    /// 回看点为距 `now` 至少 `lookback` 的最近一个采样; 采样不足2个或没有回看点时返回 None。
    pub fn displacement_since(&self, now: Instant, lookback: Duration) -> Option<f32> {
        if self.samples.len() < 2 {
            return None;
        }
        let current = self.samples.back()?.position;
        let anchor = self
            .samples
            .iter()
            .rev()
            .find(|sample| now.saturating_duration_since(sample.at) >= lookback)?;
        Some(anchor.position.distance(&current))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETENTION: Duration = Duration::from_secs(10);

    #[test]
    fn test_prunes_expired_samples() {
        let t0 = Instant::now();
        let mut history = PositionHistory::new();
        history.record(t0, Point::new(0.0, 0.0), RETENTION);
        history.record(t0 + Duration::from_secs(10), Point::new(1.0, 0.0), RETENTION);
        assert_eq!(history.len(), 2);

        history.record(t0 + Duration::from_millis(10_001), Point::new(2.0, 0.0), RETENTION);
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().position, Point::new(1.0, 0.0));
    }

    #[test]
    fn test_displacement_uses_most_recent_qualifying_sample() {
        let t0 = Instant::now();
        let mut history = PositionHistory::new();
        history.record(t0, Point::new(0.0, 0.0), RETENTION);
        history.record(t0 + Duration::from_secs(2), Point::new(30.0, 0.0), RETENTION);
        history.record(t0 + Duration::from_secs(7), Point::new(40.0, 0.0), RETENTION);

        let now = t0 + Duration::from_secs(7);
        // 至少5秒前的最近采样是 t0+2s
        assert_eq!(history.displacement_since(now, Duration::from_secs(5)), Some(10.0));
    }

    #[test]
    fn test_displacement_requires_history() {
        let t0 = Instant::now();
        let mut history = PositionHistory::new();
        history.record(t0, Point::new(0.0, 0.0), RETENTION);
        let now = t0 + Duration::from_secs(6);
        assert_eq!(history.displacement_since(now, Duration::from_secs(5)), None);

        history.record(t0 + Duration::from_secs(1), Point::new(5.0, 0.0), RETENTION);
        // 没有足够早的采样
        let now = t0 + Duration::from_secs(1);
        assert_eq!(history.displacement_since(now, Duration::from_secs(5)), None);
    }

    #[test]
    fn test_out_of_order_sample_ignored() {
        let t0 = Instant::now();
        let mut history = PositionHistory::new();
        history.record(t0 + Duration::from_secs(3), Point::new(0.0, 0.0), RETENTION);
        history.record(t0, Point::new(9.0, 9.0), RETENTION);
        assert_eq!(history.len(), 1);
    }
}
