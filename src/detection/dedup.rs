//! 检测去重 (NMS)
//!
//! 多个检测器 (或同一检测器多次调用) 对同一目标会给出重叠框,
//! 这里按置信度贪心保留每簇的代表框。人员清理与武器/物品证据清理共用同一实现,
//! 只在策略参数上不同。

use serde::{Deserialize, Serialize};

use super::types::{BBox, Detection, PersonDetection};

/// 可参与去重的检测
pub trait Candidate {
    fn bbox(&self) -> &BBox;

    fn confidence(&self) -> f32;

    /// 同类判定 (仅在要求类别匹配时使用)
    fn same_class(&self, other: &Self) -> bool;
}

impl Candidate for Detection {
    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn same_class(&self, other: &Self) -> bool {
        self.class_label == other.class_label
    }
}

impl Candidate for PersonDetection {
    fn bbox(&self) -> &BBox {
        &self.bbox
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn same_class(&self, _other: &Self) -> bool {
        true
    }
}

/// 去重策略
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DedupPolicy {
    /// 为true时不同类别的重叠框互不抑制
    pub class_match_required: bool,
    /// IOU 大于该值视为重复
    pub iou_threshold: f32,
}

impl DedupPolicy {
    /// 人员清理: 不区分类别, 阈值更严格
    pub const PERSON: Self = Self {
        class_match_required: false,
        iou_threshold: 0.3,
    };

    /// 武器/物品证据清理: 区分类别
    pub const EVIDENCE: Self = Self {
        class_match_required: true,
        iou_threshold: 0.45,
    };

    pub fn apply<T: Candidate + Clone>(&self, detections: &[T]) -> Vec<T> {
        dedupe(detections, self.class_match_required, self.iou_threshold)
    }
}

/// 贪心NMS
///
/// 按置信度降序遍历 (同置信度保持到达顺序), 与任一已保留框
/// IOU 超过阈值 (且在要求时同类) 的检测被丢弃。输出按置信度降序。
pub fn dedupe<T: Candidate + Clone>(
    detections: &[T],
    class_match_required: bool,
    iou_threshold: f32,
) -> Vec<T> {
    if detections.len() <= 1 {
        return detections.to_vec();
    }

    let mut order: Vec<usize> = (0..detections.len()).collect();
    // sort_by 是稳定排序
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence()
            .total_cmp(&detections[a].confidence())
    });

    let mut kept: Vec<&T> = Vec::with_capacity(detections.len());
    for index in order {
        let candidate = &detections[index];
        let duplicate = kept.iter().any(|existing| {
            (!class_match_required || existing.same_class(candidate))
                && existing.bbox().iou(candidate.bbox()) > iou_threshold
        });
        if !duplicate {
            kept.push(candidate);
        }
    }

    if kept.len() < detections.len() {
        tracing::debug!(
            input = detections.len(),
            kept = kept.len(),
            "去重: {} -> {}",
            detections.len(),
            kept.len()
        );
    }

    kept.into_iter().cloned().collect()
}
