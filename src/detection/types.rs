//! 检测数据结构定义
//! Data structures shared by the analytics pipeline

use std::fmt;

use serde::{Deserialize, Serialize};

// ========== 枚举类型 ==========

/// 目标类别 (detector class label)
///
/// 外部检测器给出的标签统一转小写后解析; 未知标签保留原文。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ObjectClass {
    Person,
    Gun,
    Knife,
    Bat,
    Backpack,
    Suitcase,
    Handbag,
    Other(String),
}

impl ObjectClass {
    /// 从检测器标签解析
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "person" => Self::Person,
            "gun" | "pistol" | "handgun" | "rifle" | "firearm" => Self::Gun,
            "knife" | "scissors" => Self::Knife,
            "bat" | "baseball bat" => Self::Bat,
            "backpack" => Self::Backpack,
            "suitcase" => Self::Suitcase,
            "handbag" => Self::Handbag,
            _ => Self::Other(label),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "person",
            Self::Gun => "gun",
            Self::Knife => "knife",
            Self::Bat => "bat",
            Self::Backpack => "backpack",
            Self::Suitcase => "suitcase",
            Self::Handbag => "handbag",
            Self::Other(label) => label,
        }
    }

    /// 已知武器类别
    pub fn is_weapon(&self) -> bool {
        matches!(self, Self::Gun | Self::Knife | Self::Bat)
    }

    /// 可疑物品 (背包/行李箱类)
    pub fn is_suspicious_item(&self) -> bool {
        matches!(self, Self::Backpack | Self::Suitcase | Self::Handbag)
    }
}

impl From<String> for ObjectClass {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<ObjectClass> for String {
    fn from(class: ObjectClass) -> Self {
        class.as_str().to_string()
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== 数据结构 ==========

/// 跟踪身份标识 (opaque identity token)
///
/// 稳定性由上游检测器决定: 上游无跟踪时可能是逐帧序号,
/// 此时停留时长与轨迹类因子没有意义。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// 像素坐标点
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 检测框 (x1, y1, x2, y2), 像素坐标
///
/// 规范形式要求 `x1 < x2`, `y1 < y2` 且坐标有限; 限制区域也复用此结构。
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// 中心点
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 坐标有限且顺序正确
    pub fn is_canonical(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// 交集面积, 不相交时为0
    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        (x2 - x1) * (y2 - y1)
    }

    /// IOU (Intersection over Union)
    pub fn iou(&self, other: &BBox) -> f32 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// 两框有正面积重叠
    pub fn intersects(&self, other: &BBox) -> bool {
        self.x1.max(other.x1) < self.x2.min(other.x2)
            && self.y1.max(other.y1) < self.y2.min(other.y2)
    }

    /// 每边按宽高比例外扩 (ratio=0.2 即每边扩20%)
    pub fn expanded(&self, ratio: f32) -> BBox {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        BBox::new(self.x1 - dx, self.y1 - dy, self.x2 + dx, self.y2 + dy)
    }

    /// 点是否在框内 (含边界)
    pub fn contains(&self, point: &Point) -> bool {
        self.x1 <= point.x && point.x <= self.x2 && self.y1 <= point.y && point.y <= self.y2
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}, {:.1}, {:.1})",
            self.x1, self.y1, self.x2, self.y2
        )
    }
}

/// 单帧检测结果 (武器/物品检测器输出)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: ObjectClass,
    pub bbox: BBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_label: ObjectClass, bbox: BBox, confidence: f32) -> Self {
        Self {
            class_label,
            bbox,
            confidence,
        }
    }
}

/// 人员检测 (带身份标识)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    #[serde(rename = "track_id")]
    pub identity: TrackId,
    pub bbox: BBox,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl PersonDetection {
    pub fn new(identity: impl Into<TrackId>, bbox: BBox, confidence: f32) -> Self {
        Self {
            identity: identity.into(),
            bbox,
            confidence,
        }
    }
}

/// 帧尺寸
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 框是否距离任一画面边缘不超过 margin 像素
    pub fn near_edge(&self, bbox: &BBox, margin: f32) -> bool {
        let w = self.width as f32;
        let h = self.height as f32;
        bbox.x1 <= margin || bbox.y1 <= margin || bbox.x2 >= w - margin || bbox.y2 >= h - margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
        // 只在一个轴上重叠
        let c = BBox::new(5.0, 20.0, 15.0, 30.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        // 交集50, 并集150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&BBox::new(9.0, 9.0, 20.0, 20.0)));
    }

    #[test]
    fn test_expanded_and_contains() {
        let person = BBox::new(100.0, 100.0, 200.0, 300.0);
        let grown = person.expanded(0.2);
        assert_eq!(grown, BBox::new(80.0, 60.0, 220.0, 340.0));
        assert!(grown.contains(&Point::new(220.0, 340.0)));
        assert!(!grown.contains(&Point::new(220.1, 200.0)));
    }

    #[test]
    fn test_canonical() {
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_canonical());
        assert!(!BBox::new(1.0, 0.0, 0.0, 1.0).is_canonical());
        assert!(!BBox::new(0.0, 0.0, 0.0, 1.0).is_canonical());
        assert!(!BBox::new(0.0, f32::NAN, 1.0, 1.0).is_canonical());
    }

    #[test]
    fn test_class_labels() {
        assert_eq!(ObjectClass::from_label("Pistol"), ObjectClass::Gun);
        assert_eq!(ObjectClass::from_label("scissors"), ObjectClass::Knife);
        assert_eq!(ObjectClass::from_label(" Backpack "), ObjectClass::Backpack);
        assert_eq!(
            ObjectClass::from_label("Weapon"),
            ObjectClass::Other("weapon".to_string())
        );
        assert!(ObjectClass::Bat.is_weapon());
        assert!(ObjectClass::Suitcase.is_suspicious_item());
        assert!(!ObjectClass::Person.is_weapon());
    }

    #[test]
    fn test_detection_json() {
        let json = r#"{"class":"knife","bbox":{"x1":1,"y1":2,"x2":3,"y2":4},"confidence":0.8}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.class_label, ObjectClass::Knife);
        assert_eq!(det.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));

        let person: PersonDetection =
            serde_json::from_str(r#"{"track_id":7,"bbox":{"x1":1,"y1":2,"x2":3,"y2":4}}"#).unwrap();
        assert_eq!(person.identity, TrackId(7));
        assert_eq!(person.confidence, 1.0);
    }

    #[test]
    fn test_near_edge() {
        let frame = FrameGeometry::new(640, 480);
        assert!(frame.near_edge(&BBox::new(10.0, 100.0, 80.0, 200.0), 50.0));
        assert!(frame.near_edge(&BBox::new(300.0, 100.0, 600.0, 200.0), 50.0));
        assert!(!frame.near_edge(&BBox::new(200.0, 100.0, 300.0, 350.0), 50.0));
    }
}
