//! JSON Lines 帧回放 (离线检测结果)
//!
//! 每行一帧:
//! `{"frame":1,"timestamp_ms":0,"width":640,"height":480,"persons":[{"track_id":1,"bbox":{...}}],"weapons":[{"class":"gun","bbox":{...},"confidence":0.8}]}`
//! 空行和 `#` 开头的行被忽略。

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::types::{Detection, FrameGeometry, PersonDetection};
use crate::runner::FrameSource;
use crate::session::FrameInput;

/// 单帧记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame: u64,
    /// 相对会话开始的毫秒数, 缺省时按帧率推算
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub persons: Vec<PersonDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapons: Option<Vec<Detection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Detection>>,
}

impl FrameRecord {
    /// 相对会话开始的偏移
    pub fn offset(&self, fps: f64) -> Duration {
        match self.timestamp_ms {
            Some(ms) => Duration::from_millis(ms),
            None if fps > 0.0 => {
                Duration::try_from_secs_f64(self.frame as f64 / fps).unwrap_or_default()
            }
            None => Duration::ZERO,
        }
    }
}

/// 从 JSON Lines 读取帧
pub struct JsonlFrameSource<R> {
    lines: Lines<R>,
    line_number: usize,
    fps: f64,
    origin: Instant,
    wall_origin: DateTime<Local>,
    frames_read: u64,
}

impl JsonlFrameSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("无法打开回放文件 {}", path.display()))?;
        info!("📂 回放文件: {}", path.display());
        Ok(Self::new(BufReader::new(file), fps))
    }
}

impl<R: BufRead> JsonlFrameSource<R> {
    pub fn new(reader: R, fps: f64) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            fps,
            origin: Instant::now(),
            wall_origin: Local::now(),
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// 时间戳超出时钟范围时返回 None
    fn to_input(&self, record: FrameRecord) -> Option<FrameInput> {
        let offset = record.offset(self.fps);
        let wall_offset = chrono::Duration::from_std(offset).ok()?;
        Some(FrameInput {
            frame_number: record.frame,
            geometry: FrameGeometry::new(record.width, record.height),
            persons: record.persons,
            weapons: record.weapons,
            items: record.items,
            captured_at: self.origin.checked_add(offset)?,
            wall_time: self.wall_origin.checked_add_signed(wall_offset)?,
            pixels: None,
        })
    }
}

impl<R: BufRead> FrameSource for JsonlFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<FrameInput>> {
        while let Some(line) = self.lines.next() {
            self.line_number += 1;
            let line = line.with_context(|| format!("读取第 {} 行失败", self.line_number))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(trimmed)
                .with_context(|| format!("第 {} 行解析失败", self.line_number))?;
            let frame = record.frame;
            match self.to_input(record) {
                Some(input) => {
                    self.frames_read += 1;
                    return Ok(Some(input));
                }
                None => {
                    warn!(line = self.line_number, frame, "⚠️ 时间戳超出范围, 跳过该帧")
                }
            }
        }
        Ok(None)
    }

    fn release(&mut self) {
        info!(frames = self.frames_read, "回放结束");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, ObjectClass, TrackId};
    use std::io::Cursor;

    const SAMPLE: &str = r#"
# 两帧示例
{"frame":1,"timestamp_ms":0,"width":640,"height":480,"persons":[{"track_id":4,"bbox":{"x1":10,"y1":20,"x2":110,"y2":220},"confidence":0.9}]}

{"frame":2,"timestamp_ms":1500,"width":640,"height":480,"persons":[{"track_id":4,"bbox":{"x1":12,"y1":20,"x2":112,"y2":220}}],"weapons":[{"class":"Pistol","bbox":{"x1":90,"y1":100,"x2":130,"y2":130},"confidence":0.7}]}
"#;

    #[test]
    fn test_reads_records_and_skips_comments() {
        let mut source = JsonlFrameSource::new(Cursor::new(SAMPLE), 30.0);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_number, 1);
        assert_eq!(first.geometry, FrameGeometry::new(640, 480));
        assert_eq!(first.persons[0].identity, TrackId(4));
        assert_eq!(first.persons[0].bbox, BBox::new(10.0, 20.0, 110.0, 220.0));
        assert!(first.weapons.is_none());

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.captured_at - first.captured_at, Duration::from_millis(1500));
        assert_eq!(second.persons[0].confidence, 1.0);
        let weapons = second.weapons.unwrap();
        assert_eq!(weapons[0].class_label, ObjectClass::Gun);

        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn test_missing_timestamp_uses_fps() {
        let line = r#"{"frame":60,"width":640,"height":480}"#;
        let record: FrameRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.offset(30.0), Duration::from_secs(2));
        assert!(record.persons.is_empty());
    }

    #[test]
    fn test_huge_timestamp_is_rejected() {
        let input = concat!(
            r#"{"frame":1,"timestamp_ms":10000000000000000,"width":640,"height":480}"#,
            "\n",
            r#"{"frame":2,"timestamp_ms":33,"width":640,"height":480}"#,
            "\n",
        );
        let mut source = JsonlFrameSource::new(Cursor::new(input), 30.0);
        let next = source.next_frame().unwrap().unwrap();
        assert_eq!(next.frame_number, 2);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.frames_read(), 1);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let input = "{\"frame\":1,\"width\":640,\"height\":480}\nnot json\n";
        let mut source = JsonlFrameSource::new(Cursor::new(input), 30.0);
        assert!(source.next_frame().unwrap().is_some());
        let err = source.next_frame().unwrap_err();
        assert!(format!("{err:#}").contains("第 2 行"));
    }
}
