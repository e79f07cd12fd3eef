//! 错误类型定义

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::detection::types::BBox;

/// 检测来源通道 (用于错误定位)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Person,
    Weapon,
    Item,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Person => "person",
            Channel::Weapon => "weapon",
            Channel::Item => "item",
        })
    }
}

/// 流水线入口校验错误: 无效帧在进入跟踪/评分之前被拒绝
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid frame dimensions: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("{channel} detection #{index}: bbox {bbox} is not canonical")]
    MalformedBBox {
        channel: Channel,
        index: usize,
        bbox: BBox,
    },

    #[error("{channel} detection #{index}: confidence {confidence} outside [0, 1]")]
    ConfidenceOutOfRange {
        channel: Channel,
        index: usize,
        confidence: f32,
    },
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 证据截图保存错误
#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
