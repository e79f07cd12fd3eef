//! 威胁截图保存 (Evidence capture)

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{error, info, warn};

use crate::analysis::alert::CaptureRequest;
use crate::error::EvidenceError;
use crate::runner::ReportSink;
use crate::session::{FrameInput, FramePixels, FrameReport};

/// 截图文件名: threat_id{身份}_{本地时间}.jpg
pub fn evidence_file_name(request: &CaptureRequest) -> String {
    format!(
        "threat_id{}_{}.jpg",
        request.track_id,
        request.timestamp.format("%Y%m%d_%H%M%S")
    )
}

/// 把威胁截图写入目录
#[derive(Debug, Clone)]
pub struct EvidenceWriter {
    dir: PathBuf,
    saved: u64,
}

impl EvidenceWriter {
    /// 目录不存在时自动创建
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, EvidenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, saved: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 已保存的截图数量
    pub fn saved(&self) -> u64 {
        self.saved
    }

    /// 保存一张截图, 返回文件路径
    pub fn save(
        &mut self,
        request: &CaptureRequest,
        pixels: &FramePixels,
    ) -> Result<PathBuf, EvidenceError> {
        let expected = pixels.width as usize * pixels.height as usize * 3;
        if pixels.rgb.len() != expected {
            return Err(EvidenceError::BufferMismatch {
                expected,
                actual: pixels.rgb.len(),
            });
        }
        let image = RgbImage::from_raw(pixels.width, pixels.height, pixels.rgb.to_vec()).ok_or(
            EvidenceError::BufferMismatch {
                expected,
                actual: pixels.rgb.len(),
            },
        )?;

        let path = self.dir.join(evidence_file_name(request));
        image.save(&path)?;
        self.saved += 1;
        info!(track_id = %request.track_id, path = %path.display(), "📸 威胁截图已保存");
        Ok(path)
    }
}

impl ReportSink for EvidenceWriter {
    /// 截图失败只记录日志, 不中断会话
    fn handle(&mut self, frame: &FrameInput, report: &FrameReport) -> anyhow::Result<()> {
        if report.captures.is_empty() {
            return Ok(());
        }
        let Some(pixels) = &frame.pixels else {
            warn!(frame = frame.frame_number, "帧没有像素数据, 无法截图");
            return Ok(());
        };
        for request in &report.captures {
            if let Err(e) = self.save(request, pixels) {
                error!(track_id = %request.track_id, error = %e, "❌ 截图保存失败");
            }
        }
        Ok(())
    }
}
