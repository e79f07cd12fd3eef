//! 数字卫兵 (Digital Sentinel)
//!
//! 回放外部检测器的 JSON Lines 输出, 逐帧做行为评分与告警决策。
//!
//! 系统架构:
//! 1. 会话线程: 读取帧 → 去重 → 跟踪 → 评分 → 告警
//! 2. 主线程:   等待会话结束并打印统计

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_rs::{
    spawn_session, BBox, EvidenceWriter, FrameInput, FrameReport, JsonlFrameSource, ReportSink,
    SessionConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 行为分析与告警", long_about = None)]
struct Args {
    /// 检测结果文件 (JSON Lines)
    #[arg(short, long)]
    input: PathBuf,

    /// 会话配置文件 (JSON), 不存在时写入默认配置
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 限制区域 x1,y1,x2,y2
    #[arg(long, value_parser = parse_zone)]
    zone: Option<BBox>,

    /// 人群判定人数
    #[arg(long)]
    crowd_threshold: Option<usize>,

    /// 跟踪超时帧数
    #[arg(long)]
    stale_timeout: Option<u64>,

    /// 缺少时间戳时使用的帧率
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// 威胁截图目录
    #[arg(long)]
    evidence_dir: Option<PathBuf>,

    /// 输出每一帧 (默认只输出有告警的帧)
    #[arg(long, default_value_t = false)]
    all_frames: bool,

    /// JSON 格式日志
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn parse_zone(s: &str) -> Result<BBox, String> {
    let values: Vec<f32> = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("{v}: {e}")))
        .collect::<Result<_, _>>()?;
    let &[x1, y1, x2, y2] = values.as_slice() else {
        return Err(format!("需要4个数值 x1,y1,x2,y2, 实际 {}", values.len()));
    };
    let zone = BBox::new(x1, y1, x2, y2);
    if !zone.is_canonical() {
        return Err(format!("区域 {zone} 无效"));
    }
    Ok(zone)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// 把帧结果以 JSON Lines 写到标准输出
struct StdoutSink {
    all_frames: bool,
}

impl ReportSink for StdoutSink {
    fn handle(&mut self, _frame: &FrameInput, report: &FrameReport) -> Result<()> {
        if !self.all_frames && !report.has_alerts() {
            return Ok(());
        }
        let line = serde_json::to_string(report)?;
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_or_create(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => SessionConfig::default(),
    };

    // 命令行参数覆盖配置文件
    if let Some(zone) = args.zone {
        config.restricted_zone = Some(zone);
    }
    if let Some(threshold) = args.crowd_threshold {
        config.crowd_threshold = threshold;
    }
    if let Some(timeout) = args.stale_timeout {
        config.stale_track_timeout_frames = timeout;
    }
    config.validate().context("配置无效")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("🚀 数字卫兵启动");
    let config = load_config(&args)?;
    config.log_summary();

    let source = JsonlFrameSource::open(&args.input, args.fps)?;
    let evidence = args
        .evidence_dir
        .as_ref()
        .map(EvidenceWriter::new)
        .transpose()
        .context("无法创建截图目录")?;
    let sink = (
        StdoutSink {
            all_frames: args.all_frames,
        },
        evidence,
    );

    // ========== 启动会话线程 ==========
    let handle = spawn_session(config, source, sink)?;
    let summary = handle.join()?;

    info!(
        "📊 处理 {} 帧 (跳过 {}), 告警 {} 次, 人群提示 {} 次, 截图 {} 张, 最多威胁 {} / 武器 {}",
        summary.frames_processed,
        summary.frames_rejected,
        summary.alerts,
        summary.crowd_notices,
        summary.captures,
        summary.peak_threats,
        summary.peak_weapons
    );
    Ok(())
}
