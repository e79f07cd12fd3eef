//! 会话运行器 (Session runner)
//!
//! 帧源 → Session → 输出端, 单线程顺序处理。
//! 通过控制通道随时停止, 停止后不再处理任何帧。

use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::session::{FrameInput, FrameReport, Session};

/// 控制消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Stop,
}

/// 帧源 (外部检测器输出)
pub trait FrameSource {
    /// 下一帧, 源耗尽时返回 None
    fn next_frame(&mut self) -> Result<Option<FrameInput>>;

    /// 释放底层资源 (会话结束时必定调用一次)
    fn release(&mut self) {}
}

/// 帧结果输出端
pub trait ReportSink {
    fn handle(&mut self, frame: &FrameInput, report: &FrameReport) -> Result<()>;
}

impl<A: ReportSink, B: ReportSink> ReportSink for (A, B) {
    fn handle(&mut self, frame: &FrameInput, report: &FrameReport) -> Result<()> {
        self.0.handle(frame, report)?;
        self.1.handle(frame, report)
    }
}

impl<T: ReportSink> ReportSink for Option<T> {
    fn handle(&mut self, frame: &FrameInput, report: &FrameReport) -> Result<()> {
        match self {
            Some(sink) => sink.handle(frame, report),
            None => Ok(()),
        }
    }
}

impl<T: ReportSink + ?Sized> ReportSink for Box<T> {
    fn handle(&mut self, frame: &FrameInput, report: &FrameReport) -> Result<()> {
        (**self).handle(frame, report)
    }
}

/// 内存帧源
impl FrameSource for std::vec::IntoIter<FrameInput> {
    fn next_frame(&mut self) -> Result<Option<FrameInput>> {
        Ok(self.next())
    }
}

/// 收集所有报告 (测试/离线分析用)
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Vec<FrameReport>,
}

impl ReportSink for CollectingSink {
    fn handle(&mut self, _frame: &FrameInput, report: &FrameReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// 会话统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub alerts: u64,
    pub crowd_notices: u64,
    pub captures: u64,
    pub peak_threats: usize,
    pub peak_weapons: usize,
    /// 是否由控制通道停止
    pub stopped: bool,
}

impl SessionSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames_processed += 1;
        self.alerts += report.events.len() as u64;
        self.crowd_notices += u64::from(report.crowd_notice.is_some());
        self.captures += report.captures.len() as u64;
        self.peak_threats = self.peak_threats.max(report.stats.threats);
        self.peak_weapons = self.peak_weapons.max(report.stats.weapons);
    }
}

/// 运行会话直到帧源耗尽或收到停止信号
///
/// 非法帧记录警告后跳过; 帧源或输出端错误终止会话。
/// 无论如何结束, 帧源都会被释放。
pub fn run_session<S, K>(
    session: &mut Session,
    source: &mut S,
    sink: &mut K,
    control: &Receiver<SessionControl>,
) -> Result<SessionSummary>
where
    S: FrameSource + ?Sized,
    K: ReportSink + ?Sized,
{
    let result = drive(session, source, sink, control);
    source.release();
    if let Ok(summary) = &result {
        info!(
            frames = summary.frames_processed,
            rejected = summary.frames_rejected,
            alerts = summary.alerts,
            captures = summary.captures,
            stopped = summary.stopped,
            "🛑 会话结束"
        );
    }
    result
}

fn drive<S, K>(
    session: &mut Session,
    source: &mut S,
    sink: &mut K,
    control: &Receiver<SessionControl>,
) -> Result<SessionSummary>
where
    S: FrameSource + ?Sized,
    K: ReportSink + ?Sized,
{
    let mut summary = SessionSummary::default();

    loop {
        // 每帧前检查一次停止信号
        match control.try_recv() {
            Ok(SessionControl::Stop) => {
                info!("收到停止信号");
                summary.stopped = true;
                break;
            }
            Err(TryRecvError::Disconnected) => {
                info!("控制通道已关闭, 停止会话");
                summary.stopped = true;
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        let Some(frame) = source.next_frame().context("读取帧失败")? else {
            break;
        };

        match session.process_frame(&frame) {
            Ok(report) => {
                summary.record(&report);
                sink.handle(&frame, &report)
                    .with_context(|| format!("处理第 {} 帧结果失败", frame.frame_number))?;
            }
            Err(e) => {
                summary.frames_rejected += 1;
                warn!(frame = frame.frame_number, error = %e, "⚠️ 跳过非法帧");
            }
        }
    }

    Ok(summary)
}

/// 后台会话句柄
pub struct SessionHandle {
    control: Sender<SessionControl>,
    join: JoinHandle<Result<SessionSummary>>,
}

impl SessionHandle {
    /// 请求停止 (当前帧处理完后生效)
    pub fn stop(&self) {
        // 线程已退出时发送失败, 忽略即可
        let _ = self.control.send(SessionControl::Stop);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 等待会话结束
    pub fn join(self) -> Result<SessionSummary> {
        let SessionHandle {
            control: _control,
            join,
        } = self;
        join.join().map_err(|_| anyhow!("会话线程 panic"))?
    }
}

/// 在独立线程中运行新会话
pub fn spawn_session<S, K>(
    config: SessionConfig,
    mut source: S,
    mut sink: K,
) -> Result<SessionHandle>
where
    S: FrameSource + Send + 'static,
    K: ReportSink + Send + 'static,
{
    let (control, rx) = unbounded();
    let join = thread::Builder::new()
        .name("sentinel-session".into())
        .spawn(move || {
            info!("🔍 会话线程启动");
            let mut session = Session::new(config);
            run_session(&mut session, &mut source, &mut sink, &rx)
        })
        .context("无法启动会话线程")?;
    Ok(SessionHandle { control, join })
}
