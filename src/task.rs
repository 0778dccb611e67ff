// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/task.rs - 任务循环
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{sync::mpsc, thread, time::Duration};

use tracing::{info, warn};

use crate::{
  input::Upload,
  output::{Outcome, Render},
  pipeline::Predict,
};

pub trait Task<I, P, O>: Sized {
  type Error;
  fn run_task(self, input: I, predictor: P, output: O) -> Result<TaskSummary, Self::Error>;
}

/// 一次任务处理的请求数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub processed: usize,
  pub succeeded: usize,
  pub failed: usize,
}

impl TaskSummary {
  fn record(&mut self, outcome: &Outcome) {
    self.processed += 1;
    match outcome {
      Ok(_) => self.succeeded += 1,
      Err(_) => self.failed += 1,
    }
  }
}

/// 处理输入中的第一个上传
pub struct OneShotTask;

impl<I, P, O, RE> Task<I, P, O> for OneShotTask
where
  I: Iterator<Item = Upload>,
  P: Predict,
  O: Render<Upload, Outcome, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, predictor: P, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let upload = input.next().ok_or_else(|| anyhow::anyhow!("没有输入文件"))?;
    let now = std::time::Instant::now();
    let outcome = predictor.predict_upload(&upload);
    info!("识别完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&upload, &outcome)?;

    let mut summary = TaskSummary::default();
    summary.record(&outcome);
    Ok(summary)
  }
}

/// 逐个处理输入中的上传；单个请求失败不影响后续请求
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
  interrupt: bool,
}

impl BatchTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }

  /// 注册 Ctrl-C 处理；每个进程只能注册一次
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }
}

impl<I, P, O, RE> Task<I, P, O> for BatchTask
where
  I: Iterator<Item = Upload>,
  P: Predict,
  O: Render<Upload, Outcome, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, predictor: P, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    if self.interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    } else {
      drop(tx);
    }

    let mut summary = TaskSummary::default();
    for upload in input {
      let now = std::time::Instant::now();
      let outcome = predictor.predict_upload(&upload);
      output.render_result(&upload, &outcome)?;
      summary.record(&outcome);
      info!(
        "第 {} 个请求 {:?} 完成，耗时: {:.2?}",
        summary.processed,
        upload.filename,
        now.elapsed()
      );

      if self.limit.map(|n| summary.processed >= n).unwrap_or(false) {
        info!("达到指定数量 {}, 退出任务循环", summary.processed);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成: 共 {} 个，成功 {} 个，失败 {} 个",
      summary.processed, summary.succeeded, summary.failed
    );
    Ok(summary)
  }
}
