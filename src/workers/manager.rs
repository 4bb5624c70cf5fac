// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::task_worker::TaskWorker;
use super::worker::Worker;
use crate::queue::{Broker, HandlerTable};

/// 工作管理器
///
/// 启动若干个任务工作器；关闭时停止领取新任务并等待在途任务结束。
pub struct WorkerManager {
    broker: Arc<Broker>,
    handlers: HandlerTable,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(broker: Arc<Broker>, handlers: HandlerTable, shutdown: CancellationToken) -> Self {
        Self {
            broker,
            handlers,
            shutdown,
            handles: Vec::new(),
        }
    }

    /// 启动工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    pub fn start_workers(&mut self, count: usize) {
        for _ in 0..count.max(1) {
            let worker = TaskWorker::new(self.broker.clone(), self.handlers.clone());
            let shutdown = self.shutdown.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = worker.run(shutdown).await {
                    error!(worker = worker.name(), "Worker exited with error: {}", e);
                }
            });
            self.handles.push(handle);
        }
        info!(count = self.handles.len(), kinds = self.handlers.kinds().len(), "Workers started");
    }

    /// 本管理器启动的工作进程数
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// 触发关闭并等待工作进程退出
    ///
    /// 超过 `grace` 仍未退出的工作进程被强制中止，其任务由租约回收。
    pub async fn shutdown(self, grace: Duration) {
        info!("Shutting down workers...");
        self.shutdown.cancel();

        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let all = futures::future::join_all(self.handles);
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!(running = self.broker.running_count(), "Workers did not stop in time, aborting");
            for abort in aborts {
                abort.abort();
            }
        }

        info!("Workers shut down successfully");
    }
}
