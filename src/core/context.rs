//! 单次运行上下文
//!
//! 每次任务运行一个 RunContext：运行 ID、迭代计数、起始时间；显式在循环中传递，不使用进程级全局状态。

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub max_iterations: usize,
    iteration: usize,
}

impl RunContext {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            max_iterations,
            iteration: 0,
        }
    }

    /// 已完成的迭代数
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn budget_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// 进入下一轮，返回 1 起始的轮次编号
    pub fn advance(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
