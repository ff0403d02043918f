//! 速率预算 - 基础设施层
//!
//! 持有全局共享的 LLM 调用额度，只暴露"申请一次调用许可"的能力

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::Config;
use crate::error::JudgeError;

/// 速率预算
///
/// 两层限制：
/// - 令牌桶：每个窗口最多 `capacity` 次请求，窗口到期后按墙钟时间补满
/// - 并发槽：同时在途的请求不超过 `max_in_flight`
///
/// 超出额度的调用方排队等待，队列不设上限
pub struct RateBudget {
    capacity: usize,
    interval: Duration,
    window: Mutex<Window>,
    slots: Arc<Semaphore>,
}

struct Window {
    tokens: usize,
    started: Instant,
}

/// 一次调用许可，drop 时归还并发槽
#[derive(Debug)]
pub struct BudgetPermit {
    _slot: OwnedSemaphorePermit,
}

impl RateBudget {
    pub fn new(capacity: usize, interval: Duration, max_in_flight: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            interval,
            window: Mutex::new(Window {
                tokens: capacity,
                started: Instant::now(),
            }),
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rate_capacity,
            config.refill_interval(),
            config.max_in_flight,
        )
    }

    /// 申请一次调用许可
    ///
    /// 先占并发槽，再取令牌；令牌耗尽时睡到当前窗口结束
    pub async fn acquire(&self) -> Result<BudgetPermit, JudgeError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| JudgeError::transient(format!("并发槽已关闭: {}", e)))?;

        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.started) >= self.interval {
                    window.tokens = self.capacity;
                    window.started = now;
                }
                if window.tokens > 0 {
                    window.tokens -= 1;
                    return Ok(BudgetPermit { _slot: slot });
                }
                self.interval
                    .saturating_sub(now.duration_since(window.started))
            };

            debug!("速率预算已耗尽，等待 {:?} 后重试", wait);
            sleep(wait).await;
        }
    }

    /// 空闲并发槽数
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
