//! 同一文件的操作串行执行

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// 按文件名加锁，后到的调用者等待前一个完成
#[derive(Clone, Default)]
pub struct SingleFlight {
    locks: Arc<Mutex<LockMap>>,
}

/// 持有期间同名文件的其它操作等待
pub struct FlightPermit {
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|e| e.into_inner())
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FlightPermit {
        let lock = lock_map(&self.locks)
            .entry(key.to_string())
            .or_default()
            .clone();

        if lock.try_lock().is_err() {
            tracing::debug!("等待同一文件的进行中操作: {}", key);
        }
        let guard = lock.clone().lock_owned().await;

        FlightPermit {
            key: key.to_string(),
            lock,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// 当前持有或等待中的文件数
    pub fn in_flight(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = lock_map(&self.locks);
        // 只剩表中和自己两个引用时说明没有等待者
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}
