//! 同步事件广播

use crate::core::transfer::{Direction, TransferPhase};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// 事件通道容量，慢订阅者会丢失最旧的事件
const EVENT_CAPACITY: usize = 256;

/// 向上层推送的同步事件
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SyncEvent {
    /// 传输阶段变化
    Phase {
        file_name: String,
        direction: Direction,
        phase: TransferPhase,
    },
    Completed {
        file_name: String,
        direction: Direction,
        attempts: u32,
    },
    Failed {
        file_name: String,
        direction: Direction,
        code: String,
        message: String,
    },
    /// 远程文件被修改（来自本引擎或外部）
    RemoteChanged { path: String },
    /// 上传覆盖了更新的远程版本
    ConflictOverridden {
        file_name: String,
        local_modified: Option<i64>,
        remote_modified: Option<i64>,
    },
}

/// 事件总线
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// 发布事件，没有订阅者时直接丢弃
    pub fn publish(&self, event: SyncEvent) {
        tracing::trace!("发布事件: {:?}", event);
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 以流的形式订阅，跳过因滞后丢失的事件
    pub fn stream(&self) -> impl Stream<Item = SyncEvent> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("事件订阅滞后: {}", e);
                None
            }
        })
    }
}
