//! 时序写入内存实现
//!
//! 仅用于本地测试和占位。

use crate::error::WriteError;
use crate::traits::PointSink;
use domain::DataPoint;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// 内存数据点存储
pub struct InMemorySink {
    points: RwLock<Vec<DataPoint>>,
    closed: AtomicBool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 已写入的数据点（用于测试）
    pub fn points(&self) -> Vec<DataPoint> {
        self.points.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PointSink for InMemorySink {
    async fn write(&self, point: DataPoint) -> Result<(), WriteError> {
        if self.is_closed() {
            return Err(WriteError::Closed);
        }
        let mut points = self
            .points
            .write()
            .map_err(|_| WriteError::Network("lock failed".to_string()))?;
        points.push(point);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
