//! 写入接口定义

use crate::error::WriteError;
use async_trait::async_trait;
use domain::DataPoint;

/// 时序数据点写入接口。
///
/// 实现必须可被多个派发任务并发调用。
#[async_trait]
pub trait PointSink: Send + Sync {
    /// 写入单个数据点，数据点在调用后不再保留。
    async fn write(&self, point: DataPoint) -> Result<(), WriteError>;

    /// 释放进程生命周期内持有的连接。
    async fn close(&self) {}
}
