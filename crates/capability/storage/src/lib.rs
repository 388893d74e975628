//! # Bridge Storage 模块
//!
//! 时序数据写入层：将 [`DataPoint`](domain::DataPoint) 写入 InfluxDB。
//!
//! ## 模块说明
//!
//! - [`traits`]：写入接口 `PointSink`
//! - [`error`]：写入错误与初始化错误
//! - [`line_protocol`]：InfluxDB Line Protocol 编码
//! - [`influx`]：基于 HTTP 的 InfluxDB 写入实现（1.x / 2.x 接口）
//! - [`in_memory`]：内存实现（用于测试）
//!
//! ## 写入句柄
//!
//! 每次写入都获取一个仅在本次调用内有效的 `WriteHandle`，写入结束（无论成功失败）
//! 随作用域释放，句柄不在消息之间复用。共享的只有内部线程安全的 HTTP 客户端。

pub mod error;
pub mod in_memory;
pub mod influx;
pub mod line_protocol;
pub mod traits;

pub use error::*;
pub use in_memory::InMemorySink;
pub use influx::{InfluxSink, WriteHandle};
pub use line_protocol::encode_point;
pub use traits::*;
