//! 解封装器 (Demuxer) trait 定义.
//!
//! 解封装器负责解析容器头部, 重建每条流的采样映射.
//!
//! 使用流程:
//! 1. 调用 `open()` 打开容器并解析头部
//! 2. 调用 `streams()` 获取流信息
//! 3. 调用 `take_sample_map()` 取走目标流的采样映射 (所有权转移)

use zhen_codec::SampleMap;
use zhen_core::ZhenResult;

use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
pub trait Demuxer: Send {
    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    ///
    /// 读取容器头部, 重建所有流的信息与采样映射.
    fn open(&mut self, io: &mut IoContext) -> ZhenResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 取走指定流的采样映射 (所有权转移给调用方)
    ///
    /// 每条流只能取走一次, 再次调用返回 `StreamNotFound`.
    fn take_sample_map(&mut self, stream_index: usize) -> ZhenResult<SampleMap>;

    /// 获取容器时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;
}
