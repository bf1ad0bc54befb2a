//! 位流喂入器.
//!
//! 游标式地遍历采样映射, 把每个采样的字节区间从输入文件读入内存,
//! 供 NAL 调度器消费. 这是调度器与文件 I/O 之间唯一的桥梁.

use bytes::Bytes;
use zhen_codec::{MappedSample, SampleMap, SampleSource};
use zhen_core::ZhenResult;

use crate::io::IoContext;

/// 采样喂入器
///
/// 借用输入文件句柄与 (筛选后的) 采样映射, 不拥有二者.
pub struct SampleFeeder<'a> {
    io: &'a mut IoContext,
    map: &'a SampleMap,
    cursor: usize,
}

impl<'a> SampleFeeder<'a> {
    /// 创建喂入器, 游标指向映射第一个采样
    pub fn new(io: &'a mut IoContext, map: &'a SampleMap) -> Self {
        Self { io, map, cursor: 0 }
    }

    /// 当前游标位置 (下一个要读的采样下标)
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl SampleSource for SampleFeeder<'_> {
    fn feed_next_sample(&mut self) -> ZhenResult<Option<MappedSample>> {
        let Some(info) = self.map.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        self.io.seek(std::io::SeekFrom::Start(info.offset))?;
        let data = self.io.read_bytes(info.size as usize)?;

        Ok(Some(MappedSample {
            kind: info.kind,
            data: Bytes::from(data),
            pts: info.pts,
            dts: info.dts,
            offset: info.offset,
        }))
    }
}
