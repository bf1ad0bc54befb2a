//! # zhen-format
//!
//! Zhen 缩略图提取框架容器库.
//!
//! 提供只读 I/O 抽象、MP4 (ISO-BMFF) 解封装、采样映射物化、
//! IDR 采样筛选与位流喂入器.

pub mod demuxer;
pub mod demuxers;
pub mod feeder;
pub mod filter;
pub mod io;
pub mod probe;
pub mod stream;

// 重导出常用类型
pub use demuxer::Demuxer;
pub use demuxers::mp4::{Mp4Demuxer, Mp4Probe};
pub use feeder::SampleFeeder;
pub use filter::idr_filtering;
pub use io::{IoBackend, IoContext, MemoryBackend};
pub use probe::FormatProbe;
pub use stream::{Stream, StreamParams};
