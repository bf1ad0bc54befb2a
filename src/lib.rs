//! # Zhen (帧)
//!
//! 纯 Rust 实现的视频缩略图提取库.
//!
//! 从 MP4 (ISO-BMFF) 文件中解封装出采样映射, 筛选少量 IDR 关键帧,
//! 通过 H.264 NAL 调度器驱动解码, 把解码图像交给外部图像写出器.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use zhen::codec::{ExtractOptions, ExtractionMode, PictureFormat};
//!
//! let options = ExtractOptions {
//!     picture_format: PictureFormat::Png,
//!     picture_quality: 90,
//!     picture_number: 5,
//!     extraction_mode: ExtractionMode::Distributed,
//!     output_directory: "/tmp/thumbs".into(),
//! };
//! // zhen::extract_thumbnails("movie.mp4", &options, &mut sink, &mut slice_decoder)?;
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `zhen-core` | 核心类型、错误处理与位流读取 |
//! | `zhen-codec` | H.264 解析、参数集缓存与 IDR 解码调度 |
//! | `zhen-format` | MP4 解封装、采样映射与 IDR 筛选 |

mod extract;
pub mod logging;

/// 核心类型与工具
pub use zhen_core as core;

/// 编解码框架
pub use zhen_codec as codec;

/// 容器格式框架
pub use zhen_format as format;

pub use extract::{extract_from_io, extract_thumbnails};

/// 获取 Zhen 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
