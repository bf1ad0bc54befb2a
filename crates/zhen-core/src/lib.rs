//! # zhen-core
//!
//! Zhen 缩略图提取框架核心库, 提供基础类型定义、错误处理和位流读取.

pub mod bitreader;
pub mod error;
pub mod mathutil;
pub mod media_type;
pub mod pixel_format;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{ZhenError, ZhenResult};
pub use media_type::MediaType;
pub use pixel_format::PixelFormat;
pub use rational::Rational;
pub use timestamp::Timestamp;
