//! 码流解析器集合.

pub mod h264;
