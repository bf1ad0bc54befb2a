//! 解码器集合.

pub mod h264;
