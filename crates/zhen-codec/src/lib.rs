//! # zhen-codec
//!
//! Zhen 缩略图提取框架编解码库.
//!
//! 提供 H.264 码流解析 (NAL/SPS/PPS/SEI)、参数集缓存、反量化归一化表
//! 与 IDR 关键帧解码调度器. 像素级切片重建与图像编码通过
//! [`SliceDecoder`] / [`PictureSink`] 接口交给外部协作者.
//!
//! ## 使用示例
//!
//! ```rust
//! use zhen_codec::parsers::h264::{NalUnit, NalUnitType};
//!
//! // SPS NAL: forbidden=0, ref_idc=3, type=7
//! let nalu = NalUnit::parse(&[0x67, 0x42, 0x00, 0x1E]).unwrap();
//! assert_eq!(nalu.nal_type, NalUnitType::Sps);
//! ```

pub mod codec_id;
pub mod decoders;
pub mod parsers;
pub mod picture;
pub mod sample_map;

// 重导出常用类型
pub use codec_id::CodecId;
pub use decoders::h264::{
    DecodingContext, ERROR_BUDGET, MAX_PPS, MAX_SPS, NormAdjust, ParameterSetCache,
    SliceDecodeRequest, SliceDecoder, SliceHeader,
};
pub use picture::{ExtractOptions, ExtractionMode, Picture, PictureFormat, PictureSink};
pub use sample_map::{MappedSample, SampleInfo, SampleKind, SampleMap, SampleSource};
