//! 解码图像与输出接口.
//!
//! 解码核心不负责图像编码: 解码出的图像连同目标格式与质量一起交给
//! 外部的 `PictureSink` 协作者 (PNG/JPEG 写出器等).

use zhen_core::timestamp::NOPTS_VALUE;
use zhen_core::{PixelFormat, ZhenError, ZhenResult};

/// 输出图像文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureFormat {
    /// PNG (无损)
    Png,
    /// JPEG
    Jpeg,
    /// BMP
    Bmp,
    /// TGA
    Tga,
}

impl PictureFormat {
    /// 获取格式名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Tga => "tga",
        }
    }

    /// 获取常用文件扩展名
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
            Self::Tga => "tga",
        }
    }
}

/// 缩略图抽取的分布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionMode {
    /// 不筛选, 按解码顺序取 IDR
    Unfiltered,
    /// 筛掉无效帧后按解码顺序取
    Ordered,
    /// 筛掉无效帧后在片长上均匀分布取
    Distributed,
}

/// 解码后的图像
///
/// 多平面存储, 例如 YUV420P 有 Y/U/V 三个平面.
#[derive(Debug, Clone)]
pub struct Picture {
    /// 各平面的像素数据
    pub data: Vec<Vec<u8>>,
    /// 各平面每行的字节数 (linesize / stride)
    pub linesize: Vec<usize>,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 显示时间戳
    pub pts: i64,
}

impl Picture {
    /// 创建已分配平面缓冲的图像
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let plane_count = pixel_format.plane_count() as usize;
        let mut data = Vec::with_capacity(plane_count);
        let mut linesize = Vec::with_capacity(plane_count);
        for p in 0..plane_count {
            let ls = pixel_format.plane_linesize(p, width).unwrap_or(0);
            let h = pixel_format.plane_height(p, height).unwrap_or(0);
            data.push(vec![0u8; ls * h]);
            linesize.push(ls);
        }
        Self {
            data,
            linesize,
            width,
            height,
            pixel_format,
            pts: NOPTS_VALUE,
        }
    }
}

/// 缩略图提取运行参数
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// 输出图像格式
    pub picture_format: PictureFormat,
    /// 输出图像质量, 1-100
    pub picture_quality: u8,
    /// 期望提取的图像数量, >= 1
    pub picture_number: u32,
    /// 抽取分布方式
    pub extraction_mode: ExtractionMode,
    /// 输出目录 (对核心不透明, 原样交给图像写出器)
    pub output_directory: String,
}

impl ExtractOptions {
    /// 校验参数合法性
    pub fn validate(&self) -> ZhenResult<()> {
        if !(1..=100).contains(&self.picture_quality) {
            return Err(ZhenError::InvalidArgument(format!(
                "picture_quality 超出范围 [1,100], value={}",
                self.picture_quality
            )));
        }
        if self.picture_number == 0 {
            return Err(ZhenError::InvalidArgument(
                "picture_number 必须 >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// 图像写出器接口
///
/// 解码核心每成功解码一张 IDR 图像, 就带着目标格式/质量/输出目录
/// 调用一次本接口. 具体的 PNG/JPEG/BMP/TGA 编码由实现方完成.
pub trait PictureSink {
    /// 写出一张图像
    fn write_picture(
        &mut self,
        picture: &Picture,
        format: PictureFormat,
        quality: u8,
        output_directory: &str,
    ) -> ZhenResult<()>;
}
