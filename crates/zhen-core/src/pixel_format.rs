//! 像素格式定义.
//!
//! 定义了解码图像中像素的存储格式, 解码器输出与图像写出器之间以此约定数据布局.

use std::fmt;

/// 像素格式
///
/// 命名规则: 颜色空间 + 位深 + 排列方式 (P=Planar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定
    None,
    /// YUV 4:2:0 平面格式, 8 位 (H.264 默认)
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
    /// RGB 各 8 位, 打包
    Rgb24,
    /// 灰度 8 位
    Gray8,
}

impl PixelFormat {
    /// 获取色度子采样 (log2 水平, log2 垂直)
    ///
    /// 例如 YUV420 返回 (1, 1), 表示色度分辨率为亮度的 1/2 x 1/2.
    pub const fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuv422p => (1, 0),
            _ => (0, 0),
        }
    }

    /// 是否为平面格式 (Y/U/V 存储在不同平面)
    pub const fn is_planar(&self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuv422p | Self::Yuv444p)
    }

    /// 平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Rgb24 | Self::Gray8 => 1,
        }
    }

    /// 计算指定平面每行的字节数 (linesize / stride)
    pub fn plane_linesize(&self, plane: usize, width: u32) -> Option<usize> {
        if *self == Self::None || plane >= self.plane_count() as usize {
            return None;
        }
        match self {
            Self::Rgb24 => Some(width as usize * 3),
            Self::Gray8 => Some(width as usize),
            _ => {
                if plane == 0 {
                    Some(width as usize)
                } else {
                    let (sub_x, _) = self.chroma_subsampling();
                    Some((width as usize).div_ceil(1 << sub_x))
                }
            }
        }
    }

    /// 计算指定平面的行数
    pub fn plane_height(&self, plane: usize, height: u32) -> Option<usize> {
        if *self == Self::None || plane >= self.plane_count() as usize {
            return None;
        }
        if plane == 0 || !self.is_planar() {
            return Some(height as usize);
        }
        let (_, sub_y) = self.chroma_subsampling();
        Some((height as usize).div_ceil(1 << sub_y))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Rgb24 => "rgb24",
            Self::Gray8 => "gray8",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420p_平面布局() {
        let fmt = PixelFormat::Yuv420p;
        assert_eq!(fmt.plane_count(), 3);
        assert_eq!(fmt.plane_linesize(0, 1920), Some(1920));
        assert_eq!(fmt.plane_linesize(1, 1920), Some(960));
        assert_eq!(fmt.plane_height(0, 1080), Some(1080));
        assert_eq!(fmt.plane_height(1, 1080), Some(540));
    }

    #[test]
    fn test_奇数尺寸向上取整() {
        let fmt = PixelFormat::Yuv420p;
        assert_eq!(fmt.plane_linesize(1, 1919), Some(960));
        assert_eq!(fmt.plane_height(2, 1079), Some(540));
    }

    #[test]
    fn test_打包格式() {
        assert_eq!(PixelFormat::Rgb24.plane_count(), 1);
        assert_eq!(PixelFormat::Rgb24.plane_linesize(0, 100), Some(300));
        assert!(!PixelFormat::Rgb24.is_planar());
    }

    #[test]
    fn test_越界平面索引() {
        assert_eq!(PixelFormat::Yuv420p.plane_linesize(3, 100), None);
        assert_eq!(PixelFormat::None.plane_linesize(0, 100), None);
    }
}
