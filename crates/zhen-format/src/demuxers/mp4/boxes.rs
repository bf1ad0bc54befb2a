//! MP4 Box (Atom) 头部解析.
//!
//! ISO 14496-12 定义的 Box 结构:
//! ```text
//! Size:       4 bytes (big-endian, 含头部本身)
//! Type:       4 bytes (FourCC)
//! [LargeSize]: 8 bytes (仅当 Size==1 时存在, 64-bit 大小)
//! [Uuid]:     16 bytes (仅当 Type=='uuid' 时存在, 扩展类型)
//! ```
//!
//! 特殊大小值:
//! - 0: Box 延伸到文件末尾
//! - 1: 使用 64-bit 扩展大小
//!
//! FullBox 变体额外携带 1 字节 version + 3 字节 flags,
//! 由各 FullBox 解析函数通过 `read_fullbox_header` 消费.

use zhen_core::{ZhenError, ZhenResult};

use crate::io::IoContext;

/// Box 类型枚举 (常用 FourCC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    /// ftyp - 文件类型
    Ftyp,
    /// moov - 影片元数据 (容器)
    Moov,
    /// mvhd - 影片头部
    Mvhd,
    /// trak - 轨道 (容器)
    Trak,
    /// tkhd - 轨道头部
    Tkhd,
    /// edts - 编辑列表 (容器)
    Edts,
    /// mdia - 媒体 (容器)
    Mdia,
    /// mdhd - 媒体头部
    Mdhd,
    /// hdlr - 处理器引用
    Hdlr,
    /// minf - 媒体信息 (容器)
    Minf,
    /// dinf - 数据信息 (容器)
    Dinf,
    /// stbl - 采样表 (容器)
    Stbl,
    /// stsd - 采样描述
    Stsd,
    /// stts - 解码时间→采样映射
    Stts,
    /// ctts - 合成时间偏移
    Ctts,
    /// stsc - 采样→块映射
    Stsc,
    /// stsz - 采样大小
    Stsz,
    /// stz2 - 紧凑采样大小
    Stz2,
    /// stco - 块偏移 (32位)
    Stco,
    /// co64 - 块偏移 (64位)
    Co64,
    /// stss - 同步采样 (随机访问点)
    Stss,
    /// mdat - 媒体数据
    Mdat,
    /// udta - 用户数据 (容器)
    Udta,
    /// meco - 附加元数据 (容器)
    Meco,
    /// free - 自由空间
    Free,
    /// skip - 跳过
    Skip,
    /// uuid - 用户扩展类型
    Uuid,
    /// 未知 box 类型
    Unknown([u8; 4]),
}

impl BoxType {
    /// 从 4 字节 FourCC 创建
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"ftyp" => Self::Ftyp,
            b"moov" => Self::Moov,
            b"mvhd" => Self::Mvhd,
            b"trak" => Self::Trak,
            b"tkhd" => Self::Tkhd,
            b"edts" => Self::Edts,
            b"mdia" => Self::Mdia,
            b"mdhd" => Self::Mdhd,
            b"hdlr" => Self::Hdlr,
            b"minf" => Self::Minf,
            b"dinf" => Self::Dinf,
            b"stbl" => Self::Stbl,
            b"stsd" => Self::Stsd,
            b"stts" => Self::Stts,
            b"ctts" => Self::Ctts,
            b"stsc" => Self::Stsc,
            b"stsz" => Self::Stsz,
            b"stz2" => Self::Stz2,
            b"stco" => Self::Stco,
            b"co64" => Self::Co64,
            b"stss" => Self::Stss,
            b"mdat" => Self::Mdat,
            b"udta" => Self::Udta,
            b"meco" => Self::Meco,
            b"free" => Self::Free,
            b"skip" => Self::Skip,
            b"uuid" => Self::Uuid,
            _ => Self::Unknown(*fourcc),
        }
    }

    /// 是否为纯容器 box (内容是子 box 序列, 需要递归)
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Moov
                | Self::Trak
                | Self::Edts
                | Self::Mdia
                | Self::Minf
                | Self::Dinf
                | Self::Stbl
                | Self::Udta
                | Self::Meco
        )
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(cc) => {
                let s = std::str::from_utf8(cc).unwrap_or("????");
                write!(f, "{s}")
            }
            _ => write!(f, "{}", format!("{self:?}").to_lowercase()),
        }
    }
}

/// 已解析的 Box 头部
#[derive(Debug, Clone)]
pub struct BoxHeader {
    /// Box 总大小 (含头部, 0 表示到文件末尾)
    pub size: u64,
    /// Box 类型
    pub box_type: BoxType,
    /// 扩展类型 (仅当 box_type == Uuid)
    pub uuid: Option<[u8; 16]>,
    /// 头部大小 (8/16/24/32 字节)
    pub header_size: u64,
    /// 头部起始的绝对偏移
    pub offset_start: u64,
}

impl BoxHeader {
    /// 内容区域大小 (不含头部)
    pub fn content_size(&self) -> u64 {
        if self.size == 0 {
            u64::MAX // 延伸到文件末尾
        } else {
            self.size.saturating_sub(self.header_size)
        }
    }

    /// Box 结束位置 (绝对偏移)
    ///
    /// `size == 0` 时由调用方传入的文件大小决定.
    pub fn offset_end(&self, file_size: u64) -> u64 {
        if self.size == 0 {
            file_size
        } else {
            self.offset_start + self.size
        }
    }
}

/// 读取一个 Box 头部
pub fn read_box_header(io: &mut IoContext) -> ZhenResult<BoxHeader> {
    let offset_start = io.position()?;
    let size32 = io.read_u32_be()?;
    let fourcc = io.read_tag()?;
    let box_type = BoxType::from_fourcc(&fourcc);

    let (size, mut header_size) = if size32 == 1 {
        // 64-bit 扩展大小
        (io.read_u64_be()?, 16u64)
    } else {
        (u64::from(size32), 8u64)
    };

    let mut uuid = None;
    if box_type == BoxType::Uuid {
        let mut buf = [0u8; 16];
        io.read_exact(&mut buf)?;
        uuid = Some(buf);
        header_size += 16;
    }

    // size == 0 表示延伸到文件末尾
    if size != 0 && size < header_size {
        return Err(ZhenError::Format(format!(
            "MP4: box 大小小于头部, type={}, size={}",
            box_type, size
        )));
    }

    Ok(BoxHeader {
        size,
        box_type,
        uuid,
        header_size,
        offset_start,
    })
}

/// 读取 FullBox 的 version + flags
pub fn read_fullbox_header(io: &mut IoContext) -> ZhenResult<(u8, u32)> {
    let version = io.read_u8()?;
    let flags = io.read_u24_be()?;
    Ok((version, flags))
}

/// 校验子 box 不越过父 box 边界
///
/// 任何违例都是容器损坏, 终止所在容器的解析.
pub fn check_child_bounds(header: &BoxHeader, parent_end: u64, file_size: u64) -> ZhenResult<u64> {
    let child_end = header.offset_end(file_size);
    if child_end > parent_end {
        return Err(ZhenError::Format(format!(
            "MP4: 子 box 越过父 box 边界, type={}, child_end={}, parent_end={}",
            header.box_type, child_end, parent_end
        )));
    }
    if header.offset_start >= child_end {
        return Err(ZhenError::Format(format!(
            "MP4: box 区间为空, type={}, offset={}",
            header.box_type, header.offset_start
        )));
    }
    Ok(child_end)
}

/// ftyp Box 数据
pub struct FtypBox {
    /// 主品牌
    pub major_brand: [u8; 4],
    /// 次版本号
    pub minor_version: u32,
    /// 兼容品牌列表
    pub compatible_brands: Vec<[u8; 4]>,
}

impl FtypBox {
    /// 解析 ftyp box 内容
    pub fn parse(io: &mut IoContext, content_size: u64) -> ZhenResult<Self> {
        let major_brand = io.read_tag()?;
        let minor_version = io.read_u32_be()?;

        let remaining = content_size.saturating_sub(8);
        let brand_count = (remaining / 4) as usize;
        let mut compatible_brands = Vec::with_capacity(brand_count);
        for _ in 0..brand_count {
            compatible_brands.push(io.read_tag()?);
        }

        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    /// 获取主品牌字符串
    pub fn major_brand_str(&self) -> String {
        String::from_utf8_lossy(&self.major_brand).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    fn memory_io(data: Vec<u8>) -> IoContext {
        IoContext::new(Box::new(MemoryBackend::from_data(data)))
    }

    #[test]
    fn test_box_type_识别() {
        assert_eq!(BoxType::from_fourcc(b"ftyp"), BoxType::Ftyp);
        assert_eq!(BoxType::from_fourcc(b"moov"), BoxType::Moov);
        assert_eq!(BoxType::from_fourcc(b"stz2"), BoxType::Stz2);
        assert_eq!(BoxType::from_fourcc(b"meco"), BoxType::Meco);
        assert!(matches!(BoxType::from_fourcc(b"xxxx"), BoxType::Unknown(_)));
    }

    #[test]
    fn test_容器判别() {
        assert!(BoxType::Moov.is_container());
        assert!(BoxType::Stbl.is_container());
        assert!(BoxType::Udta.is_container());
        assert!(BoxType::Edts.is_container());
        assert!(!BoxType::Stsd.is_container());
        assert!(!BoxType::Mdat.is_container());
    }

    #[test]
    fn test_读取普通box头() {
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes()); // size
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(&[0u8; 12]); // content
        let mut io = memory_io(data);

        let header = read_box_header(&mut io).unwrap();
        assert_eq!(header.box_type, BoxType::Ftyp);
        assert_eq!(header.size, 20);
        assert_eq!(header.header_size, 8);
        assert_eq!(header.content_size(), 12);
        assert_eq!(header.offset_end(1000), 20);
    }

    #[test]
    fn test_读取64位大小box头() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // size=1 → largesize
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&1000u64.to_be_bytes()); // largesize
        data.extend_from_slice(&[0u8; 984]);
        let mut io = memory_io(data);

        let header = read_box_header(&mut io).unwrap();
        assert_eq!(header.box_type, BoxType::Mdat);
        assert_eq!(header.size, 1000);
        assert_eq!(header.header_size, 16);
        assert_eq!(header.content_size(), 984);
    }

    #[test]
    fn test_读取uuid扩展类型box头() {
        let mut data = Vec::new();
        data.extend_from_slice(&32u32.to_be_bytes());
        data.extend_from_slice(b"uuid");
        data.extend_from_slice(&[0xAB; 16]); // 扩展类型
        data.extend_from_slice(&[0u8; 8]);
        let mut io = memory_io(data);

        let header = read_box_header(&mut io).unwrap();
        assert_eq!(header.box_type, BoxType::Uuid);
        assert_eq!(header.uuid, Some([0xAB; 16]));
        assert_eq!(header.header_size, 24);
        assert_eq!(header.content_size(), 8);
    }

    #[test]
    fn test_size为零延伸到文件末尾() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[0u8; 100]);
        let mut io = memory_io(data);

        let header = read_box_header(&mut io).unwrap();
        assert_eq!(header.size, 0);
        assert_eq!(header.offset_end(108), 108);
        assert_eq!(header.content_size(), u64::MAX);
    }

    #[test]
    fn test_大小小于头部拒绝() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes()); // size=4 < 8
        data.extend_from_slice(b"free");
        let mut io = memory_io(data);
        assert!(read_box_header(&mut io).is_err());
    }

    #[test]
    fn test_子box越界校验() {
        let header = BoxHeader {
            size: 100,
            box_type: BoxType::Stsd,
            uuid: None,
            header_size: 8,
            offset_start: 50,
        };
        // 父 box 在 120 结束, 子 box 到 150 → 违例
        assert!(check_child_bounds(&header, 120, 1000).is_err());
        // 父 box 到 200 → 合法
        assert_eq!(check_child_bounds(&header, 200, 1000).unwrap(), 150);
    }

    #[test]
    fn test_ftyp解析() {
        let mut content = Vec::new();
        content.extend_from_slice(b"isom");
        content.extend_from_slice(&512u32.to_be_bytes());
        content.extend_from_slice(b"isom");
        content.extend_from_slice(b"avc1");
        let len = content.len() as u64;
        let mut io = memory_io(content);

        let ftyp = FtypBox::parse(&mut io, len).unwrap();
        assert_eq!(&ftyp.major_brand, b"isom");
        assert_eq!(ftyp.minor_version, 512);
        assert_eq!(ftyp.compatible_brands.len(), 2);
        assert_eq!(ftyp.major_brand_str(), "isom");
    }
}
