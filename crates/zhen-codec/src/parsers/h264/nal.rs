//! H.264 NAL (Network Abstraction Layer) 单元解析.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! # 两种承载格式
//!
//! - Annex B: 起始码分隔, `00 00 01` 或 `00 00 00 01`
//! - AVCC (length-prefixed): 每个 NAL 前有 1-4 字节大端长度前缀,
//!   前缀宽度来自 avcC 的 lengthSizeMinusOne

use zhen_core::{ZhenError, ZhenResult};

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A
    SliceDpa,
    /// 数据分区 B
    SliceDpb,
    /// 数据分区 C
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为 IDR 关键帧切片
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 单元
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元原始数据 (不含起始码/长度前缀, 含 NAL 头部字节)
    pub data: Vec<u8>,
}

impl NalUnit {
    /// 从 NAL 数据 (含头部字节) 解析
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        let Some(&header) = data.first() else {
            return Err(ZhenError::InvalidData("H264: NAL 单元数据为空".into()));
        };

        if header & 0x80 != 0 {
            return Err(ZhenError::InvalidData(
                "H264: forbidden_zero_bit 非法, value=1".into(),
            ));
        }

        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data: data.to_vec(),
        })
    }

    /// 获取 RBSP (Raw Byte Sequence Payload) 数据
    ///
    /// 移除 NAL 头部字节和 emulation prevention 字节 (0x03).
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

/// 移除 emulation prevention 字节 (`00 00 03` → `00 00`)
///
/// H.264 规范要求 RBSP 中连续两个 0x00 之后必须插入 0x03
/// 以避免与起始码混淆, 解析前需要删除.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x03 {
            rbsp.push(0x00);
            rbsp.push(0x00);
            i += 3;
        } else {
            rbsp.push(data[i]);
            i += 1;
        }
    }

    rbsp
}

/// 从 AVCC (length-prefixed) 数据中提取 NAL 单元
///
/// `length_size` 必须在 1-4 之间, 否则返回空结果 (避免死循环).
pub fn split_avcc(data: &[u8], length_size: usize) -> Vec<NalUnit> {
    if !(1..=4).contains(&length_size) {
        return Vec::new();
    }

    let mut nalus = Vec::new();
    let mut pos = 0;

    while pos + length_size <= data.len() {
        let mut nal_len: usize = 0;
        for &b in &data[pos..pos + length_size] {
            nal_len = (nal_len << 8) | b as usize;
        }
        pos += length_size;

        if nal_len == 0 || pos + nal_len > data.len() {
            break;
        }

        if let Ok(nalu) = NalUnit::parse(&data[pos..pos + nal_len]) {
            nalus.push(nalu);
        }
        pos += nal_len;
    }

    nalus
}

/// 从 Annex B 字节流中分割出所有 NAL 单元
///
/// 支持 3 字节 (`00 00 01`) 和 4 字节 (`00 00 00 01`) 起始码,
/// 返回的 NAL 单元不含起始码, 尾部 0 字节被去除.
pub fn split_annex_b(data: &[u8]) -> Vec<NalUnit> {
    let starts = find_start_codes(data);
    let mut nalus = Vec::new();

    for (i, &(code_pos, code_len)) in starts.iter().enumerate() {
        let nal_start = code_pos + code_len;
        let mut nal_end = starts
            .get(i + 1)
            .map(|&(next, _)| next)
            .unwrap_or(data.len());

        // 去除 NAL 与下一个起始码之间的尾部 0 字节
        while nal_end > nal_start && data[nal_end - 1] == 0x00 {
            nal_end -= 1;
        }

        if nal_end > nal_start
            && let Ok(nalu) = NalUnit::parse(&data[nal_start..nal_end])
        {
            nalus.push(nalu);
        }
    }

    nalus
}

/// 查找所有起始码, 返回 (位置, 起始码长度)
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] != 0x00 || data[i + 1] != 0x00 {
            i += 1;
            continue;
        }
        if data[i + 2] == 0x01 {
            positions.push((i, 3));
            i += 3;
        } else if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
            positions.push((i, 4));
            i += 4;
        } else {
            i += 1;
        }
    }

    positions
}

/// avcC 中的单个参数集条目
#[derive(Debug, Clone)]
pub struct AvccEntry {
    /// 条目数据在 avcC 负载内的相对字节偏移 (指向 NAL 头部字节)
    pub offset: usize,
    /// 条目数据字节数
    pub size: usize,
    /// 条目数据 (含 NAL 头部字节)
    pub data: Vec<u8>,
}

/// AVCDecoderConfigurationRecord 解析结果
#[derive(Debug, Clone)]
pub struct AvccConfig {
    /// profile_idc
    pub profile_idc: u8,
    /// level_idc
    pub level_idc: u8,
    /// NAL 长度前缀大小 (字节)
    pub length_size: usize,
    /// 带内 SPS 条目列表
    pub sps_entries: Vec<AvccEntry>,
    /// 带内 PPS 条目列表
    pub pps_entries: Vec<AvccEntry>,
}

/// 解析 AVCDecoderConfigurationRecord (MP4 avcC box 内容)
///
/// 每个参数集条目记录它在 avcC 负载内的相对偏移,
/// 解封装器据此为带内 SPS/PPS 生成指向文件的伪采样.
pub fn parse_avcc_config(data: &[u8]) -> ZhenResult<AvccConfig> {
    if data.len() < 7 {
        return Err(ZhenError::InvalidData(format!(
            "H264: avcC 数据太短, len={}",
            data.len()
        )));
    }

    let _version = data[0];
    let profile_idc = data[1];
    let _compat = data[2];
    let level_idc = data[3];
    let length_size = ((data[4] & 0x03) + 1) as usize;

    let num_sps = (data[5] & 0x1F) as usize;
    let mut pos = 6;
    let sps_entries = parse_avcc_entries(data, &mut pos, num_sps, "SPS")?;

    let Some(&num_pps) = data.get(pos) else {
        return Err(ZhenError::InvalidData(
            "H264: avcC 缺少 numOfPictureParameterSets 字段".into(),
        ));
    };
    pos += 1;
    let pps_entries = parse_avcc_entries(data, &mut pos, num_pps as usize, "PPS")?;

    Ok(AvccConfig {
        profile_idc,
        level_idc,
        length_size,
        sps_entries,
        pps_entries,
    })
}

/// 解析 avcC 中的一组参数集条目 (2 字节大端长度 + 数据)
fn parse_avcc_entries(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    what: &str,
) -> ZhenResult<Vec<AvccEntry>> {
    let mut entries = Vec::with_capacity(count);

    for i in 0..count {
        if *pos + 2 > data.len() {
            return Err(ZhenError::InvalidData(format!(
                "H264: avcC {} 长度字段截断, index={}",
                what, i
            )));
        }
        let len = ((data[*pos] as usize) << 8) | data[*pos + 1] as usize;
        *pos += 2;

        if len == 0 {
            return Err(ZhenError::InvalidData(format!(
                "H264: avcC {} 长度非法, index={}, len=0",
                what, i
            )));
        }
        if *pos + len > data.len() {
            return Err(ZhenError::InvalidData(format!(
                "H264: avcC {} 数据截断, index={}, declared_len={}, remain={}",
                what,
                i,
                len,
                data.len() - *pos
            )));
        }

        entries.push(AvccEntry {
            offset: *pos,
            size: len,
            data: data[*pos..*pos + len].to_vec(),
        });
        *pos += len;
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_roundtrip() {
        for id in 0..=12 {
            let nt = NalUnitType::from_type_id(id);
            assert_eq!(nt.type_id(), id);
        }
        assert_eq!(NalUnitType::from_type_id(7), NalUnitType::Sps);
        assert_eq!(NalUnitType::from_type_id(8), NalUnitType::Pps);
        assert_eq!(NalUnitType::from_type_id(5), NalUnitType::SliceIdr);
    }

    #[test]
    fn test_nal_type_分类() {
        assert!(NalUnitType::SliceIdr.is_vcl());
        assert!(NalUnitType::SliceIdr.is_idr());
        assert!(NalUnitType::Slice.is_vcl());
        assert!(!NalUnitType::Slice.is_idr());
        assert!(!NalUnitType::Sps.is_vcl());
    }

    #[test]
    fn test_nal_unit_parse() {
        // forbidden=0, ref_idc=3, type=7 (SPS): 0b0_11_00111 = 0x67
        let nalu = NalUnit::parse(&[0x67, 0x42, 0x00, 0x1E]).unwrap();
        assert_eq!(nalu.nal_type, NalUnitType::Sps);
        assert_eq!(nalu.ref_idc, 3);
    }

    #[test]
    fn test_nal_unit_空数据拒绝() {
        assert!(NalUnit::parse(&[]).is_err());
    }

    #[test]
    fn test_nal_unit_forbidden_bit_拒绝() {
        let err = NalUnit::parse(&[0xE7]).expect_err("forbidden_zero_bit=1 应返回错误");
        assert!(format!("{err}").contains("forbidden_zero_bit"));
    }

    #[test]
    fn test_emulation_prevention_移除() {
        let data = [0x01, 0x00, 0x00, 0x03, 0x02, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x01, 0x00, 0x00, 0x02, 0x03]
        );
    }

    #[test]
    fn test_emulation_prevention_连续() {
        let data = [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_emulation_prevention_03_03序列() {
        // `00 00 03 03` 中第一个 0x03 为防竞争字节, 需要删除
        let data = [0x00, 0x00, 0x03, 0x03, 0x80];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x03, 0x80]
        );
    }

    #[test]
    fn test_rbsp_提取() {
        let data = [0x67, 0x42, 0x00, 0x00, 0x03, 0x01, 0xAA];
        let nalu = NalUnit::parse(&data).unwrap();
        // 移除头部字节 (0x67) 和 emulation prevention
        assert_eq!(nalu.rbsp(), vec![0x42, 0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn test_annex_b_混合起始码() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS (4字节起始码)
            0x00, 0x00, 0x01, 0x68, 0xBB, // PPS (3字节起始码)
            0x00, 0x00, 0x01, 0x65, 0xCC, 0xDD, // IDR
        ];

        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
        assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
    }

    #[test]
    fn test_avcc_分割() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x03]); // len=3
        data.extend_from_slice(&[0x67, 0xAA, 0xBB]); // SPS
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x02]); // len=2
        data.extend_from_slice(&[0x68, 0xCC]); // PPS

        let nalus = split_avcc(&data, 4);
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
    }

    #[test]
    fn test_avcc_非法length_size拒绝() {
        let data = [0x00, 0x00, 0x00, 0x02, 0x67, 0xAA];
        assert!(split_avcc(&data, 0).is_empty());
        assert!(split_avcc(&data, 5).is_empty());
    }

    #[test]
    fn test_avcc_2字节前缀() {
        let data = [0x00, 0x02, 0x67, 0xAA, 0x00, 0x02, 0x68, 0xBB];
        let nalus = split_avcc(&data, 2);
        assert_eq!(nalus.len(), 2);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
    }

    /// 手工构造 avcC 记录
    fn build_avcc(sps: &[u8], pps: &[u8]) -> Vec<u8> {
        let mut out = vec![
            1,    // configurationVersion
            0x64, // profile_idc (High)
            0x00, // compat
            0x28, // level_idc
            0xFF, // lengthSizeMinusOne = 3
            0xE1, // numOfSPS = 1
        ];
        out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        out.extend_from_slice(sps);
        out.push(1); // numOfPPS
        out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        out.extend_from_slice(pps);
        out
    }

    #[test]
    fn test_avcc_config_解析() {
        let sps = [0x67, 0x64, 0x00, 0x28, 0xAB];
        let pps = [0x68, 0xCE, 0x38, 0x80];
        let avcc = build_avcc(&sps, &pps);

        let config = parse_avcc_config(&avcc).unwrap();
        assert_eq!(config.profile_idc, 0x64);
        assert_eq!(config.level_idc, 0x28);
        assert_eq!(config.length_size, 4);
        assert_eq!(config.sps_entries.len(), 1);
        assert_eq!(config.pps_entries.len(), 1);
        assert_eq!(config.sps_entries[0].data, sps);
        assert_eq!(config.pps_entries[0].data, pps);

        // 偏移必须指回原始数据中的条目
        let e = &config.sps_entries[0];
        assert_eq!(&avcc[e.offset..e.offset + e.size], &sps);
        let e = &config.pps_entries[0];
        assert_eq!(&avcc[e.offset..e.offset + e.size], &pps);
    }

    #[test]
    fn test_avcc_config_sps长度字段截断拒绝() {
        // num_sps=1, 但 SPS 长度字段只有 1 字节
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00];
        let err = parse_avcc_config(&data).expect_err("SPS 长度字段截断应返回错误");
        assert!(format!("{err}").contains("长度字段截断"));
    }

    #[test]
    fn test_avcc_config_sps数据截断拒绝() {
        // declared_len=4, 实际仅 2 字节
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64];
        let err = parse_avcc_config(&data).expect_err("SPS 数据截断应返回错误");
        assert!(format!("{err}").contains("数据截断"));
    }

    #[test]
    fn test_avcc_config_缺少num_pps拒绝() {
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x01, 0x67];
        let err = parse_avcc_config(&data).expect_err("缺少 num_pps 字段应返回错误");
        assert!(format!("{err}").contains("numOfPictureParameterSets"));
    }
}
