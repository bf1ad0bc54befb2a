//! H.264/AVC 码流解析器.
//!
//! 提供对 H.264 AVCC 和 Annex B 格式码流的解析能力:
//! - NAL 单元分割与类型识别
//! - SPS / PPS / SEI 解析
//! - avcC (AVCDecoderConfigurationRecord) 解析
//! - Exp-Golomb 语法元素读取

pub mod nal;
pub mod pps;
pub mod sei;
pub mod sps;

pub use nal::{
    AvccConfig, AvccEntry, NalUnit, NalUnitType, parse_avcc_config, remove_emulation_prevention,
    split_annex_b, split_avcc,
};
pub use pps::{Pps, parse_pps};
pub use sei::{SeiMessage, SeiPayload, parse_sei_rbsp};
pub use sps::{Sps, parse_sps};

use zhen_core::bitreader::BitReader;
use zhen_core::{ZhenError, ZhenResult};

/// 读取无符号 Exp-Golomb 编码值 ue(v)
///
/// 前导零超过 31 位视为码流损坏.
pub fn read_ue(br: &mut BitReader) -> ZhenResult<u32> {
    let mut leading_zeros = 0u32;
    while br.read_bit()? == 0 {
        leading_zeros += 1;
        if leading_zeros > 31 {
            return Err(ZhenError::InvalidData(
                "H264: Exp-Golomb 前导零超过 31 位".into(),
            ));
        }
    }

    if leading_zeros == 0 {
        return Ok(0);
    }
    let suffix = br.read_bits(leading_zeros)?;
    Ok((1u32 << leading_zeros) - 1 + suffix)
}

/// 读取有符号 Exp-Golomb 编码值 se(v)
///
/// 映射规则: code_num 为奇数 → (code_num+1)/2, 偶数 → -(code_num/2).
pub fn read_se(br: &mut BitReader) -> ZhenResult<i32> {
    let code_num = read_ue(br)?;
    if code_num & 1 == 1 {
        Ok(((code_num >> 1) + 1) as i32)
    } else {
        Ok(-((code_num >> 1) as i32))
    }
}

/// 判断 RBSP 是否仍有有效语法数据 (排除 rbsp_trailing_bits)
pub fn more_rbsp_data(br: &mut BitReader) -> bool {
    let bits_left = br.bits_left();
    if bits_left == 0 {
        return false;
    }
    if bits_left > 8 {
        return true;
    }
    let Ok(rest) = br.peek_bits(bits_left as u32) else {
        return false;
    };
    // 只剩 stop bit (1) + 对齐 0 时没有更多语法数据
    let trailing = 1u32 << (bits_left - 1);
    rest != trailing
}
