//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 负责 PPS 语法解析与合法性校验. 扩展字段 (transform_8x8_mode 等)
//! 通过 `more_rbsp_data` 判断是否存在.

use zhen_core::bitreader::BitReader;
use zhen_core::{ZhenError, ZhenResult};

use super::{more_rbsp_data, read_se, read_ue};

/// PPS 解析结果
#[derive(Debug, Clone)]
pub struct Pps {
    /// PPS ID (pic_parameter_set_id, 0-255)
    pub pps_id: u32,
    /// 引用的 SPS ID
    pub sps_id: u32,
    /// 熵编码模式 (0=CAVLC, 1=CABAC)
    pub entropy_coding_mode: u8,
    /// pic_order_present_flag
    pub pic_order_present: bool,
    /// L0 默认参考帧数
    pub num_ref_idx_l0_default_active: u32,
    /// L1 默认参考帧数
    pub num_ref_idx_l1_default_active: u32,
    /// weighted_pred_flag
    pub weighted_pred: bool,
    /// weighted_bipred_idc (0-2)
    pub weighted_bipred_idc: u32,
    /// 初始 QP (26 + pic_init_qp_minus26)
    pub pic_init_qp: i32,
    /// 色度 QP 偏移
    pub chroma_qp_index_offset: i32,
    /// 第二色度 QP 偏移 (无扩展字段时等于 chroma_qp_index_offset)
    pub second_chroma_qp_index_offset: i32,
    /// deblocking_filter_control_present_flag
    pub deblocking_filter_control: bool,
    /// redundant_pic_cnt_present_flag
    pub redundant_pic_cnt_present: bool,
    /// transform_8x8_mode_flag
    pub transform_8x8_mode: bool,
}

/// 解析 PPS 参数
pub fn parse_pps(rbsp: &[u8]) -> ZhenResult<Pps> {
    if rbsp.is_empty() {
        return Err(ZhenError::InvalidData("H264: PPS RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);
    let pps_id = read_ue(&mut br)?;
    if pps_id > 255 {
        return Err(ZhenError::InvalidData(format!(
            "H264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }

    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(ZhenError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let entropy_coding_mode = br.read_bit()? as u8;
    let pic_order_present = br.read_bit()? == 1;

    let num_slice_groups_minus1 = read_ue(&mut br)?;
    if num_slice_groups_minus1 > 7 {
        return Err(ZhenError::InvalidData(format!(
            "H264: num_slice_groups_minus1 超出范围, value={}",
            num_slice_groups_minus1
        )));
    }
    if num_slice_groups_minus1 > 0 {
        skip_slice_groups(&mut br, num_slice_groups_minus1)?;
    }

    let num_ref_idx_l0 = read_ue(&mut br)?;
    let num_ref_idx_l1 = read_ue(&mut br)?;
    if num_ref_idx_l0 > 31 || num_ref_idx_l1 > 31 {
        return Err(ZhenError::InvalidData(format!(
            "H264: num_ref_idx_default_active_minus1 超出范围, l0={}, l1={}",
            num_ref_idx_l0, num_ref_idx_l1
        )));
    }

    let weighted_pred = br.read_bit()? == 1;
    let weighted_bipred_idc = br.read_bits(2)?;
    if weighted_bipred_idc > 2 {
        return Err(ZhenError::InvalidData(format!(
            "H264: weighted_bipred_idc 非法, value={}",
            weighted_bipred_idc
        )));
    }

    let pic_init_qp = 26 + read_se(&mut br)?;
    if !(0..=51).contains(&pic_init_qp) {
        return Err(ZhenError::InvalidData(format!(
            "H264: pic_init_qp 超出范围, pic_init_qp={}",
            pic_init_qp
        )));
    }

    let _pic_init_qs = read_se(&mut br)?;

    let chroma_qp_index_offset = read_se(&mut br)?;
    validate_chroma_offset("chroma_qp_index_offset", chroma_qp_index_offset)?;

    let deblocking_filter_control = br.read_bit()? == 1;
    let _constrained_intra_pred = br.read_bit()?;
    let redundant_pic_cnt_present = br.read_bit()? == 1;

    let mut transform_8x8_mode = false;
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

    if more_rbsp_data(&mut br) {
        transform_8x8_mode = br.read_bit()? == 1;
        if br.read_bit()? == 1 {
            skip_pic_scaling_lists(&mut br, transform_8x8_mode)?;
        }
        second_chroma_qp_index_offset = read_se(&mut br)?;
        validate_chroma_offset(
            "second_chroma_qp_index_offset",
            second_chroma_qp_index_offset,
        )?;
    }

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode,
        pic_order_present,
        num_ref_idx_l0_default_active: num_ref_idx_l0 + 1,
        num_ref_idx_l1_default_active: num_ref_idx_l1 + 1,
        weighted_pred,
        weighted_bipred_idc,
        pic_init_qp,
        chroma_qp_index_offset,
        second_chroma_qp_index_offset,
        deblocking_filter_control,
        redundant_pic_cnt_present,
        transform_8x8_mode,
    })
}

fn validate_chroma_offset(field: &str, value: i32) -> ZhenResult<()> {
    if !(-12..=12).contains(&value) {
        return Err(ZhenError::InvalidData(format!(
            "H264: {} 超出范围, value={}",
            field, value
        )));
    }
    Ok(())
}

/// 跳过 PPS 的 slice group 相关语法
fn skip_slice_groups(br: &mut BitReader, num_slice_groups_minus1: u32) -> ZhenResult<()> {
    let map_type = read_ue(br)?;
    match map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                let _run_length_minus1 = read_ue(br)?;
            }
        }
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                let _top_left = read_ue(br)?;
                let _bottom_right = read_ue(br)?;
            }
        }
        3..=5 => {
            let _change_direction = br.read_bit()?;
            let _change_rate_minus1 = read_ue(br)?;
        }
        6 => {
            let pic_size_in_map_units_minus1 = read_ue(br)?;
            let group_count = num_slice_groups_minus1 + 1;
            let bits_per_id = if group_count <= 1 {
                0
            } else {
                u32::BITS - (group_count - 1).leading_zeros()
            };
            for _ in 0..=pic_size_in_map_units_minus1 {
                if bits_per_id > 0 {
                    let _slice_group_id = br.read_bits(bits_per_id)?;
                }
            }
        }
        _ => {
            return Err(ZhenError::InvalidData(format!(
                "H264: slice_group_map_type 非法, value={}",
                map_type
            )));
        }
    }
    Ok(())
}

/// 跳过 PPS scaling list 语法
fn skip_pic_scaling_lists(br: &mut BitReader, transform_8x8_mode: bool) -> ZhenResult<()> {
    let list_count = if transform_8x8_mode { 8 } else { 6 };
    for i in 0..list_count {
        if br.read_bit()? == 1 {
            let size = if i < 6 { 16 } else { 64 };
            skip_scaling_list(br, size)?;
        }
    }
    Ok(())
}

/// 跳过单个 scaling list
fn skip_scaling_list(br: &mut BitReader, size: usize) -> ZhenResult<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = read_se(br)?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // 位流构造辅助
    // ============================================================

    fn write_bit(bits: &mut Vec<bool>, v: bool) {
        bits.push(v);
    }

    fn write_bits(bits: &mut Vec<bool>, value: u32, n: usize) {
        for i in (0..n).rev() {
            bits.push(((value >> i) & 1) == 1);
        }
    }

    fn write_ue(bits: &mut Vec<bool>, val: u32) {
        let code = val + 1;
        let n = 32 - code.leading_zeros();
        for _ in 0..n - 1 {
            bits.push(false);
        }
        for i in (0..n).rev() {
            bits.push(((code >> i) & 1) == 1);
        }
    }

    fn write_se(bits: &mut Vec<bool>, val: i32) {
        let code_num = if val <= 0 {
            (-val as u32) * 2
        } else {
            (val as u32) * 2 - 1
        };
        write_ue(bits, code_num);
    }

    fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
        let mut out = Vec::with_capacity(bits.len().div_ceil(8));
        let mut cur = 0u8;
        let mut n = 0;
        for &bit in bits {
            cur = (cur << 1) | u8::from(bit);
            n += 1;
            if n == 8 {
                out.push(cur);
                cur = 0;
                n = 0;
            }
        }
        if n > 0 {
            out.push(cur << (8 - n));
        }
        out
    }

    /// 构造最小 PPS RBSP (无扩展字段)
    fn build_pps_rbsp(pps_id: u32, sps_id: u32, cabac: bool, pic_init_qp_minus26: i32) -> Vec<u8> {
        let mut bits = Vec::new();
        write_ue(&mut bits, pps_id);
        write_ue(&mut bits, sps_id);
        write_bit(&mut bits, cabac); // entropy_coding_mode
        write_bit(&mut bits, false); // pic_order_present
        write_ue(&mut bits, 0); // num_slice_groups_minus1
        write_ue(&mut bits, 0); // num_ref_idx_l0_default_active_minus1
        write_ue(&mut bits, 0); // num_ref_idx_l1_default_active_minus1
        write_bit(&mut bits, false); // weighted_pred
        write_bits(&mut bits, 0, 2); // weighted_bipred_idc
        write_se(&mut bits, pic_init_qp_minus26);
        write_se(&mut bits, 0); // pic_init_qs_minus26
        write_se(&mut bits, 0); // chroma_qp_index_offset
        write_bit(&mut bits, true); // deblocking_filter_control
        write_bit(&mut bits, false); // constrained_intra_pred
        write_bit(&mut bits, false); // redundant_pic_cnt_present

        // rbsp_trailing_bits
        write_bit(&mut bits, true);
        while !bits.len().is_multiple_of(8) {
            write_bit(&mut bits, false);
        }
        bits_to_bytes(&bits)
    }

    #[test]
    fn test_parse_pps_基本字段() {
        let rbsp = build_pps_rbsp(3, 1, true, -4);
        let pps = parse_pps(&rbsp).expect("PPS 解析失败");
        assert_eq!(pps.pps_id, 3);
        assert_eq!(pps.sps_id, 1);
        assert_eq!(pps.entropy_coding_mode, 1);
        assert_eq!(pps.pic_init_qp, 22);
        assert_eq!(pps.num_ref_idx_l0_default_active, 1);
        assert!(pps.deblocking_filter_control);
        assert!(!pps.transform_8x8_mode);
        assert_eq!(pps.second_chroma_qp_index_offset, 0);
    }

    #[test]
    fn test_parse_pps_带扩展字段() {
        let mut bits = Vec::new();
        write_ue(&mut bits, 7);
        write_ue(&mut bits, 2);
        write_bit(&mut bits, false); // CAVLC
        write_bit(&mut bits, true); // pic_order_present
        write_ue(&mut bits, 0);
        write_ue(&mut bits, 2); // l0_minus1=2
        write_ue(&mut bits, 0);
        write_bit(&mut bits, false);
        write_bits(&mut bits, 1, 2);
        write_se(&mut bits, 0);
        write_se(&mut bits, 0);
        write_se(&mut bits, 1);
        write_bit(&mut bits, false);
        write_bit(&mut bits, true);
        write_bit(&mut bits, false);
        // 扩展字段
        write_bit(&mut bits, true); // transform_8x8_mode
        write_bit(&mut bits, false); // pic_scaling_matrix_present
        write_se(&mut bits, -1); // second_chroma_qp_index_offset
        // trailing
        write_bit(&mut bits, true);
        while !bits.len().is_multiple_of(8) {
            write_bit(&mut bits, false);
        }
        let rbsp = bits_to_bytes(&bits);

        let pps = parse_pps(&rbsp).expect("带扩展字段 PPS 解析失败");
        assert_eq!(pps.pps_id, 7);
        assert_eq!(pps.sps_id, 2);
        assert!(pps.pic_order_present);
        assert_eq!(pps.num_ref_idx_l0_default_active, 3);
        assert!(pps.transform_8x8_mode);
        assert_eq!(pps.second_chroma_qp_index_offset, -1);
    }

    #[test]
    fn test_parse_pps_qp超范围拒绝() {
        let rbsp = build_pps_rbsp(0, 0, true, 40); // pic_init_qp=66
        let err = parse_pps(&rbsp).expect_err("pic_init_qp 超范围应失败");
        assert!(format!("{err}").contains("pic_init_qp"));
    }

    #[test]
    fn test_parse_pps_空rbsp拒绝() {
        assert!(parse_pps(&[]).is_err());
    }
}
