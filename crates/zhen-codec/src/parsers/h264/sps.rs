//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! SPS 包含编码视频序列的全局参数:
//! - Profile / Level
//! - 图像尺寸 (宏块单位, 需应用 cropping 调整)
//! - 色度格式与位深
//! - POC 计数方式, 参考帧数量
//! - 帧率信息 (VUI timing_info, 可选)

use zhen_core::bitreader::BitReader;
use zhen_core::{Rational, ZhenError, ZhenResult};

use super::{read_se, read_ue};

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct Sps {
    /// profile_idc (66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set 标志位
    pub constraint_set_flags: u8,
    /// level_idc (30=3.0, 41=4.1)
    pub level_idc: u8,
    /// SPS ID (seq_parameter_set_id, 0-31)
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag (仅 4:4:4)
    pub separate_colour_plane: bool,
    /// 亮度位深 (通常 8)
    pub bit_depth_luma: u32,
    /// 色度位深 (通常 8)
    pub bit_depth_chroma: u32,
    /// log2(max_frame_num) = log2_max_frame_num_minus4 + 4
    pub log2_max_frame_num: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub poc_type: u32,
    /// log2(max_pic_order_cnt_lsb) (仅 poc_type==0)
    pub log2_max_poc_lsb: u32,
    /// delta_pic_order_always_zero_flag (仅 poc_type==1)
    pub delta_pic_order_always_zero: bool,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// cropping 偏移 (frame_crop_*_offset 原始值)
    pub crop_left: u32,
    /// cropping 偏移
    pub crop_right: u32,
    /// cropping 偏移
    pub crop_top: u32,
    /// cropping 偏移
    pub crop_bottom: u32,
    /// 帧率 (如果 VUI 中有 timing_info)
    pub fps: Option<Rational>,
}

/// 从 RBSP 数据解析 SPS
pub fn parse_sps(rbsp: &[u8]) -> ZhenResult<Sps> {
    if rbsp.len() < 3 {
        return Err(ZhenError::InvalidData(format!(
            "H264: SPS RBSP 太短, len={}",
            rbsp.len()
        )));
    }

    let mut br = BitReader::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let level_idc = br.read_bits(8)? as u8;

    let sps_id = read_ue(&mut br)?;
    if sps_id > 31 {
        return Err(ZhenError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    // High profile 及以上有额外字段
    if is_high_profile(profile_idc) {
        chroma_format_idc = read_ue(&mut br)?;
        if chroma_format_idc > 3 {
            return Err(ZhenError::InvalidData(format!(
                "H264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_bit()? == 1;
        }
        bit_depth_luma = read_ue(&mut br)? + 8;
        bit_depth_chroma = read_ue(&mut br)? + 8;
        if !(8..=14).contains(&bit_depth_luma) || !(8..=14).contains(&bit_depth_chroma) {
            return Err(ZhenError::InvalidData(format!(
                "H264: 位深非法, luma={}, chroma={}",
                bit_depth_luma, bit_depth_chroma
            )));
        }
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag

        let scaling_present = br.read_bit()?;
        if scaling_present == 1 {
            skip_seq_scaling_lists(&mut br, chroma_format_idc)?;
        }
    }

    let log2_max_frame_num_minus4 = read_ue(&mut br)?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(ZhenError::InvalidData(format!(
            "H264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }
    let log2_max_frame_num = log2_max_frame_num_minus4 + 4;

    let poc_type = read_ue(&mut br)?;
    if poc_type > 2 {
        return Err(ZhenError::InvalidData(format!(
            "H264: pic_order_cnt_type 非法, value={}",
            poc_type
        )));
    }
    let mut log2_max_poc_lsb = 0u32;
    let mut delta_pic_order_always_zero = false;
    match poc_type {
        0 => {
            let log2_max_poc_lsb_minus4 = read_ue(&mut br)?;
            if log2_max_poc_lsb_minus4 > 12 {
                return Err(ZhenError::InvalidData(format!(
                    "H264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    log2_max_poc_lsb_minus4
                )));
            }
            log2_max_poc_lsb = log2_max_poc_lsb_minus4 + 4;
        }
        1 => {
            delta_pic_order_always_zero = br.read_bit()? == 1;
            let _offset_for_non_ref_pic = read_se(&mut br)?;
            let _offset_for_top_to_bottom_field = read_se(&mut br)?;
            let num_ref_in_cycle = read_ue(&mut br)?;
            if num_ref_in_cycle > 255 {
                return Err(ZhenError::InvalidData(format!(
                    "H264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_in_cycle
                )));
            }
            for _ in 0..num_ref_in_cycle {
                let _offset_for_ref_frame = read_se(&mut br)?;
            }
        }
        _ => {} // poc_type == 2: 无额外字段
    }

    let max_num_ref_frames = read_ue(&mut br)?;
    if max_num_ref_frames > 16 {
        return Err(ZhenError::InvalidData(format!(
            "H264: max_num_ref_frames 超出范围, value={}",
            max_num_ref_frames
        )));
    }
    let _gaps_in_frame_num_allowed = br.read_bit()?;

    // 图像尺寸 (宏块单位)
    let pic_width_in_mbs = read_ue(&mut br)? + 1;
    let pic_height_in_map_units = read_ue(&mut br)? + 1;

    let frame_mbs_only = br.read_bit()? == 1;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip_bits(1)?; // direct_8x8_inference_flag

    // Cropping
    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
    if br.read_bit()? == 1 {
        crop_left = read_ue(&mut br)?;
        crop_right = read_ue(&mut br)?;
        crop_top = read_ue(&mut br)?;
        crop_bottom = read_ue(&mut br)?;
    }

    // 计算像素尺寸
    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = pic_width_in_mbs
        .checked_mul(16)
        .ok_or_else(|| ZhenError::InvalidData("H264: 计算宽度时发生溢出".into()))?;
    let raw_height = pic_height_in_map_units
        .checked_mul(if frame_mbs_only { 16 } else { 32 })
        .ok_or_else(|| ZhenError::InvalidData("H264: 计算高度时发生溢出".into()))?;
    let crop_x = crop_left
        .checked_add(crop_right)
        .and_then(|v| v.checked_mul(crop_unit_x))
        .ok_or_else(|| ZhenError::InvalidData("H264: 计算水平裁剪时发生溢出".into()))?;
    let crop_y = crop_top
        .checked_add(crop_bottom)
        .and_then(|v| v.checked_mul(crop_unit_y))
        .ok_or_else(|| ZhenError::InvalidData("H264: 计算垂直裁剪时发生溢出".into()))?;
    if crop_x >= raw_width || crop_y >= raw_height {
        return Err(ZhenError::InvalidData(format!(
            "H264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    let width = raw_width - crop_x;
    let height = raw_height - crop_y;

    // VUI 参数 (只取 timing_info)
    let mut fps = None;
    if br.read_bit()? == 1 {
        fps = parse_vui_timing(&mut br)?;
    }

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num,
        poc_type,
        log2_max_poc_lsb,
        delta_pic_order_always_zero,
        max_num_ref_frames,
        frame_mbs_only,
        width,
        height,
        crop_left,
        crop_right,
        crop_top,
        crop_bottom,
        fps,
    })
}

/// 是否为 High profile 及以上 (带 chroma/bit_depth/scaling 扩展字段)
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// cropping 单位 (ITU-T H.264 表 6-1)
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let field_factor = if frame_mbs_only { 1 } else { 2 };
    match chroma_array_type {
        1 => (2, 2 * field_factor), // 4:2:0
        2 => (2, field_factor),     // 4:2:2
        _ => (1, field_factor),     // 单色 / 4:4:4
    }
}

/// 跳过 SPS scaling list 语法 (缩略图解码不使用自定义量化矩阵)
fn skip_seq_scaling_lists(br: &mut BitReader, chroma_format_idc: u32) -> ZhenResult<()> {
    let list_count = if chroma_format_idc == 3 { 12 } else { 8 };
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

/// 解析 VUI 中的 timing_info, 返回帧率
///
/// timing_info 之前的 VUI 字段按语法逐项跳过.
fn parse_vui_timing(br: &mut BitReader) -> ZhenResult<Option<Rational>> {
    // aspect_ratio_info
    if br.read_bit()? == 1 {
        let aspect_ratio_idc = br.read_bits(8)?;
        if aspect_ratio_idc == 255 {
            // Extended_SAR
            br.skip_bits(32)?;
        }
    }
    // overscan_info
    if br.read_bit()? == 1 {
        br.skip_bits(1)?;
    }
    // video_signal_type
    if br.read_bit()? == 1 {
        br.skip_bits(4)?; // video_format(3) + video_full_range_flag(1)
        if br.read_bit()? == 1 {
            br.skip_bits(24)?; // colour_primaries + transfer + matrix
        }
    }
    // chroma_loc_info
    if br.read_bit()? == 1 {
        let _top = read_ue(br)?;
        let _bottom = read_ue(br)?;
    }
    // timing_info
    if br.read_bit()? == 1 {
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        let _fixed_frame_rate = br.read_bit()?;
        if num_units_in_tick > 0 && time_scale > 0 {
            // 逐帧编码时 fps = time_scale / (2 * num_units_in_tick)
            let num = (time_scale / 2).min(i32::MAX as u32) as i32;
            let den = num_units_in_tick.min(i32::MAX as u32) as i32;
            if num > 0 && den > 0 {
                return Ok(Some(Rational::new(num, den)));
            }
        }
    }
    Ok(None)
}
