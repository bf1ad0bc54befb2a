//! IDR 采样筛选器.
//!
//! 从视频采样映射中剔除对缩略图无价值的 IDR, 再按请求的数量与
//! 分布方式挑选. 无价值的帧指:
//! - 片头片尾的单色帧 (黑屏/绿屏), 通过首尾各 3% 的边界裁剪去除
//! - 信息量低于平均水平的帧, 通过大小阈值 (平均负载 / 1.66) 去除
//!
//! 筛选器消费输入映射并返回替换映射, 调用方用返回值覆盖自己的句柄.

use log::{debug, warn};
use zhen_codec::{ExtractionMode, SampleKind, SampleMap};

/// 大小阈值分母: 阈值 = 平均 IDR 负载 / 1.66 (约 60%)
const SIZE_THRESHOLD_DIVISOR: f64 = 1.66;

/// 边界裁剪比例: 首尾各 ceil(3%) 个 IDR 不参与挑选
const BORDER_CUT_RATIO: f64 = 0.03;

/// 按数量与分布方式筛选 IDR 采样
///
/// 返回 `(筛选后的映射, 最终图像数量)`. 最终数量是
/// `min(picture_number, 幸存 IDR 数)`, 映射中恰好保留这么多 IDR,
/// 非 IDR 辅助采样 (SPS/PPS 伪采样等) 原样保留.
///
/// `Unfiltered` 模式不改动映射, 只做数量钳制.
pub fn idr_filtering(
    map: SampleMap,
    picture_number: u32,
    mode: ExtractionMode,
) -> (SampleMap, u32) {
    if !map.is_video() {
        warn!("Filter: 输入不是视频采样映射, stream_type={}", map.stream_type);
    }

    let idr_count = map.sample_count_idr();
    if idr_count == 0 {
        warn!("Filter: 流中没有 IDR 采样, 0 张图像可提取");
        return (map, 0);
    }

    let mut picture_number = picture_number;
    if picture_number > idr_count {
        warn!(
            "Filter: IDR 采样不足, 只能提取 {} 张图像 (请求 {})",
            idr_count, picture_number
        );
        picture_number = idr_count;
    }

    if mode == ExtractionMode::Unfiltered {
        debug!("Filter: Unfiltered 模式, 不改动采样映射");
        return (map, picture_number);
    }

    let idr_positions = map.idr_indices();

    // 大小阈值 = 平均 IDR 负载 / 1.66
    let payload: u64 = idr_positions
        .iter()
        .map(|&i| u64::from(map.get(i).map(|s| s.size).unwrap_or(0)))
        .sum();
    let threshold = (payload as f64 / f64::from(idr_count)) / SIZE_THRESHOLD_DIVISOR;

    // 首尾边界裁剪
    let border = (f64::from(idr_count) * BORDER_CUT_RATIO).ceil() as usize;
    let total = idr_positions.len();

    // 第一轮裁剪: 去掉边界与小于阈值的 IDR
    let mut survivors: Vec<usize> = Vec::new();
    for ordinal in border..total.saturating_sub(border) {
        let position = idr_positions[ordinal];
        let Some(sample) = map.get(position) else {
            continue;
        };
        if f64::from(sample.size) > threshold {
            survivors.push(position);
        }
    }

    debug!(
        "Filter: 阈值={:.1}, 边界={}, 第一轮裁剪后剩余 {} 个 IDR",
        threshold,
        border,
        survivors.len()
    );

    let survivor_count = survivors.len() as u32;
    if picture_number > survivor_count {
        picture_number = survivor_count;
    }

    // 第二轮: 按分布方式挑选
    let selected: Vec<usize> = match mode {
        ExtractionMode::Ordered => survivors
            .iter()
            .take(picture_number as usize)
            .copied()
            .collect(),
        ExtractionMode::Distributed => {
            select_distributed(&survivors, picture_number)
        }
        ExtractionMode::Unfiltered => unreachable!("Unfiltered 已提前返回"),
    };

    // 重建映射: 非 IDR 辅助采样原样保留, 追加选中的 IDR
    let mut filtered = SampleMap::new(map.stream_type, map.stream_codec, map.time_base);
    filtered.sample_alignment = map.sample_alignment;
    filtered.nal_length_size = map.nal_length_size;

    for sample in map.iter() {
        if sample.kind != SampleKind::VideoIdr {
            filtered.push(*sample);
        }
    }
    for &position in &selected {
        if let Some(sample) = map.get(position) {
            filtered.push(*sample);
        }
    }

    debug!(
        "Filter: 筛选完成, {} 个采样 ({} 个 IDR), 模式={:?}",
        filtered.sample_count(),
        filtered.sample_count_idr(),
        mode
    );

    // 旧映射在此释放, 调用方持有的是替换映射
    (filtered, picture_number)
}

/// Distributed 模式的下标挑选
///
/// 步进 = floor(N / (picture_number - 1)), 下标向 N-1 钳制.
/// `picture_number == 1` 时步进分母无定义, 取中位幸存者.
fn select_distributed(survivors: &[usize], picture_number: u32) -> Vec<usize> {
    let n = survivors.len();
    if picture_number == 0 || n == 0 {
        return Vec::new();
    }
    if picture_number == 1 {
        return vec![survivors[n / 2]];
    }

    let jump = n / (picture_number as usize - 1);
    (0..picture_number as usize)
        .map(|i| survivors[(i * jump).min(n - 1)])
        .collect()
}
