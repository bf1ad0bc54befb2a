//! 参数集缓存.
//!
//! 按 ID 索引的 SPS/PPS 槽位表, 容量固定为 H.264 规范上限 (各 32 个).
//! 槽位只由 SPS/PPS NAL 处理器写入, 切片解码前通过 `resolve` 校验
//! `slice → PPS → SPS` 的引用完整性.

use zhen_core::{ZhenError, ZhenResult};

use crate::parsers::h264::{Pps, Sps};

/// SPS 槽位数量 (H.264 规范上限)
pub const MAX_SPS: usize = 32;
/// PPS 槽位数量
pub const MAX_PPS: usize = 32;

/// SPS/PPS 参数集缓存
pub struct ParameterSetCache {
    sps: [Option<Sps>; MAX_SPS],
    pps: [Option<Pps>; MAX_PPS],
}

impl ParameterSetCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self {
            sps: Default::default(),
            pps: Default::default(),
        }
    }

    /// 写入一个 SPS (同 ID 覆盖旧条目)
    pub fn put_sps(&mut self, sps: Sps) -> ZhenResult<()> {
        let id = sps.sps_id as usize;
        if id >= MAX_SPS {
            return Err(ZhenError::Unsupported(format!(
                "H264: sps_id 超出缓存容量, sps_id={}, max={}",
                id, MAX_SPS
            )));
        }
        self.sps[id] = Some(sps);
        Ok(())
    }

    /// 写入一个 PPS (同 ID 覆盖旧条目)
    pub fn put_pps(&mut self, pps: Pps) -> ZhenResult<()> {
        let id = pps.pps_id as usize;
        if id >= MAX_PPS {
            return Err(ZhenError::Unsupported(format!(
                "H264: pps_id 超出缓存容量, pps_id={}, max={}",
                id, MAX_PPS
            )));
        }
        self.pps[id] = Some(pps);
        Ok(())
    }

    /// 查询 SPS
    pub fn sps(&self, sps_id: u32) -> Option<&Sps> {
        self.sps.get(sps_id as usize).and_then(|s| s.as_ref())
    }

    /// 查询 PPS
    pub fn pps(&self, pps_id: u32) -> Option<&Pps> {
        self.pps.get(pps_id as usize).and_then(|p| p.as_ref())
    }

    /// 按切片引用的 PPS ID 解析出 (SPS, PPS) 对
    ///
    /// 切片解码前的引用完整性校验: 任一环节缺失都返回错误,
    /// 调度器据此跳过当前切片.
    pub fn resolve(&self, pps_id: u32) -> ZhenResult<(&Sps, &Pps)> {
        let pps = self.pps(pps_id).ok_or_else(|| {
            ZhenError::Codec(format!("H264: 切片引用了不存在的 PPS, pps_id={}", pps_id))
        })?;
        let sps = self.sps(pps.sps_id).ok_or_else(|| {
            ZhenError::Codec(format!(
                "H264: PPS 引用了不存在的 SPS, pps_id={}, sps_id={}",
                pps_id, pps.sps_id
            ))
        })?;
        Ok((sps, pps))
    }

    /// 清空全部槽位
    pub fn clear(&mut self) {
        self.sps = Default::default();
        self.pps = Default::default();
    }
}

impl Default for ParameterSetCache {
    fn default() -> Self {
        Self::new()
    }
}
