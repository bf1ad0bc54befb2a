//! H.264 SEI (Supplemental Enhancement Information) 解析.
//!
//! SEI NAL 由若干 payload 组成, 每个 payload 的类型与大小
//! 使用 ff-coded 编码 (0xFF 续字节累加).

use zhen_core::bitreader::BitReader;
use zhen_core::{ZhenError, ZhenResult};

use super::read_ue;

const SEI_BUFFERING_PERIOD: u32 = 0;
const SEI_PIC_TIMING: u32 = 1;
const SEI_USER_DATA_UNREGISTERED: u32 = 5;
const SEI_RECOVERY_POINT: u32 = 6;

/// 单个 SEI payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeiPayload {
    /// payload 类型编号
    pub payload_type: u32,
    /// payload 字节大小
    pub payload_size: usize,
    /// 解析后的消息
    pub message: SeiMessage,
}

/// SEI 消息内容
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeiMessage {
    /// buffering_period (type 0)
    BufferingPeriod {
        /// 引用的 SPS ID
        seq_parameter_set_id: u32,
    },
    /// pic_timing (type 1), 原始字节保留
    PicTiming {
        /// 原始 payload
        raw: Vec<u8>,
    },
    /// user_data_unregistered (type 5)
    UserDataUnregistered {
        /// ISO/IEC 11578 UUID
        uuid: [u8; 16],
        /// 用户数据
        payload: Vec<u8>,
    },
    /// recovery_point (type 6)
    RecoveryPoint {
        /// 恢复点帧计数
        recovery_frame_cnt: u32,
        /// exact_match_flag
        exact_match: bool,
        /// broken_link_flag
        broken_link: bool,
    },
    /// 其他类型, 原始字节保留
    Unknown {
        /// 原始 payload
        data: Vec<u8>,
    },
}

/// 解析 SEI RBSP, 返回其中所有 payload
pub fn parse_sei_rbsp(rbsp: &[u8]) -> ZhenResult<Vec<SeiPayload>> {
    let mut payloads = Vec::new();
    let mut offset = 0usize;

    while offset < rbsp.len() {
        if is_rbsp_trailing_bits(&rbsp[offset..]) {
            break;
        }

        let payload_type = read_ff_coded(rbsp, &mut offset, "payload_type")?;
        let payload_size = read_ff_coded(rbsp, &mut offset, "payload_size")? as usize;
        let payload_end = offset.checked_add(payload_size).ok_or_else(|| {
            ZhenError::InvalidData(format!("H264: SEI payload_size 溢出, value={payload_size}"))
        })?;
        if payload_end > rbsp.len() {
            return Err(ZhenError::InvalidData(format!(
                "H264: SEI payload 截断, type={payload_type}, size={payload_size}, remain={}",
                rbsp.len() - offset
            )));
        }
        let payload = &rbsp[offset..payload_end];
        offset = payload_end;

        payloads.push(SeiPayload {
            payload_type,
            payload_size,
            message: parse_payload(payload_type, payload)?,
        });
    }

    Ok(payloads)
}

fn is_rbsp_trailing_bits(rest: &[u8]) -> bool {
    match rest.first() {
        None => true,
        Some(&b) => b == 0x80 && rest[1..].iter().all(|v| *v == 0),
    }
}

/// 读取 ff-coded 值 (0xFF 续字节累加)
fn read_ff_coded(data: &[u8], offset: &mut usize, name: &str) -> ZhenResult<u32> {
    let mut value = 0u32;
    loop {
        let byte = *data
            .get(*offset)
            .ok_or_else(|| ZhenError::InvalidData(format!("H264: SEI {name} 截断")))?;
        *offset += 1;
        value = value
            .checked_add(u32::from(byte))
            .ok_or_else(|| ZhenError::InvalidData(format!("H264: SEI {name} 溢出")))?;
        if byte != 0xFF {
            break;
        }
    }
    Ok(value)
}

fn parse_payload(payload_type: u32, payload: &[u8]) -> ZhenResult<SeiMessage> {
    match payload_type {
        SEI_BUFFERING_PERIOD => {
            let mut br = BitReader::new(payload);
            Ok(SeiMessage::BufferingPeriod {
                seq_parameter_set_id: read_ue(&mut br)?,
            })
        }
        SEI_PIC_TIMING => Ok(SeiMessage::PicTiming {
            raw: payload.to_vec(),
        }),
        SEI_USER_DATA_UNREGISTERED => {
            if payload.len() < 16 {
                return Err(ZhenError::InvalidData(format!(
                    "H264: SEI user_data_unregistered 截断, len={}",
                    payload.len()
                )));
            }
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&payload[..16]);
            Ok(SeiMessage::UserDataUnregistered {
                uuid,
                payload: payload[16..].to_vec(),
            })
        }
        SEI_RECOVERY_POINT => {
            let mut br = BitReader::new(payload);
            let recovery_frame_cnt = read_ue(&mut br)?;
            let exact_match = br.read_bit()? != 0;
            let broken_link = br.read_bit()? != 0;
            Ok(SeiMessage::RecoveryPoint {
                recovery_frame_cnt,
                exact_match,
                broken_link,
            })
        }
        _ => Ok(SeiMessage::Unknown {
            data: payload.to_vec(),
        }),
    }
}
