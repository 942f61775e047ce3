//! Encoding and bounds-checked decoding of wire messages.

use std::ops::Range;

use super::WireError;
use super::layout;
use crate::suspects::SuspectList;
use crate::{FlowRecord, FlowWindow, WindowResult};

struct WireReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> WireReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    fn require_len(&self, needed: usize) -> Result<(), WireError> {
        if self.payload.len() < needed {
            return Err(WireError::Truncated {
                needed,
                actual: self.payload.len(),
            });
        }
        Ok(())
    }

    fn slice(&self, range: Range<usize>) -> Result<&'a [u8], WireError> {
        self.payload.get(range.clone()).ok_or(WireError::Truncated {
            needed: range.end,
            actual: self.payload.len(),
        })
    }

    fn i64_at(&self, offset: usize) -> Result<i64, WireError> {
        let bytes = self.slice(offset..offset + 8)?;
        Ok(i64::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    fn f64_at(&self, offset: usize) -> Result<f64, WireError> {
        let bytes = self.slice(offset..offset + 8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, WireError> {
        let bytes = self.slice(offset..offset + 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, WireError> {
        let bytes = self.slice(offset..offset + 2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap_or_default()))
    }

    fn u8_at(&self, offset: usize) -> Result<u8, WireError> {
        self.payload
            .get(offset)
            .copied()
            .ok_or(WireError::Truncated {
                needed: offset + 1,
                actual: self.payload.len(),
            })
    }

    /// NUL-padded fixed-width text field.
    fn text_at(&self, range: Range<usize>) -> Result<String, WireError> {
        let bytes = self.slice(range)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end])
            .map(str::to_string)
            .map_err(|_| WireError::BadText)
    }

    /* Sequential reads for the variable-length suspect block. */

    fn take_u32(&mut self) -> Result<u32, WireError> {
        let value = self.u32_at(self.cursor)?;
        self.cursor += 4;
        Ok(value)
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let bytes = self.slice(self.cursor..self.cursor + len)?;
        self.cursor += len;
        Ok(bytes)
    }
}

fn put_text(buf: &mut [u8], value: &str) {
    // Keep the trailing NUL even for over-long input.
    let len = value.len().min(layout::TEXT_FIELD_LEN - 1);
    buf[..len].copy_from_slice(&value.as_bytes()[..len]);
}

/// Encodes the window meta packet: `[id, start_row, end_row, flow_count]`.
pub fn encode_window_meta(window: &FlowWindow) -> Vec<u8> {
    let mut buf = Vec::with_capacity(layout::WINDOW_META_LEN);
    for value in [
        window.window_id,
        window.start_row,
        window.end_row,
        window.flow_count() as i64,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Decoded window meta, before any flow payload arrives.
#[derive(Debug, Clone, Copy)]
pub struct WindowMeta {
    pub window_id: i64,
    pub start_row: i64,
    pub end_row: i64,
    pub flow_count: usize,
}

pub fn decode_window_meta(payload: &[u8]) -> Result<WindowMeta, WireError> {
    let reader = WireReader::new(payload);
    reader.require_len(layout::WINDOW_META_LEN)?;
    Ok(WindowMeta {
        window_id: reader.i64_at(0)?,
        start_row: reader.i64_at(8)?,
        end_row: reader.i64_at(16)?,
        flow_count: reader.i64_at(24)?.max(0) as usize,
    })
}

/// Encodes `flows` as `flows.len() × RECORD_LEN` bytes.
pub fn encode_flows(flows: &[FlowRecord]) -> Vec<u8> {
    let mut buf = vec![0u8; flows.len() * layout::RECORD_LEN];
    for (flow, chunk) in flows.iter().zip(buf.chunks_exact_mut(layout::RECORD_LEN)) {
        put_text(&mut chunk[layout::SRC_ADDR_RANGE], &flow.src_addr);
        put_text(&mut chunk[layout::DST_ADDR_RANGE], &flow.dst_addr);
        put_text(&mut chunk[layout::LABEL_RANGE], &flow.label);
        chunk[layout::SRC_PORT_RANGE].copy_from_slice(&flow.src_port.to_le_bytes());
        chunk[layout::DST_PORT_RANGE].copy_from_slice(&flow.dst_port.to_le_bytes());
        chunk[layout::PROTOCOL_OFFSET] = flow.protocol;
        chunk[layout::IS_ATTACK_OFFSET] = u8::from(flow.is_attack);
        chunk[layout::DURATION_RANGE].copy_from_slice(&flow.duration.to_le_bytes());
        chunk[layout::BYTES_PER_SEC_RANGE].copy_from_slice(&flow.bytes_per_sec.to_le_bytes());
        chunk[layout::PKTS_PER_SEC_RANGE].copy_from_slice(&flow.packets_per_sec.to_le_bytes());
        chunk[layout::PKT_LEN_MEAN_RANGE].copy_from_slice(&flow.packet_len_mean.to_le_bytes());
        chunk[layout::FWD_PACKETS_RANGE].copy_from_slice(&flow.fwd_packets.to_le_bytes());
        chunk[layout::BWD_PACKETS_RANGE].copy_from_slice(&flow.bwd_packets.to_le_bytes());
        chunk[layout::SYN_COUNT_RANGE].copy_from_slice(&flow.syn_count.to_le_bytes());
    }
    buf
}

pub fn decode_flows(payload: &[u8], flow_count: usize) -> Result<Vec<FlowRecord>, WireError> {
    if payload.len() != flow_count * layout::RECORD_LEN {
        return Err(WireError::BadRecordCount {
            expected: flow_count,
            actual: payload.len(),
        });
    }
    let mut flows = Vec::with_capacity(flow_count);
    for chunk in payload.chunks_exact(layout::RECORD_LEN) {
        let reader = WireReader::new(chunk);
        flows.push(FlowRecord {
            src_addr: reader.text_at(layout::SRC_ADDR_RANGE)?,
            dst_addr: reader.text_at(layout::DST_ADDR_RANGE)?,
            label: reader.text_at(layout::LABEL_RANGE)?,
            src_port: reader.u16_at(layout::SRC_PORT_RANGE.start)?,
            dst_port: reader.u16_at(layout::DST_PORT_RANGE.start)?,
            protocol: reader.u8_at(layout::PROTOCOL_OFFSET)?,
            is_attack: reader.u8_at(layout::IS_ATTACK_OFFSET)? != 0,
            duration: reader.f64_at(layout::DURATION_RANGE.start)?,
            bytes_per_sec: reader.f64_at(layout::BYTES_PER_SEC_RANGE.start)?,
            packets_per_sec: reader.f64_at(layout::PKTS_PER_SEC_RANGE.start)?,
            packet_len_mean: reader.f64_at(layout::PKT_LEN_MEAN_RANGE.start)?,
            fwd_packets: reader.u32_at(layout::FWD_PACKETS_RANGE.start)?,
            bwd_packets: reader.u32_at(layout::BWD_PACKETS_RANGE.start)?,
            syn_count: reader.u32_at(layout::SYN_COUNT_RANGE.start)?,
        });
    }
    Ok(flows)
}

/// Encodes the result meta packet (identity, predictions, ground truth).
pub fn encode_result_meta(result: &WindowResult) -> Vec<u8> {
    let mut buf = Vec::with_capacity(layout::RESULT_META_LEN);
    for value in [
        result.window_id,
        result.start_row,
        result.end_row,
        i64::from(result.flow_count),
        i64::from(result.entropy_pred),
        i64::from(result.pca_pred),
        i64::from(result.cusum_pred),
        i64::from(result.combined_pred),
        i64::from(result.ground_truth),
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Decodes result meta into a partially filled [`WindowResult`].
pub fn decode_result_meta(payload: &[u8]) -> Result<WindowResult, WireError> {
    let reader = WireReader::new(payload);
    reader.require_len(layout::RESULT_META_LEN)?;
    Ok(WindowResult {
        window_id: reader.i64_at(0)?,
        start_row: reader.i64_at(8)?,
        end_row: reader.i64_at(16)?,
        flow_count: reader.i64_at(24)?.max(0) as u32,
        entropy_pred: reader.i64_at(32)? != 0,
        pca_pred: reader.i64_at(40)? != 0,
        cusum_pred: reader.i64_at(48)? != 0,
        combined_pred: reader.i64_at(56)? != 0,
        ground_truth: reader.i64_at(64)? != 0,
        ..WindowResult::default()
    })
}

/// Encodes the scores-and-metrics packet (10 reals, fixed order).
pub fn encode_result_metrics(result: &WindowResult) -> Vec<u8> {
    let mut buf = Vec::with_capacity(layout::RESULT_METRICS_LEN);
    for value in [
        result.entropy_score,
        result.pca_score,
        result.cusum_score,
        result.norm_entropy_src,
        result.norm_entropy_dst,
        result.pca_spe,
        result.pca_t2,
        result.cusum_positive,
        result.cusum_negative,
        result.processing_time_ms,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

pub fn apply_result_metrics(result: &mut WindowResult, payload: &[u8]) -> Result<(), WireError> {
    let reader = WireReader::new(payload);
    reader.require_len(layout::RESULT_METRICS_LEN)?;
    result.entropy_score = reader.f64_at(0)?;
    result.pca_score = reader.f64_at(8)?;
    result.cusum_score = reader.f64_at(16)?;
    result.norm_entropy_src = reader.f64_at(24)?;
    result.norm_entropy_dst = reader.f64_at(32)?;
    result.pca_spe = reader.f64_at(40)?;
    result.pca_t2 = reader.f64_at(48)?;
    result.cusum_positive = reader.f64_at(56)?;
    result.cusum_negative = reader.f64_at(64)?;
    result.processing_time_ms = reader.f64_at(72)?;
    Ok(())
}

/// Encodes the suspect block: entry count, then per entry a length-prefixed
/// address and its multiplicity.
pub fn encode_suspects(suspects: &SuspectList) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(suspects.len() as u32).to_le_bytes());
    for entry in suspects.entries() {
        buf.extend_from_slice(&(entry.addr.len() as u32).to_le_bytes());
        buf.extend_from_slice(entry.addr.as_bytes());
        buf.extend_from_slice(&entry.count.to_le_bytes());
    }
    buf
}

pub fn decode_suspects(payload: &[u8]) -> Result<SuspectList, WireError> {
    let mut reader = WireReader::new(payload);
    let entry_count = reader.take_u32()?;
    let mut suspects = SuspectList::new();
    for _ in 0..entry_count {
        let addr_len = reader.take_u32()? as usize;
        let addr_bytes = reader.take_bytes(addr_len)?;
        let addr = std::str::from_utf8(addr_bytes).map_err(|_| WireError::BadText)?;
        let count = reader.take_u32()?;
        suspects.add_with_count(addr, count);
    }
    Ok(suspects)
}
