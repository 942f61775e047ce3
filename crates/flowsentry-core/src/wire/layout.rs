//! Fixed offsets of the wire format. All integers and reals little-endian.

use std::ops::Range;

/// Address and label fields are NUL-padded to this width; content is capped
/// at one byte less so a terminator always survives.
pub const TEXT_FIELD_LEN: usize = 64;

/* FlowRecord */
pub const SRC_ADDR_RANGE: Range<usize> = 0..64;
pub const DST_ADDR_RANGE: Range<usize> = 64..128;
pub const LABEL_RANGE: Range<usize> = 128..192;
pub const SRC_PORT_RANGE: Range<usize> = 192..194;
pub const DST_PORT_RANGE: Range<usize> = 194..196;
pub const PROTOCOL_OFFSET: usize = 196;
pub const IS_ATTACK_OFFSET: usize = 197;
pub const DURATION_RANGE: Range<usize> = 198..206;
pub const BYTES_PER_SEC_RANGE: Range<usize> = 206..214;
pub const PKTS_PER_SEC_RANGE: Range<usize> = 214..222;
pub const PKT_LEN_MEAN_RANGE: Range<usize> = 222..230;
pub const FWD_PACKETS_RANGE: Range<usize> = 230..234;
pub const BWD_PACKETS_RANGE: Range<usize> = 234..238;
pub const SYN_COUNT_RANGE: Range<usize> = 238..242;
pub const RECORD_LEN: usize = 242;

/// Window meta: `[window_id, start_row, end_row, flow_count]` as i64.
pub const WINDOW_META_LEN: usize = 4 * 8;

/// Result meta: `[window_id, start_row, end_row, flow_count, pred_entropy,
/// pred_pca, pred_cusum, pred_combined, ground_truth]` as i64.
pub const RESULT_META_LEN: usize = 9 * 8;

/// Result metrics: `[score_entropy, score_pca, score_cusum, norm_H_src,
/// norm_H_dst, pca_spe, pca_t2, cusum_pos, cusum_neg, proc_time_ms]`.
pub const RESULT_METRICS_LEN: usize = 10 * 8;
