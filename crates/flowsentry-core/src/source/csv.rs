//! CSV input adapter: header-alias schema inference and windowing.
//!
//! Flow exporters disagree on header spelling (`Source IP`, ` src ip`,
//! `ip.src`, ...), so columns are discovered by case-insensitive substring
//! match against alias lists. Address columns are mandatory; everything else
//! defaults to zero when absent. Rows with a deviating field count are
//! skipped silently and do not break the window stream.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::SourceError;
use crate::{FlowRecord, FlowWindow, label_is_attack};

/// Addresses and labels are capped at 63 bytes, like the wire fields.
const MAX_FIELD_BYTES: usize = 63;

const SRC_ADDR_ALIASES: &[&str] = &["source ip", "src ip", "ip.src"];
const DST_ADDR_ALIASES: &[&str] = &["destination ip", "dst ip", "ip.dst"];
const SRC_PORT_ALIASES: &[&str] = &["source port", "src port", "sport"];
const DST_PORT_ALIASES: &[&str] = &["destination port", "dst port", "dport"];
const PROTOCOL_ALIASES: &[&str] = &["protocol", "proto"];
const DURATION_ALIASES: &[&str] = &["flow duration", "duration"];
const FWD_PACKETS_ALIASES: &[&str] = &["total fwd packets", "fwd packets"];
const BWD_PACKETS_ALIASES: &[&str] = &["total backward packets", "bwd packets"];
const BYTES_PER_SEC_ALIASES: &[&str] = &["flow bytes/s", "bytes/s"];
const PKTS_PER_SEC_ALIASES: &[&str] = &["flow packets/s", "packets/s"];
const PKT_LEN_MEAN_ALIASES: &[&str] = &["packet length mean", "pkt len mean"];
const SYN_COUNT_ALIASES: &[&str] = &["syn flag count", "syn flag"];
const LABEL_ALIASES: &[&str] = &["label", "class"];

/// Column positions discovered from a header row.
#[derive(Debug, Clone)]
pub struct CsvSchema {
    column_count: usize,
    src_addr: usize,
    dst_addr: usize,
    src_port: Option<usize>,
    dst_port: Option<usize>,
    protocol: Option<usize>,
    duration: Option<usize>,
    fwd_packets: Option<usize>,
    bwd_packets: Option<usize>,
    bytes_per_sec: Option<usize>,
    packets_per_sec: Option<usize>,
    packet_len_mean: Option<usize>,
    syn_count: Option<usize>,
    label: Option<usize>,
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|field| {
        let lowered = field.trim().to_ascii_lowercase();
        aliases.iter().any(|alias| lowered.contains(alias))
    })
}

impl CsvSchema {
    /// Infers the schema from a header record.
    ///
    /// Fails with [`SourceError::MissingColumns`] when either address column
    /// cannot be located; every other column is optional.
    pub fn from_headers(headers: &StringRecord) -> Result<CsvSchema, SourceError> {
        let src_addr = find_column(headers, SRC_ADDR_ALIASES);
        let dst_addr = find_column(headers, DST_ADDR_ALIASES);
        let (src_addr, dst_addr) = match (src_addr, dst_addr) {
            (Some(src), Some(dst)) => (src, dst),
            (src, dst) => {
                let mut missing = Vec::new();
                if src.is_none() {
                    missing.push("source address");
                }
                if dst.is_none() {
                    missing.push("destination address");
                }
                return Err(SourceError::MissingColumns(missing.join(", ")));
            }
        };

        Ok(CsvSchema {
            column_count: headers.len(),
            src_addr,
            dst_addr,
            src_port: find_column(headers, SRC_PORT_ALIASES),
            dst_port: find_column(headers, DST_PORT_ALIASES),
            protocol: find_column(headers, PROTOCOL_ALIASES),
            duration: find_column(headers, DURATION_ALIASES),
            fwd_packets: find_column(headers, FWD_PACKETS_ALIASES),
            bwd_packets: find_column(headers, BWD_PACKETS_ALIASES),
            bytes_per_sec: find_column(headers, BYTES_PER_SEC_ALIASES),
            packets_per_sec: find_column(headers, PKTS_PER_SEC_ALIASES),
            packet_len_mean: find_column(headers, PKT_LEN_MEAN_ALIASES),
            syn_count: find_column(headers, SYN_COUNT_ALIASES),
            label: find_column(headers, LABEL_ALIASES),
        })
    }

    /// Parses one data row, or `None` when the row is unusable.
    pub fn parse_record(&self, record: &StringRecord) -> Option<FlowRecord> {
        if record.len() != self.column_count {
            return None;
        }

        let text = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");
        let real = |idx: Option<usize>| text(idx).parse::<f64>().unwrap_or(0.0);
        // Counts appear as "3" or "3.0" depending on the exporter; negative
        // values clamp to zero.
        let count = |idx: Option<usize>| real(idx).max(0.0) as u32;

        let label = clip(text(self.label));
        let is_attack = label_is_attack(&label);

        Some(FlowRecord {
            src_addr: clip(text(Some(self.src_addr))),
            dst_addr: clip(text(Some(self.dst_addr))),
            src_port: count(self.src_port).min(u32::from(u16::MAX)) as u16,
            dst_port: count(self.dst_port).min(u32::from(u16::MAX)) as u16,
            protocol: count(self.protocol).min(u32::from(u8::MAX)) as u8,
            duration: real(self.duration),
            fwd_packets: count(self.fwd_packets),
            bwd_packets: count(self.bwd_packets),
            bytes_per_sec: real(self.bytes_per_sec),
            packets_per_sec: real(self.packets_per_sec),
            packet_len_mean: real(self.packet_len_mean),
            syn_count: count(self.syn_count),
            label,
            is_attack,
        })
    }
}

fn clip(field: &str) -> String {
    let trimmed = field.trim();
    if trimmed.len() <= MAX_FIELD_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_FIELD_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

/// Reads an entire flow CSV into windows of at most `window_size` flows.
///
/// Row ranges are 0-based indices over the *parsed* rows, so skipped rows do
/// not leave holes. Only the final window may hold fewer than `window_size`
/// flows.
pub fn read_windows<R: Read>(
    reader: R,
    window_size: usize,
) -> Result<Vec<FlowWindow>, SourceError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(SourceError::Csv)?.clone();
    if headers.is_empty() {
        return Err(SourceError::EmptyInput);
    }
    let schema = CsvSchema::from_headers(&headers)?;

    let mut windows = Vec::new();
    let mut pending: Vec<FlowRecord> = Vec::with_capacity(window_size);
    let mut row: i64 = 0;

    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            // A malformed line is a row-level problem, not a file-level one.
            Err(_) => continue,
        };
        let Some(flow) = schema.parse_record(&record) else {
            continue;
        };
        pending.push(flow);
        if pending.len() == window_size {
            push_window(&mut windows, &mut pending, row);
        }
        row += 1;
    }
    if !pending.is_empty() {
        push_window(&mut windows, &mut pending, row - 1);
    }

    Ok(windows)
}

fn push_window(windows: &mut Vec<FlowWindow>, pending: &mut Vec<FlowRecord>, last_row: i64) {
    let flows = std::mem::take(pending);
    let count = flows.len() as i64;
    windows.push(FlowWindow {
        window_id: windows.len() as i64,
        start_row: last_row - count + 1,
        end_row: last_row,
        flows,
    });
}

/// Opens `path` and reads it into windows; see [`read_windows`].
pub fn load_windows(path: &Path, window_size: usize) -> Result<Vec<FlowWindow>, SourceError> {
    let file = File::open(path)?;
    read_windows(file, window_size)
}

#[cfg(test)]
mod tests {
    use super::{CsvSchema, read_windows};
    use crate::source::SourceError;
    use csv::StringRecord;

    const HEADER: &str = " Source IP, Destination IP, Source Port, Destination Port, Protocol, \
                          Flow Duration, Total Fwd Packets, Total Backward Packets, \
                          Flow Bytes/s, Flow Packets/s, Packet Length Mean, SYN Flag Count, Label";

    fn sample_csv(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        text.push('\n');
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn schema_matches_case_insensitive_substrings() {
        let headers = StringRecord::from(vec!["ip.src", "IP.DST", "sport", "dport", "Label"]);
        let schema = CsvSchema::from_headers(&headers).expect("schema");
        let record = StringRecord::from(vec!["1.1.1.1", "2.2.2.2", "53", "40000", "BENIGN"]);
        let flow = schema.parse_record(&record).expect("flow");
        assert_eq!(flow.src_addr, "1.1.1.1");
        assert_eq!(flow.src_port, 53);
        assert!(!flow.is_attack);
    }

    #[test]
    fn missing_address_columns_are_fatal() {
        let headers = StringRecord::from(vec!["Source IP", "Protocol", "Label"]);
        let err = CsvSchema::from_headers(&headers).unwrap_err();
        match err {
            SourceError::MissingColumns(missing) => {
                assert_eq!(missing, "destination address");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn windows_carry_contiguous_row_ranges() {
        let rows: Vec<String> = (0..5)
            .map(|i| format!("10.0.0.{i},8.8.8.8,1000,53,17,1.0,5,5,100.0,10.0,60.0,0,BENIGN"))
            .collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let windows = read_windows(sample_csv(&refs).as_bytes(), 2).expect("windows");

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start_row, 0);
        assert_eq!(windows[0].end_row, 1);
        assert_eq!(windows[1].start_row, 2);
        assert_eq!(windows[2].start_row, 4);
        assert_eq!(windows[2].end_row, 4);
        assert_eq!(windows[2].flow_count(), 1);
        assert_eq!(windows[2].window_id, 2);
    }

    #[test]
    fn bad_rows_are_skipped() {
        let rows = [
            "10.0.0.1,8.8.8.8,1000,53,17,1.0,5,5,100.0,10.0,60.0,0,DrDoS_DNS",
            "short,row",
            "10.0.0.2,8.8.8.8,1000,53,17,1.0,5,5,100.0,10.0,60.0,0,DrDoS_DNS",
        ];
        let windows = read_windows(sample_csv(&rows).as_bytes(), 500).expect("windows");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].flow_count(), 2);
        assert!(windows[0].flows.iter().all(|f| f.is_attack));
    }

    #[test]
    fn quoted_fields_and_garbage_numbers() {
        let rows = [r#""10.0.0.1","8.8.8.8",80,53,17,oops,5,5,Infinity,10.0,60.0,0,"BENIGN""#];
        let windows = read_windows(sample_csv(&rows).as_bytes(), 500).expect("windows");
        let flow = &windows[0].flows[0];
        assert_eq!(flow.src_addr, "10.0.0.1");
        assert_eq!(flow.duration, 0.0);
        assert!(flow.bytes_per_sec.is_infinite());
        assert_eq!(flow.label, "BENIGN");
    }
}
