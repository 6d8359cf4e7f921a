//! candump log parser
//!
//! Reads SocketCAN `candump -l` text logs, one frame per line:
//!
//! ```text
//! (1436509052.249713) can0 123#DEADBEEF
//! (1436509052.250110) can0 18FF0010#0102030405060708
//! (1436509052.251002) can1 456##1112233445566778899AABB
//! ```
//!
//! Timestamps are rebased so the first frame is at 0.0 seconds. Remote
//! frames and blank lines are skipped; malformed lines surface as errors
//! without ending the iteration.

use crate::types::{MetricsError, RawFrame, Result, Timestamp};
use chrono::DateTime;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// candump log parser
pub struct CandumpParser;

impl CandumpParser {
    /// Open a candump log file and iterate its frames lazily
    pub fn parse(path: &Path) -> Result<CandumpFrameIterator<BufReader<File>>> {
        log::info!("Parsing candump log: {:?}", path);

        let file = File::open(path).map_err(|e| {
            MetricsError::Source(format!("Failed to open candump log {:?}: {}", path, e))
        })?;

        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> CandumpFrameIterator<R> {
        CandumpFrameIterator {
            lines: reader.lines(),
            line_no: 0,
            origin: None,
        }
    }
}

/// Iterator over CAN frames from a candump log
pub struct CandumpFrameIterator<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    /// Absolute timestamp of the first frame, in epoch seconds
    origin: Option<f64>,
}

impl<R: BufRead> CandumpFrameIterator<R> {
    /// Wall-clock time of the first frame, once it has been read
    pub fn started_at(&self) -> Option<Timestamp> {
        let origin = self.origin?;
        let secs = origin.floor();
        let nanos = ((origin - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }
}

impl<R: BufRead> Iterator for CandumpFrameIterator<R> {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(MetricsError::Source(format!("Read failed: {}", e)))),
            };
            self.line_no += 1;

            match parse_line(&line) {
                Ok(Some((absolute, arbitration_id, data))) => {
                    let origin = *self.origin.get_or_insert(absolute);
                    return Some(Ok(RawFrame::new(arbitration_id, data, absolute - origin)));
                }
                Ok(None) => continue,
                Err(reason) => {
                    return Some(Err(MetricsError::Source(format!(
                        "candump line {}: {}",
                        self.line_no, reason
                    ))))
                }
            }
        }
    }
}

/// Parse one log line into (epoch seconds, ID, payload); `None` for skipped lines
fn parse_line(line: &str) -> std::result::Result<Option<(f64, u32, Vec<u8>)>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let stamp = fields.next().ok_or("missing timestamp")?;
    let _interface = fields.next().ok_or("missing interface")?;
    let frame = fields.next().ok_or("missing frame")?;

    let timestamp: f64 = stamp
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("malformed timestamp '{}'", stamp))?
        .parse()
        .map_err(|_| format!("malformed timestamp '{}'", stamp))?;

    let (id_text, rest) = frame
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in frame '{}'", frame))?;

    let raw_id =
        u32::from_str_radix(id_text, 16).map_err(|_| format!("malformed CAN ID '{}'", id_text))?;
    let arbitration_id = if id_text.len() > 3 {
        raw_id & EXTENDED_ID_MASK
    } else {
        raw_id
    };

    let payload = if let Some(fd) = rest.strip_prefix('#') {
        // CAN FD: one flags nibble precedes the data
        fd.get(1..).ok_or_else(|| format!("missing FD flags in '{}'", frame))?
    } else if rest.starts_with('R') || rest.starts_with('r') {
        return Ok(None);
    } else {
        rest
    };

    Ok(Some((timestamp, arbitration_id, parse_hex_payload(payload)?)))
}

fn parse_hex_payload(text: &str) -> std::result::Result<Vec<u8>, String> {
    let digits: Vec<u8> = text.bytes().filter(|&b| b != b'.').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", text));
    }

    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| format!("malformed payload '{}'", text))
        })
        .collect()
}
