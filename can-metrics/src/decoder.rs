//! Session decoding
//!
//! Drives the frame decoder across one recording. [`SessionDecoder`] is a
//! lazy, single-pass iterator: it pulls one frame at a time from its source,
//! so a recording can be streamed without materializing it, and a caller can
//! cancel between frames simply by dropping the iterator.

use crate::config::PipelineConfig;
use crate::message_decoder::MessageDecoder;
use crate::signals::DbcModel;
use crate::types::{DecodedSample, MetricsError, RawFrame, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Per-session warning counters
///
/// Per-frame problems never abort a session; they are tallied here instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Items pulled from the frame source
    pub frames_seen: usize,
    /// Frames that matched a message and decoded
    pub frames_decoded: usize,
    /// Frames whose ID is not in the model
    pub unknown_frames: usize,
    /// Frames shorter than their message's declared length
    pub short_frames: usize,
    /// Frames excluded by the message filter
    pub filtered_frames: usize,
    /// Items the frame source could not parse
    pub source_errors: usize,
    /// Samples dropped because their physical value was not finite
    pub rejected_samples: usize,
}

impl SessionStats {
    /// Total per-frame warnings
    pub fn warnings(&self) -> usize {
        self.unknown_frames + self.short_frames + self.source_errors + self.rejected_samples
    }
}

/// One point of a signal's time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Seconds since recording start
    pub timestamp: f64,
    pub value: f64,
}

/// All samples of one signal, in frame-arrival order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSeries {
    pub unit: String,
    pub samples: Vec<SamplePoint>,
}

impl SignalSeries {
    pub fn latest(&self) -> Option<&SamplePoint> {
        self.samples.last()
    }
}

/// A fully consumed session, grouped per signal
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSamples {
    /// Only signals with at least one sample appear
    pub signals: BTreeMap<String, SignalSeries>,
    pub stats: SessionStats,
}

impl SessionSamples {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn signal(&self, name: &str) -> Option<&SignalSeries> {
        self.signals.get(name)
    }

    /// Append one sample to its signal's series
    pub fn push(&mut self, sample: DecodedSample) {
        let series = self
            .signals
            .entry(sample.name)
            .or_insert_with(|| SignalSeries {
                unit: sample.unit,
                samples: Vec::new(),
            });
        series.samples.push(SamplePoint {
            timestamp: sample.timestamp,
            value: sample.value,
        });
    }
}

impl FromIterator<DecodedSample> for SessionSamples {
    fn from_iter<T: IntoIterator<Item = DecodedSample>>(iter: T) -> Self {
        let mut session = SessionSamples::default();
        for sample in iter {
            session.push(sample);
        }
        session
    }
}

/// Decode a sequence of frames that cannot fail at the source
pub fn decode_session<'a, F>(
    model: &'a DbcModel,
    frames: F,
) -> SessionDecoder<'a, impl Iterator<Item = Result<RawFrame>>>
where
    F: IntoIterator<Item = RawFrame>,
{
    SessionDecoder::new(model, frames.into_iter().map(Ok))
}

/// Iterator that decodes CAN frames into samples
///
/// Each pulled frame is looked up, decoded and its samples queued; the queue
/// drains in signal declaration order before the next frame is pulled.
pub struct SessionDecoder<'a, I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    frames: I,
    model: &'a DbcModel,
    config: PipelineConfig,
    pending: VecDeque<DecodedSample>,
    stats: SessionStats,
}

impl<'a, I> SessionDecoder<'a, I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    pub fn new(model: &'a DbcModel, frames: I) -> Self {
        Self {
            frames,
            model,
            config: PipelineConfig::default(),
            pending: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    /// Apply message filter and frame cap from a pipeline configuration
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Consume the whole session and group samples per signal
    pub fn collect_series(mut self) -> SessionSamples {
        let mut session = SessionSamples::default();
        for sample in self.by_ref() {
            session.push(sample);
        }
        session.stats = self.stats;

        log::info!(
            "Session decoded: {} signals from {} frames ({} warnings)",
            session.len(),
            session.stats.frames_seen,
            session.stats.warnings()
        );
        session
    }

    /// Process a single CAN frame and queue its samples
    fn process_frame(&mut self, frame: RawFrame) {
        let can_id = frame.arbitration_id;

        if !self.config.should_process_message(can_id) {
            self.stats.filtered_frames += 1;
            return;
        }

        match MessageDecoder::decode_frame(self.model, &frame) {
            Ok(decoded) => {
                self.stats.frames_decoded += 1;
                self.stats.rejected_samples += decoded.rejected;
                self.pending.extend(decoded.samples);
            }
            Err(MetricsError::UnknownMessage(_)) => {
                self.stats.unknown_frames += 1;
            }
            Err(MetricsError::FrameTooShort { .. }) => {
                self.stats.short_frames += 1;
            }
            Err(e) => {
                log::warn!("Failed to decode message 0x{:X}: {}", can_id, e);
                self.stats.source_errors += 1;
            }
        }
    }
}

impl<'a, I> Iterator for SessionDecoder<'a, I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    type Item = DecodedSample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sample) = self.pending.pop_front() {
                return Some(sample);
            }

            if let Some(max) = self.config.max_frames {
                if self.stats.frames_seen >= max {
                    return None;
                }
            }

            let item = self.frames.next()?;
            self.stats.frames_seen += 1;
            match item {
                Ok(frame) => self.process_frame(frame),
                Err(e) => {
                    log::warn!("Skipping unreadable frame: {}", e);
                    self.stats.source_errors += 1;
                }
            }
        }
    }
}
