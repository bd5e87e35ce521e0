//! Acquisition thread plus consumer loop.
//!
//! The producer pulls frames from a [`FrameSource`] and publishes them into a
//! [`FrameSlot`]. The consumer polls the slot, runs each frame through the
//! [`FramePipeline`] and hands the result to every registered sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};

use super::handoff::{FinishOnDrop, FrameSlot, HandoffStats, Poll};
use super::sink::{FrameReport, MeasurementSink};
use super::FramePipeline;
use crate::config::{PipelineConfig, ReplayPacing};
use crate::core::loaders::FrameSource;

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_committed: u64,
    pub measurements: u64,
    pub handoff: HandoffStats,
    pub sink_errors: u64,
    /// Set when the run ended because the stop flag was cleared.
    pub interrupted: bool,
    /// Message of the source error that ended acquisition, if any.
    pub source_error: Option<String>,
}

/// Drives a [`FramePipeline`] from a frame source on a separate thread.
pub struct Runner {
    pipeline: FramePipeline,
    sinks: Vec<Box<dyn MeasurementSink>>,
    poll_interval: Duration,
    pacing: ReplayPacing,
}

impl Runner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            pipeline: FramePipeline::new(config),
            sinks: Vec::new(),
            poll_interval: Duration::from_millis(config.runtime.poll_interval_ms),
            pacing: config.runtime.pacing,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn MeasurementSink>) {
        self.sinks.push(sink);
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut FramePipeline {
        &mut self.pipeline
    }

    /// Run until the source is exhausted or `running` is cleared.
    ///
    /// A frame already taken from the slot is always processed to completion.
    /// Sink failures are logged and counted; they never stop the run.
    pub fn run(&mut self, source: Box<dyn FrameSource>, running: Arc<AtomicBool>) -> Result<RunSummary> {
        let slot = FrameSlot::new();
        let producer = spawn_producer(
            source,
            slot.clone(),
            running.clone(),
            self.pacing,
            self.poll_interval,
        )?;

        let mut summary = RunSummary::default();

        // A cleared flag stops the producer, which marks the slot finished;
        // the consumer drains what is left and exits on `Finished`.
        loop {
            let frame = match slot.try_take() {
                Poll::Ready(frame) => frame,
                Poll::Empty | Poll::Contended => {
                    thread::sleep(self.poll_interval);
                    continue;
                }
                Poll::Finished => break,
            };

            let stats = self.pipeline.process(&frame);
            summary.frames_processed += 1;
            summary.measurements += stats.measurements as u64;
            if stats.committed {
                summary.frames_committed += 1;
            }

            let report = FrameReport {
                stats: &stats,
                table: self.pipeline.table(),
                objects: self.pipeline.objects(),
            };
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.consume(&report) {
                    summary.sink_errors += 1;
                    warn!("frame {}: sink failed: {}", stats.frame_index, e);
                }
            }
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.finish() {
                summary.sink_errors += 1;
                warn!("failed to finish sink: {}", e);
            }
        }

        summary.interrupted = !running.load(Ordering::SeqCst);
        if summary.interrupted {
            info!("run stopped on request");
        }
        summary.source_error = producer
            .join()
            .map_err(|_| anyhow!("acquisition thread panicked"))?;
        summary.handoff = slot.stats();

        if summary.handoff.overwritten > 0 {
            info!(
                "{} of {} frames were overwritten before processing",
                summary.handoff.overwritten, summary.handoff.published
            );
        }

        Ok(summary)
    }
}

/// Start the acquisition thread.
///
/// The thread returns the message of the source error that stopped it, if any.
pub fn spawn_producer(
    mut source: Box<dyn FrameSource>,
    slot: FrameSlot,
    running: Arc<AtomicBool>,
    pacing: ReplayPacing,
    poll_interval: Duration,
) -> Result<JoinHandle<Option<String>>> {
    thread::Builder::new()
        .name("acquisition".into())
        .spawn(move || {
            let _finish = FinishOnDrop(slot.clone());

            while running.load(Ordering::SeqCst) {
                if pacing == ReplayPacing::Lossless {
                    while !slot.is_vacant() {
                        if !running.load(Ordering::SeqCst) {
                            return None;
                        }
                        thread::sleep(poll_interval);
                    }
                }

                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let period = frame.rotation_period;
                        if slot.publish(frame) {
                            debug!("overwrote a frame the consumer had not taken");
                        }
                        if pacing == ReplayPacing::Realtime {
                            thread::sleep(period);
                        }
                    }
                    Ok(None) => {
                        debug!("frame source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!("frame source failed: {}", e);
                        return Some(e.to_string());
                    }
                }
            }
            None
        })
        .context("failed to spawn acquisition thread")
}
