#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Result};
use parking_lot::Mutex;

use telesink::metric::Metric;
use telesink::output::Output;

/// What a [`RecordingOutput`] saw, in call order.
#[derive(Debug, Clone)]
pub enum Event {
    Connect,
    Write(Vec<Metric>),
    Close,
}

/// Shared view into a [`RecordingOutput`] that outlives the output itself.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    in_flight: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Every batch handed to `write`, failed ones included.
    pub fn batches(&self) -> Vec<Vec<Metric>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Write(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn write_calls(&self) -> usize {
        self.batches().len()
    }

    /// True if a write started while another one was still running.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

/// Mock sink that records every call and can be told to fail writes.
pub struct RecordingOutput {
    recorder: Recorder,
    fail_writes: bool,
    write_delay: Duration,
}

impl RecordingOutput {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        (
            Self {
                recorder: recorder.clone(),
                fail_writes: false,
                write_delay: Duration::ZERO,
            },
            recorder,
        )
    }

    pub fn failing() -> (Self, Recorder) {
        let (mut out, recorder) = Self::new();
        out.fail_writes = true;
        (out, recorder)
    }

    /// Makes each write yield to the runtime for `delay` before returning.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

impl Output for RecordingOutput {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&mut self) -> Result<()> {
        self.recorder.events.lock().push(Event::Connect);
        Ok(())
    }

    async fn write(&mut self, metrics: &mut [Metric]) -> Result<()> {
        if self.recorder.in_flight.swap(true, Ordering::SeqCst) {
            self.recorder.overlapped.store(true, Ordering::SeqCst);
        }

        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.recorder
            .events
            .lock()
            .push(Event::Write(metrics.to_vec()));

        self.recorder.in_flight.store(false, Ordering::SeqCst);

        if self.fail_writes {
            bail!("sink unavailable");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.recorder.events.lock().push(Event::Close);
        Ok(())
    }
}

pub fn gauge(name: &str, host: &str, value: f64) -> Metric {
    Metric::new(name, [("host", host)], [("value", value)], SystemTime::now())
}

/// Unique scratch path under the system temp dir.
pub fn temp_path(test: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "telesink-it-{}-{test}.ndjson",
        std::process::id()
    ))
}
