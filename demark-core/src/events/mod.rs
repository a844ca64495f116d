use std::path::PathBuf;
use std::sync::Arc;

pub mod json_handler;

/// Telemetry events emitted by the pipeline.
///
/// Five wire kinds exist: `info`, `progress`, `download_progress`, `error`
/// and `complete`. The two startup records share the `info` kind.
#[derive(Debug, Clone)]
pub enum Event {
    /// Execution plan chosen at startup: device, numeric precision, batch size.
    EngineStarted {
        device: String,
        precision: String,
        batch_size: usize,
    },

    /// Source stream description, emitted once after the input is probed.
    SourceOpened {
        total_frames: u64,
        fps: f64,
        resolution: String,
        algorithm: String,
    },

    /// Bounded-cadence progress update.
    Progress {
        current_frame: u64,
        total_frames: u64,
        /// Percentage in 0..=100, monotonically non-decreasing within a run.
        progress: u32,
        /// Throughput in frames per second since the run started.
        fps_speed: f64,
    },

    /// Checkpoint download progress, forwarded from the model provider.
    DownloadProgress {
        algorithm: String,
        progress: u32,
        downloaded_mb: f64,
        total_mb: f64,
    },

    /// Fatal condition; emitted immediately before abnormal exit.
    Error { message: String },

    /// Run finished; carries the final output path. Emitted exactly once.
    Complete { output: PathBuf },
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn emit(&self, event: Event) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
