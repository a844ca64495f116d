//! Core library for removing fixed watermark regions from video.
//!
//! This crate provides mask construction, a batched and overlapped
//! decode/restore/composite/encode pipeline, checkpoint acquisition for the
//! learned restoration algorithms, and the hardware encoder probe and audio
//! remux post-pass.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use demark_core::{process_video, CoreConfig, EventDispatcher, JsonEventHandler, Region};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let mut config = CoreConfig::new(
//!     PathBuf::from("/path/to/input.mp4"),
//!     PathBuf::from("/path/to/output.mp4"),
//! );
//! config.regions = vec![Region { x: 16, y: 16, width: 200, height: 64 }];
//! config.validate().unwrap();
//!
//! let mut events = EventDispatcher::new();
//! events.add_handler(Arc::new(JsonEventHandler::new()));
//!
//! let final_path = process_video(&config, &events).unwrap();
//! println!("wrote {}", final_path.display());
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod frame;
pub mod hardware;
pub mod mask;
pub mod models;
pub mod processing;
pub mod progress;
pub mod remux;
pub mod restore;
pub mod temp_files;

// Re-exports for public API
pub use config::{CoreConfig, Quality};
pub use error::{CoreError, CoreResult};
pub use events::json_handler::JsonEventHandler;
pub use events::{Event, EventDispatcher, EventHandler};
pub use frame::{Frame, FrameTensor, Precision};
pub use hardware::Device;
pub use mask::{Mask, Region};
pub use models::{ModelProvider, ModelRegistry};
pub use processing::process_video;
pub use restore::{Algorithm, Restorer};
