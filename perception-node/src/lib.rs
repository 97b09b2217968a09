//! Camera stream ingestion and detection scheduling.
//!
//! Each configured camera gets a [`CameraPipeline`]: a capture thread that
//! decodes frames into a bounded buffer and a detection thread that samples
//! it at a fixed cadence, runs the injected detectors and emits
//! [`camwatch_common::DetectionEvent`]s. [`PipelineRegistry`] owns the
//! pipelines for a node.

pub mod camera;
pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod pipeline;

pub use camera::{CameraTransport, Frame, FrameSource, RoutingTransport, SharedFrame, StreamRelease};
pub use config::{DetectionSettings, PipelineSettings, SamplingPolicy};
pub use detection::{DetectorFactory, DetectorOutputs, DetectorSet};
pub use error::{PerceptionError, Result};
pub use events::{DiscardSink, EventSink};
pub use pipeline::{CameraPipeline, PipelineDeps, PipelineRegistry, PipelineState, StatsSnapshot};
