//! Slidecast Render Engine
//!
//! Turns a validated encode request into a published video using one of
//! three interchangeable backends.
//!
//! # Pipeline Architecture
//!
//! ```text
//! EncodingRequest ── validate ── AssetResolver (concurrent fetch)
//!                                      │
//!                                      ▼
//!                               RequestWorkspace ── TimelineBuilder
//!                                                        │
//!                  ┌─────────────────────┬───────────────┴──────────┐
//!                  ▼                     ▼                          ▼
//!         CommandLineEncoder    FrameCaptureEncoder       RemoteRenderBackend
//!         (ffmpeg filter graph) (synth → rawvideo pipe)   (job spec → Supervisor)
//!                  └─────────────────────┴──────────────────────────┘
//!                                        │
//!                                        ▼
//!                                    Publisher ── EncodingResult
//! ```

pub mod backend;
pub mod command_line;
pub mod frame_capture;
pub mod pipeline;
pub mod process;
pub mod publisher;
pub mod remote;
pub mod supervisor;

pub use backend::{
    CancelHandle, CancelSignal, EncodeContext, EncodedArtifact, EncodingBackend, ProgressEvent,
    ProgressPhase, ProgressReporter,
};
pub use command_line::CommandLineEncoder;
pub use frame_capture::{FrameCaptureEncoder, FrameSink, SinkFactory, SinkSpec};
pub use pipeline::{backend_from_config, Pipeline};
pub use publisher::{HttpObjectStore, LocalObjectStore, ObjectStore, Publisher};
pub use remote::{HttpRenderApi, RemoteRenderBackend, RenderApi, RenderJobSpec};
pub use supervisor::{RenderJobSupervisor, SupervisorConfig};
