//! Slidecast Timeline Model
//!
//! Defines the data contracts of the encoding pipeline:
//! - **Request:** The validated JSON encode request and its limits
//! - **Geometry:** Canvas rectangles and the aspect-fit placement shared by all backends
//! - **Effects:** Canonical per-clip pan/zoom/fade/slide transforms
//! - **Timeline:** The immutable clip/overlay/audio composition of one video
//! - **Job:** Remote render job state machine
//! - **Result:** Encoding results and the API response envelope
//!
//! Times are in seconds; effect progress is normalized to `[0.0, 1.0]`.

pub mod effect;
pub mod geometry;
pub mod job;
pub mod overlay;
pub mod request;
pub mod result;
pub mod timeline;

pub use effect::*;
pub use geometry::*;
pub use job::*;
pub use overlay::*;
pub use request::*;
pub use result::*;
pub use timeline::*;
