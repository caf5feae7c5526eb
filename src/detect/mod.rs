mod backend;
pub mod backends;
mod registry;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::{ReplayBackend, StubBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, PixelRect};
