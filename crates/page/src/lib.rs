//! Styled page model the glass renderer captures and decorates.

pub mod color;
pub mod description;
pub mod error;
pub mod geometry;
pub mod gradient;
pub mod listeners;
pub mod stacking;
pub mod style;
pub mod stylesheet;
pub mod tree;
pub mod video;

pub use color::Rgba;
pub use description::PageDescription;
pub use error::PageError;
pub use geometry::{Rect, Viewport};
pub use gradient::{Gradient, LinearGradient};
pub use listeners::{EventKind, ListenerId, ListenerRegistry};
pub use stacking::effective_z;
pub use style::{FontSpec, Length, Style};
pub use stylesheet::{SheetOrigin, StyleSheet};
pub use tree::{DeviceProfile, Node, NodeId, Page};
pub use video::{FrameSource, VideoElement};
