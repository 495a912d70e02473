//! Service access points between L1 and its collaborators
//!
//! L1 never owns the radio or the data-link layer; both appear only through
//! the traits defined here. Primitives carry unpacked bits so that the FEC
//! pipelines can work on them directly.

pub mod gsmtap;
pub mod l2frame;
pub mod radio;
pub mod upstream;

pub use gsmtap::{PacketTap, TapRecord, TapTag};
pub use l2frame::{L2Frame, Primitive};
pub use radio::{BurstSink, RadioDownstream};
pub use upstream::L2Upstream;
