//! XML Writing
//!
//! - Xml: the `StreamWriter` seam and its XML implementation
//! - Dispatch: token-kind dispatch table and stream draining

pub mod dispatch;
pub mod xml;

pub use dispatch::{write_token, EventDispatchWriter};
pub use xml::{StreamWriter, XmlWriter};
