//! Path-addressed XML Splitting
//!
//! - Path: split paths, flat path matching, root element lookup
//! - Subtree: rebuilding and serializing the element at a split point
//! - Session: the lazy single-use split sequence

pub mod path;
pub mod session;
pub mod subtree;

pub use path::{next_matching, resolve, root_element_name, PathSpec};
pub use session::{IterationState, SplitDocument, SplitIter, SplitOptions, SplitSession};
pub use subtree::{reconstruct, serialize_document, SubtreeNode, SubtreeSerializer};
