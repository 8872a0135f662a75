//! ResourceArc Wrappers
//!
//! Persistent state for split sessions and output sessions held by the BEAM.

use crate::output::{MemorySink, OutputSession};
use crate::split::SplitSession;
use parking_lot::Mutex;
use rustler::ResourceArc;
use std::io::Cursor;

/// Split session over an input binary copied out of the BEAM
pub type BinarySplitSession = SplitSession<Cursor<Vec<u8>>>;

/// Wrapper for a SplitSession that can be stored in a ResourceArc
pub struct SplitResource {
    pub inner: Mutex<BinarySplitSession>,
}

impl SplitResource {
    pub fn new(session: BinarySplitSession) -> Self {
        SplitResource {
            inner: Mutex::new(session),
        }
    }
}

#[rustler::resource_impl]
impl rustler::Resource for SplitResource {}

pub type SplitRef = ResourceArc<SplitResource>;

/// Output session plus where its bytes go.
///
/// `path` selects a file sink; otherwise the document collects in `memory`
/// and is read back with `output_contents`.
pub struct OutputResource {
    pub session: OutputSession,
    pub path: Option<String>,
    pub memory: MemorySink,
}

impl OutputResource {
    pub fn new(session: OutputSession, path: Option<String>) -> Self {
        OutputResource {
            session,
            path,
            memory: MemorySink::new(),
        }
    }
}

#[rustler::resource_impl]
impl rustler::Resource for OutputResource {}

pub type OutputRef = ResourceArc<OutputResource>;
