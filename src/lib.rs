//! RustyStax - Streaming XML splitting and incremental document writing
//!
//! Two primitives over a forward-only token stream:
//! Split: one large document into a lazy sequence of documents, one per
//!        occurrence of the last element named in a path (`split`)
//! Output: one document written over many calls by several callers,
//!         serialized by a fair lock (`output`)
//!
//! The Elixir NIF surface is defined at the bottom of this file.

use rustler::{Binary, Encoder, Env, NifResult, ResourceArc, Term};
use std::io::Cursor;

pub mod core;
pub mod error;
pub mod output;
pub mod pipe;
pub mod reader;
mod resource;
pub mod split;
mod term;
pub mod writer;

pub use error::{Error, Result};
pub use output::{OutputOptions, OutputSession};
pub use reader::{EventStream, StreamOptions, XmlToken};
pub use split::{SplitOptions, SplitSession};

use output::FileSink;
use resource::{OutputRef, OutputResource, SplitRef, SplitResource};
use term::{bytes_to_binary, error_to_term, ok_binary, OutputConfig, SplitConfig};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
                while current > peak {
                    match PEAK_ALLOCATED.compare_exchange_weak(
                        peak,
                        current,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(p) => peak = p,
                    }
                }
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Memory Tracking NIFs
// ============================================================================

#[cfg(feature = "memory_tracking")]
use std::sync::atomic::Ordering;

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory() -> usize {
    tracking::ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    tracking::PEAK_ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    let current = tracking::ALLOCATED.load(Ordering::SeqCst);
    let peak = tracking::PEAK_ALLOCATED.swap(current, Ordering::SeqCst);
    (current, peak)
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    (0, 0)
}

// ============================================================================
// Split Sessions
// ============================================================================

/// Open a split session over `input`. Resolves the path before returning.
#[rustler::nif(schedule = "DirtyCpu")]
fn split_new<'a>(env: Env<'a>, input: Binary<'a>, config: SplitConfig) -> NifResult<Term<'a>> {
    let reader = Cursor::new(input.as_slice().to_vec());
    match SplitSession::new(reader, config.into()) {
        Ok(session) => {
            let arc = ResourceArc::new(SplitResource::new(session));
            Ok((term::ok(), arc).encode(env))
        }
        Err(e) => error_to_term(env, &e),
    }
}

/// Next split document as `{:ok, binary}`, or `:done`
#[rustler::nif(schedule = "DirtyCpu")]
fn split_next<'a>(env: Env<'a>, split: SplitRef) -> NifResult<Term<'a>> {
    let mut session = split.inner.lock();
    match session.has_next() {
        Ok(true) => match session.next_document() {
            Some(doc) => Ok(ok_binary(env, &doc.bytes)),
            None => Ok(term::done().encode(env)),
        },
        Ok(false) => Ok(term::done().encode(env)),
        Err(e) => {
            session.close();
            error_to_term(env, &e)
        }
    }
}

#[rustler::nif]
fn split_close(split: SplitRef) -> rustler::Atom {
    split.inner.lock().close();
    term::ok()
}

/// Local name of the first element, or nil
#[rustler::nif(schedule = "DirtyCpu")]
fn root_element_name<'a>(env: Env<'a>, input: Binary<'a>) -> NifResult<Term<'a>> {
    match split::root_element_name(input.as_slice()) {
        Ok(Some(name)) => Ok((term::ok(), name).encode(env)),
        Ok(None) => Ok((term::ok(), rustler::types::atom::nil()).encode(env)),
        Err(e) => error_to_term(env, &e),
    }
}

// ============================================================================
// Output Sessions
// ============================================================================

#[rustler::nif]
fn output_new<'a>(env: Env<'a>, config: OutputConfig) -> NifResult<Term<'a>> {
    match OutputSession::new(config.options()) {
        Ok(session) => {
            let arc = ResourceArc::new(OutputResource::new(session, config.path));
            Ok((term::ok(), arc).encode(env))
        }
        Err(e) => error_to_term(env, &e),
    }
}

fn unit_result<'a>(env: Env<'a>, result: Result<()>) -> NifResult<Term<'a>> {
    match result {
        Ok(()) => Ok(term::ok().encode(env)),
        Err(e) => error_to_term(env, &e),
    }
}

#[rustler::nif(schedule = "DirtyIo")]
fn output_start<'a>(env: Env<'a>, output: OutputRef) -> NifResult<Term<'a>> {
    let result = match &output.path {
        Some(path) => output.session.start(FileSink::new(path)),
        None => output.session.start(output.memory.clone()),
    };
    unit_result(env, result)
}

/// Append the content of the document in `fragment` inside the root
#[rustler::nif(schedule = "DirtyIo")]
fn output_write_fragment<'a>(env: Env<'a>, output: OutputRef, fragment: Binary<'a>) -> NifResult<Term<'a>> {
    match output.session.write_fragment(fragment.as_slice()) {
        Ok(written) => Ok((term::ok(), written).encode(env)),
        Err(e) => error_to_term(env, &e),
    }
}

#[rustler::nif(schedule = "DirtyIo")]
fn output_finish<'a>(env: Env<'a>, output: OutputRef) -> NifResult<Term<'a>> {
    unit_result(env, output.session.finish())
}

#[rustler::nif(schedule = "DirtyIo")]
fn output_close(output: OutputRef) -> rustler::Atom {
    output.session.close();
    term::ok()
}

/// Bytes written so far to an in-memory output
#[rustler::nif]
fn output_contents<'a>(env: Env<'a>, output: OutputRef) -> Term<'a> {
    bytes_to_binary(env, &output.memory.contents())
}

// ============================================================================
// Format Conversion
// ============================================================================

/// Re-encode a document into the encoding named by `encoding`
#[rustler::nif(schedule = "DirtyCpu")]
fn reserialize<'a>(env: Env<'a>, input: Binary<'a>, encoding: &str) -> NifResult<Term<'a>> {
    match pipe::reserialize(input.as_slice(), encoding) {
        Ok(bytes) => Ok(ok_binary(env, &bytes)),
        Err(e) => error_to_term(env, &e),
    }
}

// ============================================================================
// NIF Initialization
// ============================================================================

rustler::init!("Elixir.RustyStax.Native");
