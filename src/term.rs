//! Elixir Term Conversion Utilities
//!
//! Result tuples and configuration maps exchanged with the BEAM.

use crate::error::Error;
use crate::output::OutputOptions;
use crate::split::SplitOptions;
use rustler::{Atom, Encoder, Env, NewBinary, NifResult, Term};

// Pre-defined atoms for efficiency - created once at compile time
rustler::atoms! {
    ok,
    error,
    done,
}

/// Split configuration as passed from Elixir
#[derive(rustler::NifMap)]
pub struct SplitConfig {
    pub path: String,
    pub suppress_path_not_found: bool,
    pub preserve_whitespace: bool,
    pub encoding: Option<String>,
    pub buffer_size: Option<usize>,
    pub namespaces: Vec<(String, String)>,
    pub indent: Option<usize>,
}

impl From<SplitConfig> for SplitOptions {
    fn from(config: SplitConfig) -> Self {
        let mut options = SplitOptions::new(config.path)
            .with_suppress_path_not_found(config.suppress_path_not_found)
            .with_preserve_whitespace(config.preserve_whitespace)
            .with_indent(config.indent);
        if let Some(encoding) = config.encoding {
            options = options.with_encoding(encoding);
        }
        if let Some(size) = config.buffer_size {
            options = options.with_buffer_size(size);
        }
        for (prefix, uri) in config.namespaces {
            options = options.with_namespace(prefix, uri);
        }
        options
    }
}

/// Output configuration as passed from Elixir. `nil` fields keep defaults.
#[derive(rustler::NifMap)]
pub struct OutputConfig {
    pub encoding: Option<String>,
    pub root_element: Option<String>,
    pub prefix: Option<String>,
    pub namespace_uri: Option<String>,
    pub path: Option<String>,
}

impl OutputConfig {
    pub fn options(&self) -> OutputOptions {
        let mut options = OutputOptions::default();
        if let Some(encoding) = &self.encoding {
            options = options.with_encoding(encoding.as_str());
        }
        if let Some(root) = &self.root_element {
            options = options.with_root_element(root.as_str());
        }
        if let Some(prefix) = &self.prefix {
            options = options.with_prefix(prefix.as_str());
        }
        if let Some(uri) = &self.namespace_uri {
            options = options.with_namespace_uri(uri.as_str());
        }
        options
    }
}

/// `{:error, {kind, message}}`
pub fn error_to_term<'a>(env: Env<'a>, err: &Error) -> NifResult<Term<'a>> {
    let kind = Atom::from_str(env, err.kind_name())?;
    Ok((error(), (kind, err.to_string())).encode(env))
}

/// `{:ok, binary}`
pub fn ok_binary<'a>(env: Env<'a>, bytes: &[u8]) -> Term<'a> {
    (ok(), bytes_to_binary(env, bytes)).encode(env)
}

/// Create an Elixir binary from bytes
#[inline]
pub fn bytes_to_binary<'a>(env: Env<'a>, bytes: &[u8]) -> Term<'a> {
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}
