//! Core XML parsing primitives
//!
//! This module contains the fundamental building blocks for XML parsing:
//! - Scanner: SIMD-accelerated delimiter detection using memchr
//! - Tokenizer: Incremental state machine for XML token extraction
//! - Entities: XML entity decoding with Cow (zero-copy when possible), output escaping
//! - Attributes: Attribute parsing and extraction
//! - Dtd: General entities declared in the internal subset
//! - Encoding: Input detection and decoding to UTF-8, output encoders

pub mod attributes;
pub mod dtd;
pub mod encoding;
pub mod entities;
pub mod scanner;
pub mod tokenizer;
