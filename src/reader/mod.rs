//! XML Reader Module
//!
//! - Buffered: growable byte window over any `Read`
//! - Events: owned XML token types
//! - Stream: `EventStream`, the forward-only token source

pub mod buffered;
pub mod events;
pub mod stream;

pub use events::{Attribute, Characters, EndElement, Namespace, QName, StartElement, TokenKind, XmlToken};
pub use stream::{EventStream, StreamOptions};
