//! DTD Internal Subset
//!
//! Collects general entity declarations from a DOCTYPE so references to
//! them can be expanded in text and attribute values. Parameter entities,
//! element, attribute-list and notation declarations are skipped.
//!
//! Replacement text is expanded once, when the DOCTYPE is read. Markup
//! inside a replacement is taken as character data.

use super::entities::decode_text;
use super::scanner::is_whitespace;
use memchr::{memchr, memmem};
use std::collections::{HashMap, HashSet};

/// Upper bound on the expanded size of a single entity
const MAX_EXPANSION: usize = 1 << 20;

/// General entities declared in a document's internal subset
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    /// name -> fully expanded replacement text
    internal: HashMap<Vec<u8>, Vec<u8>>,
    /// SYSTEM / PUBLIC entities, never expanded
    external: HashSet<Vec<u8>>,
}

#[derive(Debug, Clone)]
enum EntityDecl {
    Internal(Vec<u8>),
    External,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the entity declarations out of a raw `<!DOCTYPE ...>`
    pub fn from_doctype(doctype: &[u8]) -> Result<Self, String> {
        let Some(subset) = internal_subset(doctype) else {
            return Ok(Self::default());
        };
        let declared = collect_declarations(subset)?;

        let mut table = EntityTable::new();
        for (name, decl) in &declared {
            match decl {
                EntityDecl::Internal(raw) => {
                    let mut stack = vec![name.clone()];
                    let mut out = Vec::with_capacity(raw.len());
                    expand_value(raw, &declared, &mut stack, &mut out)?;
                    table.internal.insert(name.clone(), out);
                }
                EntityDecl::External => {
                    table.external.insert(name.clone());
                }
            }
        }
        Ok(table)
    }

    /// Expanded text of an internal entity
    pub fn replacement(&self, name: &[u8]) -> Option<&[u8]> {
        self.internal.get(name).map(Vec::as_slice)
    }

    pub fn is_external(&self, name: &[u8]) -> bool {
        self.external.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.internal.is_empty() && self.external.is_empty()
    }
}

/// Text between the first `[` outside a quoted literal and the last `]`
fn internal_subset(doctype: &[u8]) -> Option<&[u8]> {
    let mut quote = None;
    let mut open = None;
    for (i, &b) in doctype.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'[' => {
                open = Some(i);
                break;
            }
            None => {}
        }
    }
    let open = open?;
    let close = doctype.iter().rposition(|&b| b == b']')?;
    (close > open).then(|| &doctype[open + 1..close])
}

fn collect_declarations(subset: &[u8]) -> Result<HashMap<Vec<u8>, EntityDecl>, String> {
    let mut declared = HashMap::new();
    let mut pos = 0;
    while pos < subset.len() {
        let rest = &subset[pos..];
        if rest.starts_with(b"<!ENTITY") {
            let (consumed, entity) = parse_entity(&rest[8..])?;
            pos += 8 + consumed;
            if let Some((name, decl)) = entity {
                // First declaration wins
                declared.entry(name).or_insert(decl);
            }
        } else if rest.starts_with(b"<!--") {
            let end = memmem::find(&rest[4..], b"-->").ok_or("unterminated comment in DTD")?;
            pos += 4 + end + 3;
        } else if rest.starts_with(b"<?") {
            let end = memmem::find(&rest[2..], b"?>").ok_or("unterminated processing instruction in DTD")?;
            pos += 2 + end + 2;
        } else if rest.starts_with(b"<!") {
            pos += 2 + skip_declaration(&rest[2..]).ok_or("unterminated markup declaration in DTD")?;
        } else {
            pos += 1;
        }
    }
    Ok(declared)
}

/// Bytes up to and including the `>` that closes a declaration
fn skip_declaration(input: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in input.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
    }
    None
}

/// Parse the body of `<!ENTITY ...>`. Parameter entities are consumed but
/// not returned.
fn parse_entity(input: &[u8]) -> Result<(usize, Option<(Vec<u8>, EntityDecl)>), String> {
    let mut pos = skip_ws(input, 0);
    let is_parameter = input.get(pos) == Some(&b'%');
    if is_parameter {
        pos = skip_ws(input, pos + 1);
    }

    let name_start = pos;
    while pos < input.len() && !is_whitespace(input[pos]) && !matches!(input[pos], b'"' | b'\'' | b'>') {
        pos += 1;
    }
    if pos == name_start {
        return Err("entity declaration without a name".to_string());
    }
    let name = input[name_start..pos].to_vec();
    pos = skip_ws(input, pos);

    let decl = match input.get(pos) {
        Some(&quote @ (b'"' | b'\'')) => {
            let len = memchr(quote, &input[pos + 1..]).ok_or("unterminated entity value")?;
            let value = input[pos + 1..pos + 1 + len].to_vec();
            pos += len + 2;
            EntityDecl::Internal(value)
        }
        _ if input[pos..].starts_with(b"SYSTEM") || input[pos..].starts_with(b"PUBLIC") => EntityDecl::External,
        _ => {
            return Err(format!(
                "malformed declaration of entity '{}'",
                String::from_utf8_lossy(&name)
            ))
        }
    };

    let consumed = pos + skip_declaration(&input[pos..]).ok_or("unterminated entity declaration")?;
    let entity = (!is_parameter).then_some((name, decl));
    Ok((consumed, entity))
}

fn skip_ws(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && is_whitespace(input[pos]) {
        pos += 1;
    }
    pos
}

/// Expand references inside an entity value. `stack` holds the entities
/// being expanded, for recursion detection.
fn expand_value(
    raw: &[u8],
    declared: &HashMap<Vec<u8>, EntityDecl>,
    stack: &mut Vec<Vec<u8>>,
    out: &mut Vec<u8>,
) -> Result<(), String> {
    let mut pos = 0;
    while let Some(offset) = memchr(b'&', &raw[pos..]) {
        let amp = pos + offset;
        out.extend_from_slice(&raw[pos..amp]);
        let Some(semi) = memchr(b';', &raw[amp..]).map(|i| amp + i) else {
            out.extend_from_slice(&raw[amp..]);
            return Ok(());
        };
        let name = &raw[amp + 1..semi];

        match declared.get(name) {
            Some(EntityDecl::Internal(inner)) if !name.starts_with(b"#") => {
                if stack.iter().any(|open| open.as_slice() == name) {
                    return Err(format!(
                        "entity '{}' references itself",
                        String::from_utf8_lossy(name)
                    ));
                }
                stack.push(name.to_vec());
                expand_value(inner, declared, stack, out)?;
                stack.pop();
            }
            // Character references, predefined entities, and anything
            // left as written
            _ => out.extend_from_slice(&decode_text(&raw[amp..=semi])),
        }
        if out.len() > MAX_EXPANSION {
            return Err("entity expansion too large".to_string());
        }
        pos = semi + 1;
    }
    out.extend_from_slice(&raw[pos..]);
    Ok(())
}
