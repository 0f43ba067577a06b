use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::loggable::{LogArguments, PayloadReader};

/// A process-wide singleton that knows how to turn one call site's encoded
/// argument bytes back into a rendered line body.
///
/// Formatters are interned: for each distinct (template, argument-type
/// tuple) pair exactly one `Formatter` exists, and its address is stable for
/// the process lifetime. The handle is stored in every message slot that
/// uses the template, so the drainer never inspects payload bytes without
/// the formatter that produced them.
///
/// # Identity
/// Two call sites observe the same handle iff their templates are byte-equal
/// and their argument type tuples carry the same tag sequence. `&str` and
/// `String` share a tag, so swapping one for the other at a call site does
/// not mint a new formatter.
pub struct Formatter {
    template: &'static str,
    splice: fn(&mut PayloadReader<'_>, &str, &mut String),
}

lazy_static! {
    /// Interning table from (template, type tags) to the leaked singleton.
    static ref FORMATTER_REGISTRY: Mutex<HashMap<(&'static str, &'static [u8]), &'static Formatter>> =
        Mutex::new(HashMap::new());
}

impl Formatter {
    /// Returns the singleton formatter for `template` rendered with the
    /// argument tuple `A`, creating it on first use. The returned reference
    /// stays valid for the entire process lifetime.
    pub fn intern<A: LogArguments>(template: &'static str) -> &'static Formatter {
        let mut registry = FORMATTER_REGISTRY.lock().unwrap();
        *registry.entry((template, A::TAGS)).or_insert_with(|| {
            Box::leak(Box::new(Formatter {
                template,
                splice: A::splice,
            }))
        })
    }

    /// `intern` with the tuple type inferred from a value, for use from the
    /// logging macro where the argument types cannot be named.
    pub fn intern_for<A: LogArguments>(template: &'static str, _args: &A) -> &'static Formatter {
        Self::intern::<A>(template)
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Decodes the argument stream in `reader` and splices each value into
    /// the template, appending the rendered body to `out`.
    pub fn format(&self, reader: &mut PayloadReader<'_>, out: &mut String) {
        (self.splice)(reader, self.template, out);
    }
}

/// Compile-time template check: braces may only appear as `{}` placeholder
/// pairs.
pub const fn validate_template(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if i + 1 >= bytes.len() || bytes[i + 1] != b'}' {
                    return false;
                }
                i += 2;
            }
            b'}' => return false,
            _ => i += 1,
        }
    }
    true
}

/// Number of `{}` placeholders in a template.
pub const fn placeholder_count(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'}' {
            count += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    count
}
