//! Minimal method-descriptor helpers.
//!
//! Descriptors use the conventional compact syntax: `(` parameter types `)` return
//! type, with `I`/`J`/`Z`/`V` primitives, `Lname;` class types and `[` array
//! prefixes. The model never interprets types beyond counting parameter slots and
//! distinguishing `V` returns, which is all the desugarer and simulator need.

/// Returns the number of parameter slots a descriptor declares.
///
/// Each parameter occupies one slot regardless of its type (the logical model has
/// no wide slots). Malformed descriptors count the parameters that could be parsed.
#[must_use]
pub fn param_count(descriptor: &str) -> u32 {
    let Some(inner) = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')').map(|(params, _)| params))
    else {
        return 0;
    };

    let mut count = 0;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            // Array prefixes attach to the following type
            '[' => continue,
            'L' => {
                // Class type runs to the next ';'
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                count += 1;
            }
            _ => count += 1,
        }
    }
    count
}

/// Returns `true` if the descriptor declares a non-`void` return type.
#[must_use]
pub fn returns_value(descriptor: &str) -> bool {
    match descriptor.split_once(')') {
        Some((_, ret)) => ret != "V",
        None => false,
    }
}

/// Prepends a receiver parameter of the given class to a descriptor.
///
/// Used when an instance method is turned into a static companion method: the
/// receiver becomes an explicit leading parameter.
#[must_use]
pub fn prepend_receiver(descriptor: &str, class: &str) -> String {
    match descriptor.strip_prefix('(') {
        Some(rest) => format!("(L{class};{rest}"),
        None => descriptor.to_string(),
    }
}
