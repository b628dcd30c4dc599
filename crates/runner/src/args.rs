//! Quote-aware splitting of a raw argument string.

/// Split `input` into an argument vector.
///
/// Tokens split on unquoted spaces. A `"` or `'` opens a quoted span that
/// runs literally, embedded spaces included, until a closing character of
/// the same kind; an unterminated quote treats the rest of the string as
/// quoted.
pub fn split_args(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            None => match c {
                ' ' => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                },
                '"' | '\'' => quote = Some(c),
                _ => current.push(c),
            },
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
