//! Positional `{i}` templating for action arguments.
//!
//! Tokens are plain substrings of the argument strings so a template
//! stays trivially editable in the config file. A token is `{`, a
//! canonical decimal index (no leading zero unless it is `0`) and `}`;
//! anything else, `{01}` or `{x}` included, is literal text.

use super::{ActionDefinition, ActionError};

/// A `{i}` occurrence inside one argument string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    index: usize,
    /// Byte range of the whole token, braces included
    start: usize,
    end: usize,
}

/// Single left-to-right scan over the tokens of a string.
struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

fn tokens(text: &str) -> Tokens<'_> {
    Tokens { text, pos: 0 }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let bytes = self.text.as_bytes();
        while let Some(offset) = self.text[self.pos..].find('{') {
            let start = self.pos + offset;
            let digits_start = start + 1;
            let digits_end = bytes[digits_start..]
                .iter()
                .position(|b| !b.is_ascii_digit())
                .map_or(bytes.len(), |n| digits_start + n);

            let digits = &self.text[digits_start..digits_end];
            let closed = bytes.get(digits_end) == Some(&b'}');
            let canonical = !digits.is_empty() && (digits == "0" || !digits.starts_with('0'));

            if closed && canonical {
                if let Ok(index) = digits.parse::<usize>() {
                    self.pos = digits_end + 1;
                    return Some(Token {
                        index,
                        start,
                        end: digits_end + 1,
                    });
                }
            }
            // Not a token, resume right after this brace ("{{0}" still yields {0})
            self.pos = start + 1;
        }
        self.pos = self.text.len();
        None
    }
}

/// Text of the token referencing `index`, e.g. `{3}`.
pub fn token_text(index: usize) -> String {
    format!("{{{index}}}")
}

/// Expands the args template of `def` with the caller's values.
///
/// Every `{i}` with `i < user_args.len()` is replaced by `user_args[i]`,
/// in every template string and at every position. Inserted values are
/// never re-scanned, so a value that itself contains `{0}` is kept
/// verbatim. Tokens without a matching value stay literal; with no
/// values at all the template is returned unchanged.
pub fn expand<S: AsRef<str>>(def: &ActionDefinition, user_args: &[S]) -> Vec<String> {
    if user_args.is_empty() {
        return def.args.clone();
    }
    def.args
        .iter()
        .map(|arg| substitute(arg, user_args))
        .collect()
}

fn substitute<S: AsRef<str>>(arg: &str, user_args: &[S]) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut copied = 0;
    for token in tokens(arg) {
        if let Some(value) = user_args.get(token.index) {
            out.push_str(&arg[copied..token.start]);
            out.push_str(value.as_ref());
            copied = token.end;
        }
    }
    out.push_str(&arg[copied..]);
    out
}

/// Checks that declared params and template tokens agree.
///
/// 1. every param index has at least one token in the raw template;
/// 2. expanding the template with the param names as placeholder values
///    leaves no token behind (catches tokens numbered past the params).
pub fn validate(def: &ActionDefinition) -> Result<(), ActionError> {
    for (index, param) in def.params.iter().enumerate() {
        let referenced = def
            .args
            .iter()
            .any(|arg| tokens(arg).any(|t| t.index == index));
        if !referenced {
            return Err(ActionError::MissingArgumentToken {
                action: def.name.clone(),
                token: token_text(index),
                param: param.clone(),
            });
        }
    }

    let leftover = expand(def, def.params.as_slice())
        .iter()
        .flat_map(|arg| tokens(arg).map(|t| t.index))
        .min();
    if let Some(index) = leftover {
        return Err(ActionError::UnusedOrOverNumberedToken {
            action: def.name.clone(),
            token: token_text(index),
        });
    }

    Ok(())
}
