//! Non-blocking tokenizers the decoders are built on.
//!
//! Both tokenizers accept input in chunks of any size and never block: when the buffered bytes
//! end inside a token they report [`Next::NeedMoreInput`] and resume once more bytes were fed.
pub mod json;
pub mod xml;

/// Outcome of asking a tokenizer for its next token.
#[derive(Debug, Clone, PartialEq)]
pub enum Next<T> {
    Token(T),
    NeedMoreInput,
    EndOfInput,
}
