// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while parsing `.pyl` files.

use miette::{Diagnostic, SourceSpan};
use std::ops::Range;
use thiserror::Error;
use winnow::error::{ContextError, StrContext};

/// An error that occurred while parsing a `.pyl` file.
///
/// The full input is carried along so that the error can be rendered with
/// [`miette`] and point at the offending span.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[non_exhaustive]
pub enum PylParseError {
    /// The input is not a valid Python literal.
    #[error("invalid Python literal: {message}")]
    Syntax {
        /// The full input.
        #[source_code]
        input: String,
        /// Where parsing failed.
        #[label("{message}")]
        span: SourceSpan,
        /// What was expected at `span`.
        message: String,
    },

    /// A dictionary defines the same key more than once.
    #[error("duplicate key `{key}` in dictionary")]
    DuplicateKey {
        /// The full input.
        #[source_code]
        input: String,
        /// The second definition of the key.
        #[label("redefined here")]
        span: SourceSpan,
        /// The first definition of the key.
        #[label("first defined here")]
        first: SourceSpan,
        /// The duplicated key.
        key: String,
    },
}

impl PylParseError {
    pub(crate) fn syntax(input: &str, offset: usize, error: &ContextError) -> Self {
        let mut label = None;
        let mut expected = Vec::new();
        for context in error.context() {
            match context {
                StrContext::Label(l) => {
                    // The innermost label is the most precise one.
                    label.get_or_insert(*l);
                }
                StrContext::Expected(value) => expected.push(value.to_string()),
                _ => {}
            }
        }

        let message = match (label, expected.is_empty()) {
            (Some(label), false) => format!("invalid {label}, expected {}", expected.join(" or ")),
            (Some(label), true) => format!("invalid {label}"),
            (None, false) => format!("expected {}", expected.join(" or ")),
            (None, true) => "unexpected input after literal".to_owned(),
        };

        // Point at the next character, or at the end of input.
        let len = input[offset..].chars().next().map_or(0, char::len_utf8);

        Self::Syntax {
            input: input.to_owned(),
            span: (offset, len).into(),
            message,
        }
    }

    pub(crate) fn duplicate_key(
        input: &str,
        key: String,
        span: Range<usize>,
        first: Range<usize>,
    ) -> Self {
        Self::DuplicateKey {
            input: input.to_owned(),
            span: span.into(),
            first: first.into(),
            key,
        }
    }

    /// Returns the byte span of the primary error location.
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Syntax { span, .. } | Self::DuplicateKey { span, .. } => *span,
        }
    }
}
