// Copyright (c) The bbgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for `.pyl` files.
//!
//! A `.pyl` file holds a single Python literal expression, as accepted by
//! `ast.literal_eval`. Only the subset used by build configuration files is
//! supported: dictionaries with string keys, lists, tuples, strings, numbers,
//! `True`, `False` and `None`.
//!
//! Parsing happens in two steps. The grammar below produces a [`Node`] tree
//! that remembers where each dictionary key was written, and
//! [`Node::into_value`] then lowers that tree to a [`serde_json::Value`],
//! reporting duplicate keys along the way.

use crate::errors::PylParseError;
use serde_json::{Map, Number, Value};
use std::{collections::HashMap, ops::Range};
use winnow::{
    LocatingSlice, ModalResult, Parser,
    ascii::line_ending,
    combinator::{alt, cut_err, delimited, fail, opt, repeat, trace},
    error::{StrContext, StrContextValue},
    stream::Stream,
    token::{any, literal, one_of, take_till, take_while},
};

pub(crate) type Input<'a> = LocatingSlice<&'a str>;
type PResult<T> = ModalResult<T>;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    None,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Node>),
    Dict(Vec<DictEntry>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DictEntry {
    key: String,
    key_span: Range<usize>,
    value: Node,
}

impl Node {
    pub(crate) fn into_value(self, input: &str) -> Result<Value, PylParseError> {
        match self {
            Node::None => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(b)),
            Node::Number(n) => Ok(Value::Number(n)),
            Node::String(s) => Ok(Value::String(s)),
            Node::List(items) => items
                .into_iter()
                .map(|item| item.into_value(input))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Node::Dict(entries) => {
                let mut map = Map::with_capacity(entries.len());
                let mut first_spans: HashMap<String, Range<usize>> = HashMap::new();
                for DictEntry {
                    key,
                    key_span,
                    value,
                } in entries
                {
                    if let Some(first) = first_spans.get(&key) {
                        return Err(PylParseError::duplicate_key(
                            input,
                            key,
                            key_span,
                            first.clone(),
                        ));
                    }
                    first_spans.insert(key.clone(), key_span);
                    map.insert(key, value.into_value(input)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

pub(crate) fn parse(input: &str) -> Result<Node, PylParseError> {
    delimited(ws, required_value, ws)
        .parse(LocatingSlice::new(input))
        .map_err(|error| PylParseError::syntax(input, error.offset(), error.inner()))
}

fn cut_fail<T>(
    input: &mut Input<'_>,
    label: &'static str,
    expected: &'static str,
) -> PResult<T> {
    cut_err(fail)
        .context(StrContext::Label(label))
        .context(StrContext::Expected(StrContextValue::Description(expected)))
        .parse_next(input)
}

// Whitespace, comments and explicit line continuations.
fn ws(input: &mut Input<'_>) -> PResult<()> {
    trace(
        "ws",
        repeat(
            0..,
            alt((
                take_while(1.., [' ', '\t', '\r', '\n', '\x0c']).void(),
                ('#', take_till(0.., ['\n'])).void(),
                ('\\', line_ending).void(),
            )),
        ),
    )
    .parse_next(input)
}

fn required_value(input: &mut Input<'_>) -> PResult<Node> {
    cut_err(value)
        .context(StrContext::Label("value"))
        .context(StrContext::Expected(StrContextValue::Description(
            "a Python literal",
        )))
        .parse_next(input)
}

fn value(input: &mut Input<'_>) -> PResult<Node> {
    trace(
        "value",
        alt((
            dict,
            list,
            tuple_or_group,
            strings.map(Node::String),
            keyword,
            number,
        )),
    )
    .parse_next(input)
}

fn keyword(input: &mut Input<'_>) -> PResult<Node> {
    alt((
        "True".value(Node::Bool(true)),
        "False".value(Node::Bool(false)),
        "None".value(Node::None),
    ))
    .parse_next(input)
}

fn digits<'i>(input: &mut Input<'i>) -> PResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        take_while(0.., |c: char| c.is_ascii_digit() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn number(input: &mut Input<'_>) -> PResult<Node> {
    let text = (
        opt(one_of(['-', '+'])),
        digits,
        opt(('.', opt(digits))),
        opt((one_of(['e', 'E']), opt(one_of(['-', '+'])), cut_err(digits))),
    )
        .take()
        .parse_next(input)?;

    let text = text.replace('_', "");
    let is_float = text.contains(['.', 'e', 'E']);
    let number = if is_float {
        text.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        text.parse::<i64>()
            .map(Number::from)
            .ok()
            .or_else(|| text.parse::<u64>().map(Number::from).ok())
    };

    match number {
        Some(number) => Ok(Node::Number(number)),
        None => cut_fail(input, "number", "a finite number that fits in 64 bits"),
    }
}

fn list(input: &mut Input<'_>) -> PResult<Node> {
    '['.parse_next(input)?;
    let mut items = Vec::new();
    sequence_items(input, ']', &mut items)?;
    Ok(Node::List(items))
}

// `(a)` is grouping, `(a,)` and `(a, b)` are tuples. Tuples become lists.
fn tuple_or_group(input: &mut Input<'_>) -> PResult<Node> {
    '('.parse_next(input)?;
    ws(input)?;
    if opt(')').parse_next(input)?.is_some() {
        return Ok(Node::List(Vec::new()));
    }

    let first = required_value(input)?;
    ws(input)?;
    if opt(',').parse_next(input)?.is_none() {
        close(input, ')')?;
        return Ok(first);
    }

    let mut items = vec![first];
    sequence_items(input, ')', &mut items)?;
    Ok(Node::List(items))
}

// Parses comma-separated values up to and including `end`. A trailing comma
// is allowed.
fn sequence_items(input: &mut Input<'_>, end: char, items: &mut Vec<Node>) -> PResult<()> {
    loop {
        ws(input)?;
        if opt(end).parse_next(input)?.is_some() {
            return Ok(());
        }
        items.push(required_value(input)?);
        ws(input)?;
        if opt(',').parse_next(input)?.is_none() {
            return close(input, end);
        }
    }
}

fn close(input: &mut Input<'_>, end: char) -> PResult<()> {
    cut_err(end)
        .context(StrContext::Label("collection"))
        .context(StrContext::Expected(StrContextValue::CharLiteral(end)))
        .context(StrContext::Expected(StrContextValue::CharLiteral(',')))
        .void()
        .parse_next(input)
}

fn dict(input: &mut Input<'_>) -> PResult<Node> {
    '{'.parse_next(input)?;
    let mut entries = Vec::new();
    loop {
        ws(input)?;
        if opt('}').parse_next(input)?.is_some() {
            break;
        }

        let (key, key_span) = cut_err(strings.with_span())
            .context(StrContext::Label("dictionary key"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a string",
            )))
            .parse_next(input)?;
        ws(input)?;
        cut_err(':')
            .context(StrContext::Label("dictionary entry"))
            .context(StrContext::Expected(StrContextValue::CharLiteral(':')))
            .parse_next(input)?;
        ws(input)?;
        let value = required_value(input)?;
        entries.push(DictEntry {
            key,
            key_span,
            value,
        });

        ws(input)?;
        if opt(',').parse_next(input)?.is_none() {
            close(input, '}')?;
            break;
        }
    }
    Ok(Node::Dict(entries))
}

// Adjacent string literals are concatenated, as in Python.
fn strings(input: &mut Input<'_>) -> PResult<String> {
    let mut out = string_literal(input)?;
    loop {
        let checkpoint = input.checkpoint();
        ws(input)?;
        match opt(string_literal).parse_next(input)? {
            Some(next) => out.push_str(&next),
            None => {
                input.reset(&checkpoint);
                return Ok(out);
            }
        }
    }
}

fn string_literal(input: &mut Input<'_>) -> PResult<String> {
    let prefix = opt(one_of(['r', 'R', 'u', 'U', 'b', 'B'])).parse_next(input)?;
    let raw = matches!(prefix, Some('r' | 'R'));
    let quote = alt(("'''", "\"\"\"", "'", "\"")).parse_next(input)?;
    string_body(input, quote, raw)
}

fn string_body(input: &mut Input<'_>, quote: &str, raw: bool) -> PResult<String> {
    let triple = quote.len() == 3;
    let mut out = String::new();
    loop {
        if opt(literal(quote)).parse_next(input)?.is_some() {
            return Ok(out);
        }

        let c = next_char(input)?;
        match c {
            '\n' if !triple => {
                return cut_fail(input, "string", "a closing quote before the end of the line");
            }
            '\\' if raw => {
                // Raw strings keep the backslash, but it still escapes a quote.
                out.push('\\');
                out.push(next_char(input)?);
            }
            '\\' => escape(input, &mut out)?,
            c => out.push(c),
        }
    }
}

fn next_char(input: &mut Input<'_>) -> PResult<char> {
    cut_err(any)
        .context(StrContext::Label("string"))
        .context(StrContext::Expected(StrContextValue::Description(
            "a closing quote",
        )))
        .parse_next(input)
}

fn escape(input: &mut Input<'_>, out: &mut String) -> PResult<()> {
    let c = next_char(input)?;
    match c {
        // Backslash-newline is a line continuation.
        '\n' => {}
        '\\' | '\'' | '"' => out.push(c),
        'a' => out.push('\x07'),
        'b' => out.push('\x08'),
        'f' => out.push('\x0c'),
        'n' => out.push('\n'),
        'r' => out.push('\r'),
        't' => out.push('\t'),
        'v' => out.push('\x0b'),
        '0'..='7' => {
            let rest = take_while(0..=2, |c: char| ('0'..='7').contains(&c)).parse_next(input)?;
            let mut digits = String::with_capacity(3);
            digits.push(c);
            digits.push_str(rest);
            out.push(code_point(input, &digits, 8)?);
        }
        'x' => {
            let digits = hex_digits(input, 2)?;
            out.push(code_point(input, digits, 16)?);
        }
        'u' => {
            let digits = hex_digits(input, 4)?;
            out.push(code_point(input, digits, 16)?);
        }
        'U' => {
            let digits = hex_digits(input, 8)?;
            out.push(code_point(input, digits, 16)?);
        }
        // Unknown escapes are kept verbatim.
        other => {
            out.push('\\');
            out.push(other);
        }
    }
    Ok(())
}

fn hex_digits<'i>(input: &mut Input<'i>, count: usize) -> PResult<&'i str> {
    cut_err(take_while(count, |c: char| c.is_ascii_hexdigit()))
        .context(StrContext::Label("escape sequence"))
        .context(StrContext::Expected(StrContextValue::Description(
            "hexadecimal digits",
        )))
        .parse_next(input)
}

fn code_point(input: &mut Input<'_>, digits: &str, radix: u32) -> PResult<char> {
    match u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
    {
        Some(c) => Ok(c),
        None => cut_fail(input, "escape sequence", "a valid Unicode code point"),
    }
}
