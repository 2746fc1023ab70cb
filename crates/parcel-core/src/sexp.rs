//! Minimal s-expression reader and printer.
//!
//! Archive indexes and package description files are written as Lisp data.
//! Only the data subset is supported: lists, dotted pairs, vectors, strings,
//! integers, symbols and the `'` quote shorthand.

use std::fmt;

/// A Lisp datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Symbol(String),
    Str(String),
    Int(i64),
    List(Vec<Value>),
    /// A list whose last cdr is not nil: `(a b . c)`.
    Dotted(Vec<Value>, Box<Value>),
    Vector(Vec<Value>),
}

/// Syntax error while reading s-expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SexpError {
    pub line: usize,
    pub message: String,
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    pub fn quote(value: Value) -> Self {
        Self::List(vec![Self::symbol("quote"), value])
    }

    /// `nil` and `()` are the same object.
    pub fn is_nil(&self) -> bool {
        match self {
            Self::Symbol(s) => s == "nil",
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements of a proper list; `nil` is the empty list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            Self::Symbol(s) if s == "nil" => Some(&[]),
            _ => None,
        }
    }

    /// Strip one level of `(quote x)`.
    pub fn unquote(&self) -> &Value {
        match self {
            Self::List(items) if items.len() == 2 && items[0].as_symbol() == Some("quote") => {
                &items[1]
            }
            other => other,
        }
    }

    /// Text of a string or symbol.
    pub fn as_text(&self) -> Option<&str> {
        self.as_str().or_else(|| self.as_symbol())
    }
}

/// Read exactly one form; anything but whitespace and comments after it is an error.
pub fn parse_one(input: &str) -> Result<Value, SexpError> {
    let mut reader = Reader::new(input);
    let value = reader
        .read()?
        .ok_or_else(|| reader.error("expected a form, found end of input"))?;
    if reader.read()?.is_some() {
        return Err(reader.error("trailing data after form"));
    }
    Ok(value)
}

/// Read the first form of `input`; also returns the number of bytes consumed.
///
/// `None` when `input` holds only whitespace and comments.
pub fn parse_prefix(input: &str) -> Result<Option<(Value, usize)>, SexpError> {
    let mut reader = Reader::new(input);
    Ok(reader.read()?.map(|value| (value, reader.offset)))
}

/// Read every top-level form.
pub fn parse_all(input: &str) -> Result<Vec<Value>, SexpError> {
    let mut reader = Reader::new(input);
    let mut forms = Vec::new();
    while let Some(value) = reader.read()? {
        forms.push(value);
    }
    Ok(forms)
}

/// Deepest nesting of lists, vectors and quotes the reader accepts.
pub const MAX_DEPTH: usize = 256;

struct Reader<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    offset: usize,
    depth: usize,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | '\'' | ';')
}

impl<'a> Reader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            offset: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> SexpError {
        SexpError {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Next form, or `None` at end of input.
    fn read(&mut self) -> Result<Option<Value>, SexpError> {
        self.skip_trivia();
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };

        let value = match c {
            '(' | '[' | '\'' => {
                self.bump();
                self.read_nested(c)?
            }
            ')' | ']' => return Err(self.error(format!("unexpected '{c}'"))),
            '"' => {
                self.bump();
                Value::Str(self.read_string()?)
            }
            _ => self.read_atom()?,
        };
        Ok(Some(value))
    }

    /// Body of a form opened by `open`, one level deeper.
    fn read_nested(&mut self, open: char) -> Result<Value, SexpError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let value = match open {
            '(' => self.read_list(),
            '[' => self.read_until(']').map(Value::Vector),
            _ => self
                .read()
                .and_then(|quoted| quoted.ok_or_else(|| self.error("quote at end of input")))
                .map(Value::quote),
        };
        self.depth -= 1;
        value
    }

    fn read_until(&mut self, close: char) -> Result<Vec<Value>, SexpError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.chars.peek() {
                None => return Err(self.error(format!("missing '{close}'"))),
                Some(&c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => {
                    let item = self.read()?.ok_or_else(|| self.error("unexpected end of input"))?;
                    items.push(item);
                }
            }
        }
    }

    fn read_list(&mut self) -> Result<Value, SexpError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.chars.peek() {
                None => return Err(self.error("missing ')'")),
                Some(')') => {
                    self.bump();
                    return Ok(Value::List(items));
                }
                Some(_) => {
                    let item = self.read()?.ok_or_else(|| self.error("unexpected end of input"))?;
                    if item == Value::symbol(".") {
                        if items.is_empty() {
                            return Err(self.error("dot at start of list"));
                        }
                        let tail = self
                            .read()?
                            .ok_or_else(|| self.error("missing cdr after dot"))?;
                        self.skip_trivia();
                        if self.bump() != Some(')') {
                            return Err(self.error("expected ')' after dotted cdr"));
                        }
                        return Ok(match tail {
                            Value::List(rest) => {
                                items.extend(rest);
                                Value::List(items)
                            }
                            Value::Symbol(ref s) if s == "nil" => Value::List(items),
                            other => Value::Dotted(items, Box::new(other)),
                        });
                    }
                    items.push(item);
                }
            }
        }
    }

    fn read_string(&mut self) -> Result<String, SexpError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\n') => {}
                    Some(other) => out.push(other),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_atom(&mut self) -> Result<Value, SexpError> {
        let mut token = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_delimiter(c) {
                break;
            }
            self.bump();
            if c == '\\' {
                match self.bump() {
                    Some(escaped) => token.push(escaped),
                    None => return Err(self.error("unterminated escape")),
                }
            } else {
                token.push(c);
            }
        }
        if token.is_empty() {
            return Err(self.error("empty atom"));
        }

        let numeric = token.strip_prefix(['-', '+']).unwrap_or(&token);
        if !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = token.parse::<i64>() {
                return Ok(Value::Int(n));
            }
        }
        Ok(Value::Symbol(token))
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(s) => {
                for c in s.chars() {
                    if is_delimiter(c) || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{c}")?;
                }
                Ok(())
            }
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Int(n) => write!(f, "{n}"),
            Self::List(items) if items.len() == 2 && items[0].as_symbol() == Some("quote") => {
                write!(f, "'{}", items[1])
            }
            Self::List(items) if items.is_empty() => f.write_str("nil"),
            Self::List(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                f.write_str(")")
            }
            Self::Dotted(items, tail) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                write!(f, " . {tail})")
            }
            Self::Vector(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
        }
    }
}
