//! Placeholder expansion for file names, locations and archive addresses.
//!
//! Templates are literal text with `{{ expr }}` blocks. Expressions are
//! evaluated against a [`Context`] that binds the cycle, the lead time, the
//! ensemble member and any configured defaults, e.g.
//!
//! ```text
//! gfs.t{{ cycle.strftime('%H') }}z.atmf{{ "%03d" % (lead_time.total_seconds() // 3600) }}.nc
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved reference `{0}` in template")]
    UnresolvedReference(String),

    #[error("template syntax error in `{template}`: {message}")]
    Syntax { template: String, message: String },

    #[error("template evaluation failed: {0}")]
    Type(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Time(DateTime<Utc>),
    Span(TimeDelta),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Time(_) => "datetime",
            Value::Span(_) => "timedelta",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
            Value::Time(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            Value::Span(value) => {
                let total = value.num_seconds();
                let days = total.div_euclid(86_400);
                let rest = total.rem_euclid(86_400);
                if days != 0 {
                    let plural = if days.abs() == 1 { "" } else { "s" };
                    write!(f, "{days} day{plural}, ")?;
                }
                write!(f, "{}:{:02}:{:02}", rest / 3600, rest % 3600 / 60, rest % 60)
            }
        }
    }
}

/// Variables visible to a template while it renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Renders each default against the variables bound so far and binds the
    /// result under the default's name. A default referencing something that
    /// is not bound stays unbound; templates that use it fail later with the
    /// default's own name.
    pub fn bind_defaults(
        &mut self,
        defaults: &BTreeMap<String, Template>,
    ) -> Result<(), TemplateError> {
        let base = self.clone();
        for (name, template) in defaults {
            match template.render(&base) {
                Ok(value) => self.insert(name.clone(), Value::Str(value)),
                Err(TemplateError::UnresolvedReference(missing)) => {
                    tracing::trace!(default = %name, %missing, "leaving default unbound");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Int(i64),
    Str(String),
    Var(String),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, String, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
        })
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let syntax = |message: String| TemplateError::Syntax {
            template: source.to_string(),
            message,
        };

        let mut parts = Vec::new();
        let mut rest = 0usize;
        while let Some(offset) = source[rest..].find("{{") {
            let open = rest + offset;
            if open > rest {
                parts.push(Part::Text(source[rest..open].to_string()));
            }
            let (tokens, end) = lex_block(source, open + 2).map_err(syntax)?;
            if tokens.is_empty() {
                return Err(syntax("empty expression".to_string()));
            }
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.parse_expr().map_err(syntax)?;
            if let Some(token) = parser.peek() {
                return Err(syntax(format!("unexpected {token:?} after expression")));
            }
            parts.push(Part::Expr(expr));
            rest = end;
        }
        if rest < source.len() {
            parts.push(Part::Text(source[rest..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, context: &Context) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => {
                    let value = eval(expr, context)?;
                    write!(out, "{value}").map_err(|err| TemplateError::Type(err.to_string()))?;
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Template {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

/// Parses and renders `template` in one step.
pub fn expand(template: &str, context: &Context) -> Result<String, TemplateError> {
    Template::parse(template)?.render(context)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,
}

/// Tokenizes one `{{ ... }}` block starting right after the opening braces.
/// Returns the tokens and the byte offset just past the closing braces.
fn lex_block(src: &str, start: usize) -> Result<(Vec<Token>, usize), String> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = start;

    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b'}' if bytes.get(pos + 1) == Some(&b'}') => return Ok((tokens, pos + 2)),
            b'.' => {
                tokens.push(Token::Dot);
                pos += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            b'(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            b'+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            b'-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            b'*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            b'%' => {
                tokens.push(Token::Percent);
                pos += 1;
            }
            b'/' => {
                if bytes.get(pos + 1) != Some(&b'/') {
                    return Err("`/` is not supported, use `//` for integer division".to_string());
                }
                tokens.push(Token::SlashSlash);
                pos += 2;
            }
            b'\'' | b'"' => {
                let quote = byte;
                let body_start = pos + 1;
                let mut end = body_start;
                while end < bytes.len() && bytes[end] != quote {
                    end += if bytes[end] == b'\\' { 2 } else { 1 };
                }
                if end >= bytes.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(unescape(&src[body_start..end])));
                pos = end + 1;
            }
            b'0'..=b'9' => {
                let begin = pos;
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let value = src[begin..pos]
                    .parse::<i64>()
                    .map_err(|_| format!("integer literal {} is too large", &src[begin..pos]))?;
                tokens.push(Token::Int(value));
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let begin = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push(Token::Ident(src[begin..pos].to_string()));
            }
            _ => {
                let ch = src[pos..].chars().next().unwrap_or('?');
                return Err(format!("unexpected character `{ch}`"));
            }
        }
    }

    Err("unterminated `{{` block".to_string())
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                Some(token) => return Err(format!("expected attribute name, found {token:?}")),
                None => return Err("expected attribute name after `.`".to_string()),
            };
            if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                let args = self.parse_args()?;
                expr = Expr::Call(Box::new(expr), name, args);
            } else {
                expr = Expr::Attr(Box::new(expr), name);
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(format!("expected `,` or `)`, found {token:?}")),
                None => return Err("unclosed argument list".to_string()),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(token) => Err(format!("unexpected {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn eval(expr: &Expr, context: &Context) -> Result<Value, TemplateError> {
    match expr {
        Expr::Int(value) => Ok(Value::Int(*value)),
        Expr::Str(value) => Ok(Value::Str(value.clone())),
        Expr::Var(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::UnresolvedReference(name.clone())),
        Expr::Attr(base, name) => attribute(eval(base, context)?, name),
        Expr::Call(base, name, args) => {
            let receiver = eval(base, context)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, context))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(receiver, name, &args)
        }
        Expr::Neg(inner) => match eval(inner, context)? {
            Value::Int(value) => value
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| overflow("-")),
            Value::Span(value) => Ok(Value::Span(-value)),
            other => Err(TemplateError::Type(format!(
                "bad operand type for unary -: {}",
                other.type_name()
            ))),
        },
        Expr::Binary(lhs, op, rhs) => binary(*op, eval(lhs, context)?, eval(rhs, context)?),
    }
}

fn attribute(value: Value, name: &str) -> Result<Value, TemplateError> {
    let result = match (&value, name) {
        (Value::Time(time), "year") => Some(i64::from(time.year())),
        (Value::Time(time), "month") => Some(i64::from(time.month())),
        (Value::Time(time), "day") => Some(i64::from(time.day())),
        (Value::Time(time), "hour") => Some(i64::from(time.hour())),
        (Value::Time(time), "minute") => Some(i64::from(time.minute())),
        (Value::Time(time), "second") => Some(i64::from(time.second())),
        (Value::Span(span), "days") => Some(span.num_seconds().div_euclid(86_400)),
        (Value::Span(span), "seconds") => Some(span.num_seconds().rem_euclid(86_400)),
        (Value::Span(span), "hours") => Some(span.num_hours()),
        (Value::Span(span), "minutes") => Some(span.num_minutes()),
        _ => None,
    };
    result.map(Value::Int).ok_or_else(|| {
        TemplateError::Type(format!(
            "`{}` has no attribute `{name}`",
            value.type_name()
        ))
    })
}

fn call_method(receiver: Value, name: &str, args: &[Value]) -> Result<Value, TemplateError> {
    match (&receiver, name, args) {
        (Value::Time(time), "strftime", [Value::Str(format)]) => {
            Ok(Value::Str(strftime(time, format)?))
        }
        (Value::Span(span), "total_seconds", []) => Ok(Value::Int(span.num_seconds())),
        (Value::Str(text), "upper", []) => Ok(Value::Str(text.to_uppercase())),
        (Value::Str(text), "lower", []) => Ok(Value::Str(text.to_lowercase())),
        (Value::Str(text), "zfill", [Value::Int(width)]) => Ok(Value::Str(zfill(text, *width))),
        _ => Err(TemplateError::Type(format!(
            "unsupported call `{}.{name}` with {} argument(s)",
            receiver.type_name(),
            args.len()
        ))),
    }
}

fn strftime(time: &DateTime<Utc>, format: &str) -> Result<String, TemplateError> {
    let items = StrftimeItems::new(format).collect::<Vec<_>>();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::Type(format!(
            "invalid strftime format `{format}`"
        )));
    }
    let mut out = String::new();
    write!(out, "{}", time.format_with_items(items.iter()))
        .map_err(|_| TemplateError::Type(format!("cannot format cycle with `{format}`")))?;
    Ok(out)
}

fn zfill(text: &str, width: i64) -> String {
    let width = usize::try_from(width).unwrap_or(0);
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let zeros = "0".repeat(width - len);
    match text.strip_prefix(['-', '+']) {
        Some(digits) => format!("{}{zeros}{digits}", &text[..1]),
        None => format!("{zeros}{text}"),
    }
}

fn overflow(op: &str) -> TemplateError {
    TemplateError::Type(format!("integer overflow in `{op}`"))
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, TemplateError> {
    use Value::{Int, Span, Str, Time};

    let result = match (op, &lhs, &rhs) {
        (BinOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int),
        (BinOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int),
        (BinOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int),
        (BinOp::FloorDiv | BinOp::Mod, Int(_), Int(0)) => {
            return Err(TemplateError::Type("integer division by zero".to_string()));
        }
        (BinOp::FloorDiv, Int(a), Int(b)) => floor_div(*a, *b).map(Int),
        (BinOp::Mod, Int(a), Int(b)) => Some(Int(floor_mod(*a, *b))),
        (BinOp::Add, Str(a), Str(b)) => Some(Str(format!("{a}{b}"))),
        (BinOp::Mod, Str(format), value) => Some(Str(printf(format, value)?)),
        (BinOp::Add, Time(t), Span(d)) | (BinOp::Add, Span(d), Time(t)) => {
            t.checked_add_signed(*d).map(Time)
        }
        (BinOp::Sub, Time(t), Span(d)) => t.checked_sub_signed(*d).map(Time),
        (BinOp::Sub, Time(a), Time(b)) => Some(Span(a.signed_duration_since(*b))),
        (BinOp::Add, Span(a), Span(b)) => a.checked_add(b).map(Span),
        (BinOp::Sub, Span(a), Span(b)) => a.checked_sub(b).map(Span),
        (BinOp::Mul, Span(d), Int(n)) | (BinOp::Mul, Int(n), Span(d)) => i32::try_from(*n)
            .ok()
            .and_then(|n| d.checked_mul(n))
            .map(Span),
        _ => {
            return Err(TemplateError::Type(format!(
                "unsupported operand types for {op}: {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
    };
    result.ok_or_else(|| overflow(&op.to_string()))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if a.checked_rem(b)? != 0 && ((a < 0) != (b < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

// `wrapping_rem` only differs from `%` for `i64::MIN % -1`, which is 0.
fn floor_mod(a: i64, b: i64) -> i64 {
    let rem = a.wrapping_rem(b);
    if rem != 0 && ((rem < 0) != (b < 0)) {
        rem + b
    } else {
        rem
    }
}

/// printf-style `format % value` with a single conversion.
fn printf(format: &str, value: &Value) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(format.len());
    let mut converted = false;
    let mut chars = format.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + digit as usize;
            chars.next();
        }
        let conversion = chars
            .next()
            .ok_or_else(|| TemplateError::Type(format!("incomplete format `{format}`")))?;
        if converted {
            return Err(TemplateError::Type(
                "not enough arguments for format string".to_string(),
            ));
        }
        converted = true;

        let (body, numeric) = match (conversion, value) {
            ('d' | 'i', Value::Int(n)) => (n.to_string(), true),
            ('x', Value::Int(n)) if *n < 0 => (format!("-{:x}", n.unsigned_abs()), true),
            ('x', Value::Int(n)) => (format!("{n:x}"), true),
            ('s', other) => (other.to_string(), false),
            (c, other) => {
                return Err(TemplateError::Type(format!(
                    "%{c} format does not accept {}",
                    other.type_name()
                )));
            }
        };
        pad_into(&mut out, &body, width, left, zero && numeric);
    }

    if !converted {
        return Err(TemplateError::Type(
            "not all arguments converted during string formatting".to_string(),
        ));
    }
    Ok(out)
}

fn pad_into(out: &mut String, body: &str, width: usize, left: bool, zero: bool) {
    let len = body.chars().count();
    if len >= width {
        out.push_str(body);
        return;
    }
    let fill = width - len;
    if left {
        out.push_str(body);
        out.extend(std::iter::repeat_n(' ', fill));
    } else if zero {
        let (sign, digits) = match body.strip_prefix('-') {
            Some(digits) => ("-", digits),
            None => ("", body),
        };
        out.push_str(sign);
        out.extend(std::iter::repeat_n('0', fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat_n(' ', fill));
        out.push_str(body);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn context() -> Context {
        Context::new()
            .with(
                "cycle",
                Value::Time(Utc.with_ymd_and_hms(2025, 5, 4, 18, 0, 0).unwrap()),
            )
            .with("lead_time", Value::Span(TimeDelta::hours(6)))
            .with("mem", Value::Int(7))
    }

    #[test]
    fn literal_text_passes_through() {
        let template = Template::parse("plain/file.nc").unwrap();
        assert_eq!(template.render(&Context::new()).unwrap(), "plain/file.nc");
    }

    #[test]
    fn strftime_and_lead_hours() {
        let rendered = expand(
            "gfs.t{{ cycle.strftime('%H') }}z.pgrb2.f{{ \"%03d\" % (lead_time.total_seconds() // 3600) }}",
            &context(),
        )
        .unwrap();
        assert_eq!(rendered, "gfs.t18z.pgrb2.f006");
    }

    #[test]
    fn valid_time_arithmetic() {
        let rendered = expand("{{ (cycle + lead_time).strftime('%Y%m%d%H') }}", &context()).unwrap();
        assert_eq!(rendered, "2025050500");
    }

    #[test]
    fn binning_window() {
        let rendered = expand("{{ cycle.hour // 6 * 6 }}-{{ cycle.hour % 5 }}", &context()).unwrap();
        assert_eq!(rendered, "18-3");
    }

    #[test]
    fn member_padding() {
        assert_eq!(expand("mem{{ '%03d' % mem }}", &context()).unwrap(), "mem007");
        assert_eq!(expand("{{ ('' + 'x').zfill(3) }}", &context()).unwrap(), "00x");
    }

    #[test]
    fn unresolved_reference_names_variable() {
        let err = expand("{{ cycle.strftime('%H') }}{{ missing }}", &context()).unwrap_err();
        assert_eq!(err, TemplateError::UnresolvedReference("missing".to_string()));
    }

    #[test]
    fn syntax_errors_are_reported_at_parse() {
        assert_matches!(
            Template::parse("{{ cycle.strftime('%H') "),
            Err(TemplateError::Syntax { .. })
        );
        assert_matches!(Template::parse("{{ }}"), Err(TemplateError::Syntax { .. }));
        assert_matches!(Template::parse("{{ 6 / 2 }}"), Err(TemplateError::Syntax { .. }));
    }

    #[test]
    fn python_style_floor_semantics() {
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_div(7, 2), Some(3));
    }

    #[test]
    fn minimum_integer_division_overflows() {
        assert_matches!(
            expand("{{ (-9223372036854775807 - 1) // -1 }}", &context()),
            Err(TemplateError::Type(message)) if message.contains("//")
        );
        assert_eq!(
            expand("{{ (-9223372036854775807 - 1) % -1 }}", &context()).unwrap(),
            "0"
        );
    }

    #[test]
    fn timedelta_rendering() {
        assert_eq!(Value::Span(TimeDelta::hours(6)).to_string(), "6:00:00");
        assert_eq!(Value::Span(TimeDelta::hours(30)).to_string(), "1 day, 6:00:00");
    }

    #[test]
    fn defaults_bind_lazily() {
        let mut defaults = BTreeMap::new();
        defaults.insert("hh".to_string(), Template::parse("{{ cycle.strftime('%H') }}").unwrap());
        defaults.insert("tag".to_string(), Template::parse("{{ nope }}").unwrap());
        let mut ctx = context();
        ctx.bind_defaults(&defaults).unwrap();
        assert_eq!(ctx.get("hh"), Some(&Value::Str("18".to_string())));
        assert_eq!(ctx.get("tag"), None);
    }
}
