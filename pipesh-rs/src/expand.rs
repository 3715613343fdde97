//! Parameter and arithmetic expansion, applied to a raw line before it is
//! tokenized.
//!
//! Quote characters and backslashes are copied through unchanged so the
//! tokenizer can still group words and drop escapes; they only decide what
//! gets expanded here.

use crate::env::Environment;

/// Deepest nesting of parentheses, signs or `$(( ))` that is still
/// evaluated; anything deeper evaluates to 0.
pub const MAX_NESTING: usize = 256;

pub fn expand(input: &str, env: &Environment, last_status: i32) -> String { expand_nested(input, env, last_status, 0) }

fn expand_nested(input: &str, env: &Environment, last_status: i32, depth: usize) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let (mut single, mut double) = (false, false);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if !single => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) { out.push(next); i += 1; }
            }
            '\'' if !double => { single = !single; out.push(c); }
            '"' if !single => { double = !double; out.push(c); }
            '$' if !single => { i = dollar(&chars, i, env, last_status, depth, &mut out); continue; }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Expands the `$` form starting at `at` into `out`; returns the index after it.
fn dollar(chars: &[char], at: usize, env: &Environment, last_status: i32, depth: usize, out: &mut String) -> usize {
    match chars.get(at + 1) {
        Some('(') if chars.get(at + 2) == Some(&'(') => {
            let start = at + 3;
            match arith_end(chars, start) {
                Some(end) => {
                    let inner: String = chars[start..end].iter().collect();
                    let value = if depth < MAX_NESTING {
                        evaluate(&expand_nested(&inner, env, last_status, depth + 1), env)
                    } else {
                        0
                    };
                    out.push_str(&value.to_string());
                    end + 2
                }
                None => { out.push('$'); at + 1 }
            }
        }
        Some('{') => match chars[at + 2..].iter().position(|&c| c == '}') {
            Some(len) => {
                let name: String = chars[at + 2..at + 2 + len].iter().collect();
                lookup(&name, env, last_status, out);
                at + 3 + len
            }
            None => { out.push('$'); at + 1 }
        },
        Some('?') => { out.push_str(&last_status.to_string()); at + 2 }
        Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
            let len = chars[at + 1..].iter().take_while(|c| c.is_ascii_alphanumeric() || **c == '_').count();
            let name: String = chars[at + 1..at + 1 + len].iter().collect();
            lookup(&name, env, last_status, out);
            at + 1 + len
        }
        _ => { out.push('$'); at + 1 }
    }
}

fn lookup(name: &str, env: &Environment, last_status: i32, out: &mut String) {
    if name == "?" { out.push_str(&last_status.to_string()); } else { out.push_str(env.get(name).unwrap_or("")); }
}

/// Index of the `))` closing an arithmetic expansion whose body starts at `start`.
fn arith_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut j = start;
    while j < chars.len() {
        match chars[j] {
            '(' => depth += 1,
            ')' if depth == 0 => return (chars.get(j + 1) == Some(&')')).then_some(j),
            ')' => depth -= 1,
            _ => {}
        }
        j += 1;
    }
    None
}

/// Integer arithmetic over `i64`: `+ - * / %`, unary signs, parentheses and
/// bare variable names. Division or modulo by zero, malformed input and
/// nesting deeper than [`MAX_NESTING`] give 0.
pub fn evaluate(expr: &str, env: &Environment) -> i64 {
    let mut p = Arith { chars: expr.chars().collect(), pos: 0, depth: 0, env };
    match p.sum() {
        Some(v) if p.at_end() => v,
        _ => 0,
    }
}

struct Arith<'a> { chars: Vec<char>, pos: usize, depth: usize, env: &'a Environment }

impl Arith<'_> {
    fn peek(&mut self) -> Option<char> {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) { self.pos += 1; }
        self.chars.get(self.pos).copied()
    }

    fn at_end(&mut self) -> bool { self.peek().is_none() }

    fn sum(&mut self) -> Option<i64> {
        let mut v = self.product()?;
        loop {
            match self.peek() {
                Some('+') => { self.pos += 1; v = v.wrapping_add(self.product()?); }
                Some('-') => { self.pos += 1; v = v.wrapping_sub(self.product()?); }
                _ => return Some(v),
            }
        }
    }

    fn product(&mut self) -> Option<i64> {
        let mut v = self.unary()?;
        loop {
            let op = match self.peek() { Some(op @ ('*' | '/' | '%')) => op, _ => return Some(v) };
            self.pos += 1;
            let rhs = self.unary()?;
            v = match op {
                '*' => v.wrapping_mul(rhs),
                _ if rhs == 0 => 0,
                '/' => v.wrapping_div(rhs),
                _ => v.wrapping_rem(rhs),
            };
        }
    }

    fn unary(&mut self) -> Option<i64> {
        if self.depth >= MAX_NESTING { return None; }
        self.depth += 1;
        let v = self.operand();
        self.depth -= 1;
        v
    }

    fn operand(&mut self) -> Option<i64> {
        match self.peek()? {
            '+' => { self.pos += 1; self.unary() }
            '-' => { self.pos += 1; self.unary().map(i64::wrapping_neg) }
            '(' => {
                self.pos += 1;
                let v = self.sum()?;
                (self.peek() == Some(')')).then(|| { self.pos += 1; v })
            }
            c if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                digits.parse().ok()
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                Some(self.env.get(&name).and_then(|v| v.trim().parse().ok()).unwrap_or(0))
            }
            _ => None,
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(|&c| pred(c)) { self.pos += 1; }
        self.chars[start..self.pos].iter().collect()
    }
}
