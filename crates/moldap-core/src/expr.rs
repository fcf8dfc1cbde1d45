//! Mapping-expression front end
//!
//! A mapping expression is literal text interleaved with `{{ ... }}` template
//! regions. Each region is parsed into a small abstract tree (attribute paths,
//! filter pipes, function calls, `or` fallbacks, literals) which the resolver
//! evaluates against a [`ResolutionContext`](crate::resolver::ResolutionContext).
//!
//! Unknown filter or function names are rejected here, at parse time, so a
//! mapping document referencing a helper that does not exist fails at load
//! rather than on the first record.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::filters;

/// A parsed mapping expression, ready for repeated evaluation.
///
/// Parsing is done once, at schema load; `Expression` is immutable afterwards
/// and cheap to clone.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    pub(crate) segments: Vec<Segment>,
}

/// One piece of a mapping expression.
#[derive(Debug, Clone)]
pub(crate) enum Segment {
    /// Literal text outside any template region
    Text(String),
    /// A parsed `{{ ... }}` region
    Region(Expr),
}

/// Abstract tree for one template region.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    /// Quoted string, number, boolean or none literal
    Literal(Value),
    /// Dotted attribute path, e.g. `source.address.city`
    Path(Vec<String>),
    /// `a or b`: left value if truthy, else right
    Or(Box<Expr>, Box<Expr>),
    /// Filter pipe or function call dispatched through the helper registry.
    /// For pipes the piped-in value is the first positional argument.
    Apply {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
}

impl Expression {
    /// Parse a mapping expression.
    ///
    /// A string without template markers parses to a single literal segment
    /// and resolves to itself unchanged.
    pub fn parse(source: &str) -> Result<Self> {
        let mut scanner = Scanner::new(source);
        let mut segments = Vec::new();
        let mut text = String::new();

        while let Some(c) = scanner.peek() {
            if scanner.rest().starts_with("{{") {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                scanner.advance(2);
                let tokens = lex_region(&mut scanner, source)?;
                let expr = RegionParser::new(tokens, source).parse()?;
                segments.push(Segment::Region(expr));
            } else {
                text.push(c);
                scanner.advance(c.len_utf8());
            }
        }
        if !text.is_empty() || segments.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn syntax_error(source: &str, message: impl Into<String>) -> Error {
    Error::Expression {
        expression: source.to_string(),
        message: message.into(),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Value),
    True,
    False,
    None_,
    Or,
    Dot,
    Pipe,
    Comma,
    Assign,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Str(_) => "string literal".to_string(),
            Token::Number(n) => format!("number {n}"),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::None_ => "'none'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Pipe => "'|'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Assign => "'='".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance(c.len_utf8());
            } else {
                break;
            }
        }
    }
}

/// Tokenize one `{{ ... }}` region, consuming the closing marker.
fn lex_region(scanner: &mut Scanner<'_>, source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    loop {
        scanner.skip_whitespace();
        if scanner.rest().starts_with("}}") {
            scanner.advance(2);
            return Ok(tokens);
        }
        let c = match scanner.peek() {
            Some(c) => c,
            None => return Err(syntax_error(source, "unterminated template region")),
        };
        let token = match c {
            '.' => {
                scanner.advance(1);
                Token::Dot
            }
            '|' => {
                scanner.advance(1);
                Token::Pipe
            }
            ',' => {
                scanner.advance(1);
                Token::Comma
            }
            '=' => {
                scanner.advance(1);
                Token::Assign
            }
            '(' => {
                scanner.advance(1);
                Token::LParen
            }
            ')' => {
                scanner.advance(1);
                Token::RParen
            }
            '"' | '\'' => lex_string(scanner, source, c)?,
            c if c.is_ascii_digit() => lex_number(scanner, source)?,
            '-' => lex_number(scanner, source)?,
            c if c.is_alphabetic() || c == '_' => lex_ident(scanner),
            other => {
                return Err(syntax_error(
                    source,
                    format!("unexpected character '{other}' at byte {}", scanner.pos),
                ));
            }
        };
        tokens.push(token);
    }
}

fn lex_string(scanner: &mut Scanner<'_>, source: &str, quote: char) -> Result<Token> {
    scanner.advance(1);
    let mut out = String::new();
    loop {
        let c = match scanner.peek() {
            Some(c) => c,
            None => return Err(syntax_error(source, "unterminated string literal")),
        };
        scanner.advance(c.len_utf8());
        if c == quote {
            return Ok(Token::Str(out));
        }
        if c == '\\' {
            let escaped = scanner
                .peek()
                .ok_or_else(|| syntax_error(source, "unterminated string literal"))?;
            scanner.advance(escaped.len_utf8());
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
}

fn lex_number(scanner: &mut Scanner<'_>, source: &str) -> Result<Token> {
    let start = scanner.pos;
    if scanner.peek() == Some('-') {
        scanner.advance(1);
    }
    let mut seen_dot = false;
    while let Some(c) = scanner.peek() {
        if c.is_ascii_digit() {
            scanner.advance(1);
        } else if c == '.' && !seen_dot && scanner.rest()[1..].starts_with(|d: char| d.is_ascii_digit()) {
            seen_dot = true;
            scanner.advance(1);
        } else {
            break;
        }
    }
    let text = &scanner.src[start..scanner.pos];
    let value = if seen_dot {
        text.parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
    } else {
        text.parse::<i64>().ok().map(Value::from)
    };
    value
        .map(Token::Number)
        .ok_or_else(|| syntax_error(source, format!("invalid number literal '{text}'")))
}

fn lex_ident(scanner: &mut Scanner<'_>) -> Token {
    let start = scanner.pos;
    while let Some(c) = scanner.peek() {
        if c.is_alphanumeric() || c == '_' {
            scanner.advance(c.len_utf8());
        } else {
            break;
        }
    }
    let word = &scanner.src[start..scanner.pos];
    match word {
        "or" => Token::Or,
        "true" | "True" => Token::True,
        "false" | "False" => Token::False,
        "none" | "None" | "null" => Token::None_,
        _ => Token::Ident(word.to_string()),
    }
}

// ============================================================================
// Region parser
// ============================================================================

struct RegionParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> RegionParser<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
        }
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(syntax_error(
                self.source,
                format!("unexpected {} after expression", tok.describe()),
            )),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            let found = match self.peek() {
                Some(tok) => tok.describe(),
                None => "end of region".to_string(),
            };
            Err(syntax_error(
                self.source,
                format!("expected {}, found {}", token.describe(), found),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Ident(name)) => Ok(name),
            Some(tok) => Err(syntax_error(
                self.source,
                format!("expected identifier, found {}", tok.describe()),
            )),
            None => Err(syntax_error(
                self.source,
                "expected identifier, found end of region",
            )),
        }
    }

    /// `expr := pipe ( "or" pipe )*`, left associative.
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_pipe()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_pipe()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    /// `pipe := primary ( "|" IDENT [ "(" args ")" ] )*`
    fn parse_pipe(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Token::Pipe) {
            let name = self.expect_ident()?;
            self.check_helper(&name)?;
            let (mut args, kwargs) = if self.eat(&Token::LParen) {
                self.parse_args()?
            } else {
                (Vec::new(), Vec::new())
            };
            args.insert(0, expr);
            expr = Expr::Apply { name, args, kwargs };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::None_) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    self.check_helper(&name)?;
                    let (args, kwargs) = self.parse_args()?;
                    return Ok(Expr::Apply { name, args, kwargs });
                }
                let mut path = vec![name];
                while self.eat(&Token::Dot) {
                    path.push(self.expect_ident()?);
                }
                Ok(Expr::Path(path))
            }
            Some(tok) => Err(syntax_error(
                self.source,
                format!("expected value, found {}", tok.describe()),
            )),
            None => Err(syntax_error(
                self.source,
                "expected value, found end of region",
            )),
        }
    }

    /// Argument list after a consumed `(`, consuming the closing `)`.
    /// Keyword arguments (`sep=","`) may be mixed with positional ones.
    fn parse_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            // `IDENT =` starts a keyword argument
            if let (Some(Token::Ident(name)), Some(Token::Assign)) =
                (self.peek(), self.tokens.get(self.pos + 1))
            {
                let name = name.clone();
                self.pos += 2;
                kwargs.push((name, self.parse_expr()?));
            } else {
                args.push(self.parse_expr()?);
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            return Ok((args, kwargs));
        }
    }

    fn check_helper(&self, name: &str) -> Result<()> {
        if filters::lookup(name).is_none() {
            return Err(syntax_error(
                self.source,
                format!("unknown filter or function '{name}'"),
            ));
        }
        Ok(())
    }
}
