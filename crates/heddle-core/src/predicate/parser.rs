//! Lexer and recursive-descent parser for edge predicates.
//!
//! Grammar:
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | cmp
//! cmp     := operand (("==" | "!=" | "<" | "<=" | ">" | ">=") operand)?
//! operand := literal | path | "(" expr ")"
//! path    := "results" ("[" (string | int) "]" | "." ident)*
//! literal := number | string | "true" | "false" | "null"
//! ```

use serde_json::Value;

use super::PredicateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
    Literal(Value),
    /// Access path below the `results` root.
    Path(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Op(CmpOp),
    And,
    Or,
    Not,
}

const ROOT: &str = "results";

/// Upper bound on `not`, `and`, `or` and parentheses in one predicate. It
/// bounds the height of the expression tree, and with it the recursion of
/// both the parser and the evaluator.
pub const MAX_NESTING: usize = 64;

pub fn parse(source: &str) -> Result<Expr, PredicateError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some((pos, tok)) => Err(PredicateError::parse(*pos, format!("unexpected {tok:?}"))),
    }
}

fn lex(source: &str) -> Result<Vec<(usize, Token)>, PredicateError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '.' => Token::Dot,
            '=' if next == Some('=') => {
                i += 1;
                Token::Op(CmpOp::Eq)
            }
            '!' if next == Some('=') => {
                i += 1;
                Token::Op(CmpOp::Ne)
            }
            '!' => Token::Not,
            '<' if next == Some('=') => {
                i += 1;
                Token::Op(CmpOp::Le)
            }
            '<' => Token::Op(CmpOp::Lt),
            '>' if next == Some('=') => {
                i += 1;
                Token::Op(CmpOp::Ge)
            }
            '>' => Token::Op(CmpOp::Gt),
            '&' if next == Some('&') => {
                i += 1;
                Token::And
            }
            '|' if next == Some('|') => {
                i += 1;
                Token::Or
            }
            '\'' | '"' => {
                let (s, end) = lex_string(&chars, i)?;
                i = end;
                Token::Str(s)
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|d| d.is_ascii_digit())) => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let text: String = chars[i..end].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| PredicateError::parse(start, format!("bad number {text:?}")))?;
                i = end - 1;
                Token::Number(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                i = end - 1;
                match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(PredicateError::parse(start, format!("unexpected character {other:?}")));
            }
        };
        tokens.push((start, token));
        i += 1;
    }
    Ok(tokens)
}

/// Returns the unescaped string and the index of its closing quote.
fn lex_string(chars: &[char], open: usize) -> Result<(String, usize), PredicateError> {
    let quote = chars[open];
    let mut out = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| PredicateError::parse(i, "dangling escape"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(PredicateError::parse(open, "unterminated string"))
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    /// Nesting constructs seen so far, see [`MAX_NESTING`].
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.peek()
            .map(|(p, _)| *p)
            .or_else(|| self.tokens.last().map(|(p, _)| p + 1))
            .unwrap_or(0)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), PredicateError> {
        let at = self.offset();
        match self.bump() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(PredicateError::parse(at, format!("expected {want:?}, found {tok:?}"))),
            None => Err(PredicateError::parse(at, format!("expected {want:?}, found end of input"))),
        }
    }

    fn nest(&mut self, at: usize) -> Result<(), PredicateError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(PredicateError::parse(
                at,
                format!("predicate nests deeper than {MAX_NESTING} levels"),
            ));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.and()?;
        while self.peek_token() == Some(&Token::Or) {
            self.nest(self.offset())?;
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.not()?;
        while self.peek_token() == Some(&Token::And) {
            self.nest(self.offset())?;
            self.pos += 1;
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, PredicateError> {
        if self.peek_token() == Some(&Token::Not) {
            self.nest(self.offset())?;
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, PredicateError> {
        let lhs = self.operand()?;
        if let Some(Token::Op(op)) = self.peek_token() {
            let op = *op;
            self.pos += 1;
            let rhs = self.operand()?;
            return Ok(Expr::Cmp(Box::new(lhs), op, Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn operand(&mut self) -> Result<Expr, PredicateError> {
        let at = self.offset();
        match self.bump() {
            Some(Token::LParen) => {
                self.nest(at)?;
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Expr::Literal(number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                ROOT => self.path(),
                other => Err(PredicateError::parse(
                    at,
                    format!("unknown name {other:?}, paths must start with `{ROOT}`"),
                )),
            },
            Some(tok) => Err(PredicateError::parse(at, format!("unexpected {tok:?}"))),
            None => Err(PredicateError::parse(at, "unexpected end of input")),
        }
    }

    fn path(&mut self) -> Result<Expr, PredicateError> {
        let mut segments = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let at = self.offset();
                    let segment = match self.bump() {
                        Some(Token::Str(key)) => Segment::Key(key),
                        Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                            Segment::Index(n as usize)
                        }
                        other => {
                            return Err(PredicateError::parse(
                                at,
                                format!("expected string key or index, found {other:?}"),
                            ));
                        }
                    };
                    self.expect(Token::RBracket)?;
                    segments.push(segment);
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let at = self.offset();
                    match self.bump() {
                        Some(Token::Ident(field)) => segments.push(Segment::Key(field)),
                        other => {
                            return Err(PredicateError::parse(
                                at,
                                format!("expected field name, found {other:?}"),
                            ));
                        }
                    }
                }
                _ => return Ok(Expr::Path(segments)),
            }
        }
    }
}

/// Integral literals become JSON integers so `== 1` compares cleanly.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_indexed_comparison() {
        let expr = parse("results['A']['v']==1").unwrap();
        assert_eq!(
            expr,
            Expr::Cmp(
                Box::new(Expr::Path(vec![
                    Segment::Key("A".into()),
                    Segment::Key("v".into())
                ])),
                CmpOp::Eq,
                Box::new(Expr::Literal(json!(1))),
            )
        );
    }

    #[test]
    fn dotted_and_numeric_segments() {
        let expr = parse("results.build.items[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Path(vec![
                Segment::Key("build".into()),
                Segment::Key("items".into()),
                Segment::Index(0),
            ])
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("true or false and false").unwrap();
        assert!(matches!(expr, Expr::Or(_, rhs) if matches!(*rhs, Expr::And(_, _))));
    }

    #[test]
    fn symbolic_connectives() {
        assert_eq!(
            parse("!true && false || true").unwrap(),
            parse("not true and false or true").unwrap()
        );
    }

    #[test]
    fn string_escapes() {
        let expr = parse(r#""a\"b""#).unwrap();
        assert_eq!(expr, Expr::Literal(json!("a\"b")));
    }

    #[test]
    fn negative_and_fractional_numbers() {
        assert_eq!(parse("-2").unwrap(), Expr::Literal(json!(-2)));
        assert_eq!(parse("0.5").unwrap(), Expr::Literal(json!(0.5)));
    }

    #[test]
    fn rejects_unknown_root() {
        let err = parse("os.system('rm')").unwrap_err();
        assert!(err.to_string().contains("unknown name"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(parse("true true").is_err());
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(parse("results['A").is_err());
    }

    #[test]
    fn rejects_single_equals() {
        assert!(parse("results['A'] = 1").is_err());
    }
}
