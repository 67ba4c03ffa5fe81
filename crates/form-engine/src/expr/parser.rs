use serde_json::{Number, Value};

use super::{BinaryOp, Expr, ExprError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Punct(&'static str),
}

// Longest operators first so `===` is not read as `==`.
static PUNCTUATION: [&str; 17] = [
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "-", ".", "[", "]", "(",
    ")",
];

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> ExprError {
        ExprError::Parse {
            expression: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn tokens(mut self) -> Result<Vec<(usize, Token)>, ExprError> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.source[self.offset..].chars().next() {
            let start = self.offset;
            if ch.is_whitespace() {
                self.offset += ch.len_utf8();
            } else if ch == '\'' || ch == '"' {
                tokens.push((start, Token::Str(self.string(ch)?)));
            } else if ch.is_ascii_digit() {
                tokens.push((start, Token::Num(self.number()?)));
            } else if ch.is_alphabetic() || ch == '_' || ch == '$' {
                tokens.push((start, Token::Ident(self.ident())));
            } else if let Some(punct) = PUNCTUATION
                .iter()
                .find(|punct| self.source[start..].starts_with(**punct))
            {
                self.offset += punct.len();
                tokens.push((start, Token::Punct(*punct)));
            } else {
                return Err(self.error(start, format!("unexpected character `{ch}`")));
            }
        }
        Ok(tokens)
    }

    fn string(&mut self, quote: char) -> Result<String, ExprError> {
        let source = self.source;
        let start = self.offset;
        self.offset += quote.len_utf8();
        let mut text = String::new();
        let mut chars = source[self.offset..].chars();
        while let Some(ch) = chars.next() {
            self.offset += ch.len_utf8();
            match ch {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| self.error(start, "unterminated string"))?;
                    self.offset += escaped.len_utf8();
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                ch if ch == quote => return Ok(text),
                ch => text.push(ch),
            }
        }
        Err(self.error(start, "unterminated string"))
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let source = self.source;
        let start = self.offset;
        let rest = &source[start..];
        let len = rest
            .char_indices()
            .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        self.offset += len;
        rest[..len]
            .parse()
            .map_err(|_| self.error(start, format!("invalid number `{}`", &rest[..len])))
    }

    fn ident(&mut self) -> String {
        let source = self.source;
        let rest = &source[self.offset..];
        let len = rest
            .char_indices()
            .find(|(_, ch)| !(ch.is_alphanumeric() || *ch == '_' || *ch == '$'))
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        self.offset += len;
        rest[..len].to_string()
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    position: usize,
}

/// Parses an expression into an [`Expr`] tree.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = Lexer { source, offset: 0 }.tokens()?;
    let mut parser = Parser {
        source,
        tokens,
        position: 0,
    };
    let expr = parser.or()?;
    match parser.tokens.get(parser.position) {
        None => Ok(expr),
        Some((offset, token)) => Err(parser.error_at(*offset, format!("unexpected {token:?}"))),
    }
}

impl Parser<'_> {
    fn error_at(&self, offset: usize, message: impl Into<String>) -> ExprError {
        ExprError::Parse {
            expression: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn end_error(&self) -> ExprError {
        self.error_at(self.source.len(), "unexpected end of expression")
    }

    fn eat(&mut self, punct: &str) -> bool {
        match self.tokens.get(self.position) {
            Some((_, Token::Punct(found))) if *found == punct => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
        if self.eat(punct) {
            return Ok(());
        }
        match self.tokens.get(self.position) {
            Some((offset, token)) => {
                Err(self.error_at(*offset, format!("expected `{punct}`, found {token:?}")))
            }
            None => Err(self.end_error()),
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and()?;
        while self.eat("||") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            left = Expr::And(Box::new(left), Box::new(self.equality()?));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.relational()?;
        loop {
            let op = if self.eat("===") {
                BinaryOp::StrictEq
            } else if self.eat("!==") {
                BinaryOp::StrictNe
            } else if self.eat("==") {
                BinaryOp::LooseEq
            } else if self.eat("!=") {
                BinaryOp::LooseNe
            } else {
                return Ok(left);
            };
            left = binary(op, left, self.relational()?);
        }
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat("<=") {
                BinaryOp::Le
            } else if self.eat(">=") {
                BinaryOp::Ge
            } else if self.eat("<") {
                BinaryOp::Lt
            } else if self.eat(">") {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            left = binary(op, left, self.unary()?);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat("!") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat("-") {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                let name = match self.tokens.get(self.position) {
                    Some((_, Token::Ident(name))) => name.clone(),
                    Some((offset, token)) => {
                        return Err(
                            self.error_at(*offset, format!("expected property name, found {token:?}"))
                        );
                    }
                    None => return Err(self.end_error()),
                };
                self.position += 1;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Box::new(Expr::Literal(Value::String(name))),
                };
            } else if self.eat("[") {
                let property = self.or()?;
                self.expect("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Box::new(property),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some((offset, token)) = self.tokens.get(self.position).cloned() else {
            return Err(self.end_error());
        };
        self.position += 1;
        match token {
            Token::Str(text) => Ok(Expr::Literal(Value::String(text))),
            Token::Num(number) => Ok(Expr::Literal(
                Number::from_f64(number)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let inner = self.or()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct(punct) => Err(self.error_at(offset, format!("unexpected `{punct}`"))),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_binds_comparison_tighter_than_logic() {
        let expr = parse("a.value === 'x' || !b").expect("parse");
        let Expr::Or(left, right) = expr else {
            panic!("expected `||` at the top");
        };
        assert!(matches!(
            *left,
            Expr::Binary {
                op: BinaryOp::StrictEq,
                ..
            }
        ));
        assert!(matches!(*right, Expr::Not(_)));
    }

    #[test]
    fn reports_offset_of_unexpected_token() {
        let err = parse("a.value ) b").unwrap_err();
        match err {
            ExprError::Parse { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let expr = parse(r"'it\'s'").expect("parse");
        assert_eq!(expr, Expr::Literal(Value::String("it's".into())));
    }
}
