//! Free-text query language (`q=` parameter) into [`CriteriaNode`].
//!
//! ```text
//! name like "jo%" AND (age >= 21 OR status in (1, 2)) AND created between 10 and 20
//! ```
//!
//! Keywords are case-insensitive. Any input that does not parse completely is rejected.

use super::{check_depth, ComparisonOp, CriteriaNode, MAX_DEPTH};
use crate::error::AppError;
use serde_json::{Number, Value};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Op(ComparisonOp),
    LParen,
    RParen,
    Comma,
    And,
    Or,
}

fn lex(input: &str) -> Result<Vec<Token>, AppError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(AppError::malformed(format!("unexpected '{}' at {}", c, i)));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (ComparisonOp::Eq, 2),
                    ('=', _) => (ComparisonOp::Eq, 1),
                    ('!', Some('=')) => (ComparisonOp::Ne, 2),
                    ('<', Some('>')) => (ComparisonOp::Ne, 2),
                    ('<', Some('=')) => (ComparisonOp::Lte, 2),
                    ('<', _) => (ComparisonOp::Lt, 1),
                    ('>', Some('=')) => (ComparisonOp::Gte, 2),
                    ('>', _) => (ComparisonOp::Gt, 1),
                    _ => return Err(AppError::malformed(format!("unexpected '{}' at {}", c, i))),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(AppError::malformed("unterminated string literal")),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| AppError::malformed("unterminated string literal"))?;
                            s.push(*escaped);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).map_or(false, |d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&text)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(AppError::malformed(format!("unexpected '{}' at {}", other, i))),
        }
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Number, AppError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(n.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| AppError::malformed(format!("invalid number '{}'", text)))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses around the current position.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), AppError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(AppError::malformed(format!("expected {:?}, found {:?}", want, t))),
            None => Err(AppError::malformed(format!("expected {:?}, found end of input", want))),
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn expr(&mut self) -> Result<CriteriaNode, AppError> {
        let mut operands = vec![self.conjunction()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            operands.push(self.conjunction()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { CriteriaNode::or(operands) })
    }

    fn conjunction(&mut self) -> Result<CriteriaNode, AppError> {
        let mut operands = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            operands.push(self.unary()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { CriteriaNode::and(operands) })
    }

    fn unary(&mut self) -> Result<CriteriaNode, AppError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(AppError::malformed(format!("parentheses nested deeper than {}", MAX_DEPTH)));
            }
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            self.depth -= 1;
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<CriteriaNode, AppError> {
        let field = match self.next() {
            Some(Token::Ident(f)) if !is_reserved(&f) => f,
            Some(t) => return Err(AppError::malformed(format!("expected field name, found {:?}", t))),
            None => return Err(AppError::malformed("expected field name, found end of input")),
        };

        let negated = self.peek_keyword("not");
        if negated {
            self.pos += 1;
        }

        if self.peek_keyword("in") {
            self.pos += 1;
            let list = self.list()?;
            let op = if negated { ComparisonOp::NotIn } else { ComparisonOp::In };
            return Ok(CriteriaNode::compare(op, field, list));
        }
        if self.peek_keyword("like") {
            if negated {
                return Err(AppError::malformed("NOT LIKE is not supported"));
            }
            self.pos += 1;
            return match self.next() {
                Some(Token::Str(s)) => Ok(CriteriaNode::compare(ComparisonOp::Like, field, s)),
                _ => Err(AppError::malformed("like requires a quoted pattern")),
            };
        }
        if negated {
            return Err(AppError::malformed("NOT must be followed by IN"));
        }
        if self.peek_keyword("between") {
            self.pos += 1;
            let from = self.value()?;
            self.expect(Token::And)?;
            let to = self.value()?;
            return Ok(CriteriaNode::between(field, from, to));
        }
        match self.next() {
            Some(Token::Op(op)) => {
                let value = self.value()?;
                Ok(CriteriaNode::compare(op, field, value))
            }
            Some(t) => Err(AppError::malformed(format!("expected operator after '{}', found {:?}", field, t))),
            None => Err(AppError::malformed(format!("expected operator after '{}'", field))),
        }
    }

    fn list(&mut self) -> Result<Value, AppError> {
        self.expect(Token::LParen)?;
        let mut items = vec![self.value()?];
        loop {
            match self.next() {
                Some(Token::Comma) => items.push(self.value()?),
                Some(Token::RParen) => break,
                _ => return Err(AppError::malformed("unterminated list")),
            }
        }
        Ok(Value::Array(items))
    }

    fn value(&mut self) -> Result<Value, AppError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(Value::Number(n)),
            Some(Token::Ident(w)) => Ok(match w.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ if is_reserved(&w) => {
                    return Err(AppError::malformed(format!("unexpected keyword '{}'", w)));
                }
                _ => Value::String(w),
            }),
            Some(t) => Err(AppError::malformed(format!("expected value, found {:?}", t))),
            None => Err(AppError::malformed("expected value, found end of input")),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["not", "in", "like", "between"]
        .iter()
        .any(|kw| word.eq_ignore_ascii_case(kw))
}

/// Parses a free-text filter expression. Blank or partially parseable input is an error.
pub fn parse_query(input: &str) -> Result<CriteriaNode, AppError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(AppError::malformed("empty query"));
    }
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let node = parser.expr()?;
    if let Some(t) = parser.peek() {
        return Err(AppError::malformed(format!("unexpected trailing {:?}", t)));
    }
    check_depth(&node)?;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaNode as C;
    use serde_json::json;

    #[test]
    fn single_comparison() {
        assert_eq!(parse_query("status=1").unwrap(), C::eq("status", 1));
        assert_eq!(parse_query("name = 'Young'").unwrap(), C::eq("name", "Young"));
        assert_eq!(
            parse_query("age >= 30.5").unwrap(),
            C::compare(ComparisonOp::Gte, "age", json!(30.5))
        );
        assert_eq!(
            parse_query("kind <> \"root\"").unwrap(),
            C::compare(ComparisonOp::Ne, "kind", "root")
        );
    }

    #[test]
    fn connectives_are_case_insensitive_with_and_binding_tighter() {
        let parsed = parse_query("a = 1 or B = 2 AnD c = 3").unwrap();
        assert_eq!(
            parsed,
            C::or(vec![C::eq("a", 1), C::and(vec![C::eq("B", 2), C::eq("c", 3)])])
        );
        assert_eq!(parse_query("a=1 && b=2").unwrap(), C::and(vec![C::eq("a", 1), C::eq("b", 2)]));
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            parse_query("(a = 1 or b = 2) and c = 3").unwrap(),
            C::and(vec![C::or(vec![C::eq("a", 1), C::eq("b", 2)]), C::eq("c", 3)])
        );
    }

    #[test]
    fn in_like_between() {
        assert_eq!(
            parse_query("status not in (1, 2)").unwrap(),
            C::compare(ComparisonOp::NotIn, "status", json!([1, 2]))
        );
        assert_eq!(
            parse_query("profile.emails LIKE '%@root.net'").unwrap(),
            C::compare(ComparisonOp::Like, "profile.emails", "%@root.net")
        );
        assert_eq!(parse_query("age between 1 and 9").unwrap(), C::between("age", 1, 9));
    }

    #[test]
    fn literals() {
        assert_eq!(parse_query("enabled = true").unwrap(), C::eq("enabled", true));
        assert_eq!(parse_query("deleted = NULL").unwrap(), C::eq("deleted", Value::Null));
        assert_eq!(parse_query("status = enabled").unwrap(), C::eq("status", "enabled"));
        assert_eq!(parse_query("n = -4").unwrap(), C::eq("n", -4));
    }

    #[test]
    fn fails_closed() {
        for bad in [
            "",
            "   ",
            "status",
            "status =",
            "= 1",
            "a = 1 and",
            "a = 1 b = 2",
            "(a = 1",
            "a = 'open",
            "a in (1, 2",
            "a not like 'x%'",
            "a ! 1",
            "a = 1 | b = 2",
            "$where = 1",
        ] {
            assert!(
                matches!(parse_query(bad), Err(AppError::MalformedCriteria(_))),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = |n: usize| format!("{}a=1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(parse_query(&nested(MAX_DEPTH)).unwrap(), C::eq("a", 1));
        for n in [MAX_DEPTH + 1, 2000, 10_000] {
            assert!(matches!(parse_query(&nested(n)), Err(AppError::MalformedCriteria(_))));
        }

        // Two parentheses and two tree levels per step: the parentheses stay within the
        // limit while the tree ends up one level too deep.
        let mut q = String::from("a=1");
        for _ in 0..MAX_DEPTH / 2 {
            q = format!("b=1 or (c=1 and ({}))", q);
        }
        assert!(matches!(parse_query(&q), Err(AppError::MalformedCriteria(_))));
    }
}
