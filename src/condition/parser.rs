//! Tokenizer and recursive-descent parser for condition expressions

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, Weekday};

use super::{Condition, ConditionError};

/// Deepest allowed nesting of `!` and parentheses
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
}

fn parse_error(position: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            ',' => {
                chars.next();
                tokens.push((pos, Token::Comma));
            }
            '!' => {
                chars.next();
                tokens.push((pos, Token::Not));
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        tokens.push((pos, if c == '&' { Token::And } else { Token::Or }));
                    }
                    _ => return Err(parse_error(pos, format!("expected '{c}{c}'"))),
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        c => value.push(c),
                    }
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated string"));
                }
                tokens.push((pos, Token::Str(value)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(ident)));
            }
            c => return Err(parse_error(pos, format!("unexpected character '{c}'"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(p, _)| *p)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ConditionError> {
        let position = self.position();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(parse_error(position, format!("expected {what}"))),
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(parse_error(self.position(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Condition, ConditionError> {
        let mut terms = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            terms.push(self.and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::Any(terms)
        })
    }

    fn and(&mut self) -> Result<Condition, ConditionError> {
        let mut terms = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Condition::All(terms)
        })
    }

    fn unary(&mut self) -> Result<Condition, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Condition, ConditionError> {
        let position = self.position();
        match self.next() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Condition::Literal(true)),
                "false" => Ok(Condition::Literal(false)),
                _ => {
                    let args = self.arguments()?;
                    call(&ident, args, position)
                }
            },
            Some(_) => Err(parse_error(position, "expected a condition")),
            None => Err(parse_error(position, "unexpected end of expression")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<String>, ConditionError> {
        self.expect(Token::LParen, "'(' after function name")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            let position = self.position();
            match self.next() {
                Some(Token::Str(value)) => args.push(value),
                _ => return Err(parse_error(position, "expected a string argument")),
            }
            let position = self.position();
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(parse_error(position, "expected ',' or ')'")),
            }
        }
    }
}

fn parse_time(value: &str, position: usize) -> Result<NaiveTime, ConditionError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| parse_error(position, format!("invalid time '{value}', expected HH:MM[:SS]")))
}

fn arity(
    name: &str,
    args: &[String],
    expected: usize,
    position: usize,
) -> Result<(), ConditionError> {
    if args.len() != expected {
        return Err(parse_error(
            position,
            format!("{name}() takes {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn call(name: &str, args: Vec<String>, position: usize) -> Result<Condition, ConditionError> {
    match name {
        "after" => {
            arity(name, &args, 1, position)?;
            Ok(Condition::After(parse_time(&args[0], position)?))
        }
        "before" => {
            arity(name, &args, 1, position)?;
            Ok(Condition::Before(parse_time(&args[0], position)?))
        }
        "between" => {
            arity(name, &args, 2, position)?;
            Ok(Condition::Between(
                parse_time(&args[0], position)?,
                parse_time(&args[1], position)?,
            ))
        }
        "weekday" => {
            if args.is_empty() {
                return Err(parse_error(position, "weekday() needs at least one day"));
            }
            let days = args
                .iter()
                .map(|day| {
                    day.parse::<Weekday>()
                        .map_err(|_| parse_error(position, format!("invalid weekday '{day}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::Weekday(days))
        }
        "date" => {
            arity(name, &args, 1, position)?;
            let date = NaiveDate::parse_from_str(&args[0], "%Y-%m-%d").map_err(|_| {
                parse_error(position, format!("invalid date '{}', expected YYYY-MM-DD", args[0]))
            })?;
            Ok(Condition::Date(date))
        }
        "file_exists" => {
            arity(name, &args, 1, position)?;
            Ok(Condition::FileExists(PathBuf::from(&args[0])))
        }
        "process_running" => {
            arity(name, &args, 1, position)?;
            if args[0].trim().is_empty() {
                return Err(parse_error(position, "process_running() needs a process name"));
            }
            Ok(Condition::ProcessRunning(args[0].clone()))
        }
        other => Err(parse_error(position, format!("unknown function '{other}'"))),
    }
}

/// Parse an expression into a [`Condition`] tree
pub fn parse(input: &str) -> Result<Condition, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        depth: 0,
    };
    let condition = parser.or()?;
    if parser.cursor != parser.tokens.len() {
        return Err(parse_error(parser.position(), "unexpected trailing input"));
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals_and_operators() {
        let cond = parse("true && !false || false").unwrap();
        assert_eq!(
            cond,
            Condition::Any(vec![
                Condition::All(vec![
                    Condition::Literal(true),
                    Condition::Not(Box::new(Condition::Literal(false))),
                ]),
                Condition::Literal(false),
            ])
        );
    }

    #[test]
    fn test_parse_calls() {
        let cond = parse(r#"between("22:00", "06:30") && weekday("sat", "Sunday")"#).unwrap();
        assert_eq!(
            cond,
            Condition::All(vec![
                Condition::Between(
                    NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
                ),
                Condition::Weekday(vec![Weekday::Sat, Weekday::Sun]),
            ])
        );
    }

    #[test]
    fn test_parse_escaped_string() {
        let cond = parse(r#"file_exists("/tmp/a \"quoted\" name")"#).unwrap();
        assert_eq!(
            cond,
            Condition::FileExists(PathBuf::from("/tmp/a \"quoted\" name"))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for input in [
            "",
            "   ",
            "true &",
            "true false",
            "(true",
            "after(\"25:00\")",
            "after()",
            "between(\"10:00\")",
            "weekday(\"funday\")",
            "date(\"2024-13-01\")",
            "process_running(\"\")",
            "os.system(\"rm\")",
            "eval(\"1\")",
            "\"unterminated",
        ] {
            assert!(parse(input).is_err(), "expected parse failure for {input:?}");
        }
    }

    #[test]
    fn test_parse_nesting_cap() {
        let deep = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        let err = parse(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));

        let shallow = format!("{}true{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse(&shallow).unwrap(), Condition::Literal(true));
    }
}
