//! Structured query parser.
//!
//! Recognizes `#AND`, `#OR`, `#SUM`, `#WAND w₁ a₁ …`, `#WSUM …`, `#SYN`,
//! `#NEAR/k`, `#WINDOW/k` (operator names are case-insensitive) and
//! field-qualified terms like `apple.title`; unqualified terms default to
//! the `body` field. Positional operators may only contain positional
//! arguments; scoring operators wrap bare terms in `SCORE` nodes. The
//! weighted operators read strictly alternating `weight argument` pairs.

use crate::positional::Iop;
use crate::scoring::Sop;
use crate::Error;

const DEFAULT_FIELD: &str = "body";

#[derive(Debug, PartialEq)]
enum Token {
    Open,
    Close,
    Word(String),
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for ch in input.chars() {
        match ch {
            '(' | ')' => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
                tokens.push(if ch == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }
    tokens
}

enum Node {
    Scoring(Sop),
    Positional(Iop),
}

impl Node {
    fn into_sop(self) -> Sop {
        match self {
            Node::Scoring(sop) => sop,
            Node::Positional(iop) => Sop::score_op(iop),
        }
    }

    fn into_iop(self, op: &str) -> Result<Iop, Error> {
        match self {
            Node::Positional(iop) => Ok(iop),
            Node::Scoring(sop) => Err(Error::QueryParse(format!(
                "{op} operator cannot contain the scoring operator {}",
                sop.op_name()
            ))),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parse a query expression into a scoring operator tree.
pub fn parse_query(input: &str) -> Result<Sop, Error> {
    let mut parser = Parser {
        tokens: tokenize(input),
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(Error::QueryParse("empty query".to_string()));
    }
    let root = parser.parse_node()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::QueryParse(
            "trailing input after query expression".to_string(),
        ));
    }
    Ok(root.into_sop())
}

impl Parser {
    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_is_close(&self) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Close))
    }

    fn expect_open(&mut self, op: &str) -> Result<(), Error> {
        match self.next() {
            Some(Token::Open) => Ok(()),
            _ => Err(Error::QueryParse(format!(
                "{op} operator must be followed by ("
            ))),
        }
    }

    fn parse_node(&mut self) -> Result<Node, Error> {
        match self.next() {
            Some(Token::Word(word)) if word.starts_with('#') => {
                let word = word.clone();
                self.parse_operator(&word)
            }
            Some(Token::Word(word)) => {
                let word = word.clone();
                Ok(Node::Positional(parse_term(&word)?))
            }
            Some(Token::Open) => Err(Error::QueryParse("unexpected (".to_string())),
            Some(Token::Close) | None => {
                Err(Error::QueryParse("expected a term or operator".to_string()))
            }
        }
    }

    fn parse_operator(&mut self, word: &str) -> Result<Node, Error> {
        let body = &word[1..];
        let (name, distance) = match body.split_once('/') {
            Some((name, k)) => {
                let distance: u32 = k.parse().map_err(|_| {
                    Error::QueryParse(format!("bad distance in operator {word}"))
                })?;
                (name.to_ascii_uppercase(), Some(distance))
            }
            None => (body.to_ascii_uppercase(), None),
        };
        if distance.is_some() && name != "NEAR" && name != "WINDOW" {
            return Err(Error::QueryParse(format!(
                "operator {name} does not take a /k distance"
            )));
        }

        self.expect_open(&name)?;
        match name.as_str() {
            "NEAR" | "WINDOW" => {
                let distance = distance.ok_or_else(|| {
                    Error::QueryParse(format!("{name} operator requires a /k distance"))
                })?;
                let children = self.parse_positional_args(&name)?;
                let iop = if name == "NEAR" {
                    Iop::near(distance, children)?
                } else {
                    Iop::window(distance, children)?
                };
                Ok(Node::Positional(iop))
            }
            "SYN" => {
                let children = self.parse_positional_args("SYN")?;
                Ok(Node::Positional(Iop::syn(children)?))
            }
            "AND" => Ok(Node::Scoring(Sop::and(self.parse_scoring_args("AND")?)?)),
            "OR" => Ok(Node::Scoring(Sop::or(self.parse_scoring_args("OR")?)?)),
            "SUM" => Ok(Node::Scoring(Sop::sum(self.parse_scoring_args("SUM")?)?)),
            "WAND" => {
                let (weights, children) = self.parse_weighted_args("WAND")?;
                Ok(Node::Scoring(Sop::wand(weights, children)?))
            }
            "WSUM" => {
                let (weights, children) = self.parse_weighted_args("WSUM")?;
                Ok(Node::Scoring(Sop::wsum(weights, children)?))
            }
            other => Err(Error::QueryParse(format!("unknown operator #{other}"))),
        }
    }

    fn parse_scoring_args(&mut self, op: &str) -> Result<Vec<Sop>, Error> {
        let mut args = Vec::new();
        while !self.peek_is_close() {
            args.push(self.parse_node()?.into_sop());
        }
        self.consume_close(op)?;
        Ok(args)
    }

    fn parse_positional_args(&mut self, op: &str) -> Result<Vec<Iop>, Error> {
        let mut args = Vec::new();
        while !self.peek_is_close() {
            args.push(self.parse_node()?.into_iop(op)?);
        }
        self.consume_close(op)?;
        Ok(args)
    }

    fn parse_weighted_args(&mut self, op: &str) -> Result<(Vec<f64>, Vec<Sop>), Error> {
        let mut weights = Vec::new();
        let mut args = Vec::new();
        while !self.peek_is_close() {
            let weight = match self.next() {
                Some(Token::Word(word)) => word.parse::<f64>().map_err(|_| {
                    Error::QueryParse(format!("{op} operator expected a weight, found {word}"))
                })?,
                _ => {
                    return Err(Error::QueryParse(format!(
                        "{op} operator expected a weight"
                    )))
                }
            };
            weights.push(weight);
            args.push(self.parse_node()?.into_sop());
        }
        self.consume_close(op)?;
        Ok((weights, args))
    }

    fn consume_close(&mut self, op: &str) -> Result<(), Error> {
        match self.next() {
            Some(Token::Close) => Ok(()),
            _ => Err(Error::QueryParse(format!("{op} operator is missing )"))),
        }
    }
}

fn parse_term(word: &str) -> Result<Iop, Error> {
    match word.rsplit_once('.') {
        Some((term, field)) if !term.is_empty() && !field.is_empty() => {
            Ok(Iop::term(term, field))
        }
        Some(_) => Err(Error::QueryParse(format!("malformed term {word}"))),
        None => Ok(Iop::term(word, DEFAULT_FIELD)),
    }
}
