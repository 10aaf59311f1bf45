use serde_json::{Number, Value};

/// Evaluates integer and floating point arithmetic with `+ - * / %`, unary
/// signs and parentheses. Anything else is rejected.
pub fn evaluate(expression: &str) -> Result<Value, String> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let result = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("invalid expression '{expression}'"));
    }
    result.into_value()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(value) => value as f64,
            Num::Float(value) => value,
        }
    }

    fn into_value(self) -> Result<Value, String> {
        match self {
            Num::Int(value) => Ok(Value::Number(Number::from(value))),
            Num::Float(value) => Number::from_f64(value)
                .map(Value::Number)
                .ok_or_else(|| "result is not a finite number".to_string()),
        }
    }

    fn apply(self, op: char, other: Num) -> Result<Num, String> {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            let checked = match op {
                '+' => a.checked_add(b),
                '-' => a.checked_sub(b),
                '*' => a.checked_mul(b),
                '/' if b == 0 => return Err("division by zero".to_string()),
                '/' => match a.checked_rem(b) {
                    Some(0) => a.checked_div(b),
                    Some(_) => return Ok(Num::Float(a as f64 / b as f64)),
                    None => None,
                },
                '%' if b == 0 => return Err("modulo by zero".to_string()),
                '%' => a.checked_rem_euclid(b),
                _ => None,
            };
            return checked
                .map(Num::Int)
                .ok_or_else(|| "integer overflow".to_string());
        }
        let (a, b) = (self.as_f64(), other.as_f64());
        let result = match op {
            '+' => a + b,
            '-' => a - b,
            '*' => a * b,
            '/' if b == 0.0 => return Err("division by zero".to_string()),
            '/' => a / b,
            '%' if b == 0.0 => return Err("modulo by zero".to_string()),
            '%' => a.rem_euclid(b),
            _ => return Err(format!("unsupported operator '{op}'")),
        };
        Ok(Num::Float(result))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Num),
    Op(char),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < chars.len() {
        let c = chars[index];
        match c {
            ' ' | '\t' => index += 1,
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                index += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                index += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                index += 1;
            }
            '0'..='9' | '.' => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                let literal: String = chars[start..index].iter().collect();
                tokens.push(Token::Num(parse_literal(&literal)?));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

fn parse_literal(literal: &str) -> Result<Num, String> {
    if let Ok(value) = literal.parse::<i64>() {
        return Ok(Num::Int(value));
    }
    literal
        .parse::<f64>()
        .map(Num::Float)
        .map_err(|_| format!("invalid number '{literal}'"))
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

    fn expression(&mut self) -> Result<Num, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            value = value.apply(op, self.term()?)?;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Num, String> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            value = value.apply(op, self.factor()?)?;
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<Num, String> {
        match self.next() {
            Some(Token::Num(num)) => Ok(num),
            Some(Token::Op('-')) => Num::Int(0).apply('-', self.factor()?),
            Some(Token::Op('+')) => self.factor(),
            Some(Token::Open) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            _ => Err("unexpected end of expression".to_string()),
        }
    }
}
