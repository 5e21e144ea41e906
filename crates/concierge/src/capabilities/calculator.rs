use async_trait::async_trait;
use serde_json::{json, Value};

use super::Capability;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

/// Longest expression accepted from the model
const MAX_EXPRESSION_LEN: usize = 1024;
/// Deepest nesting of parentheses, signs and exponents
const MAX_DEPTH: usize = 64;

/// Evaluates arithmetic expressions locally.
pub struct Calculator {
    tool: Tool,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            tool: Tool::new(
                "calculator",
                "Evaluate an arithmetic expression. Supports + - * / ^, parentheses and decimals.",
                json!({
                    "type": "object",
                    "properties": {
                        "expression": {
                            "type": "string",
                            "description": "The expression to evaluate, e.g. (2 + 3) * 4.5"
                        }
                    },
                    "required": ["expression"]
                }),
            ),
        }
    }
}

#[async_trait]
impl Capability for Calculator {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let expression = arguments
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::InvalidParameters("expression parameter required".into()))?;
        if expression.len() > MAX_EXPRESSION_LEN {
            return Err(AgentError::InvalidParameters(format!(
                "expression is longer than {} characters",
                MAX_EXPRESSION_LEN
            )));
        }

        let result = evaluate(expression).map_err(AgentError::InvalidParameters)?;
        if !result.is_finite() {
            return Err(AgentError::ExecutionError(format!(
                "'{}' does not evaluate to a finite number",
                expression
            )));
        }
        Ok(json!({ "expression": expression, "result": result }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", literal))?;
                tokens.push(Token::Number(value));
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '^' => Token::Caret,
                    '(' => Token::Open,
                    ')' => Token::Close,
                    other => return Err(format!("unexpected character '{}'", other)),
                };
                tokens.push(token);
                chars.next();
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

// expr   := term (('+' | '-') term)*
// term   := unary (('*' | '/') unary)*
// unary  := '-' unary | '+' unary | power
// power  := atom ('^' unary)?
// atom   := number | '(' expr ')'
impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Plus => {
                    self.next();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.next();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(token) = self.peek() {
            match token {
                Token::Star => {
                    self.next();
                    value *= self.unary()?;
                }
                Token::Slash => {
                    self.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// Bounds recursion so hostile input fails instead of exhausting the stack
    fn nested<F>(&mut self, rule: F) -> Result<f64, String>
    where
        F: FnOnce(&mut Self) -> Result<f64, String>,
    {
        if self.depth >= MAX_DEPTH {
            return Err("expression is nested too deeply".to_string());
        }
        self.depth += 1;
        let value = rule(self);
        self.depth -= 1;
        value
    }

    fn unary(&mut self) -> Result<f64, String> {
        self.nested(Self::signed)
    }

    fn signed(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.next();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Caret) {
            self.next();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected token {:?}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "unexpected token {:?}",
            parser.tokens[parser.pos]
        ));
    }
    Ok(value)
}
