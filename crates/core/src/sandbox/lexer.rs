// Tokenizer for sandbox expressions

use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Int(n) => n.to_string(),
            Token::Float(x) => format!("{:?}", x),
            Token::Ident(name) => format!("'{}'", name),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::DoubleStar => "'**'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// Streaming lexer; the parser pulls one token at a time so errors surface in
/// source order
pub(crate) struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub(crate) fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Next token and the position it starts at
    pub(crate) fn next_token(&mut self) -> Result<(Token, usize), EvalError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok((Token::Eof, start));
        };

        let token = match c {
            '0'..='9' => return self.number(start).map(|t| (t, start)),
            '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                return self.number(start).map(|t| (t, start));
            }
            '.' => return Err(EvalError::Disallowed("attribute access".to_string())),
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                    name.push(c);
                    self.pos += 1;
                }
                return Ok((Token::Ident(name), start));
            }
            '*' if self.peek_at(1) == Some('*') => {
                self.pos += 1;
                Token::DoubleStar
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' if self.peek_at(1) == Some('/') => {
                return Err(EvalError::Disallowed("operator '//'".to_string()));
            }
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '\'' | '"' => return Err(EvalError::Disallowed("string literal".to_string())),
            other => return Err(EvalError::Disallowed(format!("character '{}'", other))),
        };

        self.pos += 1;
        Ok((token, start))
    }

    fn number(&mut self, start: usize) -> Result<Token, EvalError> {
        let mut text = String::new();
        let mut is_float = false;

        self.take_digits(&mut text);
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.pos += 1;
            self.take_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.pos += 1;
            }
            if !self.peek().is_some_and(|d| d.is_ascii_digit()) {
                return Err(EvalError::syntax(start, "malformed exponent"));
            }
            self.take_digits(&mut text);
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(EvalError::syntax(start, "invalid numeric literal"));
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| EvalError::syntax(start, "invalid numeric literal"))
        } else {
            text.parse::<i64>().map(Token::Int).map_err(|_| EvalError::Overflow)
        }
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(d) = self.peek().filter(char::is_ascii_digit) {
            text.push(d);
            self.pos += 1;
        }
    }
}
