// SQL lexer - tokenizes SQL statements

use super::token::{SpannedToken, Token};
use crate::error::{SqlError, SqlResult};

pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset of `current_char`
    position: usize,
    current_char: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            current_char: input.chars().next(),
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> SqlResult<Token> {
        Ok(self.next_spanned()?.token)
    }

    /// Get the next token with its byte range
    pub fn next_spanned(&mut self) -> SqlResult<SpannedToken> {
        self.skip_whitespace_and_comments()?;
        let start = self.position;

        let ch = match self.current_char {
            Some(ch) => ch,
            None => {
                return Ok(SpannedToken {
                    token: Token::Eof,
                    start,
                    end: start,
                })
            }
        };

        let token = match ch {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            '=' => self.single(Token::Equal),
            '?' => self.single(Token::Parameter),
            '<' => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::LessEqual
                } else if self.current_char == Some('>') {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Less
                }
            }
            '>' => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '!' => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::NotEqual
                } else {
                    return Err(self.error(start, "unexpected character '!'"));
                }
            }
            '|' => {
                self.advance();
                if self.current_char == Some('|') {
                    self.advance();
                    Token::Concat
                } else {
                    return Err(self.error(start, "unexpected character '|'"));
                }
            }
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            ',' => self.single(Token::Comma),
            ';' => self.single(Token::Semicolon),
            '.' if self.peek().map_or(false, |c| c.is_ascii_digit()) => self.read_number(),
            '.' => self.single(Token::Dot),
            '\'' => self.read_string()?,
            '"' => self.read_quoted_identifier()?,
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            c => return Err(self.error(start, &format!("unexpected character '{}'", c))),
        };

        Ok(SpannedToken {
            token,
            start,
            end: self.position,
        })
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn error(&self, position: usize, message: &str) -> SqlError {
        SqlError::Parse(format!("{} at offset {}", message, position))
    }

    /// Advance to the next character
    fn advance(&mut self) {
        if let Some(ch) = self.current_char {
            self.position += ch.len_utf8();
        }
        self.current_char = self.input[self.position..].chars().next();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        let mut chars = self.input[self.position..].chars();
        chars.next();
        chars.next()
    }

    /// Skip whitespace, `--` line comments and `/* */` block comments
    fn skip_whitespace_and_comments(&mut self) -> SqlResult<()> {
        loop {
            match self.current_char {
                Some(ch) if ch.is_whitespace() => self.advance(),
                Some('-') if self.peek() == Some('-') => {
                    while let Some(ch) = self.current_char {
                        self.advance();
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek() == Some('*') => {
                    let start = self.position;
                    self.advance();
                    self.advance();
                    loop {
                        match self.current_char {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => self.advance(),
                            None => return Err(self.error(start, "unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Read an identifier or keyword. Unquoted identifiers fold to lower
    /// case.
    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                self.advance();
            } else {
                break;
            }
        }
        let identifier = &self.input[start..self.position];

        // Check if it's a keyword
        Token::keyword_from_str(identifier)
            .unwrap_or_else(|| Token::Identifier(identifier.to_lowercase()))
    }

    /// Read a quoted identifier (e.g., "table name"); `""` is a quote
    fn read_quoted_identifier(&mut self) -> SqlResult<Token> {
        let start = self.position;
        self.advance(); // Skip opening quote
        let mut identifier = String::new();

        loop {
            match self.current_char {
                Some('"') if self.peek() == Some('"') => {
                    identifier.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some(ch) => {
                    identifier.push(ch);
                    self.advance();
                }
                None => return Err(self.error(start, "unterminated quoted identifier")),
            }
        }

        if identifier.is_empty() {
            return Err(self.error(start, "empty quoted identifier"));
        }
        Ok(Token::Identifier(identifier))
    }

    /// Read a string literal
    fn read_string(&mut self) -> SqlResult<Token> {
        let start = self.position;
        self.advance(); // Skip opening quote
        let mut string = String::new();

        loop {
            match self.current_char {
                Some('\'') if self.peek() == Some('\'') => {
                    // Escaped single quote
                    string.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => return Err(self.error(start, "unterminated string literal")),
            }
        }

        Ok(Token::String(string))
    }

    /// Read a number: digits, an optional fraction and an optional exponent
    fn read_number(&mut self) -> Token {
        let start = self.position;
        let mut has_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else if (ch == 'e' || ch == 'E') && self.exponent_follows() {
                self.advance();
                if matches!(self.current_char, Some('+') | Some('-')) {
                    self.advance();
                }
                while self.current_char.map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        Token::Number(self.input[start..self.position].to_string())
    }

    fn exponent_follows(&self) -> bool {
        let mut chars = self.input[self.position..].chars().skip(1);
        match chars.next() {
            Some('+') | Some('-') => chars.next().map_or(false, |c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    /// Tokenize the entire input, ending with `Eof`
    pub fn tokenize(&mut self) -> SqlResult<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_spanned()?;
            let done = token.token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}
