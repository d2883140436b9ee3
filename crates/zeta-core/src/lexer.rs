//! Lexer: character stream → tokens.
//!
//! A one-byte-lookahead scanner over ASCII source. Identifiers may contain
//! dots (`fs.GetFiles` is a single identifier, which is how qualified
//! builtin names reach the parser), numbers are digit runs with at most one
//! internal dot flanked by digits on both sides, and strings are
//! double-quoted with no escapes.

use crate::token::{lookup_ident, Token, TokenKind};

pub struct Lexer {
    input: Vec<u8>,
    /// Index of the current character.
    position: usize,
    /// Index of the next character to read.
    read_position: usize,
    ch: u8,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.as_bytes().to_vec(),
            position: 0,
            read_position: 0,
            ch: 0,
        };
        lexer.read_char();
        lexer
    }

    /// Produce the next token, consuming input. At end of input this keeps
    /// returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let token = match self.ch {
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::Eq, "==")
                } else {
                    Token::new(TokenKind::Assign, "=")
                }
            }
            b'+' => Token::new(TokenKind::Plus, "+"),
            b'-' => Token::new(TokenKind::Minus, "-"),
            b'*' => Token::new(TokenKind::Asterisk, "*"),
            // Both slash directions lex as the division operator.
            b'/' | b'\\' => Token::new(TokenKind::Slash, (self.ch as char).to_string()),
            b'<' => Token::new(TokenKind::Lt, "<"),
            b'>' => Token::new(TokenKind::Gt, ">"),
            b'!' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    Token::new(TokenKind::NotEq, "!=")
                } else {
                    Token::new(TokenKind::Bang, "!")
                }
            }
            b'(' => Token::new(TokenKind::Lparen, "("),
            b')' => Token::new(TokenKind::Rparen, ")"),
            b'{' => Token::new(TokenKind::Lbrace, "{"),
            b'}' => Token::new(TokenKind::Rbrace, "}"),
            b'[' => Token::new(TokenKind::Lbracket, "["),
            b']' => Token::new(TokenKind::Rbracket, "]"),
            b',' => Token::new(TokenKind::Comma, ","),
            b':' => Token::new(TokenKind::Colon, ":"),
            b';' => Token::new(TokenKind::Semicolon, ";"),
            b'"' => Token::new(TokenKind::Str, self.read_string()),
            0 => Token::new(TokenKind::Eof, ""),
            _ => {
                if self.ch.is_ascii_alphabetic() {
                    let literal = self.read_identifier();
                    let kind = lookup_ident(&literal);
                    return Token::new(kind, literal);
                }
                if self.ch.is_ascii_digit() {
                    let (literal, is_float) = self.read_number();
                    let kind = if is_float {
                        TokenKind::Float
                    } else {
                        TokenKind::Int
                    };
                    return Token::new(kind, literal);
                }
                Token::new(TokenKind::Illegal, (self.ch as char).to_string())
            }
        };

        self.read_char();
        token
    }

    fn read_char(&mut self) {
        self.ch = if self.read_position >= self.input.len() {
            0
        } else {
            self.input[self.read_position]
        };
        self.position = self.read_position;
        self.read_position += 1;
    }

    fn peek_char(&self) -> u8 {
        if self.read_position >= self.input.len() {
            0
        } else {
            self.input[self.read_position]
        }
    }

    fn prev_char(&self) -> u8 {
        if self.read_position < 2 {
            0
        } else {
            self.input[self.read_position - 2]
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self.ch.is_ascii_alphanumeric() || self.ch == b'_' || self.ch == b'.' {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    /// Read a digit run. A dot is consumed only when flanked by digits on
    /// both sides, and flags the number as a float.
    fn read_number(&mut self) -> (String, bool) {
        let start = self.position;
        let mut is_float = false;
        while self.ch.is_ascii_digit() || self.ch == b'.' {
            if self.ch == b'.' {
                if !(self.prev_char().is_ascii_digit() && self.peek_char().is_ascii_digit()) {
                    break;
                }
                is_float = true;
            }
            self.read_char();
        }
        let literal = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        (literal, is_float)
    }

    /// Read the body of a double-quoted string. The terminating quote is
    /// consumed by the caller; an unterminated string ends at EOF.
    fn read_string(&mut self) -> String {
        let start = self.position + 1;
        loop {
            self.read_char();
            if self.ch == b'"' || self.ch == 0 {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_ascii_whitespace() {
            self.read_char();
        }
    }
}
