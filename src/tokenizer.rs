use std::fmt::Display;

use tracing::trace;

use crate::ast::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Int,
    Float,
    Double,

    // Keywords
    And,
    Class,
    Constructor,
    Else,
    False,
    For,
    Fun,
    If,
    Import,
    New,
    Nil,
    Or,
    Print,
    Private,
    Public,
    Return,
    Static,
    This,
    True,
    While,

    // Type keywords
    TypeInt,
    TypeFloat,
    TypeDouble,
    TypeString,
    TypeBool,
    TypeVoid,

    // End of file
    Eof,
}

impl TokenType {
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TokenType::TypeInt
                | TokenType::TypeFloat
                | TokenType::TypeDouble
                | TokenType::TypeString
                | TokenType::TypeBool
                | TokenType::TypeVoid
        )
    }
}

fn keyword(text: &str) -> Option<TokenType> {
    let token_type = match text {
        "and" => TokenType::And,
        "class" => TokenType::Class,
        "constructor" => TokenType::Constructor,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "import" => TokenType::Import,
        "new" => TokenType::New,
        "nil" => TokenType::Nil,
        "or" => TokenType::Or,
        "print" => TokenType::Print,
        "private" => TokenType::Private,
        "public" => TokenType::Public,
        "return" => TokenType::Return,
        "static" => TokenType::Static,
        "this" => TokenType::This,
        "true" => TokenType::True,
        "while" => TokenType::While,
        "int" => TokenType::TypeInt,
        "float" => TokenType::TypeFloat,
        "double" => TokenType::TypeDouble,
        "string" => TokenType::TypeString,
        "bool" => TokenType::TypeBool,
        "void" => TokenType::TypeVoid,
        _ => return None,
    };
    Some(token_type)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenizeErrorKind {
    #[error("Unexpected character: {0}")]
    UnexpectedCharacter(char),
    #[error("Unterminated string.")]
    UnterminatedString,
    #[error("Unterminated comment.")]
    UnterminatedComment,
    #[error("Invalid number literal '{0}'.")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] Error: {kind}")]
pub struct TokenizeError {
    pub kind: TokenizeErrorKind,
    pub line: usize,
}

#[derive(Debug)]
pub struct TokensError(pub Vec<TokenizeError>);

impl std::error::Error for TokensError {}

impl Display for TokensError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Scans the whole source, requiring it to be free of lexical errors.
pub fn tokens(source: &str) -> Result<Vec<Token>, TokensError> {
    let (tokens, errors) = Tokenizer::new(source).scan();
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(TokensError(errors))
    }
}

pub struct Tokenizer<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: usize,
    errors: Vec<TokenizeError>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            errors: Vec::new(),
        }
    }

    /// Produces every token up to and including `Eof`, together with the
    /// lexical errors met on the way.
    pub fn scan(mut self) -> (Vec<Token>, Vec<TokenizeError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.token();
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        (tokens, self.errors)
    }

    /// Returns the next token. Errors are recorded and scanning moves on,
    /// so this always yields a token and eventually `Eof`.
    pub fn token(&mut self) -> Token {
        loop {
            self.start = self.current;
            let Some(c) = self.advance() else {
                return Token {
                    token_type: TokenType::Eof,
                    lexeme: String::new(),
                    literal: None,
                    line: self.line,
                };
            };

            let token_type = match c {
                '(' => TokenType::LeftParen,
                ')' => TokenType::RightParen,
                '{' => TokenType::LeftBrace,
                '}' => TokenType::RightBrace,
                ',' => TokenType::Comma,
                '.' => TokenType::Dot,
                '-' => TokenType::Minus,
                '+' => TokenType::Plus,
                ';' => TokenType::Semicolon,
                '*' => TokenType::Star,
                '!' => self.either('=', TokenType::BangEqual, TokenType::Bang),
                '=' => self.either('=', TokenType::EqualEqual, TokenType::Equal),
                '<' => self.either('=', TokenType::LessEqual, TokenType::Less),
                '>' => self.either('=', TokenType::GreaterEqual, TokenType::Greater),
                '/' => {
                    if self.matches('/') {
                        self.line_comment();
                        continue;
                    }
                    if self.matches('*') {
                        self.block_comment();
                        continue;
                    }
                    TokenType::Slash
                }
                ' ' | '\r' | '\t' => continue,
                '\n' => {
                    self.line += 1;
                    continue;
                }
                '"' | '\'' => match self.string() {
                    Some(token) => return token,
                    None => continue,
                },
                c if c.is_ascii_digit() => match self.number() {
                    Some(token) => return token,
                    None => continue,
                },
                c if c.is_ascii_alphabetic() || c == '_' => return self.identifier(),
                c => {
                    self.error(TokenizeErrorKind::UnexpectedCharacter(c));
                    continue;
                }
            };

            return self.make(token_type, None);
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += c.len_utf8();
        Some(c)
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.current += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn either(&mut self, expected: char, matched: TokenType, otherwise: TokenType) -> TokenType {
        if self.matches(expected) {
            matched
        } else {
            otherwise
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.start..self.current]
    }

    fn make(&self, token_type: TokenType, literal: Option<Literal>) -> Token {
        Token {
            token_type,
            lexeme: self.lexeme().to_string(),
            literal,
            line: self.line,
        }
    }

    fn error(&mut self, kind: TokenizeErrorKind) {
        trace!(line = self.line, "lexical error: {}", kind);
        self.errors.push(TokenizeError {
            kind,
            line: self.line,
        });
    }

    fn line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn block_comment(&mut self) {
        loop {
            match self.advance() {
                Some('*') if self.matches('/') => return,
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => {
                    self.error(TokenizeErrorKind::UnterminatedComment);
                    return;
                }
            }
        }
    }

    fn string(&mut self) -> Option<Token> {
        let start_line = self.line;
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\n') => self.line += 1,
                Some(_) => {}
                None => {
                    self.error(TokenizeErrorKind::UnterminatedString);
                    return None;
                }
            }
        }

        let lexeme = self.lexeme();
        let value = lexeme[1..lexeme.len() - 1].to_string();
        Some(Token {
            token_type: TokenType::String,
            lexeme: lexeme.to_string(),
            literal: Some(Literal::String(value)),
            line: start_line,
        })
    }

    fn number(&mut self) -> Option<Token> {
        self.digits();

        let mut is_decimal = false;
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.digits();
            is_decimal = true;
        }
        let digits = self.lexeme();

        let token_type = match self.peek() {
            Some('d' | 'D') => {
                self.advance();
                TokenType::Double
            }
            Some('f' | 'F') => {
                self.advance();
                TokenType::Float
            }
            _ if is_decimal => TokenType::Double,
            _ => TokenType::Int,
        };

        let literal = match token_type {
            TokenType::Int => digits.parse().ok().map(Literal::Int),
            TokenType::Float => digits.parse().ok().map(Literal::Float),
            _ => digits.parse().ok().map(Literal::Double),
        };

        match literal {
            Some(literal) => Some(self.make(token_type, Some(literal))),
            None => {
                self.error(TokenizeErrorKind::InvalidNumber(self.lexeme().to_string()));
                None
            }
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn identifier(&mut self) -> Token {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let token_type = keyword(self.lexeme()).unwrap_or(TokenType::Identifier);
        self.make(token_type, None)
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenType::LeftParen => "LEFT_PAREN",
            TokenType::RightParen => "RIGHT_PAREN",
            TokenType::LeftBrace => "LEFT_BRACE",
            TokenType::RightBrace => "RIGHT_BRACE",
            TokenType::Comma => "COMMA",
            TokenType::Dot => "DOT",
            TokenType::Minus => "MINUS",
            TokenType::Plus => "PLUS",
            TokenType::Semicolon => "SEMICOLON",
            TokenType::Slash => "SLASH",
            TokenType::Star => "STAR",
            TokenType::Bang => "BANG",
            TokenType::BangEqual => "BANG_EQUAL",
            TokenType::Equal => "EQUAL",
            TokenType::EqualEqual => "EQUAL_EQUAL",
            TokenType::Greater => "GREATER",
            TokenType::GreaterEqual => "GREATER_EQUAL",
            TokenType::Less => "LESS",
            TokenType::LessEqual => "LESS_EQUAL",
            TokenType::Identifier => "IDENTIFIER",
            TokenType::String => "STRING",
            TokenType::Int => "INT",
            TokenType::Float => "FLOAT",
            TokenType::Double => "DOUBLE",
            TokenType::And => "AND",
            TokenType::Class => "CLASS",
            TokenType::Constructor => "CONSTRUCTOR",
            TokenType::Else => "ELSE",
            TokenType::False => "FALSE",
            TokenType::For => "FOR",
            TokenType::Fun => "FUN",
            TokenType::If => "IF",
            TokenType::Import => "IMPORT",
            TokenType::New => "NEW",
            TokenType::Nil => "NIL",
            TokenType::Or => "OR",
            TokenType::Print => "PRINT",
            TokenType::Private => "PRIVATE",
            TokenType::Public => "PUBLIC",
            TokenType::Return => "RETURN",
            TokenType::Static => "STATIC",
            TokenType::This => "THIS",
            TokenType::True => "TRUE",
            TokenType::While => "WHILE",
            TokenType::TypeInt => "TYPE_INT",
            TokenType::TypeFloat => "TYPE_FLOAT",
            TokenType::TypeDouble => "TYPE_DOUBLE",
            TokenType::TypeString => "TYPE_STRING",
            TokenType::TypeBool => "TYPE_BOOL",
            TokenType::TypeVoid => "TYPE_VOID",
            TokenType::Eof => "EOF",
        };
        write!(f, "{}", name)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.literal {
            Some(literal) => write!(f, "{} {} {}", self.token_type, self.lexeme, literal.fixed()),
            None => write!(f, "{} {} null", self.token_type, self.lexeme),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokens(source)
            .unwrap()
            .into_iter()
            .map(|token| token.token_type)
            .collect()
    }

    #[test]
    fn test_tokens() {
        let tokens = tokens("var x = 1;").unwrap();
        let expected = vec![
            (TokenType::Identifier, "var"),
            (TokenType::Identifier, "x"),
            (TokenType::Equal, "="),
            (TokenType::Int, "1"),
            (TokenType::Semicolon, ";"),
            (TokenType::Eof, ""),
        ];
        let actual: Vec<_> = tokens
            .iter()
            .map(|token| (token.token_type, token.lexeme.as_str()))
            .collect();
        assert_eq!(actual, expected);
        assert_eq!(tokens[3].literal, Some(Literal::Int(1)));
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "int x = 1; // comment\n/* block\ncomment */ x";
        let tokens = tokens(source).unwrap();
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[5].lexeme, "x");
        assert_eq!(tokens[5].line, 3);
    }

    #[test]
    fn test_unterminated_comment() {
        let (tokens, errors) = Tokenizer::new("1 /* never closed").scan();
        assert_eq!(tokens.len(), 2);
        assert_eq!(errors[0].kind, TokenizeErrorKind::UnterminatedComment);
    }

    #[test]
    fn test_tokens_with_string() {
        let tokens = tokens("\"hello\nworld\" x").unwrap();
        assert_eq!(tokens[0].token_type, TokenType::String);
        assert_eq!(
            tokens[0].literal,
            Some(Literal::String("hello\nworld".to_string()))
        );
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_single_quote_only_opens() {
        let source = "'abc\" x";
        let (tokens, errors) = Tokenizer::new(source).scan();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].literal, Some(Literal::String("abc".to_string())));
        let (_, errors) = Tokenizer::new("'abc'").scan();
        assert_eq!(errors[0].kind, TokenizeErrorKind::UnterminatedString);
    }

    #[test]
    fn test_numeric_kinds() {
        let tokens = tokens("1 1.5 2d 2.5f 3F 4D 7.").unwrap();
        let actual: Vec<_> = tokens
            .iter()
            .map(|token| (token.token_type, token.literal.clone()))
            .collect();
        assert_eq!(
            actual,
            vec![
                (TokenType::Int, Some(Literal::Int(1))),
                (TokenType::Double, Some(Literal::Double(1.5))),
                (TokenType::Double, Some(Literal::Double(2.0))),
                (TokenType::Float, Some(Literal::Float(2.5))),
                (TokenType::Float, Some(Literal::Float(3.0))),
                (TokenType::Double, Some(Literal::Double(4.0))),
                (TokenType::Int, Some(Literal::Int(7))),
                (TokenType::Dot, None),
                (TokenType::Eof, None),
            ]
        );
    }

    #[test]
    fn test_comma_separates_arguments() {
        assert_eq!(
            types("f(1,2)"),
            vec![
                TokenType::Identifier,
                TokenType::LeftParen,
                TokenType::Int,
                TokenType::Comma,
                TokenType::Int,
                TokenType::RightParen,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            types("class constructor new public private static import this void int_"),
            vec![
                TokenType::Class,
                TokenType::Constructor,
                TokenType::New,
                TokenType::Public,
                TokenType::Private,
                TokenType::Static,
                TokenType::Import,
                TokenType::This,
                TokenType::TypeVoid,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_double_equal() {
        assert_eq!(
            types("a==b<=c!d"),
            vec![
                TokenType::Identifier,
                TokenType::EqualEqual,
                TokenType::Identifier,
                TokenType::LessEqual,
                TokenType::Identifier,
                TokenType::Bang,
                TokenType::Identifier,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_errors_do_not_stop_scanning() {
        let (tokens, errors) = Tokenizer::new("1 @ 2\n#").scan();
        assert_eq!(tokens.len(), 3);
        assert_eq!(
            errors,
            vec![
                TokenizeError {
                    kind: TokenizeErrorKind::UnexpectedCharacter('@'),
                    line: 1
                },
                TokenizeError {
                    kind: TokenizeErrorKind::UnexpectedCharacter('#'),
                    line: 2
                },
            ]
        );
        assert_eq!(errors[0].to_string(), "[line 1] Error: Unexpected character: @");
    }

    #[test]
    fn test_display() {
        let tokens = tokens("x 42 \"s\" 1.25d").unwrap();
        let lines: Vec<_> = tokens.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "IDENTIFIER x null",
                "INT 42 42.0",
                "STRING \"s\" s",
                "DOUBLE 1.25d 1.25",
                "EOF  null",
            ]
        );
    }

    #[test]
    fn test_lines_non_decreasing() {
        let tokens = tokens("a\nb\n\nc /* x\n */ d").unwrap();
        let lines: Vec<_> = tokens.iter().map(|token| token.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 5, 5]);
    }
}
