use std::{cell::RefCell, rc::Rc};

use tracing::debug;

use crate::{
    ast::{
        AttributeDecl, ClassDecl, Expression, FunctionDecl, InfixOperator, Literal,
        LogicalOperator, MethodDecl, Parameter, Program, Statement, TypeName, UnaryOperator,
        VarDecl, Visibility, CONSTRUCTOR,
    },
    tokenizer::{Token, TokenType},
};

const MAX_ARGUMENTS: usize = 255;

#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseErrorWithContext>);

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
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

#[derive(Debug, Clone)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    pub token: Option<Token>,
    rule: &'static str,
    // Length of the token slice at the failure point. Every slice handed
    // around is a suffix of the input, so this locates the failing token.
    remaining: usize,
}

impl ParseErrorWithContext {
    pub fn line(&self) -> usize {
        self.token.as_ref().map_or(0, |token| token.line)
    }

    fn position<'a>(&self, tokens: &'a [Token]) -> &'a [Token] {
        &tokens[tokens.len().saturating_sub(self.remaining)..]
    }
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.token {
            Some(token) if token.token_type != TokenType::Eof => write!(
                f,
                "[line {}] Error at '{}': {}",
                token.line, token.lexeme, self.error
            ),
            _ => write!(f, "[line {}] Error at end: {}", self.line(), self.error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Expect {0}.")]
    Expected(&'static str),
    #[error("Expect expression.")]
    ExpectedExpression,
    #[error("Expect type name.")]
    ExpectedType,
    #[error("Invalid assignment target.")]
    InvalidAssignmentTarget,
    #[error("A class can only have one constructor.")]
    DuplicateConstructor,
    #[error("Method '{0}' is already defined in this class.")]
    DuplicateMethod(String),
    #[error("Attribute '{0}' cannot be of type void.")]
    VoidAttribute(String),
    #[error("Can't have more than 255 arguments.")]
    TooManyArguments,
}

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseErrorWithContext>;

#[derive(Debug)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    errors: RefCell<Vec<ParseErrorWithContext>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(vec![]),
            errors: RefCell::new(vec![]),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn error(&self, error: ParseError, tokens: &[Token]) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            token: tokens.first().cloned(),
            rule: self.stack.borrow().last().copied().unwrap_or("program"),
            remaining: tokens.len(),
        }
    }

    fn report(&self, error: ParseErrorWithContext) {
        debug!(
            rule = error.rule,
            path = self.stack.borrow().join(" > "),
            "{}",
            error
        );
        self.errors.borrow_mut().push(error);
    }

    fn finish<T>(self, value: T) -> Result<T, ParseErrors> {
        let errors = self.errors.into_inner();
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(ParseErrors(errors))
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

/// Parses a whole program. Malformed statements are reported and skipped,
/// so every independent syntax error in the input shows up in one pass.
pub fn program(tokens: &[Token]) -> Result<Program, ParseErrors> {
    let context = ParseContext::new();
    let mut statements = Vec::new();
    let mut tokens = tokens;

    {
        let _guard = context.push("program");
        while !is_at_end(tokens) {
            let (statement, rest) = declaration(&context, tokens);
            statements.extend(statement);
            tokens = rest;
        }
    }

    context.finish(Program(statements))
}

/// Parses the input as one bare expression followed by end of file.
pub fn single_expression(tokens: &[Token]) -> Result<Expression, ParseErrors> {
    let context = ParseContext::new();

    let result = {
        let _guard = context.push("single_expression");
        expression(&context, tokens).and_then(|(expr, rest)| {
            if is_at_end(rest) {
                Ok(expr)
            } else {
                Err(context.error(ParseError::Expected("end of expression"), rest))
            }
        })
    };

    match result {
        Ok(expr) => context.finish(expr),
        Err(error) => {
            context.report(error);
            Err(ParseErrors(context.errors.into_inner()))
        }
    }
}

fn peek(tokens: &[Token]) -> Option<&TokenType> {
    tokens.first().map(Token::token_type)
}

fn check(tokens: &[Token], token_type: TokenType) -> bool {
    peek(tokens) == Some(&token_type)
}

fn is_at_end(tokens: &[Token]) -> bool {
    matches!(peek(tokens), None | Some(TokenType::Eof))
}

fn begins_statement(token_type: &TokenType) -> bool {
    token_type.is_value_type()
        || matches!(
            token_type,
            TokenType::Class
                | TokenType::Fun
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return
                | TokenType::Import
                | TokenType::Identifier
        )
}

/// Discards tokens from the failure point up to the next statement boundary:
/// just past a `;`, or at a token that starts a new statement.
fn synchronize(tokens: &[Token]) -> &[Token] {
    let mut tokens = tokens;
    let mut previous: Option<TokenType> = None;

    while let Some(token) = tokens.first() {
        if token.token_type == TokenType::Eof {
            break;
        }
        match previous {
            Some(TokenType::Semicolon) => break,
            Some(_) if begins_statement(&token.token_type) => break,
            _ => {}
        }
        previous = Some(token.token_type);
        tokens = &tokens[1..];
    }

    tokens
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
    message: &'static str,
) -> Result<&'a [Token], ParseErrorWithContext> {
    if check(tokens, token_type) {
        Ok(&tokens[1..])
    } else {
        Err(context.error(ParseError::Expected(message), tokens))
    }
}

fn match_identifier<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    message: &'static str,
) -> ParseResult<'a, &'a Token> {
    match tokens.first() {
        Some(token) if token.token_type == TokenType::Identifier => Ok((token, &tokens[1..])),
        _ => Err(context.error(ParseError::Expected(message), tokens)),
    }
}

fn declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> (Option<Statement>, &'a [Token]) {
    let _guard = context.push("declaration");
    match declaration_or_statement(context, tokens) {
        Ok((statement, rest)) => (Some(statement), rest),
        Err(error) => {
            let at = error.position(tokens);
            context.report(error);
            let rest = synchronize(at);
            debug!(skipped = at.len() - rest.len(), "synchronized after syntax error");
            (None, rest)
        }
    }
}

fn declaration_or_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    match peek(tokens) {
        Some(TokenType::Import) => import_declaration(context, tokens),
        Some(TokenType::Class) => class_declaration(context, &tokens[1..]),
        Some(TokenType::Fun) => {
            let (name, rest) = match_identifier(context, &tokens[1..], "function name")?;
            let (decl, rest) = function(context, TypeName::Dynamic, name, rest)?;
            Ok((Statement::FunctionDeclaration(Rc::new(decl)), rest))
        }
        _ if starts_typed_declaration(tokens) => typed_declaration(context, tokens),
        _ => statement(context, tokens),
    }
}

/// A value-type keyword, or a user type name directly followed by a name.
fn starts_typed_declaration(tokens: &[Token]) -> bool {
    match (tokens.first(), tokens.get(1)) {
        (Some(first), _) if first.token_type.is_value_type() => true,
        (Some(first), Some(second)) => {
            first.token_type == TokenType::Identifier && second.token_type == TokenType::Identifier
        }
        _ => false,
    }
}

fn type_name<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, TypeName> {
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::ExpectedType, tokens));
    };

    let type_name = match token.token_type {
        TokenType::TypeInt => TypeName::Int,
        TokenType::TypeFloat => TypeName::Float,
        TokenType::TypeDouble => TypeName::Double,
        TokenType::TypeString => TypeName::String,
        TokenType::TypeBool => TypeName::Bool,
        TokenType::TypeVoid => TypeName::Void,
        TokenType::Fun => TypeName::Dynamic,
        TokenType::Identifier if token.lexeme == "var" => TypeName::Dynamic,
        TokenType::Identifier => TypeName::Class(token.lexeme.clone()),
        _ => return Err(context.error(ParseError::ExpectedType, tokens)),
    };

    Ok((type_name, &tokens[1..]))
}

fn typed_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("typed_declaration");
    let (type_name, tokens) = type_name(context, tokens)?;
    let (name, tokens) = match_identifier(context, tokens, "variable name")?;

    if check(tokens, TokenType::LeftParen) {
        let (decl, tokens) = function(context, type_name, name, tokens)?;
        Ok((Statement::FunctionDeclaration(Rc::new(decl)), tokens))
    } else {
        let (decl, tokens) = var_declaration(context, type_name, name, tokens)?;
        Ok((Statement::VarDeclaration(decl), tokens))
    }
}

fn var_declaration<'a>(
    context: &ParseContext,
    type_name: TypeName,
    name: &Token,
    tokens: &'a [Token],
) -> ParseResult<'a, VarDecl> {
    let _guard = context.push("var_declaration");
    let (initializer, tokens) = if check(tokens, TokenType::Equal) {
        let (expr, rest) = expression(context, &tokens[1..])?;
        (Some(expr), rest)
    } else {
        (None, tokens)
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        "';' after variable declaration",
    )?;

    Ok((
        VarDecl {
            type_name,
            name: name.lexeme.clone(),
            line: name.line,
            initializer,
        },
        tokens,
    ))
}

/// Parses a parameter list and body; `tokens` starts at the `(`.
fn function<'a>(
    context: &ParseContext,
    return_type: TypeName,
    name: &Token,
    tokens: &'a [Token],
) -> ParseResult<'a, FunctionDecl> {
    let _guard = context.push("function");
    let mut tokens = consume(context, tokens, TokenType::LeftParen, "'(' after function name")?;

    let mut params = vec![];
    if !check(tokens, TokenType::RightParen) {
        loop {
            let (param, rest) = parameter(context, tokens)?;
            params.push(param);
            tokens = rest;
            if check(tokens, TokenType::Comma) {
                tokens = &tokens[1..];
            } else {
                break;
            }
        }
    }
    let tokens = consume(context, tokens, TokenType::RightParen, "')' after parameters")?;
    let tokens = consume(context, tokens, TokenType::LeftBrace, "'{' before function body")?;
    let (body, tokens) = block(context, tokens)?;

    Ok((
        FunctionDecl {
            return_type,
            name: name.lexeme.clone(),
            line: name.line,
            params,
            body,
        },
        tokens,
    ))
}

fn parameter<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Parameter> {
    let (type_name, tokens) = if starts_typed_declaration(tokens) {
        type_name(context, tokens)?
    } else {
        (TypeName::Dynamic, tokens)
    };
    let (name, tokens) = match_identifier(context, tokens, "parameter name")?;
    Ok((
        Parameter {
            type_name,
            name: name.lexeme.clone(),
        },
        tokens,
    ))
}

fn import_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("import_declaration");
    let line = tokens[0].line;
    let tokens = &tokens[1..];
    let path = match tokens.first() {
        Some(Token {
            token_type: TokenType::String,
            literal: Some(Literal::String(path)),
            ..
        }) => path.clone(),
        _ => return Err(context.error(ParseError::Expected("module path string after 'import'"), tokens)),
    };
    let tokens = consume(context, &tokens[1..], TokenType::Semicolon, "';' after import")?;
    Ok((Statement::Import { path, line }, tokens))
}

fn class_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("class_declaration");
    let (name, tokens) = match_identifier(context, tokens, "class name")?;
    let mut tokens = consume(context, tokens, TokenType::LeftBrace, "'{' before class body")?;

    let mut attributes: Vec<AttributeDecl> = vec![];
    let mut methods: Vec<MethodDecl> = vec![];

    while !check(tokens, TokenType::RightBrace) && !is_at_end(tokens) {
        let visibility = match peek(tokens) {
            Some(TokenType::Public) => Visibility::Public,
            Some(TokenType::Private) => Visibility::Private,
            _ => {
                return Err(context.error(
                    ParseError::Expected("'public' or 'private' before class member"),
                    tokens,
                ))
            }
        };
        let mut rest = &tokens[1..];
        let is_static = check(rest, TokenType::Static);
        if is_static {
            rest = &rest[1..];
        }

        if check(rest, TokenType::Constructor) {
            let keyword = &rest[0];
            let (decl, after) = function(context, TypeName::Void, keyword, &rest[1..])?;
            if methods.iter().any(|method| method.function.name == CONSTRUCTOR) {
                context.report(context.error(ParseError::DuplicateConstructor, rest));
            } else {
                methods.push(MethodDecl {
                    visibility,
                    is_static,
                    function: Rc::new(decl),
                });
            }
            tokens = after;
            continue;
        }

        let (member_type, at_name) = type_name(context, rest)?;
        let (member, after_name) = match_identifier(context, at_name, "member name")?;

        if check(after_name, TokenType::LeftParen) {
            let (decl, after) = function(context, member_type, member, after_name)?;
            if methods.iter().any(|method| method.function.name == decl.name) {
                context.report(context.error(ParseError::DuplicateMethod(decl.name), at_name));
            } else {
                methods.push(MethodDecl {
                    visibility,
                    is_static,
                    function: Rc::new(decl),
                });
            }
            tokens = after;
        } else {
            if member_type.is_void() {
                context.report(context.error(
                    ParseError::VoidAttribute(member.lexeme.clone()),
                    at_name,
                ));
            }
            let (var, after) = var_declaration(context, member_type, member, after_name)?;
            attributes.push(AttributeDecl {
                visibility,
                is_static,
                var,
            });
            tokens = after;
        }
    }

    let tokens = consume(context, tokens, TokenType::RightBrace, "'}' after class body")?;

    Ok((
        Statement::ClassDeclaration(Rc::new(ClassDecl {
            name: name.lexeme.clone(),
            line: name.line,
            attributes,
            methods,
        })),
        tokens,
    ))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("statement");
    match peek(tokens) {
        Some(TokenType::Print) => print_statement(context, tokens),
        Some(TokenType::LeftBrace) => {
            let (statements, rest) = block(context, &tokens[1..])?;
            Ok((Statement::Block(statements), rest))
        }
        Some(TokenType::If) => if_statement(context, &tokens[1..]),
        Some(TokenType::While) => while_statement(context, &tokens[1..]),
        Some(TokenType::For) => for_statement(context, &tokens[1..]),
        Some(TokenType::Return) => return_statement(context, tokens),
        _ => expression_statement(context, tokens),
    }
}

/// Parses declarations up to the closing brace; `tokens` starts after `{`.
fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Statement>> {
    let _guard = context.push("block");
    let mut statements = Vec::new();
    let mut tokens = tokens;

    while !check(tokens, TokenType::RightBrace) && !is_at_end(tokens) {
        let (statement, rest) = declaration(context, tokens);
        statements.extend(statement);
        tokens = rest;
    }

    let tokens = consume(context, tokens, TokenType::RightBrace, "'}' after block")?;
    Ok((statements, tokens))
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("while_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'while'")?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen, "')' after condition")?;
    let (body, tokens) = statement(context, tokens)?;
    Ok((Statement::While(condition, Box::new(body)), tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("if_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'if'")?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen, "')' after if condition")?;
    let (then_branch, tokens) = statement(context, tokens)?;
    if check(tokens, TokenType::Else) {
        let (else_branch, tokens) = statement(context, &tokens[1..])?;
        Ok((
            Statement::If(
                condition,
                Box::new(then_branch),
                Some(Box::new(else_branch)),
            ),
            tokens,
        ))
    } else {
        Ok((
            Statement::If(condition, Box::new(then_branch), None),
            tokens,
        ))
    }
}

fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("for_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen, "'(' after 'for'")?;

    let (initializer, tokens) = match peek(tokens) {
        Some(TokenType::Semicolon) => (None, &tokens[1..]),
        _ if starts_typed_declaration(tokens) => {
            let (type_name, rest) = type_name(context, tokens)?;
            let (name, rest) = match_identifier(context, rest, "variable name")?;
            let (decl, rest) = var_declaration(context, type_name, name, rest)?;
            (Some(Statement::VarDeclaration(decl)), rest)
        }
        _ => {
            let (statement, rest) = expression_statement(context, tokens)?;
            (Some(statement), rest)
        }
    };

    let (condition, tokens) = if check(tokens, TokenType::Semicolon) {
        (Expression::Literal(Literal::Boolean(true)), tokens)
    } else {
        expression(context, tokens)?
    };
    let tokens = consume(context, tokens, TokenType::Semicolon, "';' after loop condition")?;

    let (increment, tokens) = if check(tokens, TokenType::RightParen) {
        (None, tokens)
    } else {
        let (increment, rest) = expression(context, tokens)?;
        (Some(increment), rest)
    };
    let tokens = consume(context, tokens, TokenType::RightParen, "')' after for clauses")?;

    let (body, tokens) = statement(context, tokens)?;
    let body = match increment {
        Some(increment) => Statement::Block(vec![body, Statement::Expression(increment)]),
        None => body,
    };

    let mut statements = Vec::new();
    statements.extend(initializer);
    statements.push(Statement::While(condition, Box::new(body)));
    Ok((Statement::Block(statements), tokens))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("return_statement");
    let line = tokens[0].line;
    let tokens = &tokens[1..];
    let (value, tokens) = if check(tokens, TokenType::Semicolon) {
        (None, tokens)
    } else {
        let (value, rest) = expression(context, tokens)?;
        (Some(value), rest)
    };
    let tokens = consume(context, tokens, TokenType::Semicolon, "';' after return value")?;
    Ok((Statement::Return { value, line }, tokens))
}

fn expression_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("expression_statement");
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::Semicolon, "';' after expression")?;
    Ok((Statement::Expression(expr), tokens))
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("print_statement");
    let line = tokens[0].line;
    let (expression, tokens) = expression(context, &tokens[1..])?;
    let tokens = consume(context, tokens, TokenType::Semicolon, "';' after value")?;
    Ok((Statement::Print { expression, line }, tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("expression");
    assignment(context, tokens)
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (expr, rest) = logical_or(context, tokens)?;

    if !check(rest, TokenType::Equal) {
        return Ok((expr, rest));
    }

    let (value, after) = assignment(context, &rest[1..])?;
    let value = Box::new(value);
    match expr {
        Expression::Identifier { name, line } => Ok((Expression::Assign { name, line, value }, after)),
        Expression::Get { object, name, line } => Ok((
            Expression::Set {
                object,
                name,
                line,
                value,
            },
            after,
        )),
        expr => {
            context.report(context.error(ParseError::InvalidAssignmentTarget, rest));
            Ok((expr, after))
        }
    }
}

fn logical<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    token_type: TokenType,
    operator: LogicalOperator,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while check(tokens, token_type) {
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = Expression::Logical {
            left: Box::new(expr),
            operator,
            right: Box::new(right),
        };
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&TokenType) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token.token_type()) {
            Some(op) => op,
            None => break,
        };
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = Expression::Binary {
            left: Box::new(expr),
            operator: op,
            line: token.line,
            right: Box::new(right),
        };
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_or");
    logical(context, logical_and, TokenType::Or, LogicalOperator::Or, tokens)
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_and");
    logical(context, equality, TokenType::And, LogicalOperator::And, tokens)
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token_type| match token_type {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            _ => None,
        },
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token_type| match token_type {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token_type| match token_type {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token_type| match token_type {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("unary");

    let operator = match peek(tokens) {
        Some(TokenType::Minus) => UnaryOperator::Negate,
        Some(TokenType::Bang) => UnaryOperator::Not,
        _ => return call(context, tokens),
    };

    let line = tokens[0].line;
    let (right, rest) = unary(context, &tokens[1..])?;
    Ok((
        Expression::Unary {
            operator,
            line,
            right: Box::new(right),
        },
        rest,
    ))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    loop {
        match peek(tokens) {
            Some(TokenType::LeftParen) => {
                let line = tokens[0].line;
                let (args, rest) = arguments(context, &tokens[1..])?;
                expr = Expression::Call {
                    callee: Box::new(expr),
                    line,
                    args,
                };
                tokens = rest;
            }
            Some(TokenType::Dot) => {
                let (name, rest) =
                    match_identifier(context, &tokens[1..], "property name after '.'")?;
                expr = Expression::Get {
                    object: Box::new(expr),
                    name: name.lexeme.clone(),
                    line: name.line,
                };
                tokens = rest;
            }
            _ => break,
        }
    }

    Ok((expr, tokens))
}

/// Parses call arguments; `tokens` starts after the `(`.
fn arguments<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Expression>> {
    let mut args = Vec::new();
    let mut tokens = tokens;

    if !check(tokens, TokenType::RightParen) {
        loop {
            if args.len() >= MAX_ARGUMENTS {
                context.report(context.error(ParseError::TooManyArguments, tokens));
            }
            let (arg, rest) = expression(context, tokens)?;
            args.push(arg);
            tokens = rest;
            if check(tokens, TokenType::Comma) {
                tokens = &tokens[1..];
            } else {
                break;
            }
        }
    }

    let tokens = consume(context, tokens, TokenType::RightParen, "')' after arguments")?;
    Ok((args, tokens))
}

/// `new` takes a class reference, optionally qualified with `.name`, and
/// a mandatory argument list.
fn new_expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("new_expression");
    let line = tokens[0].line;
    let (mut callee, mut tokens) = primary(context, &tokens[1..])?;

    while check(tokens, TokenType::Dot) {
        let (name, rest) = match_identifier(context, &tokens[1..], "property name after '.'")?;
        callee = Expression::Get {
            object: Box::new(callee),
            name: name.lexeme.clone(),
            line: name.line,
        };
        tokens = rest;
    }

    if !check(tokens, TokenType::LeftParen) {
        return Err(context.error(ParseError::Expected("constructor call after 'new'"), tokens));
    }
    let call_line = tokens[0].line;
    let (args, tokens) = arguments(context, &tokens[1..])?;

    Ok((
        Expression::New {
            line,
            call: Box::new(Expression::Call {
                callee: Box::new(callee),
                line: call_line,
                args,
            }),
        },
        tokens,
    ))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::ExpectedExpression, tokens));
    };

    match token.token_type {
        TokenType::Int | TokenType::Float | TokenType::Double | TokenType::String => {
            match &token.literal {
                Some(literal) => Ok((Expression::Literal(literal.clone()), &tokens[1..])),
                None => Err(context.error(ParseError::ExpectedExpression, tokens)),
            }
        }
        TokenType::True => Ok((Expression::Literal(Literal::Boolean(true)), &tokens[1..])),
        TokenType::False => Ok((Expression::Literal(Literal::Boolean(false)), &tokens[1..])),
        TokenType::Nil => Ok((Expression::Literal(Literal::Nil), &tokens[1..])),
        TokenType::This => Ok((Expression::This { line: token.line }, &tokens[1..])),
        TokenType::New => new_expression(context, tokens),
        TokenType::Identifier => Ok((
            Expression::Identifier {
                name: token.lexeme.clone(),
                line: token.line,
            },
            &tokens[1..],
        )),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenType::RightParen, "')' after expression")?;
            Ok((Expression::Grouping(Box::new(expr)), tokens))
        }
        _ => Err(context.error(ParseError::ExpectedExpression, tokens)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseErrors> {
        program(&tokens(source).expect("source should tokenize"))
    }

    fn printed(source: &str) -> Vec<String> {
        parse(source)
            .expect("source should parse")
            .0
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn messages(source: &str) -> Vec<String> {
        parse(source)
            .expect_err("source should not parse")
            .0
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_precedence() {
        let expr = single_expression(&tokens("1 + 2 * 3 - -4 / (5)").unwrap()).unwrap();
        assert_eq!(expr.to_string(), "(- (+ 1 (* 2 3)) (/ (- 4) (group 5)))");
    }

    #[test]
    fn test_logical_and_comparison() {
        let expr = single_expression(&tokens("a or b and c == 1 < 2").unwrap()).unwrap();
        assert_eq!(expr.to_string(), "(or a (and b (== c (< 1 2))))");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(printed("a = b = 1;"), vec!["(expr (= a (= b 1)))"]);
        assert_eq!(printed("a.b.c = 2;"), vec!["(expr (= (. (. a b) c) 2))"]);
    }

    #[test]
    fn test_call_chain() {
        assert_eq!(
            printed("a.b().c(d, 1.5);"),
            vec!["(expr (call (. (call (. a b)) c) d 1.5d))"]
        );
    }

    #[test]
    fn test_typed_declarations() {
        assert_eq!(
            printed("int x = 1; var y; Point p = nil; string s = \"hi\";"),
            vec![
                "(var int x 1)",
                "(var var y)",
                "(var Point p nil)",
                "(var string s hi)",
            ]
        );
    }

    #[test]
    fn test_typed_function() {
        assert_eq!(
            printed("int add(int a, b) { return a + b; }"),
            vec!["(fun int add (int a) b (block (return (+ a b))))"]
        );
        assert_eq!(
            printed("fun hello() { print 1; }"),
            vec!["(fun var hello (block (print 1)))"]
        );
    }

    #[test]
    fn test_for_desugars_to_while() {
        assert_eq!(
            printed("for (int i = 0; i < 3; i = i + 1) print i;"),
            vec!["(block (var int i 0) (while (< i 3) (block (print i) (expr (= i (+ i 1))))))"]
        );
        assert_eq!(
            printed("for (;;) print 1;"),
            vec!["(block (while true (print 1)))"]
        );
    }

    #[test]
    fn test_class_members() {
        let source = r#"
        class Counter {
            public static int created = 0;
            private int count;
            public constructor(int start) { this.count = start; }
            public int get() { return this.count; }
            public static Counter make() { return new Counter(0); }
        }
        "#;
        let program = parse(source).unwrap();
        let Statement::ClassDeclaration(class) = &program.0[0] else {
            panic!("expected class declaration");
        };
        assert_eq!(class.name, "Counter");
        assert_eq!(class.attributes.len(), 2);
        assert!(class.attributes[0].is_static);
        assert_eq!(class.attributes[1].visibility, Visibility::Private);
        assert_eq!(class.methods.len(), 3);
        assert_eq!(class.constructor().unwrap().function.params.len(), 1);
        assert!(class.methods[2].is_static);
        assert_eq!(
            class.methods[2].function.to_string(),
            "(fun Counter make (block (return (new (call Counter 0)))))"
        );
    }

    #[test]
    fn test_import() {
        assert_eq!(printed("import \"lib.tl\";"), vec!["(import \"lib.tl\")"]);
    }

    #[test]
    fn test_recovers_and_reports_every_error() {
        let errors = messages("print 1 +; print 2; int = 3; print 4;");
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at ';': Expect expression.",
                "[line 1] Error at '=': Expect variable name.",
            ]
        );
    }

    #[test]
    fn test_malformed_statement_is_omitted() {
        let tokens = tokens("print 1; print (2; print 3;").unwrap();
        let context = ParseContext::new();
        let mut statements = vec![];
        let mut rest = tokens.as_slice();
        while !is_at_end(rest) {
            let (statement, after) = declaration(&context, rest);
            statements.extend(statement);
            rest = after;
        }
        assert_eq!(context.errors.borrow().len(), 1);
        let printed: Vec<_> = statements.iter().map(ToString::to_string).collect();
        assert_eq!(printed, vec!["(print 1)", "(print 3)"]);
    }

    #[test]
    fn test_invalid_assignment_target_keeps_parsing() {
        let errors = messages("1 + 2 = 3; a = ;");
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at '=': Invalid assignment target.",
                "[line 1] Error at ';': Expect expression.",
            ]
        );
    }

    #[test]
    fn test_errors_inside_blocks() {
        let errors = messages("{\n print ;\n print 2;\n}\nprint 3");
        assert_eq!(
            errors,
            vec![
                "[line 2] Error at ';': Expect expression.",
                "[line 5] Error at end: Expect ';' after value.",
            ]
        );
    }

    #[test]
    fn test_duplicate_constructor_and_method() {
        let errors = messages(
            "class A { public constructor() {} public constructor() {} \
             public int f() { return 1; } private int f() { return 2; } }",
        );
        assert_eq!(
            errors,
            vec![
                "[line 1] Error at 'constructor': A class can only have one constructor.",
                "[line 1] Error at 'f': Method 'f' is already defined in this class.",
            ]
        );
    }

    #[test]
    fn test_void_attribute_rejected() {
        let errors = messages("class A { public static void x; }");
        assert_eq!(
            errors,
            vec!["[line 1] Error at 'x': Attribute 'x' cannot be of type void."]
        );
    }

    #[test]
    fn test_member_needs_visibility() {
        let errors = messages("class A { int x; }");
        assert_eq!(
            errors[0],
            "[line 1] Error at 'int': Expect 'public' or 'private' before class member."
        );
    }

    #[test]
    fn test_new_requires_call() {
        let errors = messages("var a = new Foo;");
        assert_eq!(
            errors,
            vec!["[line 1] Error at ';': Expect constructor call after 'new'."]
        );
    }

    #[test]
    fn test_single_expression_rejects_trailing_tokens() {
        let errors = single_expression(&tokens("1 2").unwrap()).unwrap_err();
        assert_eq!(
            errors.to_string(),
            "[line 1] Error at '2': Expect end of expression."
        );
    }

    fn literal_leaves<'a>(expression: &'a Expression, leaves: &mut Vec<&'a Literal>) {
        match expression {
            Expression::Literal(literal) => leaves.push(literal),
            Expression::Grouping(inner) => literal_leaves(inner, leaves),
            Expression::Unary { right, .. } => literal_leaves(right, leaves),
            Expression::Binary { left, right, .. } | Expression::Logical { left, right, .. } => {
                literal_leaves(left, leaves);
                literal_leaves(right, leaves);
            }
            _ => {}
        }
    }

    #[test]
    fn test_printed_literals_match_source_literals() {
        let source = r#"(1 + 1.5) * 2f == "hi" or !nil != true and -3 < false"#;
        let expression =
            single_expression(&tokens(source).unwrap()).expect("expression should parse");
        let mut leaves = vec![];
        literal_leaves(&expression, &mut leaves);
        assert_eq!(leaves.len(), 8);

        let printed = expression.to_string().replace(['(', ')'], " ");
        let operators = ["group", "+", "-", "*", "/", "==", "!=", "<", "!", "and", "or"];
        let atoms: Vec<_> = printed
            .split_whitespace()
            .filter(|atom| !operators.contains(atom))
            .collect();
        assert_eq!(atoms.len(), leaves.len(), "{printed}");

        for (atom, leaf) in atoms.into_iter().zip(leaves) {
            let reparsed = match leaf {
                Literal::Int(_) => Literal::Int(atom.parse().unwrap()),
                Literal::Float(_) => Literal::Float(atom.trim_end_matches('f').parse().unwrap()),
                Literal::Double(_) => Literal::Double(atom.trim_end_matches('d').parse().unwrap()),
                Literal::String(_) => Literal::String(atom.to_string()),
                Literal::Boolean(_) => Literal::Boolean(atom.parse().unwrap()),
                Literal::Nil => {
                    assert_eq!(atom, "nil");
                    Literal::Nil
                }
            };
            assert_eq!(&reparsed, leaf);
        }
    }
}
