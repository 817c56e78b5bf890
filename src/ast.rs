use std::{fmt::Display, rc::Rc};

/// Name of the method that acts as a class initializer.
pub const CONSTRUCTOR: &str = "constructor";

#[derive(Debug, Clone)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expression),
    Print {
        expression: Expression,
        line: usize,
    },
    VarDeclaration(VarDecl),
    Block(Vec<Statement>),
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    While(Expression, Box<Statement>),
    FunctionDeclaration(Rc<FunctionDecl>),
    Return {
        value: Option<Expression>,
        line: usize,
    },
    ClassDeclaration(Rc<ClassDecl>),
    Import {
        path: String,
        line: usize,
    },
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Grouping(Box<Expression>),
    Unary {
        operator: UnaryOperator,
        line: usize,
        right: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        operator: InfixOperator,
        line: usize,
        right: Box<Expression>,
    },
    Logical {
        left: Box<Expression>,
        operator: LogicalOperator,
        right: Box<Expression>,
    },
    Identifier {
        name: String,
        line: usize,
    },
    Assign {
        name: String,
        line: usize,
        value: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        line: usize,
        args: Vec<Expression>,
    },
    Get {
        object: Box<Expression>,
        name: String,
        line: usize,
    },
    Set {
        object: Box<Expression>,
        name: String,
        line: usize,
        value: Box<Expression>,
    },
    This {
        line: usize,
    },
    New {
        line: usize,
        call: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f32),
    Double(f64),
    String(String),
    Boolean(bool),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Declared type of a variable, parameter, attribute or function result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Int,
    Float,
    Double,
    String,
    Bool,
    Void,
    /// `var` on variables, `fun` on functions, or an untyped parameter.
    Dynamic,
    Class(String),
}

impl TypeName {
    pub fn is_void(&self) -> bool {
        matches!(self, TypeName::Void)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, TypeName::Dynamic)
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub type_name: TypeName,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub type_name: TypeName,
    pub name: String,
    pub line: usize,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub return_type: TypeName,
    pub name: String,
    pub line: usize,
    pub params: Vec<Parameter>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub visibility: Visibility,
    pub is_static: bool,
    pub var: VarDecl,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub visibility: Visibility,
    pub is_static: bool,
    pub function: Rc<FunctionDecl>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub line: usize,
    pub attributes: Vec<AttributeDecl>,
    pub methods: Vec<MethodDecl>,
}

impl ClassDecl {
    pub fn constructor(&self) -> Option<&MethodDecl> {
        self.methods
            .iter()
            .find(|method| method.function.name == CONSTRUCTOR)
    }
}

impl Literal {
    /// Renders numbers with at least one decimal, the way `tokenize` echoes them.
    pub fn fixed(&self) -> String {
        match self {
            Literal::Int(n) => format!("{n}.0"),
            Literal::Float(n) => fixed_float(*n),
            Literal::Double(n) => fixed_double(*n),
            other => other.to_string(),
        }
    }
}

fn fixed_double(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

fn fixed_float(n: f32) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "(expr {})", expr),
            Statement::Print { expression, .. } => write!(f, "(print {})", expression),
            Statement::VarDeclaration(decl) => write!(f, "{}", decl),
            Statement::Block(statements) => {
                write!(f, "(block")?;
                for statement in statements {
                    write!(f, " {}", statement)?;
                }
                write!(f, ")")
            }
            Statement::If(condition, then_branch, else_branch) => {
                write!(f, "(if {} {}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " {}", else_branch)?;
                }
                write!(f, ")")
            }
            Statement::While(condition, body) => write!(f, "(while {} {})", condition, body),
            Statement::FunctionDeclaration(decl) => write!(f, "{}", decl),
            Statement::Return { value, .. } => match value {
                Some(value) => write!(f, "(return {})", value),
                None => write!(f, "(return)"),
            },
            Statement::ClassDeclaration(decl) => write!(f, "{}", decl),
            Statement::Import { path, .. } => write!(f, "(import \"{}\")", path),
        }
    }
}

impl Display for VarDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(var {} {}", self.type_name, self.name)?;
        if let Some(initializer) = &self.initializer {
            write!(f, " {}", initializer)?;
        }
        write!(f, ")")
    }
}

impl Display for FunctionDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(fun {} {}", self.return_type, self.name)?;
        for param in &self.params {
            if param.type_name.is_dynamic() {
                write!(f, " {}", param.name)?;
            } else {
                write!(f, " ({} {})", param.type_name, param.name)?;
            }
        }
        write!(f, " (block")?;
        for statement in &self.body {
            write!(f, " {}", statement)?;
        }
        write!(f, "))")
    }
}

impl Display for ClassDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(class {}", self.name)?;
        for attribute in &self.attributes {
            write!(f, " (attribute {}", attribute.visibility)?;
            if attribute.is_static {
                write!(f, " static")?;
            }
            write!(f, " {})", attribute.var)?;
        }
        for method in &self.methods {
            write!(f, " (method {}", method.visibility)?;
            if method.is_static {
                write!(f, " static")?;
            }
            write!(f, " {})", method.function)?;
        }
        write!(f, ")")
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Grouping(expr) => write!(f, "(group {})", expr),
            Expression::Unary {
                operator, right, ..
            } => write!(f, "({} {})", operator, right),
            Expression::Binary {
                left,
                operator,
                right,
                ..
            } => write!(f, "({} {} {})", operator, left, right),
            Expression::Logical {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", operator, left, right),
            Expression::Identifier { name, .. } => write!(f, "{}", name),
            Expression::Assign { name, value, .. } => write!(f, "(= {} {})", name, value),
            Expression::Call { callee, args, .. } => {
                write!(f, "(call {}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Get { object, name, .. } => write!(f, "(. {} {})", object, name),
            Expression::Set {
                object,
                name,
                value,
                ..
            } => write!(f, "(= (. {} {}) {})", object, name, value),
            Expression::This { .. } => write!(f, "this"),
            Expression::New { call, .. } => write!(f, "(new {})", call),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}f", n),
            Literal::Double(n) => write!(f, "{}d", n),
            Literal::String(s) => write!(f, "{}", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
        }
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "and"),
            LogicalOperator::Or => write!(f, "or"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

impl Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Int => write!(f, "int"),
            TypeName::Float => write!(f, "float"),
            TypeName::Double => write!(f, "double"),
            TypeName::String => write!(f, "string"),
            TypeName::Bool => write!(f, "bool"),
            TypeName::Void => write!(f, "void"),
            TypeName::Dynamic => write!(f, "var"),
            TypeName::Class(name) => write!(f, "{}", name),
        }
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}
