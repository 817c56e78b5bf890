mod callable;
mod class;
mod environment;
mod imports;
mod natives;
mod operators;
mod value;

use std::{
    cell::RefCell,
    fmt::Debug,
    path::Path,
    rc::Rc,
};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{
    ClassDecl, Expression, InfixOperator, LogicalOperator, Program, Statement, UnaryOperator,
    CONSTRUCTOR,
};

pub use self::{
    callable::{Function, NativeFunction},
    class::{Class, Instance},
    environment::Environment,
    value::Value,
};
use self::{callable::check_returns, imports::Modules};

/// How a statement finished. `Return` unwinds to the enclosing call.
#[derive(Debug)]
pub enum Completion {
    Normal,
    Return(Value),
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}\n[line {line}]")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: usize,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Unsupported operand types for '{operator}': {left} and {right}.")]
    UnsupportedOperands {
        operator: InfixOperator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Cannot assign a value of type {found} to variable '{name}' holding {expected}.")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {found}.")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Can only instantiate classes.")]
    NotAClass,
    #[error("Only instances and classes have properties.")]
    NoProperties,
    #[error("Only instances and classes have fields.")]
    NoFields,
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Static attribute '{name}' is already defined on class '{class}'.")]
    StaticAlreadyDefined { class: String, name: String },
    #[error("Void function '{0}' cannot return a value.")]
    VoidReturnsValue(String),
    #[error("Function '{0}' declared to return {1} has no return statement.")]
    MissingReturn(String, String),
    #[error("Imported file not found: '{0}'.")]
    ImportNotFound(String),
    #[error("Circular import detected: '{0}'.")]
    CircularImport(String),
    #[error("Could not read imported file '{path}': {source}")]
    ImportUnreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("Imported file '{path}' has errors:\n{errors}")]
    ImportInvalid { path: String, errors: String },
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn std::io::Write>>,
    modules: Modules,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals)
            .field("modules", &self.modules)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        let globals = Environment::boxed(None);
        natives::define_natives(&mut globals.borrow_mut());

        Self {
            globals,
            stdout,
            modules: Modules::default(),
        }
    }

    /// Runs a program against the global environment. A top-level
    /// `return` ends the program early.
    pub fn interpret(&mut self, program: &Program) -> Result<(), RuntimeError> {
        debug!(statements = program.0.len(), "interpreting program");
        let globals = self.globals.clone();
        self.execute_all(&program.0, &globals)?;
        Ok(())
    }

    /// Like [`Interpreter::interpret`], with `path` registered as in progress
    /// so that a file importing it back is reported as circular.
    pub fn interpret_file(&mut self, path: &Path, program: &Program) -> Result<(), RuntimeError> {
        let resolved = imports::resolve(path).map_err(|kind| RuntimeError::new(kind, 1))?;
        let fresh = self
            .modules
            .begin(&resolved)
            .map_err(|kind| RuntimeError::new(kind, 1))?;

        let result = self.interpret(program);
        if fresh {
            match result {
                Ok(()) => self.modules.finish(),
                Err(_) => self.modules.abandon(),
            }
        }
        result
    }

    pub fn evaluate_expression(&mut self, expression: &Expression) -> Result<Value, RuntimeError> {
        let globals = self.globals.clone();
        self.evaluate(expression, &globals)
    }

    fn execute_all(
        &mut self,
        statements: &[Statement],
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<Completion, RuntimeError> {
        for statement in statements {
            if let Completion::Return(value) = self.execute(statement, environment)? {
                return Ok(Completion::Return(value));
            }
        }
        Ok(Completion::Normal)
    }

    pub(crate) fn execute_block(
        &mut self,
        statements: &[Statement],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Completion, RuntimeError> {
        self.execute_all(statements, &environment)
    }

    fn execute(
        &mut self,
        statement: &Statement,
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<Completion, RuntimeError> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression, environment)?;
            }
            Statement::Print { expression, line } => {
                let value = self.evaluate(expression, environment)?;
                writeln!(self.stdout.borrow_mut(), "{}", value)
                    .map_err(|e| RuntimeError::new(e.into(), *line))?;
            }
            Statement::VarDeclaration(decl) => {
                let value = match &decl.initializer {
                    Some(initializer) => self.evaluate(initializer, environment)?,
                    None => Value::Nil,
                };
                environment.borrow_mut().define(decl.name.clone(), value);
            }
            Statement::Block(statements) => {
                return self.execute_block(statements, Environment::boxed(Some(environment.clone())));
            }
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition, environment)?.is_truthy() {
                    return self.execute(then_branch, environment);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch, environment);
                }
            }
            Statement::While(condition, body) => {
                while self.evaluate(condition, environment)?.is_truthy() {
                    if let Completion::Return(value) = self.execute(body, environment)? {
                        return Ok(Completion::Return(value));
                    }
                }
            }
            Statement::FunctionDeclaration(decl) => {
                check_returns(decl).map_err(|kind| RuntimeError::new(kind, decl.line))?;
                let function = Function::new(decl.clone(), environment.clone(), false);
                environment
                    .borrow_mut()
                    .define(decl.name.clone(), Value::Function(Rc::new(function)));
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value, environment)?,
                    None => Value::Nil,
                };
                return Ok(Completion::Return(value));
            }
            Statement::ClassDeclaration(decl) => self.declare_class(decl, environment)?,
            Statement::Import { path, line } => self.import(path, *line, environment)?,
        }

        Ok(Completion::Normal)
    }

    fn declare_class(
        &mut self,
        decl: &ClassDecl,
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<(), RuntimeError> {
        environment.borrow_mut().define(decl.name.clone(), Value::Nil);

        let mut methods = FxHashMap::default();
        let mut static_methods = FxHashMap::default();
        for method in &decl.methods {
            let is_initializer = method.function.name == CONSTRUCTOR;
            if !is_initializer {
                check_returns(&method.function)
                    .map_err(|kind| RuntimeError::new(kind, method.function.line))?;
            }
            let function = Rc::new(Function::new(
                method.function.clone(),
                environment.clone(),
                is_initializer,
            ));
            if method.is_static && !is_initializer {
                static_methods.insert(method.function.name.clone(), function);
            } else {
                methods.insert(method.function.name.clone(), function);
            }
        }

        let class = Rc::new(Class::new(decl.name.clone(), methods, static_methods));
        environment
            .borrow_mut()
            .define(decl.name.clone(), Value::Class(class.clone()));

        for attribute in decl.attributes.iter().filter(|attribute| attribute.is_static) {
            let value = match &attribute.var.initializer {
                Some(initializer) => self.evaluate(initializer, environment)?,
                None => Value::Nil,
            };
            class
                .define_static(&attribute.var.name, value)
                .map_err(|kind| RuntimeError::new(kind, attribute.var.line))?;
        }

        debug!(class = %decl.name, methods = decl.methods.len(), "declared class");
        Ok(())
    }

    fn import(
        &mut self,
        path: &str,
        line: usize,
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<(), RuntimeError> {
        let at_line = |kind| RuntimeError::new(kind, line);
        let resolved = imports::resolve(path).map_err(at_line)?;
        if !self.modules.begin(&resolved).map_err(at_line)? {
            return Ok(());
        }

        let result = self.execute_module(&resolved, environment);
        match result {
            Ok(()) => self.modules.finish(),
            Err(_) => self.modules.abandon(),
        }
        result.map_err(|kind| match kind {
            ModuleError::Runtime(error) => error,
            ModuleError::Load(kind) => at_line(kind),
        })
    }

    fn execute_module(
        &mut self,
        path: &Path,
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<(), ModuleError> {
        let display = path.display().to_string();
        if !path.is_file() {
            return Err(ModuleError::Load(RuntimeErrorKind::ImportNotFound(display)));
        }
        let source = std::fs::read_to_string(path).map_err(|source| {
            ModuleError::Load(RuntimeErrorKind::ImportUnreadable {
                path: display.clone(),
                source,
            })
        })?;
        let program = crate::parse_program(&source).map_err(|errors| {
            ModuleError::Load(RuntimeErrorKind::ImportInvalid {
                path: display.clone(),
                errors: errors.to_string(),
            })
        })?;

        self.execute_all(&program.0, environment)
            .map_err(ModuleError::Runtime)?;
        Ok(())
    }

    fn evaluate(
        &mut self,
        expression: &Expression,
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<Value, RuntimeError> {
        match expression {
            Expression::Literal(literal) => Ok(Value::from(literal)),
            Expression::Grouping(expression) => self.evaluate(expression, environment),
            Expression::Unary {
                operator,
                line,
                right,
            } => {
                let right = self.evaluate(right, environment)?;
                match operator {
                    UnaryOperator::Negate => {
                        operators::negate(&right).map_err(|kind| RuntimeError::new(kind, *line))
                    }
                    UnaryOperator::Not => Ok(Value::Boolean(!right.is_truthy())),
                }
            }
            Expression::Binary {
                left,
                operator,
                line,
                right,
            } => {
                let left = self.evaluate(left, environment)?;
                let right = self.evaluate(right, environment)?;
                let result = match operator {
                    InfixOperator::Equal => Ok(Value::Boolean(left.equals(&right))),
                    InfixOperator::NotEqual => Ok(Value::Boolean(!left.equals(&right))),
                    InfixOperator::LessThan
                    | InfixOperator::LessThanOrEqual
                    | InfixOperator::GreaterThan
                    | InfixOperator::GreaterThanOrEqual => {
                        operators::comparison(*operator, &left, &right)
                    }
                    InfixOperator::Plus
                    | InfixOperator::Minus
                    | InfixOperator::Multiply
                    | InfixOperator::Divide => operators::arithmetic(*operator, &left, &right),
                };
                result.map_err(|kind| RuntimeError::new(kind, *line))
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, environment)?;
                let short_circuits = match operator {
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::And => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right, environment)
                }
            }
            Expression::Identifier { name, line } => environment
                .borrow()
                .get(name)
                .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::UndefinedVariable(name.clone()), *line)),
            Expression::Assign { name, line, value } => {
                let value = self.evaluate(value, environment)?;
                environment
                    .borrow_mut()
                    .assign(name, value.clone())
                    .map_err(|kind| RuntimeError::new(kind, *line))?;
                Ok(value)
            }
            Expression::Call { callee, line, args } => {
                let callee = self.evaluate(callee, environment)?;
                let args = self.evaluate_args(args, environment)?;
                self.call(callee, args, *line)
            }
            Expression::Get { object, name, line } => {
                let object = self.evaluate(object, environment)?;
                let result = match object {
                    Value::Instance(instance) => Instance::get(&instance, name),
                    Value::Class(class) => class
                        .get_static(name)
                        .ok_or_else(|| RuntimeErrorKind::UndefinedProperty(name.clone())),
                    _ => Err(RuntimeErrorKind::NoProperties),
                };
                result.map_err(|kind| RuntimeError::new(kind, *line))
            }
            Expression::Set {
                object,
                name,
                line,
                value,
            } => {
                let object = self.evaluate(object, environment)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value, environment)?;
                        instance.borrow_mut().set(name, value.clone());
                        Ok(value)
                    }
                    Value::Class(class) => {
                        let value = self.evaluate(value, environment)?;
                        class
                            .define_static(name, value.clone())
                            .map_err(|kind| RuntimeError::new(kind, *line))?;
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(RuntimeErrorKind::NoFields, *line)),
                }
            }
            Expression::This { line } => environment
                .borrow()
                .get("this")
                .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::UndefinedVariable("this".to_string()), *line)),
            Expression::New { line, call } => {
                let Expression::Call { callee, args, .. } = call.as_ref() else {
                    return Err(RuntimeError::new(RuntimeErrorKind::NotAClass, *line));
                };
                let Value::Class(class) = self.evaluate(callee, environment)? else {
                    return Err(RuntimeError::new(RuntimeErrorKind::NotAClass, *line));
                };
                let args = self.evaluate_args(args, environment)?;
                self.instantiate(&class, args, *line)
            }
        }
    }

    fn evaluate_args(
        &mut self,
        args: &[Expression],
        environment: &Rc<RefCell<Environment>>,
    ) -> Result<Vec<Value>, RuntimeError> {
        args.iter()
            .map(|arg| self.evaluate(arg, environment))
            .collect()
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => {
                check_arity(function.arity(), args.len(), line)?;
                function.call(self, args)
            }
            Value::Native(native) => {
                check_arity(native.arity, args.len(), line)?;
                (native.function)(&args).map_err(|kind| RuntimeError::new(kind, line))
            }
            Value::Class(class) => self.instantiate(&class, args, line),
            _ => Err(RuntimeError::new(RuntimeErrorKind::NotCallable, line)),
        }
    }

    fn instantiate(
        &mut self,
        class: &Rc<Class>,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        check_arity(class.arity(), args.len(), line)?;
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
        if let Some(constructor) = class.constructor() {
            constructor.bind(&instance).call(self, args)?;
        }
        Ok(Value::Instance(instance))
    }
}

enum ModuleError {
    Load(RuntimeErrorKind),
    Runtime(RuntimeError),
}

fn check_arity(expected: usize, found: usize, line: usize) -> Result<(), RuntimeError> {
    if expected == found {
        Ok(())
    } else {
        Err(RuntimeError::new(
            RuntimeErrorKind::ArityMismatch { expected, found },
            line,
        ))
    }
}
