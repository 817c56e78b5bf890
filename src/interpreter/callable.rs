use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::ast::{Expression, FunctionDecl, Literal, Statement};

use super::{
    class::Instance, environment::Environment, Completion, Interpreter, RuntimeError,
    RuntimeErrorKind, Value,
};

/// A user function together with the environment it closes over.
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
}

impl Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.decl.name)
            .field("closure", &self.closure.as_ptr())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

impl Function {
    pub fn new(
        decl: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    /// Wraps the closure in a node that defines `this`.
    pub fn bind(&self, instance: &Rc<RefCell<Instance>>) -> Self {
        let closure = Environment::boxed(Some(self.closure.clone()));
        closure
            .borrow_mut()
            .define("this", Value::Instance(instance.clone()));
        Self {
            closure,
            decl: self.decl.clone(),
            is_initializer: self.is_initializer,
        }
    }

    pub fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let environment = Environment::boxed(Some(self.closure.clone()));
        for (param, value) in self.decl.params.iter().zip(args) {
            environment.borrow_mut().define(param.name.clone(), value);
        }

        let completion = interpreter.execute_block(&self.decl.body, environment)?;

        if self.is_initializer {
            return Ok(self.closure.borrow().get("this").unwrap_or(Value::Nil));
        }

        match completion {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::Nil),
        }
    }
}

pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub function: fn(&[Value]) -> Result<Value, RuntimeErrorKind>,
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}/{}>", self.name, self.arity)
    }
}

/// Declaration-time return check. A `void` function may only `return;`
/// (or `return nil;`), and any other declared type needs at least one
/// `return` somewhere in its body. A dynamic (`fun`) function may return
/// a value or fall off the end. Nested functions are not searched.
pub fn check_returns(decl: &FunctionDecl) -> Result<(), RuntimeErrorKind> {
    if decl.return_type.is_dynamic() {
        return Ok(());
    }

    let mut returns = vec![];
    collect_returns(&decl.body, &mut returns);

    if decl.return_type.is_void() {
        let returns_value = returns
            .iter()
            .any(|value| !matches!(value, None | Some(Expression::Literal(Literal::Nil))));
        if returns_value {
            return Err(RuntimeErrorKind::VoidReturnsValue(decl.name.clone()));
        }
    } else if returns.is_empty() {
        return Err(RuntimeErrorKind::MissingReturn(
            decl.name.clone(),
            decl.return_type.to_string(),
        ));
    }

    Ok(())
}

fn collect_returns<'a>(statements: &'a [Statement], returns: &mut Vec<Option<&'a Expression>>) {
    for statement in statements {
        collect_statement_returns(statement, returns);
    }
}

fn collect_statement_returns<'a>(statement: &'a Statement, returns: &mut Vec<Option<&'a Expression>>) {
    match statement {
        Statement::Return { value, .. } => returns.push(value.as_ref()),
        Statement::Block(statements) => collect_returns(statements, returns),
        Statement::If(_, then_branch, else_branch) => {
            collect_statement_returns(then_branch, returns);
            if let Some(else_branch) = else_branch {
                collect_statement_returns(else_branch, returns);
            }
        }
        Statement::While(_, body) => collect_statement_returns(body, returns),
        _ => {}
    }
}
