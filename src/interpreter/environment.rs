use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use super::{RuntimeErrorKind, Value};

/// A variable's current value and the runtime kind fixed by the first
/// non-nil value it held.
struct Binding {
    value: Value,
    kind: Option<&'static str>,
}

impl Binding {
    fn new(value: Value) -> Self {
        let kind = (!value.is_nil()).then(|| value.kind());
        Self { value, kind }
    }
}

/// One node of the scope chain. Blocks and calls each push a fresh node;
/// closures keep their defining node alive and observe later writes to it.
#[derive(Default)]
pub struct Environment {
    values: FxHashMap<String, Binding>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn boxed(enclosing: Option<Rc<RefCell<Environment>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            values: FxHashMap::default(),
            enclosing,
        }))
    }

    /// Binds `name` in this node, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), Binding::new(value));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.values.get(name) {
            Some(binding.value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            None
        }
    }

    /// Rebinds the nearest `name`. The first non-nil value fixes the
    /// binding's kind; later values must match it, though nil is always
    /// accepted and does not reset the kind.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), RuntimeErrorKind> {
        if let Some(binding) = self.values.get_mut(name) {
            if !value.is_nil() {
                match binding.kind {
                    Some(kind) if kind != value.kind() => {
                        return Err(RuntimeErrorKind::TypeMismatch {
                            name: name.to_string(),
                            expected: kind,
                            found: value.kind(),
                        });
                    }
                    Some(_) => {}
                    None => binding.kind = Some(value.kind()),
                }
            }
            binding.value = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(RuntimeErrorKind::UndefinedVariable(name.to_string()))
        }
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct(format!("Environment<{:?}>", std::ptr::from_ref(self)).as_str())
            .field("names", &names)
            .field("enclosing", &self.enclosing.as_ref().map(|e| e.as_ptr()))
            .finish()
    }
}
