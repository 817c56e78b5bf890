use std::{cell::RefCell, collections::hash_map::Entry, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use crate::ast::CONSTRUCTOR;

use super::{callable::Function, RuntimeErrorKind, Value};

pub struct Class {
    pub name: String,
    methods: FxHashMap<String, Rc<Function>>,
    static_methods: FxHashMap<String, Rc<Function>>,
    statics: RefCell<FxHashMap<String, Value>>,
}

impl Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut statics: Vec<_> = self.statics.borrow().keys().cloned().collect();
        statics.sort();
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("static_methods", &self.static_methods.keys().collect::<Vec<_>>())
            .field("statics", &statics)
            .finish()
    }
}

impl Class {
    pub fn new(
        name: String,
        methods: FxHashMap<String, Rc<Function>>,
        static_methods: FxHashMap<String, Rc<Function>>,
    ) -> Self {
        Self {
            name,
            methods,
            static_methods,
            statics: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn constructor(&self) -> Option<&Rc<Function>> {
        self.methods.get(CONSTRUCTOR)
    }

    /// Argument count expected by `new`.
    pub fn arity(&self) -> usize {
        self.constructor().map_or(0, |constructor| constructor.arity())
    }

    /// Method lookup for instances, which see static methods as well.
    pub fn find_method(&self, name: &str) -> Option<&Rc<Function>> {
        self.methods
            .get(name)
            .or_else(|| self.static_methods.get(name))
    }

    /// Static attribute or unbound static method.
    pub fn get_static(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.statics.borrow().get(name) {
            return Some(value.clone());
        }
        self.static_methods
            .get(name)
            .map(|method| Value::Function(method.clone()))
    }

    /// Records a static attribute. Each name can be recorded once.
    pub fn define_static(&self, name: &str, value: Value) -> Result<(), RuntimeErrorKind> {
        match self.statics.borrow_mut().entry(name.to_string()) {
            Entry::Occupied(_) => Err(RuntimeErrorKind::StaticAlreadyDefined {
                class: self.name.clone(),
                name: name.to_string(),
            }),
            Entry::Vacant(v) => {
                v.insert(value);
                Ok(())
            }
        }
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: FxHashMap<String, Value>,
}

impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: FxHashMap::default(),
        }
    }

    /// Field lookup, falling back to a method bound to `instance`.
    pub fn get(instance: &Rc<RefCell<Instance>>, name: &str) -> Result<Value, RuntimeErrorKind> {
        if let Some(value) = instance.borrow().fields.get(name) {
            return Ok(value.clone());
        }

        let class = instance.borrow().class.clone();
        match class.find_method(name) {
            Some(method) => Ok(Value::Function(Rc::new(method.bind(instance)))),
            None => Err(RuntimeErrorKind::UndefinedProperty(name.to_string())),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
