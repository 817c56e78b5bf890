use std::rc::Rc;

use super::{callable::NativeFunction, environment::Environment, RuntimeErrorKind, Value};

const NATIVES: [NativeFunction; 2] = [
    NativeFunction {
        name: "clock",
        arity: 0,
        function: clock,
    },
    NativeFunction {
        name: "currentDateTime",
        arity: 0,
        function: current_date_time,
    },
];

pub fn define_natives(environment: &mut Environment) {
    for native in NATIVES {
        environment.define(native.name, Value::Native(Rc::new(native)));
    }
}

/// Seconds since the Unix epoch.
fn clock(_: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::Int(chrono::Utc::now().timestamp()))
}

/// Local time as `dd-mm-yyyy HH:MM:SS`.
fn current_date_time(_: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::String(
        chrono::Local::now().format("%d-%m-%Y %H:%M:%S").to_string(),
    ))
}
