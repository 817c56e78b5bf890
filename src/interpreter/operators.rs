use crate::ast::InfixOperator;

use super::{RuntimeErrorKind, Value};

/// `+ - * /`. Defined for int/double pairings, plus string concatenation.
/// Dividing an int by a double truncates the divisor and stays integral;
/// every other mixed pairing promotes to double.
pub fn arithmetic(
    operator: InfixOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, RuntimeErrorKind> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(operator, *a, *b),
        (Value::Int(a), Value::Double(b)) if operator == InfixOperator::Divide => {
            int_arithmetic(operator, *a, b.trunc() as i64)
        }
        (Value::Int(a), Value::Double(b)) => double_arithmetic(operator, *a as f64, *b),
        (Value::Double(a), Value::Int(b)) => double_arithmetic(operator, *a, *b as f64),
        (Value::Double(a), Value::Double(b)) => double_arithmetic(operator, *a, *b),
        (Value::String(a), Value::String(b)) if operator == InfixOperator::Plus => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (a, b) => Err(RuntimeErrorKind::UnsupportedOperands {
            operator,
            left: a.kind(),
            right: b.kind(),
        }),
    }
}

fn int_arithmetic(operator: InfixOperator, a: i64, b: i64) -> Result<Value, RuntimeErrorKind> {
    let result = match operator {
        InfixOperator::Plus => a.wrapping_add(b),
        InfixOperator::Minus => a.wrapping_sub(b),
        InfixOperator::Multiply => a.wrapping_mul(b),
        InfixOperator::Divide => {
            if b == 0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        _ => return Err(RuntimeErrorKind::UnsupportedOperands {
            operator,
            left: "int",
            right: "int",
        }),
    };
    Ok(Value::Int(result))
}

fn double_arithmetic(operator: InfixOperator, a: f64, b: f64) -> Result<Value, RuntimeErrorKind> {
    let result = match operator {
        InfixOperator::Plus => a + b,
        InfixOperator::Minus => a - b,
        InfixOperator::Multiply => a * b,
        InfixOperator::Divide => a / b,
        _ => return Err(RuntimeErrorKind::UnsupportedOperands {
            operator,
            left: "double",
            right: "double",
        }),
    };
    Ok(Value::Double(result))
}

/// `< <= > >=` over any two numbers.
pub fn comparison(
    operator: InfixOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, RuntimeErrorKind> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return compare(operator, a, b);
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => compare(operator, &a, &b),
        _ => Err(RuntimeErrorKind::OperandsMustBeNumbers),
    }
}

fn compare<T: PartialOrd>(operator: InfixOperator, a: &T, b: &T) -> Result<Value, RuntimeErrorKind> {
    let result = match operator {
        InfixOperator::LessThan => a < b,
        InfixOperator::LessThanOrEqual => a <= b,
        InfixOperator::GreaterThan => a > b,
        InfixOperator::GreaterThanOrEqual => a >= b,
        _ => return Err(RuntimeErrorKind::OperandsMustBeNumbers),
    };
    Ok(Value::Boolean(result))
}

pub fn negate(value: &Value) -> Result<Value, RuntimeErrorKind> {
    match value {
        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
        Value::Float(n) => Ok(Value::Float(-n)),
        Value::Double(n) => Ok(Value::Double(-n)),
        _ => Err(RuntimeErrorKind::OperandMustBeNumber),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn eval(operator: InfixOperator, left: Value, right: Value) -> String {
        match arithmetic(operator, &left, &right) {
            Ok(value) => value.to_string(),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn test_promotion_table() {
        use InfixOperator::*;
        assert_eq!(eval(Plus, Value::Int(2), Value::Int(3)), "5");
        assert_eq!(eval(Plus, Value::Int(2), Value::Double(0.5)), "2.5d");
        assert_eq!(eval(Minus, Value::Double(2.5), Value::Int(1)), "1.5d");
        assert_eq!(eval(Multiply, Value::Double(1.5), Value::Double(2.0)), "3d");
        assert_eq!(eval(Divide, Value::Double(7.0), Value::Int(2)), "3.5d");
    }

    #[test]
    fn test_int_division() {
        use InfixOperator::Divide;
        assert_eq!(eval(Divide, Value::Int(7), Value::Int(2)), "3");
        assert_eq!(eval(Divide, Value::Int(7), Value::Double(2.9)), "3");
        assert_eq!(eval(Divide, Value::Int(-7), Value::Int(2)), "-3");
        assert_eq!(eval(Divide, Value::Int(1), Value::Int(0)), "Division by zero.");
        assert_eq!(eval(Divide, Value::Int(1), Value::Double(0.5)), "Division by zero.");
    }

    #[test]
    fn test_wrapping() {
        assert_eq!(
            eval(InfixOperator::Plus, Value::Int(i64::MAX), Value::Int(1)),
            i64::MIN.to_string()
        );
    }

    #[test]
    fn test_concatenation_only_for_plus() {
        let hello = || Value::String("hello ".to_string());
        let world = || Value::String("world".to_string());
        assert_eq!(eval(InfixOperator::Plus, hello(), world()), "hello world");
        assert_eq!(
            eval(InfixOperator::Minus, hello(), world()),
            "Unsupported operand types for '-': string and string."
        );
    }

    #[test]
    fn test_unsupported_pairings() {
        assert_eq!(
            eval(InfixOperator::Plus, Value::String("a".to_string()), Value::Int(1)),
            "Unsupported operand types for '+': string and int."
        );
        assert_eq!(
            eval(InfixOperator::Plus, Value::Float(1.0), Value::Int(1)),
            "Unsupported operand types for '+': float and int."
        );
        assert_eq!(
            eval(InfixOperator::Multiply, Value::Nil, Value::Nil),
            "Unsupported operand types for '*': nil and nil."
        );
    }

    #[test]
    fn test_comparison() {
        let less = |a: Value, b: Value| comparison(InfixOperator::LessThan, &a, &b);
        assert!(matches!(less(Value::Int(1), Value::Int(2)), Ok(Value::Boolean(true))));
        assert!(matches!(less(Value::Double(2.5), Value::Int(2)), Ok(Value::Boolean(false))));
        assert!(matches!(less(Value::Float(1.0), Value::Double(1.5)), Ok(Value::Boolean(true))));
        assert!(matches!(
            less(Value::String("a".to_string()), Value::Int(1)),
            Err(RuntimeErrorKind::OperandsMustBeNumbers)
        ));
    }

    #[test]
    fn test_negate() {
        assert!(matches!(negate(&Value::Int(3)), Ok(Value::Int(-3))));
        assert!(matches!(negate(&Value::Float(1.5)), Ok(Value::Float(n)) if n == -1.5));
        assert!(matches!(
            negate(&Value::Boolean(true)),
            Err(RuntimeErrorKind::OperandMustBeNumber)
        ));
    }
}
