//! Expression evaluation over an environment snapshot.
//!
//! Evaluation is pure with respect to the passed environment: the same
//! snapshot always produces the same value. All failures (undefined name,
//! type error, non-boolean condition) surface as structured errors carrying
//! the offending expression text.

use super::parser::parse;
use super::{BinaryOp, Expr, UnaryOp};
use crate::error::{Result, SequorError};
use crate::value::Value;
use crate::variables::Env;
use serde_json::Value as JsonValue;

/// Evaluate an expression string against an environment.
pub fn evaluate(source: &str, env: &Env) -> Result<Value> {
    let expr = parse(source)?;
    eval_parsed(source, &expr, env)
}

/// Evaluate an argument or assignment binding.
///
/// A string binding is an expression; any other value is a literal taken
/// verbatim. To pass a literal string, quote it inside the expression
/// (`"'John'"`).
pub fn evaluate_binding(binding: &Value, env: &Env) -> Result<Value> {
    match binding.as_str() {
        Some(source) => evaluate(source, env),
        None => Ok(binding.clone()),
    }
}

/// Evaluate a transition condition, requiring a boolean result.
pub fn evaluate_condition(source: &str, env: &Env) -> Result<bool> {
    let value = evaluate(source, env)?;
    match value.as_bool() {
        Some(b) => Ok(b),
        None => Err(SequorError::ConditionNotBoolean {
            expr: source.to_string(),
            actual: value.type_name().to_string(),
        }),
    }
}

/// Evaluate an already-parsed expression. `source` is used only for error
/// attribution.
pub fn eval_parsed(source: &str, expr: &Expr, env: &Env) -> Result<Value> {
    eval(expr, env).map_err(|cause| SequorError::ExpressionEval {
        expr: source.to_string(),
        cause,
    })
}

type EvalResult = std::result::Result<Value, String>;

fn eval(expr: &Expr, env: &Env) -> EvalResult {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| format!("name '{}' is not defined", name)),
        Expr::List(elements) => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval(element, env)?.into_inner());
            }
            Ok(Value(JsonValue::Array(items)))
        }
        Expr::Attr { object, name } => {
            let object = eval(object, env)?;
            match object.inner() {
                // A missing key reads as None so conditions can probe
                // optional result fields before they exist.
                JsonValue::Object(map) => Ok(map
                    .get(name)
                    .cloned()
                    .map(Value)
                    .unwrap_or_else(Value::null)),
                _ => Err(format!(
                    "cannot access attribute '{}' on {}",
                    name,
                    object.type_name()
                )),
            }
        }
        Expr::Index { object, index } => {
            let object = eval(object, env)?;
            let index = eval(index, env)?;
            index_value(&object, &index)
        }
        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, env)?);
            }
            call_builtin(function, &values)
        }
        Expr::Unary { op, operand } => {
            let operand = eval(operand, env)?;
            apply_unary(*op, operand)
        }
        Expr::Binary { op, left, right } => match op {
            // and/or short-circuit and return the deciding operand
            BinaryOp::And => {
                let left = eval(left, env)?;
                if left.is_truthy() {
                    eval(right, env)
                } else {
                    Ok(left)
                }
            }
            BinaryOp::Or => {
                let left = eval(left, env)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    eval(right, env)
                }
            }
            _ => {
                let left = eval(left, env)?;
                let right = eval(right, env)?;
                apply_binary(*op, left, right)
            }
        },
    }
}

fn index_value(object: &Value, index: &Value) -> EvalResult {
    match (object.inner(), index.inner()) {
        (JsonValue::Array(items), _) => {
            let idx = index
                .as_i64()
                .ok_or_else(|| format!("list index must be an integer, got {}", index.type_name()))?;
            let len = items.len() as i64;
            // Negative indices count from the end
            let resolved = if idx < 0 { idx + len } else { idx };
            if resolved < 0 || resolved >= len {
                return Err(format!("list index {} out of range (len {})", idx, len));
            }
            Ok(Value(items[resolved as usize].clone()))
        }
        (JsonValue::Object(map), JsonValue::String(key)) => Ok(map
            .get(key)
            .cloned()
            .map(Value)
            .unwrap_or_else(Value::null)),
        // Integer keys resolve via their decimal form, which is how
        // `results[3]` finds the entry for node 3.
        (JsonValue::Object(map), JsonValue::Number(_)) => {
            let key = index
                .as_i64()
                .ok_or_else(|| "object index must be a string or integer".to_string())?;
            Ok(map
                .get(&key.to_string())
                .cloned()
                .map(Value)
                .unwrap_or_else(Value::null))
        }
        _ => Err(format!("cannot index {} with {}", object.type_name(), index.type_name())),
    }
}

fn call_builtin(function: &str, args: &[Value]) -> EvalResult {
    match function {
        "len" => {
            let [arg] = args else {
                return Err(format!("len() takes 1 argument, got {}", args.len()));
            };
            let len = match arg.inner() {
                JsonValue::Array(items) => items.len(),
                JsonValue::String(text) => text.chars().count(),
                JsonValue::Object(map) => map.len(),
                _ => return Err(format!("len() expects list, string, or object, got {}", arg.type_name())),
            };
            Ok(Value::int(len as i64))
        }
        "str" => {
            let [arg] = args else {
                return Err(format!("str() takes 1 argument, got {}", args.len()));
            };
            Ok(Value::string(arg.to_string()))
        }
        other => Err(format!("unknown builtin '{}'", other)),
    }
}

fn apply_unary(op: UnaryOp, operand: Value) -> EvalResult {
    match op {
        UnaryOp::Not => Ok(Value::bool(!operand.is_truthy())),
        UnaryOp::Neg => {
            if let Some(v) = operand.as_i64() {
                return Ok(Value::int(-v));
            }
            match operand.as_f64() {
                Some(v) => Ok(Value::float(-v)),
                None => Err(format!("unary '-' expects a number, got {}", operand.type_name())),
            }
        }
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult {
    match op {
        BinaryOp::Eq => Ok(Value::bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::bool(!values_equal(&left, &right))),
        BinaryOp::Lt => compare(left, right, |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => compare(left, right, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => compare(left, right, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => compare(left, right, |o| o != std::cmp::Ordering::Less),
        BinaryOp::In => Ok(Value::bool(value_in(&left, &right)?)),
        BinaryOp::NotIn => Ok(Value::bool(!value_in(&left, &right)?)),
        BinaryOp::Add => add_values(left, right),
        BinaryOp::Sub => numeric_op(left, right, "-", |a, b| a.checked_sub(b), |a, b| Some(a - b)),
        BinaryOp::Mul => numeric_op(left, right, "*", |a, b| a.checked_mul(b), |a, b| Some(a * b)),
        BinaryOp::Div => {
            let (a, b) = float_pair(&left, &right, "/")?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::float(a / b))
        }
        BinaryOp::FloorDiv => numeric_op(
            left,
            right,
            "//",
            |a, b| if b == 0 { None } else { Some(a.div_euclid(b)) },
            |a, b| if b == 0.0 { None } else { Some((a / b).floor()) },
        ),
        BinaryOp::Mod => numeric_op(
            left,
            right,
            "%",
            |a, b| if b == 0 { None } else { Some(a.rem_euclid(b)) },
            |a, b| if b == 0.0 { None } else { Some(a % b) },
        ),
        // and/or are handled before operand evaluation
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators evaluated eagerly"),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    // Numeric equality is value equality: 1 == 1.0
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a == b;
    }
    left == right
}

fn compare(left: Value, right: Value, check: impl Fn(std::cmp::Ordering) -> bool) -> EvalResult {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        let ordering = a
            .partial_cmp(&b)
            .ok_or_else(|| "cannot order NaN".to_string())?;
        return Ok(Value::bool(check(ordering)));
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Ok(Value::bool(check(a.cmp(b))));
    }
    Err(format!(
        "cannot order {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn value_in(value: &Value, container: &Value) -> std::result::Result<bool, String> {
    match container.inner() {
        JsonValue::Array(items) => Ok(items
            .iter()
            .any(|item| values_equal(&Value(item.clone()), value))),
        JsonValue::Object(map) => match value.as_str() {
            Some(key) => Ok(map.contains_key(key)),
            None => Err(format!(
                "membership test on object expects a string, got {}",
                value.type_name()
            )),
        },
        JsonValue::String(text) => match value.as_str() {
            Some(needle) => Ok(text.contains(needle)),
            None => Err(format!(
                "membership test on string expects a string, got {}",
                value.type_name()
            )),
        },
        _ => Err(format!(
            "membership test expects list, string, or object, got {}",
            container.type_name()
        )),
    }
}

fn add_values(left: Value, right: Value) -> EvalResult {
    if let (JsonValue::Array(a), JsonValue::Array(b)) = (left.inner(), right.inner()) {
        let mut items = a.clone();
        items.extend(b.iter().cloned());
        return Ok(Value(JsonValue::Array(items)));
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Ok(Value::string(format!("{}{}", a, b)));
    }
    numeric_op(left, right, "+", |a, b| a.checked_add(b), |a, b| Some(a + b))
}

/// Apply a numeric operator, staying in integer arithmetic when both
/// operands are integers. An integer overflow or undefined operation
/// (`None` from the closure) falls through to the error path.
fn numeric_op(
    left: Value,
    right: Value,
    symbol: &str,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> Option<f64>,
) -> EvalResult {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return int_op(a, b)
            .map(Value::int)
            .ok_or_else(|| format!("integer operation '{}' failed on {} and {}", symbol, a, b));
    }
    let (a, b) = float_pair(&left, &right, symbol)?;
    float_op(a, b)
        .map(Value::float)
        .ok_or_else(|| format!("operation '{}' undefined for {} and {}", symbol, a, b))
}

fn float_pair(
    left: &Value,
    right: &Value,
    symbol: &str,
) -> std::result::Result<(f64, f64), String> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(format!(
            "operator '{}' expects numbers, got {} and {}",
            symbol,
            left.type_name(),
            right.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_with(pairs: &[(&str, JsonValue)]) -> Env {
        let mut env = Env::new();
        for (name, value) in pairs {
            env.insert(name.to_string(), Value(value.clone()));
        }
        env
    }

    #[test]
    fn arithmetic_stays_integral() {
        let env = Env::new();
        assert_eq!(evaluate("2 + 3 * 4", &env).unwrap(), Value::int(14));
        assert_eq!(evaluate("7 // 2", &env).unwrap(), Value::int(3));
        assert_eq!(evaluate("7 % 2", &env).unwrap(), Value::int(1));
    }

    #[test]
    fn true_division_is_float() {
        let env = Env::new();
        assert_eq!(evaluate("7 / 2", &env).unwrap(), Value::float(3.5));
    }

    #[test]
    fn division_by_zero_errors() {
        let env = Env::new();
        assert!(evaluate("1 / 0", &env).is_err());
        assert!(evaluate("1 // 0", &env).is_err());
        assert!(evaluate("1 % 0", &env).is_err());
    }

    #[test]
    fn string_concatenation() {
        let env = env_with(&[("who", json!("world"))]);
        assert_eq!(
            evaluate("'hello ' + who", &env).unwrap(),
            Value::string("hello world")
        );
    }

    #[test]
    fn list_concatenation() {
        let env = Env::new();
        assert_eq!(
            evaluate("[1] + [2, 3]", &env).unwrap(),
            Value(json!([1, 2, 3]))
        );
    }

    #[test]
    fn mixed_numeric_equality() {
        let env = Env::new();
        assert_eq!(evaluate("1 == 1.0", &env).unwrap(), Value::bool(true));
        assert_eq!(evaluate("2 != 2.5", &env).unwrap(), Value::bool(true));
    }

    #[test]
    fn string_ordering() {
        let env = Env::new();
        assert_eq!(evaluate("'abc' < 'abd'", &env).unwrap(), Value::bool(true));
    }

    #[test]
    fn boolean_logic_short_circuits() {
        // The right side would error if evaluated
        let env = env_with(&[("flag", json!(false))]);
        assert_eq!(
            evaluate("flag and missing_name", &env).unwrap(),
            Value::bool(false)
        );
        let env = env_with(&[("flag", json!(true))]);
        assert_eq!(
            evaluate("flag or missing_name", &env).unwrap(),
            Value::bool(true)
        );
    }

    #[test]
    fn membership() {
        let env = env_with(&[("items", json!([1, 2, 3])), ("text", json!("spam and egg"))]);
        assert_eq!(evaluate("2 in items", &env).unwrap(), Value::bool(true));
        assert_eq!(evaluate("5 not in items", &env).unwrap(), Value::bool(true));
        assert_eq!(evaluate("'egg' in text", &env).unwrap(), Value::bool(true));
    }

    #[test]
    fn attribute_and_index_access() {
        let env = env_with(&[(
            "results",
            json!({"1": {"nid": 1, "returned": "ok"}}),
        )]);
        assert_eq!(
            evaluate("results[1].returned", &env).unwrap(),
            Value::string("ok")
        );
    }

    #[test]
    fn missing_keys_read_as_none() {
        let env = env_with(&[("results", json!({"1": {"nid": 1}}))]);
        assert_eq!(
            evaluate("results[1].exception == None", &env).unwrap(),
            Value::bool(true)
        );
        assert_eq!(evaluate("results[2]", &env).unwrap(), Value::null());
    }

    #[test]
    fn attribute_on_non_object_errors() {
        let env = env_with(&[("n", json!(3))]);
        assert!(evaluate("n.field", &env).is_err());
    }

    #[test]
    fn negative_list_index() {
        let env = env_with(&[("items", json!([10, 20, 30]))]);
        assert_eq!(evaluate("items[-1]", &env).unwrap(), Value::int(30));
        assert!(evaluate("items[3]", &env).is_err());
    }

    #[test]
    fn builtins() {
        let env = env_with(&[("items", json!(["a", "b"]))]);
        assert_eq!(evaluate("len(items)", &env).unwrap(), Value::int(2));
        assert_eq!(evaluate("len('abc')", &env).unwrap(), Value::int(3));
        assert_eq!(evaluate("str(42)", &env).unwrap(), Value::string("42"));
        assert!(evaluate("open('/etc/passwd')", &env).is_err());
    }

    #[test]
    fn undefined_name_errors() {
        let env = Env::new();
        let err = evaluate("nope", &env).unwrap_err();
        assert_eq!(err.code(), "E102");
    }

    #[test]
    fn condition_requires_boolean() {
        let env = Env::new();
        assert!(evaluate_condition("1 == 1", &env).unwrap());
        let err = evaluate_condition("1 + 1", &env).unwrap_err();
        assert_eq!(err.code(), "E103");
    }

    #[test]
    fn unary_operators() {
        let env = env_with(&[("x", json!(5))]);
        assert_eq!(evaluate("-x", &env).unwrap(), Value::int(-5));
        assert_eq!(evaluate("not x", &env).unwrap(), Value::bool(false));
        assert_eq!(evaluate("not None", &env).unwrap(), Value::bool(true));
    }
}
