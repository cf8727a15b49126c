//! Tree-walking evaluator for the Moss language.
//!
//! The prior execution backend, superseded by the bytecode pipeline
//! but kept complete: it still powers `--backend eval` and is the only
//! backend with a full calling convention.
//!
//! Failures are `Object::Error` values rather than `Err` results: an
//! error produced anywhere short-circuits the enclosing blocks and
//! surfaces as the program's result, the same way a `return` does.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use moss_object::{builtins, Environment, Function, HashPair, Object};
use moss_syntax::ast::*;

/// Evaluate a whole program, unwrapping a top-level `return`.
pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Object {
    let mut result = Object::Null;
    for statement in &program.statements {
        match eval_statement(statement, env) {
            Object::ReturnValue(value) => return *value,
            err @ Object::Error(_) => return err,
            other => result = other,
        }
    }
    result
}

fn eval_statement(statement: &Statement, env: &Rc<RefCell<Environment>>) -> Object {
    match statement {
        Statement::Expression(expr) => eval_expression(expr, env),
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if is_error(&value) {
                return value;
            }
            env.borrow_mut().set(name.clone(), value);
            Object::Null
        }
        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if is_error(&value) {
                return value;
            }
            Object::ReturnValue(Box::new(value))
        }
    }
}

/// Evaluate a block, propagating `return` wrappers and errors without
/// unwrapping them.
fn eval_block_statement(block: &BlockStatement, env: &Rc<RefCell<Environment>>) -> Object {
    let mut result = Object::Null;
    for statement in &block.statements {
        result = eval_statement(statement, env);
        if matches!(result, Object::ReturnValue(_) | Object::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_expression(expr: &Expression, env: &Rc<RefCell<Environment>>) -> Object {
    match expr {
        Expression::IntegerLiteral(value) => Object::Integer(*value),
        Expression::StringLiteral(value) => Object::Str(Rc::new(value.clone())),
        Expression::Boolean(value) => Object::Boolean(*value),
        Expression::Prefix { op, right } => {
            let right = eval_expression(right, env);
            if is_error(&right) {
                return right;
            }
            eval_prefix_expression(*op, right)
        }
        Expression::Infix { op, left, right } => {
            let left = eval_expression(left, env);
            if is_error(&left) {
                return left;
            }
            let right = eval_expression(right, env);
            if is_error(&right) {
                return right;
            }
            eval_infix_expression(*op, left, right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if is_error(&condition) {
                return condition;
            }
            if condition.is_truthy() {
                eval_block_statement(consequence, env)
            } else if let Some(alt) = alternative {
                eval_block_statement(alt, env)
            } else {
                Object::Null
            }
        }
        Expression::Identifier(name) => eval_identifier(name, env),
        Expression::FunctionLiteral { parameters, body } => Object::Function(Rc::new(Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: Rc::clone(env),
        })),
        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if is_error(&function) {
                return function;
            }
            match eval_expressions(arguments, env) {
                Ok(args) => apply_function(function, args),
                Err(err) => err,
            }
        }
        Expression::ArrayLiteral(elements) => match eval_expressions(elements, env) {
            Ok(elements) => Object::Array(Rc::new(elements)),
            Err(err) => err,
        },
        Expression::HashLiteral(pairs) => eval_hash_literal(pairs, env),
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if is_error(&left) {
                return left;
            }
            let index = eval_expression(index, env);
            if is_error(&index) {
                return index;
            }
            eval_index_expression(left, index)
        }
    }
}

/// Evaluate left to right; the first error stops the walk.
fn eval_expressions(
    exprs: &[Expression],
    env: &Rc<RefCell<Environment>>,
) -> Result<Vec<Object>, Object> {
    let mut result = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let evaluated = eval_expression(expr, env);
        if is_error(&evaluated) {
            return Err(evaluated);
        }
        result.push(evaluated);
    }
    Ok(result)
}

fn eval_prefix_expression(op: PrefixOp, right: Object) -> Object {
    match op {
        PrefixOp::Bang => match right {
            Object::Boolean(value) => Object::Boolean(!value),
            Object::Null => Object::Boolean(true),
            _ => Object::Boolean(false),
        },
        PrefixOp::Minus => match right {
            Object::Integer(value) => Object::Integer(value.wrapping_neg()),
            other => Object::Error(format!("unknown operator: -{}", other.type_name())),
        },
    }
}

fn eval_infix_expression(op: InfixOp, left: Object, right: Object) -> Object {
    match (&left, &right) {
        (Object::Integer(l), Object::Integer(r)) => eval_integer_infix_expression(op, *l, *r),
        (Object::Str(l), Object::Str(r)) => match op {
            InfixOp::Add => Object::Str(Rc::new(format!("{}{}", l, r))),
            InfixOp::Eq => Object::Boolean(l == r),
            InfixOp::NotEq => Object::Boolean(l != r),
            _ => Object::Error(format!("unknown operator: STRING {} STRING", op)),
        },
        _ => match op {
            // Identity comparison; distinct types are simply unequal.
            InfixOp::Eq => Object::Boolean(left.identity_eq(&right)),
            InfixOp::NotEq => Object::Boolean(!left.identity_eq(&right)),
            _ if left.type_name() != right.type_name() => Object::Error(format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            )),
            _ => Object::Error(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                op,
                right.type_name()
            )),
        },
    }
}

fn eval_integer_infix_expression(op: InfixOp, left: i64, right: i64) -> Object {
    match op {
        InfixOp::Add => Object::Integer(left.wrapping_add(right)),
        InfixOp::Sub => Object::Integer(left.wrapping_sub(right)),
        InfixOp::Mul => Object::Integer(left.wrapping_mul(right)),
        InfixOp::Div => {
            if right == 0 {
                Object::Error("division by zero".to_string())
            } else {
                Object::Integer(left.wrapping_div(right))
            }
        }
        InfixOp::Lt => Object::Boolean(left < right),
        InfixOp::Gt => Object::Boolean(left > right),
        InfixOp::Eq => Object::Boolean(left == right),
        InfixOp::NotEq => Object::Boolean(left != right),
    }
}

fn eval_identifier(name: &str, env: &Rc<RefCell<Environment>>) -> Object {
    if let Some(value) = env.borrow().get(name) {
        return value;
    }
    if let Some(builtin) = builtins::lookup(name) {
        return builtin;
    }
    Object::Error(format!("identifier not found: \"{}\"", name))
}

fn apply_function(function: Object, args: Vec<Object>) -> Object {
    match function {
        Object::Function(func) => {
            if args.len() != func.parameters.len() {
                return Object::Error(format!(
                    "wrong number of arguments. got={}, want={}",
                    args.len(),
                    func.parameters.len()
                ));
            }
            let extended = extend_function_env(&func, args);
            let evaluated = eval_block_statement(&func.body, &extended);
            unwrap_return_value(evaluated)
        }
        Object::Builtin(builtin) => (builtin.func)(args),
        other => Object::Error(format!("not a function: {}", other.type_name())),
    }
}

fn extend_function_env(func: &Function, args: Vec<Object>) -> Rc<RefCell<Environment>> {
    let mut env = Environment::new_enclosed(Rc::clone(&func.env));
    for (param, arg) in func.parameters.iter().zip(args) {
        env.set(param.clone(), arg);
    }
    Rc::new(RefCell::new(env))
}

fn unwrap_return_value(obj: Object) -> Object {
    match obj {
        Object::ReturnValue(value) => *value,
        other => other,
    }
}

fn eval_index_expression(left: Object, index: Object) -> Object {
    match (&left, &index) {
        (Object::Array(elements), Object::Integer(i)) => {
            let max = elements.len() as i64 - 1;
            if *i < 0 || *i > max {
                Object::Null
            } else {
                elements[*i as usize].clone()
            }
        }
        (Object::Hash(pairs), _) => match index.hash_key() {
            Some(key) => pairs
                .get(&key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Object::Null),
            None => Object::Error(format!("unusable as hash key: {}", index.type_name())),
        },
        _ => Object::Error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}

fn eval_hash_literal(
    pairs: &[(Expression, Expression)],
    env: &Rc<RefCell<Environment>>,
) -> Object {
    let mut evaluated = HashMap::with_capacity(pairs.len());
    for (key_expr, value_expr) in pairs {
        let key = eval_expression(key_expr, env);
        if is_error(&key) {
            return key;
        }
        let Some(hash_key) = key.hash_key() else {
            return Object::Error(format!("unusable as hash key: {}", key.type_name()));
        };
        let value = eval_expression(value_expr, env);
        if is_error(&value) {
            return value;
        }
        evaluated.insert(hash_key, HashPair { key, value });
    }
    Object::Hash(Rc::new(evaluated))
}

fn is_error(obj: &Object) -> bool {
    matches!(obj, Object::Error(_))
}
