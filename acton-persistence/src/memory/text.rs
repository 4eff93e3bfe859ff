//! Textual WHERE conditions translated into predicates
//!
//! Conditions are parsed with `sqlparser` and mapped onto [`Predicate`]s:
//! comparisons, `[NOT] IN`, `IS [NOT] NULL`, `[NOT] [I]LIKE`, `AND`, `OR`,
//! `NOT` and parentheses. `:name` placeholders bind from the parameter map;
//! inside an `IN (...)` list a placeholder expands to every bound value.

use sqlparser::ast::{self as sql_ast, BinaryOperator, Expr, UnaryOperator};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::query::{Path, Predicate, QueryParameters, Value};
use crate::session::{PersistenceError, PersistenceResult};

/// Parse `condition` and bind its placeholders
pub(super) fn parse_condition(
    condition: &str,
    parameters: &QueryParameters,
) -> PersistenceResult<Predicate> {
    let dialect = PostgreSqlDialect {};
    let invalid = |err: &dyn std::fmt::Display| {
        PersistenceError::query_failed(format!("invalid condition `{}`: {}", condition, err))
    };

    let mut parser = Parser::new(&dialect)
        .try_with_sql(condition)
        .map_err(|err| invalid(&err))?;
    let expr = parser.parse_expr().map_err(|err| invalid(&err))?;
    let trailing = parser.peek_token();
    if trailing.token != Token::EOF {
        return Err(invalid(&format!("unexpected {}", trailing.token)));
    }

    Binder { parameters }.predicate(expr)
}

enum Operand {
    Path(Path),
    Value(Value),
}

struct Binder<'p> {
    parameters: &'p QueryParameters,
}

impl Binder<'_> {
    fn predicate(&self, expr: Expr) -> PersistenceResult<Predicate> {
        match expr {
            Expr::Nested(inner) => self.predicate(*inner),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Predicate::not(self.predicate(*expr)?)),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(Predicate::and(vec![
                self.predicate(*left)?,
                self.predicate(*right)?,
            ])),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Ok(Predicate::or(vec![
                self.predicate(*left)?,
                self.predicate(*right)?,
            ])),
            Expr::BinaryOp { left, op, right } => self.comparison(*left, op, *right),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let path = self.path(*expr)?;
                let mut values = Vec::new();
                for item in list {
                    values.extend(self.list_values(item)?);
                }
                Ok(if negated {
                    Predicate::not_in_values(path, values)
                } else {
                    Predicate::in_values(path, values)
                })
            }
            Expr::IsNull(inner) => Ok(Predicate::is_null(self.path(*inner)?)),
            Expr::IsNotNull(inner) => Ok(Predicate::is_not_null(self.path(*inner)?)),
            Expr::Like {
                negated,
                expr,
                pattern,
                escape_char: None,
                ..
            } => self.like(*expr, *pattern, negated, false),
            Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char: None,
                ..
            } => self.like(*expr, *pattern, negated, true),
            Expr::Value(value) => match self.scalar(&value.value)? {
                Value::Bool(true) => Ok(Predicate::always()),
                Value::Bool(false) => Ok(Predicate::never()),
                other => Err(PersistenceError::query_failed(format!(
                    "{} is not a condition",
                    other
                ))),
            },
            other => Err(PersistenceError::query_failed(format!(
                "unsupported condition: {}",
                other
            ))),
        }
    }

    fn comparison(&self, left: Expr, op: BinaryOperator, right: Expr) -> PersistenceResult<Predicate> {
        match (self.operand(left)?, self.operand(right)?) {
            (Operand::Path(path), Operand::Value(value)) => Ok(compare(&op)?(path, value)),
            (Operand::Value(value), Operand::Path(path)) => Ok(compare(&mirror(op))?(path, value)),
            (Operand::Value(left), Operand::Value(right)) => {
                let holds = compare(&op)?(Path::attr(""), right).matches(&|_: &Path| left.clone());
                Ok(if holds {
                    Predicate::always()
                } else {
                    Predicate::never()
                })
            }
            (Operand::Path(left), Operand::Path(right)) => Err(PersistenceError::query_failed(
                format!("comparing {} with {} is not supported", left, right),
            )),
        }
    }

    fn like(
        &self,
        expr: Expr,
        pattern: Expr,
        negated: bool,
        case_insensitive: bool,
    ) -> PersistenceResult<Predicate> {
        let path = self.path(expr)?;
        let pattern = match self.operand(pattern)? {
            Operand::Value(Value::Text(pattern)) => pattern,
            _ => {
                return Err(PersistenceError::query_failed(format!(
                    "LIKE on {} needs a text pattern",
                    path
                )))
            }
        };
        let like = if case_insensitive {
            Predicate::ilike(path, pattern.to_lowercase())
        } else {
            Predicate::like(path, pattern)
        };
        Ok(if negated { Predicate::not(like) } else { like })
    }

    fn operand(&self, expr: Expr) -> PersistenceResult<Operand> {
        match expr {
            Expr::Nested(inner) => self.operand(*inner),
            Expr::Value(value) => self.scalar(&value.value).map(Operand::Value),
            other => self.path(other).map(Operand::Path),
        }
    }

    fn path(&self, expr: Expr) -> PersistenceResult<Path> {
        match expr {
            Expr::Nested(inner) => self.path(*inner),
            Expr::Identifier(ident) => Ok(Path::attr(ident.value)),
            Expr::CompoundIdentifier(mut parts) if parts.len() == 2 => {
                let attribute = parts.pop().map(|ident| ident.value).unwrap_or_default();
                let source = parts.pop().map(|ident| ident.value).unwrap_or_default();
                Ok(Path::of(source, attribute))
            }
            other => Err(PersistenceError::query_failed(format!(
                "expected an attribute, found {}",
                other
            ))),
        }
    }

    fn list_values(&self, expr: Expr) -> PersistenceResult<Vec<Value>> {
        match expr {
            Expr::Nested(inner) => self.list_values(*inner),
            Expr::Value(value) => match &value.value {
                sql_ast::Value::Placeholder(name) => self.bound(name).cloned(),
                literal => literal_value(literal).map(|value| vec![value]),
            },
            other => Err(PersistenceError::query_failed(format!(
                "unsupported IN list element: {}",
                other
            ))),
        }
    }

    fn scalar(&self, value: &sql_ast::Value) -> PersistenceResult<Value> {
        match value {
            sql_ast::Value::Placeholder(name) => match self.bound(name)?.as_slice() {
                [single] => Ok(single.clone()),
                values => Err(PersistenceError::query_failed(format!(
                    "parameter {} binds {} values where one is expected",
                    name,
                    values.len()
                ))),
            },
            literal => literal_value(literal),
        }
    }

    fn bound(&self, placeholder: &str) -> PersistenceResult<&Vec<Value>> {
        let name = placeholder.strip_prefix(':').unwrap_or(placeholder);
        self.parameters.get(name).ok_or_else(|| {
            PersistenceError::query_failed(format!("parameter {} is not bound", placeholder))
        })
    }
}

fn literal_value(value: &sql_ast::Value) -> PersistenceResult<Value> {
    match value {
        sql_ast::Value::Number(number, _) => number.parse::<i64>().map(Value::Integer).map_err(|_| {
            PersistenceError::query_failed(format!("unsupported number {}", number))
        }),
        sql_ast::Value::SingleQuotedString(text) => Ok(Value::Text(text.clone())),
        sql_ast::Value::Boolean(flag) => Ok(Value::Bool(*flag)),
        sql_ast::Value::Null => Ok(Value::Null),
        other => Err(PersistenceError::query_failed(format!(
            "unsupported literal {}",
            other
        ))),
    }
}

type Comparison = fn(Path, Value) -> Predicate;

fn compare(op: &BinaryOperator) -> PersistenceResult<Comparison> {
    let build: Comparison = match op {
        BinaryOperator::Eq => |path: Path, value: Value| Predicate::eq(path, value),
        BinaryOperator::NotEq => |path: Path, value: Value| Predicate::ne(path, value),
        BinaryOperator::Lt => |path: Path, value: Value| Predicate::lt(path, value),
        BinaryOperator::LtEq => |path: Path, value: Value| Predicate::lte(path, value),
        BinaryOperator::Gt => |path: Path, value: Value| Predicate::gt(path, value),
        BinaryOperator::GtEq => |path: Path, value: Value| Predicate::gte(path, value),
        other => {
            return Err(PersistenceError::query_failed(format!(
                "unsupported operator {}",
                other
            )))
        }
    };
    Ok(build)
}

/// Operator with its operands swapped (`1 < x` is `x > 1`)
fn mirror(op: BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other,
    }
}
