use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;

use crate::db::{SqlValue, push_value};
use crate::db::repository::Entity;
use crate::error::AppError;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct FilterError(pub String);

impl From<FilterError> for AppError {
    fn from(err: FilterError) -> Self {
        AppError::BadRequest(format!("Invalid filter: {}", err))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    And(Vec<Where>),
    Or(Vec<Where>),
    Field { property: String, condition: Condition },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Inq(Vec<Value>),
    Nin(Vec<Value>),
    Between(Value, Value),
    Like(String),
    Nlike(String),
}

impl Where {
    pub fn eq(property: &str, value: impl Into<Value>) -> Self {
        Where::Field {
            property: property.to_string(),
            condition: Condition::Eq(value.into()),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| FilterError(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FilterError> {
        let Value::Object(map) = value else {
            return Err(FilterError("where clause must be an object".to_string()));
        };
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "and" => clauses.push(Where::And(Self::from_list(&key, value)?)),
                "or" => clauses.push(Where::Or(Self::from_list(&key, value)?)),
                _ => clauses.extend(Self::from_property(key, value)?),
            }
        }
        if clauses.len() == 1 {
            Ok(clauses.remove(0))
        } else {
            Ok(Where::And(clauses))
        }
    }

    fn from_list(key: &str, value: Value) -> Result<Vec<Where>, FilterError> {
        let Value::Array(items) = value else {
            return Err(FilterError(format!("{:?} expects an array of clauses", key)));
        };
        items.into_iter().map(Self::from_value).collect()
    }

    fn from_property(property: String, value: Value) -> Result<Vec<Where>, FilterError> {
        match value {
            Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(FilterError(format!("empty condition for {:?}", property)));
                }
                ops.into_iter()
                    .map(|(op, operand)| {
                        Ok(Where::Field {
                            property: property.clone(),
                            condition: Condition::parse(&op, operand)?,
                        })
                    })
                    .collect()
            }
            Value::Array(_) => Err(FilterError(format!(
                "{:?} cannot be compared to an array, use inq",
                property
            ))),
            scalar => Ok(vec![Where::Field {
                property,
                condition: Condition::Eq(scalar),
            }]),
        }
    }
}

impl<'de> Deserialize<'de> for Where {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Where::from_value(value).map_err(de::Error::custom)
    }
}

impl Condition {
    fn parse(op: &str, operand: Value) -> Result<Self, FilterError> {
        let condition = match op {
            "eq" => Condition::Eq(operand),
            "neq" => Condition::Neq(operand),
            "gt" => Condition::Gt(operand),
            "gte" => Condition::Gte(operand),
            "lt" => Condition::Lt(operand),
            "lte" => Condition::Lte(operand),
            "inq" => Condition::Inq(expect_array(op, operand)?),
            "nin" => Condition::Nin(expect_array(op, operand)?),
            "between" => {
                let bounds = expect_array(op, operand)?;
                let [low, high]: [Value; 2] = bounds.try_into().map_err(|_| {
                    FilterError("between expects exactly two values".to_string())
                })?;
                Condition::Between(low, high)
            }
            "like" => Condition::Like(expect_string(op, operand)?),
            "nlike" => Condition::Nlike(expect_string(op, operand)?),
            other => return Err(FilterError(format!("unknown operator {:?}", other))),
        };
        Ok(condition)
    }
}

fn expect_array(op: &str, operand: Value) -> Result<Vec<Value>, FilterError> {
    match operand {
        Value::Array(items) => Ok(items),
        _ => Err(FilterError(format!("{} expects an array", op))),
    }
}

fn expect_string(op: &str, operand: Value) -> Result<String, FilterError> {
    match operand {
        Value::String(s) => Ok(s),
        _ => Err(FilterError(format!("{} expects a string pattern", op))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub property: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order(pub Vec<OrderBy>);

impl Order {
    fn parse_one(raw: &str) -> Result<OrderBy, FilterError> {
        let mut parts = raw.split_whitespace();
        let property = parts
            .next()
            .ok_or_else(|| FilterError("empty order clause".to_string()))?;
        let descending = match parts.next() {
            None => false,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
            Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
            Some(dir) => return Err(FilterError(format!("unknown order direction {:?}", dir))),
        };
        if parts.next().is_some() {
            return Err(FilterError(format!("malformed order clause {:?}", raw)));
        }
        Ok(OrderBy { property: property.to_string(), descending })
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawOrder {
            One(String),
            Many(Vec<String>),
        }

        let clauses = match RawOrder::deserialize(deserializer)? {
            RawOrder::One(s) => vec![s],
            RawOrder::Many(v) => v,
        };
        clauses
            .iter()
            .map(|c| Order::parse_one(c))
            .collect::<Result<Vec<_>, _>>()
            .map(Order)
            .map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(rename = "where")]
    pub where_clause: Option<Where>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub offset: Option<u64>,
}

impl Filter {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        serde_json::from_str(raw).map_err(|e| FilterError(e.to_string()))
    }

    pub fn matching(where_clause: Where) -> Self {
        Self { where_clause: Some(where_clause), ..Self::default() }
    }

    /// `skip` and `offset` are aliases; `skip` wins when both are given.
    pub fn offset(&self) -> Option<u64> {
        self.skip.or(self.offset)
    }
}

fn column<E: Entity>(property: &str) -> Result<&'static str, FilterError> {
    E::column(property).ok_or_else(|| {
        FilterError(format!("unknown property {:?} on {}", property, E::NAME))
    })
}

fn scalar(property: &str, value: &Value) -> Result<SqlValue, FilterError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Bool(*b)),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .ok_or_else(|| FilterError(format!("unsupported number for {:?}", property))),
        Value::Array(_) | Value::Object(_) => Err(FilterError(format!(
            "{:?} must be compared to a scalar",
            property
        ))),
    }
}

fn non_null(property: &str, value: &Value) -> Result<SqlValue, FilterError> {
    match scalar(property, value)? {
        SqlValue::Null => Err(FilterError(format!(
            "{:?} cannot be ordered against null",
            property
        ))),
        v => Ok(v),
    }
}

pub(crate) fn push_where<E: Entity>(
    qb: &mut QueryBuilder<'_, Sqlite>,
    clause: &Where,
) -> Result<(), FilterError> {
    match clause {
        Where::And(items) | Where::Or(items) if items.is_empty() => {
            // An empty conjunction matches everything, an empty disjunction nothing.
            qb.push(if matches!(clause, Where::And(_)) { "1 = 1" } else { "1 = 0" });
        }
        Where::And(items) | Where::Or(items) => {
            let joiner = if matches!(clause, Where::And(_)) { " AND " } else { " OR " };
            qb.push("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_where::<E>(qb, item)?;
            }
            qb.push(")");
        }
        Where::Field { property, condition } => {
            let col = column::<E>(property)?;
            push_condition(qb, property, col, condition)?;
        }
    }
    Ok(())
}

fn push_condition(
    qb: &mut QueryBuilder<'_, Sqlite>,
    property: &str,
    col: &str,
    condition: &Condition,
) -> Result<(), FilterError> {
    match condition {
        Condition::Eq(value) => match scalar(property, value)? {
            SqlValue::Null => {
                qb.push(col).push(" IS NULL");
            }
            v => {
                qb.push(col).push(" = ");
                push_value(qb, v);
            }
        },
        Condition::Neq(value) => match scalar(property, value)? {
            SqlValue::Null => {
                qb.push(col).push(" IS NOT NULL");
            }
            v => {
                qb.push(col).push(" <> ");
                push_value(qb, v);
            }
        },
        Condition::Gt(value) => push_compare(qb, property, col, " > ", value)?,
        Condition::Gte(value) => push_compare(qb, property, col, " >= ", value)?,
        Condition::Lt(value) => push_compare(qb, property, col, " < ", value)?,
        Condition::Lte(value) => push_compare(qb, property, col, " <= ", value)?,
        Condition::Inq(values) | Condition::Nin(values) => {
            let negated = matches!(condition, Condition::Nin(_));
            if values.is_empty() {
                qb.push(if negated { "1 = 1" } else { "1 = 0" });
                return Ok(());
            }
            qb.push(col).push(if negated { " NOT IN (" } else { " IN (" });
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, non_null(property, value)?);
            }
            qb.push(")");
        }
        Condition::Between(low, high) => {
            let low = non_null(property, low)?;
            let high = non_null(property, high)?;
            qb.push(col).push(" BETWEEN ");
            push_value(qb, low);
            qb.push(" AND ");
            push_value(qb, high);
        }
        Condition::Like(pattern) => {
            qb.push(col).push(" LIKE ");
            push_value(qb, SqlValue::Text(pattern.clone()));
        }
        Condition::Nlike(pattern) => {
            qb.push(col).push(" NOT LIKE ");
            push_value(qb, SqlValue::Text(pattern.clone()));
        }
    }
    Ok(())
}

fn push_compare(
    qb: &mut QueryBuilder<'_, Sqlite>,
    property: &str,
    col: &str,
    op: &str,
    value: &Value,
) -> Result<(), FilterError> {
    let value = non_null(property, value)?;
    qb.push(col).push(op);
    push_value(qb, value);
    Ok(())
}

pub(crate) fn push_order<E: Entity>(
    qb: &mut QueryBuilder<'_, Sqlite>,
    order: &Order,
) -> Result<(), FilterError> {
    if order.0.is_empty() {
        return Ok(());
    }
    qb.push(" ORDER BY ");
    for (i, by) in order.0.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(column::<E>(&by.property)?)
            .push(if by.descending { " DESC" } else { " ASC" });
    }
    Ok(())
}

pub(crate) fn push_window(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    let to_i64 = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
    match (filter.limit, filter.offset()) {
        (None, None) => {}
        (limit, offset) => {
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            qb.push(" LIMIT ");
            push_value(qb, SqlValue::Integer(limit.map_or(-1, to_i64)));
            if let Some(offset) = offset {
                qb.push(" OFFSET ");
                push_value(qb, SqlValue::Integer(to_i64(offset)));
            }
        }
    }
}

pub fn parse_where_param(raw: Option<&str>) -> Result<Option<Where>, FilterError> {
    raw.filter(|s| !s.trim().is_empty()).map(Where::parse).transpose()
}

pub fn parse_filter_param(raw: Option<&str>) -> Result<Filter, FilterError> {
    match raw.filter(|s| !s.trim().is_empty()) {
        Some(raw) => Filter::parse(raw),
        None => Ok(Filter::default()),
    }
}
