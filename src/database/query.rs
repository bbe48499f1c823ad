//! Backend-neutral description of a select.
//!
//! The pipeline only ever composes these; turning them into SQL is the job
//! of a [`Repository`](super::Repository).

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub table: String,
    pub conditions: Vec<Condition>,
    pub groups: Vec<String>,
    pub orders: Vec<(String, Direction)>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Query {
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn where_op(mut self, column: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            operator,
            value,
        });
        self
    }

    #[must_use]
    pub fn where_eq(self, column: impl Into<String>, value: Value) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    #[must_use]
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.groups.push(column.into());
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push((column.into(), direction));
        self
    }

    #[must_use]
    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}
