/*!
# Sea-ORM repository

[`Repository`] and [`ExistsChecker`] over a `sea_orm::DatabaseConnection`.
Statements are built with `sea_query`, so identifiers are quoted and values
bound for whichever backend the connection speaks. Rows come back as JSON
objects through `JsonValue::find_by_statement`.
*/

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Asterisk, Expr, Func, Order, Query as SqlQuery, SelectStatement, SimpleExpr,
    Value as SqlValue,
};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, FromQueryResult, JsonValue,
    Statement,
};
use serde_json::{Map, Value, json};

use super::query::{Condition, Direction, Operator, Query};
use super::repository::{Record, Repository};
use crate::validation::ExistsChecker;

/// Repository backed by a Sea-ORM connection.
#[derive(Debug, Clone)]
pub struct SeaOrmRepository {
    db: DatabaseConnection,
}

impl SeaOrmRepository {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn backend(&self) -> DatabaseBackend {
        self.db.get_database_backend()
    }

    async fn rows(&self, statement: Statement) -> Result<Vec<Record>, DbErr> {
        let rows = JsonValue::find_by_statement(statement).all(&self.db).await?;
        Ok(rows.into_iter().map(into_record).collect())
    }
}

#[async_trait]
impl Repository for SeaOrmRepository {
    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, DbErr> {
        let statement = self.backend().build(&select_statement(query));
        self.rows(statement).await
    }

    async fn count(&self, query: &Query) -> Result<u64, DbErr> {
        let mut inner = query.clone();
        inner.offset = None;
        inner.limit = None;
        inner.orders.clear();

        let mut select = SqlQuery::select();
        select
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
            .from_subquery(select_statement(&inner), Alias::new("counted"));

        let row = self
            .db
            .query_one(self.backend().build(&select))
            .await?
            .ok_or_else(|| DbErr::Custom("count query returned no row".to_string()))?;
        let count: i64 = row.try_get("", "count")?;
        u64::try_from(count).map_err(|err| DbErr::Custom(err.to_string()))
    }

    async fn insert(
        &self,
        table: &str,
        primary_key: &str,
        attributes: &Record,
    ) -> Result<Record, DbErr> {
        let mut insert = SqlQuery::insert();
        insert.into_table(Alias::new(table));
        if attributes.is_empty() {
            insert.or_default_values();
        } else {
            insert.columns(attributes.keys().map(Alias::new));
            insert
                .values(attributes.values().map(|value| SimpleExpr::from(to_sql_value(value))))
                .map_err(|err| DbErr::Custom(err.to_string()))?;
        }

        if self.db.support_returning() {
            insert.returning_all();
            let stored = self.rows(self.backend().build(&insert)).await?;
            return stored.into_iter().next().ok_or(DbErr::RecordNotInserted);
        }

        let result = self.db.execute(self.backend().build(&insert)).await?;
        let key = attributes
            .get(primary_key)
            .cloned()
            .unwrap_or_else(|| json!(result.last_insert_id()));

        self.fetch_first(&Query::table(table).where_eq(primary_key, key))
            .await?
            .ok_or(DbErr::RecordNotInserted)
    }

    async fn update(
        &self,
        table: &str,
        primary_key: &str,
        key: &Value,
        attributes: &Record,
    ) -> Result<u64, DbErr> {
        if attributes.is_empty() {
            return Ok(0);
        }

        let mut update = SqlQuery::update();
        update
            .table(Alias::new(table))
            .values(
                attributes
                    .iter()
                    .map(|(column, value)| (Alias::new(column), SimpleExpr::from(to_sql_value(value)))),
            )
            .and_where(Expr::col(Alias::new(primary_key)).eq(to_sql_value(key)));

        let result = self.db.execute(self.backend().build(&update)).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: &str, primary_key: &str, key: &Value) -> Result<u64, DbErr> {
        let mut delete = SqlQuery::delete();
        delete
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new(primary_key)).eq(to_sql_value(key)));

        let result = self.db.execute(self.backend().build(&delete)).await?;
        Ok(result.rows_affected())
    }

    async fn column_listing(&self, table: &str) -> Result<Vec<String>, DbErr> {
        let backend = self.backend();
        let statement = match backend {
            DatabaseBackend::Sqlite => Statement::from_string(
                backend,
                format!("PRAGMA table_info({})", quote_identifier(table, backend)),
            ),
            DatabaseBackend::Postgres => Statement::from_sql_and_values(
                backend,
                r"SELECT column_name::text AS name FROM information_schema.columns
                  WHERE table_name = $1 ORDER BY ordinal_position",
                [table.into()],
            ),
            DatabaseBackend::MySql => Statement::from_sql_and_values(
                backend,
                r"SELECT COLUMN_NAME AS name FROM information_schema.columns
                  WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE() ORDER BY ORDINAL_POSITION",
                [table.into()],
            ),
        };

        let mut columns = Vec::new();
        for row in self.db.query_all(statement).await? {
            columns.push(row.try_get::<String>("", "name")?);
        }
        Ok(columns)
    }
}

#[async_trait]
impl ExistsChecker for SeaOrmRepository {
    async fn exists(&self, table: &str, column: &str, value: &Value) -> Result<bool, DbErr> {
        let mut select = SqlQuery::select();
        select
            .expr(Expr::val(1))
            .from(Alias::new(table))
            .and_where(Expr::col(Alias::new(column)).eq(to_sql_value(value)))
            .limit(1);

        Ok(self
            .db
            .query_one(self.backend().build(&select))
            .await?
            .is_some())
    }
}

/// Quote SQL identifier (double quotes for Postgres/SQLite, backticks for MySQL)
fn quote_identifier(identifier: &str, backend: DatabaseBackend) -> String {
    match backend {
        DatabaseBackend::MySql => format!("`{}`", identifier.replace('`', "``")),
        DatabaseBackend::Postgres | DatabaseBackend::Sqlite => {
            format!("\"{}\"", identifier.replace('"', "\"\""))
        }
    }
}

fn select_statement(query: &Query) -> SelectStatement {
    let mut select = SqlQuery::select();
    select.column(Asterisk).from(Alias::new(&query.table));

    for condition in &query.conditions {
        select.and_where(condition_expr(condition));
    }
    for group in &query.groups {
        select.group_by_col(Alias::new(group));
    }
    for (column, direction) in &query.orders {
        let order = match direction {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        };
        select.order_by(Alias::new(column), order);
    }
    if let Some(offset) = query.offset {
        select.offset(offset);
    }
    if let Some(limit) = query.limit {
        select.limit(limit);
    }
    select
}

fn condition_expr(condition: &Condition) -> SimpleExpr {
    let column = Expr::col(Alias::new(&condition.column));
    match (condition.operator, &condition.value) {
        (Operator::Eq, Value::Null) => column.is_null(),
        (Operator::Ne, Value::Null) => column.is_not_null(),
        (Operator::Eq, value) => column.eq(to_sql_value(value)),
        (Operator::Ne, value) => column.ne(to_sql_value(value)),
        (Operator::Gt, value) => column.gt(to_sql_value(value)),
        (Operator::Gte, value) => column.gte(to_sql_value(value)),
        (Operator::Lt, value) => column.lt(to_sql_value(value)),
        (Operator::Lte, value) => column.lte(to_sql_value(value)),
        (Operator::Like, Value::String(pattern)) => column.like(pattern.as_str()),
        (Operator::Like, value) => column.like(value.to_string().as_str()),
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::String(None),
        Value::Bool(flag) => SqlValue::from(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                SqlValue::from(int)
            } else if let Some(unsigned) = number.as_u64() {
                SqlValue::from(unsigned)
            } else {
                SqlValue::from(number.as_f64().unwrap_or_default())
            }
        }
        Value::String(text) => SqlValue::from(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::from(value.to_string()),
    }
}

fn into_record(row: JsonValue) -> Record {
    match row {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::SqliteQueryBuilder;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("widgets", DatabaseBackend::Sqlite), "\"widgets\"");
        assert_eq!(quote_identifier("wid\"gets", DatabaseBackend::Postgres), "\"wid\"\"gets\"");
        assert_eq!(quote_identifier("wid`gets", DatabaseBackend::MySql), "`wid``gets`");
    }

    #[test]
    fn test_select_statement_sql() {
        let query = Query::table("widgets")
            .where_eq("owner_id", json!(3))
            .where_eq("deleted_at", Value::Null)
            .order_by("id", Direction::Desc)
            .skip(20)
            .take(10);
        let sql = select_statement(&query).to_string(SqliteQueryBuilder);
        assert_eq!(
            sql,
            r#"SELECT * FROM "widgets" WHERE "owner_id" = 3 AND "deleted_at" IS NULL ORDER BY "id" DESC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(5)), SqlValue::from(5_i64));
        assert_eq!(to_sql_value(&json!("x")), SqlValue::from("x".to_string()));
        assert_eq!(to_sql_value(&json!(true)), SqlValue::from(true));
        assert_eq!(to_sql_value(&json!([1])), SqlValue::from("[1]".to_string()));
    }
}
