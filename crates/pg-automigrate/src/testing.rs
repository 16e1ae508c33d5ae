//! In-memory stand-in for PostgreSQL used by unit tests.
//!
//! Understands just enough of the generated DDL to track tables and named
//! constraints, and answers with the same error classes PostgreSQL would.

use crate::error::{AutomigrateError, DriverError, DriverErrorCode, Result};
use crate::target::{Connector, SchemaExecutor};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    tables: HashSet<String>,
    constraints: HashSet<String>,
    schemas: HashSet<String>,
    statements: Vec<String>,
    fail_constraints: HashSet<String>,
    fail_tables: HashSet<String>,
    fail_commit: bool,
    fail_acquire: bool,
    in_transaction: bool,
    added_in_transaction: Vec<String>,
    acquired: usize,
    released: usize,
}

/// Shared handle to the fake database.
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    pub fn with_tables(tables: &[&str]) -> Self {
        let db = Self::default();
        db.add_table(tables.iter().copied());
        db
    }

    pub fn add_table<'a>(&self, tables: impl IntoIterator<Item = &'a str>) {
        let mut state = self.state.lock().unwrap();
        state.tables.extend(tables.into_iter().map(str::to_string));
    }

    pub fn connection(&self) -> MockConnection {
        self.state.lock().unwrap().acquired += 1;
        MockConnection { db: self.clone() }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector { db: self.clone() }
    }

    /// Every ALTER for this constraint fails with a non-classified error.
    pub fn fail_constraint(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_constraints
            .insert(name.to_string());
    }

    pub fn heal_constraint(&self, name: &str) {
        self.state.lock().unwrap().fail_constraints.remove(name);
    }

    pub fn fail_table(&self, name: &str) {
        self.state.lock().unwrap().fail_tables.insert(name.to_string());
    }

    pub fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub fn fail_acquire(&self) {
        self.state.lock().unwrap().fail_acquire = true;
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn statements_matching(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with(prefix))
            .collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains(name)
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.state.lock().unwrap().constraints.contains(name)
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.state.lock().unwrap().schemas.contains(name)
    }

    /// (acquired, released) connection counts.
    pub fn connection_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.acquired, state.released)
    }

    fn run(&self, statement: &str) -> std::result::Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(statement.to_string());

        match statement {
            "BEGIN" => {
                state.in_transaction = true;
                state.added_in_transaction.clear();
                return Ok(());
            }
            "COMMIT" => {
                state.in_transaction = false;
                if state.fail_commit {
                    let added = std::mem::take(&mut state.added_in_transaction);
                    for name in added {
                        state.constraints.remove(&name);
                    }
                    return Err(DriverError::new(
                        DriverErrorCode::Other("40001".into()),
                        "could not serialize access",
                    ));
                }
                state.added_in_transaction.clear();
                return Ok(());
            }
            "ROLLBACK" => {
                state.in_transaction = false;
                let added = std::mem::take(&mut state.added_in_transaction);
                for name in added {
                    state.constraints.remove(&name);
                }
                return Ok(());
            }
            "SELECT 1" => return Ok(()),
            _ => {}
        }
        if statement.starts_with("SAVEPOINT")
            || statement.starts_with("RELEASE SAVEPOINT")
            || statement.starts_with("ROLLBACK TO SAVEPOINT")
        {
            return Ok(());
        }

        if statement.starts_with("CREATE SCHEMA") {
            let ids = quoted_identifiers(statement);
            if let Some(schema) = ids.first() {
                state.schemas.insert(schema.clone());
            }
            return Ok(());
        }

        if statement.starts_with("CREATE TABLE") {
            let ids = quoted_identifiers(statement);
            let table = ids.get(1).cloned().unwrap_or_default();
            if state.fail_tables.contains(&table) {
                return Err(DriverError::new(
                    DriverErrorCode::Other("42601".into()),
                    format!("syntax error creating {}", table),
                ));
            }
            if state.tables.contains(&table) {
                return Ok(());
            }
            let mut inline = Vec::new();
            for chunk in statement.split(" CONSTRAINT ").skip(1) {
                let ids = quoted_identifiers(chunk);
                if let (Some(name), Some(target)) = (ids.first(), ids.get(2)) {
                    if !state.tables.contains(target) {
                        return Err(DriverError::new(
                            DriverErrorCode::UndefinedTable,
                            format!("relation \"{}\" does not exist", target),
                        ));
                    }
                    inline.push(name.clone());
                }
            }
            state.tables.insert(table);
            state.constraints.extend(inline);
            return Ok(());
        }

        if statement.starts_with("ALTER TABLE") {
            let ids = quoted_identifiers(statement);
            let source = ids.get(1).cloned().unwrap_or_default();
            let name = ids.get(2).cloned().unwrap_or_default();
            let target = ids.get(5).cloned().unwrap_or_default();
            if state.fail_constraints.contains(&name) {
                return Err(DriverError::new(
                    DriverErrorCode::Other("23503".into()),
                    format!("insert or update violates foreign key constraint \"{}\"", name),
                ));
            }
            if state.constraints.contains(&name) {
                return Err(DriverError::new(
                    DriverErrorCode::DuplicateObject,
                    format!("constraint \"{}\" for relation \"{}\" already exists", name, source),
                ));
            }
            for table in [&source, &target] {
                if !state.tables.contains(table) {
                    return Err(DriverError::new(
                        DriverErrorCode::UndefinedTable,
                        format!("relation \"{}\" does not exist", table),
                    ));
                }
            }
            if state.in_transaction {
                state.added_in_transaction.push(name.clone());
            }
            state.constraints.insert(name);
            return Ok(());
        }

        if statement.starts_with("DROP TABLE") {
            let ids = quoted_identifiers(statement);
            if let Some(table) = ids.get(1) {
                state.tables.remove(table);
                let prefix = format!("fk_{}_", table);
                state.constraints.retain(|c| !c.starts_with(&prefix));
            }
            return Ok(());
        }

        Err(DriverError::new(
            DriverErrorCode::Other("0A000".into()),
            format!("mock cannot execute: {}", statement),
        ))
    }
}

/// Double-quoted identifiers in order, with `""` unescaped.
fn quoted_identifiers(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }
        let mut ident = String::new();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    ident.push('"');
                } else {
                    break;
                }
            } else {
                ident.push(c);
            }
        }
        out.push(ident);
    }
    out
}

pub struct MockConnection {
    db: MockDatabase,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.db.state.lock() {
            state.released += 1;
        }
    }
}

#[async_trait]
impl SchemaExecutor for MockConnection {
    async fn execute(&self, statement: &str) -> std::result::Result<(), DriverError> {
        self.db.run(statement)
    }

    async fn list_tables(&self, _schema: &str) -> std::result::Result<Vec<String>, DriverError> {
        let state = self.db.state.lock().unwrap();
        let mut tables: Vec<String> = state.tables.iter().cloned().collect();
        tables.sort();
        Ok(tables)
    }
}

#[derive(Debug, Clone)]
pub struct MockConnector {
    db: MockDatabase,
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn acquire(&self) -> Result<MockConnection> {
        if self.db.state.lock().unwrap().fail_acquire {
            return Err(AutomigrateError::connection(
                "connection refused",
                "acquiring mock connection",
            ));
        }
        Ok(self.db.connection())
    }
}

#[test]
fn test_quoted_identifiers() {
    assert_eq!(
        quoted_identifiers("ALTER TABLE \"s\".\"a\"\"b\" ADD"),
        vec!["s".to_string(), "a\"b".to_string()]
    );
}
