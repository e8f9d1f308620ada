//! Prepared statements and bind variables
//!
//! A [`Statement`] pairs the SQL text with everything the execute cycle
//! needs: the detected statement kind, the ordered bind names from the
//! lexer, and — once the server has parsed it — the cursor id that lets
//! re-executions skip the parse phase.

use crate::constants::{BindDirection, OracleType};
use crate::error::{Error, Result};
use crate::parser;
use crate::row::{ColumnInfo, Value};

/// Statement classification, detected from the first keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// SELECT or WITH query
    Query,
    /// INSERT / UPDATE / DELETE / MERGE
    Dml,
    /// Anonymous PL/SQL block or CALL
    Plsql,
    /// CREATE / ALTER / DROP / TRUNCATE and friends
    Ddl,
    /// COMMIT statement text
    Commit,
    /// ROLLBACK statement text
    Rollback,
    /// Anything else
    Unknown,
}

impl StatementType {
    fn detect(sql: &str) -> Self {
        let token = first_keyword(sql);
        match token.as_str() {
            "SELECT" | "WITH" => StatementType::Query,
            "INSERT" | "UPDATE" | "DELETE" | "MERGE" => StatementType::Dml,
            "BEGIN" | "DECLARE" | "CALL" => StatementType::Plsql,
            "CREATE" | "ALTER" | "DROP" | "TRUNCATE" | "GRANT" | "REVOKE" | "ANALYZE"
            | "AUDIT" | "COMMENT" => StatementType::Ddl,
            "COMMIT" => StatementType::Commit,
            "ROLLBACK" => StatementType::Rollback,
            _ => StatementType::Unknown,
        }
    }
}

/// First keyword of the statement, skipping comments and parentheses
fn first_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = match stripped.split_once('\n') {
                Some((_, tail)) => tail.trim_start(),
                None => "",
            };
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = match stripped.split_once("*/") {
                Some((_, tail)) => tail.trim_start(),
                None => "",
            };
        } else if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

/// A bind variable passed to execute
#[derive(Debug, Clone)]
pub struct BindParam {
    /// Bind name; positional binds use their index as the name
    pub name: String,
    /// The bound value (input direction) or type template (output)
    pub value: Value,
    /// Bind direction
    pub direction: BindDirection,
    /// Wire type for OUT binds where no input value fixes it
    pub oracle_type: OracleType,
    /// Buffer size reserved for OUT values
    pub max_size: u32,
}

impl BindParam {
    /// Create an IN bind
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let oracle_type = value.oracle_type();
        Self {
            name: name.into(),
            value,
            direction: BindDirection::Input,
            oracle_type,
            max_size: 0,
        }
    }

    /// Create an OUT bind of the given type
    pub fn output(name: impl Into<String>, oracle_type: OracleType, max_size: u32) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            direction: BindDirection::Output,
            oracle_type,
            max_size,
        }
    }

    /// Create an IN OUT bind
    pub fn input_output(name: impl Into<String>, value: impl Into<Value>, max_size: u32) -> Self {
        let value = value.into();
        let oracle_type = value.oracle_type();
        Self {
            name: name.into(),
            value,
            direction: BindDirection::InputOutput,
            oracle_type,
            max_size,
        }
    }
}

/// A prepared statement with its server-side cursor state
#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    statement_type: StatementType,
    bind_names: Vec<String>,
    cursor_id: u16,
    executed: bool,
    /// Column metadata captured from the last describe
    pub columns: Vec<ColumnInfo>,
}

impl Statement {
    /// Prepare a statement: classify it and extract its bind names
    pub fn prepare(sql: &str) -> Result<Self> {
        if sql.trim().is_empty() {
            return Err(Error::InvalidParameter("empty SQL text".into()));
        }
        Ok(Self {
            sql: sql.to_string(),
            statement_type: StatementType::detect(sql),
            bind_names: parser::bind_names(sql),
            cursor_id: 0,
            executed: false,
            columns: Vec::new(),
        })
    }

    /// The SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The detected statement type
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Ordered, deduplicated bind names
    pub fn bind_names(&self) -> &[String] {
        &self.bind_names
    }

    /// The server cursor id; 0 means the statement needs a (re)parse
    pub fn cursor_id(&self) -> u16 {
        self.cursor_id
    }

    /// Record the cursor id assigned by the server
    pub fn set_cursor_id(&mut self, cursor_id: u16) {
        self.cursor_id = cursor_id;
    }

    /// Whether this statement has been executed on its session
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Record execution state
    pub fn set_executed(&mut self, executed: bool) {
        self.executed = executed;
    }

    /// Whether a parse round is required
    pub fn requires_parse(&self) -> bool {
        self.cursor_id == 0
    }

    /// Whether this statement returns rows
    pub fn is_query(&self) -> bool {
        self.statement_type == StatementType::Query
    }

    /// Whether this statement is DML
    pub fn is_dml(&self) -> bool {
        self.statement_type == StatementType::Dml
    }

    /// Whether this statement is a PL/SQL block
    pub fn is_plsql(&self) -> bool {
        self.statement_type == StatementType::Plsql
    }

    /// Whether this statement is DDL (never cached; commits implicitly)
    pub fn is_ddl(&self) -> bool {
        self.statement_type == StatementType::Ddl
    }

    /// Clone for reuse from the statement cache, keeping cursor id and
    /// describe metadata
    pub fn clone_for_reuse(&self) -> Self {
        self.clone()
    }

    /// Match the provided binds against the statement's bind names, putting
    /// them in wire order. Positional binds are matched by index.
    pub fn order_binds(&self, binds: &[BindParam]) -> Result<Vec<BindParam>> {
        if self.bind_names.is_empty() {
            if binds.is_empty() {
                return Ok(Vec::new());
            }
            return Err(Error::InvalidParameter(format!(
                "statement has no bind placeholders but {} binds were supplied",
                binds.len()
            )));
        }
        if binds.len() != self.bind_names.len() {
            return Err(Error::InvalidParameter(format!(
                "statement has {} bind placeholders but {} binds were supplied",
                self.bind_names.len(),
                binds.len()
            )));
        }

        // positional callers leave names empty
        let positional = binds.iter().all(|b| b.name.is_empty());
        if positional {
            return Ok(binds.to_vec());
        }

        let mut ordered = Vec::with_capacity(self.bind_names.len());
        for name in &self.bind_names {
            let found = binds
                .iter()
                .find(|b| b.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    Error::InvalidParameter(format!("no bind supplied for :{}", name))
                })?;
            ordered.push(found.clone());
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_type_detection() {
        assert_eq!(
            Statement::prepare("select * from dual").unwrap().statement_type(),
            StatementType::Query
        );
        assert_eq!(
            Statement::prepare("WITH x AS (select 1 from dual) select * from x")
                .unwrap()
                .statement_type(),
            StatementType::Query
        );
        assert_eq!(
            Statement::prepare("insert into t values (1)").unwrap().statement_type(),
            StatementType::Dml
        );
        assert_eq!(
            Statement::prepare("begin null; end;").unwrap().statement_type(),
            StatementType::Plsql
        );
        assert_eq!(
            Statement::prepare("create table t (c number)").unwrap().statement_type(),
            StatementType::Ddl
        );
        assert_eq!(
            Statement::prepare("commit").unwrap().statement_type(),
            StatementType::Commit
        );
    }

    #[test]
    fn test_type_detection_skips_comments_and_parens() {
        assert_eq!(
            Statement::prepare("-- leading comment\nselect 1 from dual")
                .unwrap()
                .statement_type(),
            StatementType::Query
        );
        assert_eq!(
            Statement::prepare("/* hint */ update t set c = 1")
                .unwrap()
                .statement_type(),
            StatementType::Dml
        );
        assert_eq!(
            Statement::prepare("(select 1 from dual)").unwrap().statement_type(),
            StatementType::Query
        );
    }

    #[test]
    fn test_empty_sql_rejected() {
        assert!(Statement::prepare("").is_err());
        assert!(Statement::prepare("   ").is_err());
    }

    #[test]
    fn test_bind_names_extracted() {
        let stmt = Statement::prepare("select :a, :b, :a from dual").unwrap();
        assert_eq!(stmt.bind_names(), ["A", "B"]);
    }

    #[test]
    fn test_parse_required_until_cursor_assigned() {
        let mut stmt = Statement::prepare("select 1 from dual").unwrap();
        assert!(stmt.requires_parse());
        stmt.set_cursor_id(7);
        assert!(!stmt.requires_parse());
        assert_eq!(stmt.cursor_id(), 7);
    }

    #[test]
    fn test_order_binds_by_name() {
        let stmt = Statement::prepare("select :a, :b from dual").unwrap();
        let binds = [
            BindParam::new("b", 2i64),
            BindParam::new("a", 1i64),
        ];
        let ordered = stmt.order_binds(&binds).unwrap();
        assert_eq!(ordered[0].name, "a");
        assert_eq!(ordered[1].name, "b");
    }

    #[test]
    fn test_order_binds_positional() {
        let stmt = Statement::prepare("select :1, :2 from dual").unwrap();
        let binds = [
            BindParam::new("", 1i64),
            BindParam::new("", 2i64),
        ];
        let ordered = stmt.order_binds(&binds).unwrap();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn test_order_binds_count_mismatch() {
        let stmt = Statement::prepare("select :a from dual").unwrap();
        assert!(stmt.order_binds(&[]).is_err());
        let stmt = Statement::prepare("select 1 from dual").unwrap();
        assert!(stmt.order_binds(&[BindParam::new("a", 1i64)]).is_err());
    }

    #[test]
    fn test_bind_param_constructors() {
        let in_bind = BindParam::new("x", 5i64);
        assert!(in_bind.direction.is_input());
        assert_eq!(in_bind.oracle_type, OracleType::Number);

        let out_bind = BindParam::output("y", OracleType::Varchar, 4000);
        assert!(out_bind.direction.is_output());
        assert!(!out_bind.direction.is_input());

        let io_bind = BindParam::input_output("z", "seed", 4000);
        assert!(io_bind.direction.is_input());
        assert!(io_bind.direction.is_output());
    }
}
