//! Execute and fetch messages
//!
//! First execution of a SQL text sends a combined parse+bind+execute call;
//! once the server has assigned a cursor id, later executions send a
//! re-execute referencing it and skip the SQL text entirely. For queries,
//! `prefetch_rows` rows ride back on the execute response, saving the first
//! fetch round trip.

use crate::buffer::WriteBuffer;
use crate::constants::{exec_option, FunctionCode};
use crate::error::Result;
use crate::messages::write_function_header;
use crate::statement::{BindParam, Statement};

/// Knobs for one execute call
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Rows piggybacked on the execute response (queries only)
    pub prefetch_rows: u32,
    /// Commit with the call once it succeeds
    pub autocommit: bool,
    /// Describe only, do not run
    pub describe_only: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            prefetch_rows: 2,
            autocommit: false,
            describe_only: false,
        }
    }
}

/// One execute (or re-execute) call
#[derive(Debug)]
pub struct ExecuteRequest<'a> {
    /// The statement being executed
    pub statement: &'a Statement,
    /// Binds in wire order
    pub binds: &'a [BindParam],
    /// Call options
    pub options: ExecuteOptions,
}

impl<'a> ExecuteRequest<'a> {
    /// Create an execute request
    pub fn new(statement: &'a Statement, binds: &'a [BindParam], options: ExecuteOptions) -> Self {
        Self {
            statement,
            binds,
            options,
        }
    }

    /// The option word announced to the server
    pub fn option_word(&self) -> u32 {
        let mut options = 0u32;
        if self.statement.requires_parse() {
            options |= exec_option::PARSE;
        }
        if !self.binds.is_empty() {
            options |= exec_option::BIND;
        }
        if self.options.describe_only {
            options |= exec_option::DESCRIBE;
        } else {
            options |= exec_option::EXECUTE;
        }
        if self.statement.is_query() {
            options |= exec_option::DEFINE | exec_option::FETCH;
        } else if !self.statement.is_plsql() {
            options |= exec_option::NOT_PLSQL;
        }
        if self.statement.is_plsql() && !self.binds.is_empty() {
            options |= exec_option::PLSQL_BIND;
        }
        if self.options.autocommit {
            options |= exec_option::COMMIT;
        }
        options
    }

    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        let function = if self.statement.requires_parse() {
            FunctionCode::Execute
        } else if self.statement.is_query() {
            FunctionCode::ReexecuteAndFetch
        } else {
            FunctionCode::Reexecute
        };
        write_function_header(buf, function, sequence)?;

        buf.write_ub4(self.option_word())?;
        buf.write_ub2(self.statement.cursor_id())?;

        // SQL text only travels with a parse
        if self.statement.requires_parse() {
            buf.write_str_with_length(self.statement.sql())?;
        } else {
            buf.write_null()?;
        }

        let prefetch = if self.statement.is_query() && !self.options.describe_only {
            self.options.prefetch_rows
        } else {
            0
        };
        buf.write_ub4(prefetch)?;

        // bind metadata, then bind values in the same order
        buf.write_ub2(self.binds.len() as u16)?;
        for bind in self.binds {
            buf.write_ub1(bind.oracle_type as u8)?;
            buf.write_ub1(bind.direction as u8)?;
            buf.write_ub4(bind.max_size)?;
        }
        for bind in self.binds {
            if bind.direction.is_input() {
                let raw = bind.value.encode()?;
                buf.write_bytes_with_length(&raw)?;
            } else {
                buf.write_null()?;
            }
        }
        Ok(())
    }
}

/// Array execute: one parse, one round trip, many bind rows.
///
/// Every row must carry the same shape; metadata is taken from the first
/// row and the iteration count precedes the value block.
#[derive(Debug)]
pub struct BatchExecuteRequest<'a> {
    /// The statement being executed
    pub statement: &'a Statement,
    /// Bind rows, one inner vector per iteration
    pub rows: &'a [Vec<crate::row::Value>],
    /// Call options
    pub options: ExecuteOptions,
}

impl BatchExecuteRequest<'_> {
    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        let first = self.rows.first().ok_or_else(|| {
            crate::error::Error::InvalidParameter("batch execute needs at least one row".into())
        })?;
        for row in self.rows {
            if row.len() != first.len() {
                return Err(crate::error::Error::InvalidParameter(format!(
                    "batch rows must have equal arity ({} != {})",
                    row.len(),
                    first.len()
                )));
            }
        }

        let function = if self.statement.requires_parse() {
            FunctionCode::Execute
        } else {
            FunctionCode::Reexecute
        };
        write_function_header(buf, function, sequence)?;

        let mut option_word = exec_option::BIND | exec_option::EXECUTE;
        if self.statement.requires_parse() {
            option_word |= exec_option::PARSE;
        }
        if !self.statement.is_plsql() {
            option_word |= exec_option::NOT_PLSQL;
        }
        if self.options.autocommit {
            option_word |= exec_option::COMMIT;
        }
        buf.write_ub4(option_word)?;
        buf.write_ub2(self.statement.cursor_id())?;
        if self.statement.requires_parse() {
            buf.write_str_with_length(self.statement.sql())?;
        } else {
            buf.write_null()?;
        }
        buf.write_ub4(0)?; // no prefetch on DML

        buf.write_ub2(first.len() as u16)?;
        for value in first {
            buf.write_ub1(value.oracle_type() as u8)?;
            buf.write_ub1(crate::constants::BindDirection::Input as u8)?;
            buf.write_ub4(0)?;
        }
        buf.write_ub4(self.rows.len() as u32)?;
        for row in self.rows {
            for value in row {
                let raw = value.encode()?;
                buf.write_bytes_with_length(&raw)?;
            }
        }
        Ok(())
    }
}

/// A fetch call requesting more rows from an open cursor
#[derive(Debug)]
pub struct FetchRequest {
    /// Cursor to fetch from
    pub cursor_id: u16,
    /// Upper bound on rows returned in this round trip
    pub num_rows: u32,
}

impl FetchRequest {
    /// Create a fetch request
    pub fn new(cursor_id: u16, num_rows: u32) -> Self {
        Self {
            cursor_id,
            num_rows,
        }
    }

    /// Write the message body
    pub fn write(&self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        write_function_header(buf, FunctionCode::Fetch, sequence)?;
        buf.write_ub2(self.cursor_id)?;
        buf.write_ub4(self.num_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MessageType;

    fn prepared(sql: &str) -> Statement {
        Statement::prepare(sql).unwrap()
    }

    #[test]
    fn test_first_execute_includes_parse_and_sql() {
        let stmt = prepared("select :a from dual");
        let binds = [BindParam::new("a", 1i64)];
        let req = ExecuteRequest::new(&stmt, &binds, ExecuteOptions::default());

        let options = req.option_word();
        assert!(options & exec_option::PARSE != 0);
        assert!(options & exec_option::BIND != 0);
        assert!(options & exec_option::FETCH != 0);

        let mut buf = WriteBuffer::new();
        req.write(&mut buf, 1).unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::Function as u8);
        assert_eq!(buf.as_slice()[1], FunctionCode::Execute as u8);
        let text = String::from_utf8_lossy(buf.as_slice()).into_owned();
        assert!(text.contains("select :a from dual"));
    }

    #[test]
    fn test_reexecute_omits_sql() {
        let mut stmt = prepared("select 1 from dual");
        stmt.set_cursor_id(42);
        let req = ExecuteRequest::new(&stmt, &[], ExecuteOptions::default());

        assert_eq!(req.option_word() & exec_option::PARSE, 0);
        let mut buf = WriteBuffer::new();
        req.write(&mut buf, 2).unwrap();
        assert_eq!(buf.as_slice()[1], FunctionCode::ReexecuteAndFetch as u8);
        let text = String::from_utf8_lossy(buf.as_slice()).into_owned();
        assert!(!text.contains("select"));
    }

    #[test]
    fn test_dml_reexecute_uses_plain_reexecute() {
        let mut stmt = prepared("delete from t");
        stmt.set_cursor_id(9);
        let req = ExecuteRequest::new(&stmt, &[], ExecuteOptions::default());
        let mut buf = WriteBuffer::new();
        req.write(&mut buf, 3).unwrap();
        assert_eq!(buf.as_slice()[1], FunctionCode::Reexecute as u8);
        assert!(req.option_word() & exec_option::NOT_PLSQL != 0);
    }

    #[test]
    fn test_plsql_with_binds_sets_plsql_bind() {
        let stmt = prepared("begin :x := 1; end;");
        let binds = [BindParam::output("x", crate::constants::OracleType::Number, 22)];
        let req = ExecuteRequest::new(&stmt, &binds, ExecuteOptions::default());
        assert!(req.option_word() & exec_option::PLSQL_BIND != 0);
        assert_eq!(req.option_word() & exec_option::NOT_PLSQL, 0);
    }

    #[test]
    fn test_autocommit_flag() {
        let stmt = prepared("insert into t values (1)");
        let options = ExecuteOptions {
            autocommit: true,
            ..Default::default()
        };
        let req = ExecuteRequest::new(&stmt, &[], options);
        assert!(req.option_word() & exec_option::COMMIT != 0);
    }

    #[test]
    fn test_fetch_request_layout() {
        let mut buf = WriteBuffer::new();
        FetchRequest::new(3, 100).write(&mut buf, 5).unwrap();
        assert_eq!(buf.as_slice()[0], MessageType::Function as u8);
        assert_eq!(buf.as_slice()[1], FunctionCode::Fetch as u8);
        assert_eq!(buf.as_slice()[2], 5);
    }
}
