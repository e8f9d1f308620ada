//! SQL bind-name lexer
//!
//! Scans SQL/PL-SQL text for `:name` bind placeholders, skipping every
//! construct that can legally contain a colon: single-line comments, block
//! comments, string literals (including q-strings with arbitrary delimiters)
//! and double-quoted identifiers.
//!
//! Unquoted bind names are upper-cased the way the server folds identifiers;
//! quoted names (`:"mixed Case"`) are kept verbatim. Repeated names are
//! deduplicated, keeping first-occurrence order, which is the order the
//! execute message sends bind metadata in.

/// Extract the ordered, deduplicated list of bind names from a statement
pub fn bind_names(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut names: Vec<String> = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        match chars[pos] {
            '-' if chars.get(pos + 1) == Some(&'-') => {
                pos = skip_line_comment(&chars, pos + 2);
            }
            '/' if chars.get(pos + 1) == Some(&'*') => {
                pos = skip_block_comment(&chars, pos + 2);
            }
            '\'' => {
                pos = skip_string_literal(&chars, pos + 1);
            }
            'q' | 'Q'
                if chars.get(pos + 1) == Some(&'\'')
                    && (pos == 0 || !is_bind_char(chars[pos - 1])) =>
            {
                pos = skip_q_string(&chars, pos + 2);
            }
            '"' => {
                pos = skip_quoted(&chars, pos + 1);
            }
            ':' => {
                pos = read_bind(&chars, pos + 1, &mut names);
            }
            _ => pos += 1,
        }
    }

    names
}

fn skip_line_comment(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos] != '\n' {
        pos += 1;
    }
    pos
}

/// Block comments do not nest: the first `*/` ends the comment.
fn skip_block_comment(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() {
        if chars[pos] == '*' && chars.get(pos + 1) == Some(&'/') {
            return pos + 2;
        }
        pos += 1;
    }
    pos
}

/// A doubled quote inside the literal is an escaped quote, not the end.
fn skip_string_literal(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() {
        if chars[pos] == '\'' {
            if chars.get(pos + 1) == Some(&'\'') {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    pos
}

/// q-strings use a caller-chosen delimiter: `q'X ... X'`. The four bracket
/// characters pair with their closing counterpart; anything else closes on
/// itself.
fn skip_q_string(chars: &[char], pos: usize) -> usize {
    let open = match chars.get(pos) {
        Some(c) => *c,
        None => return pos,
    };
    let close = match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        c => c,
    };
    let mut pos = pos + 1;
    while pos < chars.len() {
        if chars[pos] == close && chars.get(pos + 1) == Some(&'\'') {
            return pos + 2;
        }
        pos += 1;
    }
    pos
}

fn skip_quoted(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos] != '"' {
        pos += 1;
    }
    pos + 1
}

fn is_bind_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}

/// Parse the text after a `:`. Whitespace may separate the colon from the
/// name. `:=` and a bare colon produce no bind.
fn read_bind(chars: &[char], mut pos: usize, names: &mut Vec<String>) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    match chars.get(pos) {
        Some('"') => {
            // quoted bind name, kept verbatim
            let start = pos + 1;
            let end = {
                let mut p = start;
                while p < chars.len() && chars[p] != '"' {
                    p += 1;
                }
                p
            };
            if end > start {
                push_unique(names, chars[start..end].iter().collect());
            }
            end + 1
        }
        Some(c) if c.is_ascii_digit() => {
            // positional bind: a run of digits
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            push_unique(names, chars[start..pos].iter().collect());
            pos
        }
        Some(c) if c.is_alphabetic() => {
            let start = pos;
            while pos < chars.len() && is_bind_char(chars[pos]) {
                pos += 1;
            }
            let name: String = chars[start..pos].iter().collect();
            push_unique(names, name.to_uppercase());
            pos
        }
        _ => pos,
    }
}

fn push_unique(names: &mut Vec<String>, name: String) {
    if !names.iter().any(|n| *n == name) {
        names.push(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Vec<String> {
        bind_names(sql)
    }

    #[test]
    fn test_single_line_comment() {
        let sql = "--begin :value2 := :a + :b + :c +:a +3; end;\n\
                   begin :value2 := :a + :c +3; end;";
        assert_eq!(parse(sql), ["VALUE2", "A", "C"]);
    }

    #[test]
    fn test_block_comment() {
        let sql = "/*--select * from :a where :a = 1\n\
                   select * from table_names where :a = 1*/\n\
                   select :table_name, :value from dual";
        assert_eq!(parse(sql), ["TABLE_NAME", "VALUE"]);
    }

    #[test]
    fn test_constant_strings() {
        let sql = "begin :value := to_date('20021231 12:31:00', :format); end;";
        assert_eq!(parse(sql), ["VALUE", "FORMAT"]);
    }

    #[test]
    fn test_division_operators_are_not_comments() {
        assert_eq!(
            parse("select :a / :b, :c / :d from dual"),
            ["A", "B", "C", "D"]
        );
    }

    #[test]
    fn test_leading_parentheses() {
        assert_eq!(
            parse("(select :a from dual) union (select :b from dual)"),
            ["A", "B"]
        );
    }

    #[test]
    fn test_quoted_identifier_is_not_a_bind() {
        assert_eq!(parse("select \":test\", :a from dual"), ["A"]);
    }

    #[test]
    fn test_non_ascii_bind_name() {
        assert_eq!(parse("select :méil$ from dual"), ["MÉIL$"]);
    }

    #[test]
    fn test_quoted_bind_names() {
        let cases: [(&str, &[&str]); 10] = [
            ("select :\"percent%\" from dual", &["percent%"]),
            ("select : \"q?marks\" from dual", &["q?marks"]),
            ("select :  \"per % cent\" from dual", &["per % cent"]),
            ("select :\"par(ens)\" from dual", &["par(ens)"]),
            ("select :\"more/slashes\" from dual", &["more/slashes"]),
            ("select :\"%percent\" from dual", &["%percent"]),
            ("select :\"1col:on\" from dual", &["1col:on"]),
            ("select :\"more :: %colons%\" from dual", &["more :: %colons%"]),
            ("select :\"spaces % spaces\" from dual", &["spaces % spaces"]),
            (
                "select \"col:nns\", :\"col:ons\", :id from dual",
                &["col:ons", "ID"],
            ),
        ];
        for (sql, expected) in cases {
            assert_eq!(parse(sql), expected, "sql: {}", sql);
        }
    }

    #[test]
    fn test_quoted_identifiers_and_quoted_binds_mixed() {
        let sql = "select \"/*_value1\" + : \"VaLue_2\" + :\"*/3VALUE\" from dual";
        assert_eq!(parse(sql), ["VaLue_2", "*/3VALUE"]);
    }

    #[test]
    fn test_string_with_escaped_quotes() {
        let sql = "select 'it''s, :not_a_bind', :a from dual";
        assert_eq!(parse(sql), ["A"]);
    }

    #[test]
    fn test_q_string_simple_delimiter() {
        let sql = "select q'!:not_a_bind!', :a from dual";
        assert_eq!(parse(sql), ["A"]);
    }

    #[test]
    fn test_q_string_bracket_delimiters() {
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}'), ('<', '>')] {
            let sql = format!("select q'{}:skip me{}', :x from dual", open, close);
            assert_eq!(parse(&sql), ["X"], "delimiter {}{}", open, close);
        }
    }

    #[test]
    fn test_plsql_assignment_is_not_a_bind() {
        let sql = "begin :value := 5; end;";
        assert_eq!(parse(sql), ["VALUE"]);
    }

    #[test]
    fn test_positional_binds() {
        assert_eq!(
            parse("insert into t (a, b) values (:1, :2)"),
            ["1", "2"]
        );
    }

    #[test]
    fn test_duplicate_binds_deduplicated_in_order() {
        assert_eq!(
            parse("select :b, :a, :b, :c, :a from dual"),
            ["B", "A", "C"]
        );
    }

    #[test]
    fn test_no_binds() {
        assert!(parse("select sysdate from dual").is_empty());
        assert!(parse("").is_empty());
    }
}
