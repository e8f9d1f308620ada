//! Bind-name lexer behavior against representative SQL and PL/SQL texts

use oranet::parser::bind_names;

#[test]
fn test_comments_hide_binds() {
    assert_eq!(
        bind_names(
            "--begin :value2 := :a + :b + :c +:a +3; end;\n\
             begin :value2 := :a + :c +3; end;"
        ),
        ["VALUE2", "A", "C"]
    );
    assert_eq!(
        bind_names(
            "/*--select * from :a where :a = 1\n\
             select * from table_names where :a = 1*/\n\
             select :table_name, :value from dual"
        ),
        ["TABLE_NAME", "VALUE"]
    );
}

#[test]
fn test_string_literals_hide_binds() {
    assert_eq!(
        bind_names("begin :value := to_date('20021231 12:31:00', :format); end;"),
        ["VALUE", "FORMAT"]
    );
    assert_eq!(bind_names("select 'it''s :hidden' , :a from dual"), ["A"]);
}

#[test]
fn test_division_is_not_a_comment() {
    assert_eq!(
        bind_names("select :a / :b, :c / :d from dual"),
        ["A", "B", "C", "D"]
    );
}

#[test]
fn test_statement_starting_with_parenthesis() {
    assert_eq!(
        bind_names("(select :a from dual) union (select :b from dual)"),
        ["A", "B"]
    );
}

#[test]
fn test_quoted_identifier_is_not_a_bind() {
    assert_eq!(bind_names("select \":test\", :a from dual"), ["A"]);
}

#[test]
fn test_non_ascii_bind_names_fold_upward() {
    assert_eq!(bind_names("select :méil$ from dual"), ["MÉIL$"]);
}

#[test]
fn test_quoted_bind_names_keep_their_spelling() {
    let cases: &[(&str, &[&str])] = &[
        ("select :\"percent%\" from dual", &["percent%"]),
        ("select : \"q?marks\" from dual", &["q?marks"]),
        ("select :\"percent%(ens)yah\" from dual", &["percent%(ens)yah"]),
        ("select :  \"per % cent\" from dual", &["per % cent"]),
        ("select :\"par(ens)\" from dual", &["par(ens)"]),
        ("select :\"more/slashes\" from dual", &["more/slashes"]),
        ("select :\"%percent\" from dual", &["%percent"]),
        ("select :\"/slashes/\" from dual", &["/slashes/"]),
        ("select :\"1col:on\" from dual", &["1col:on"]),
        ("select :\"col:ons\" from dual", &["col:ons"]),
        ("select :\"more :: %colons%\" from dual", &["more :: %colons%"]),
        ("select :\"spaces % spaces\" from dual", &["spaces % spaces"]),
        (
            "select \"col:nns\", :\"col:ons\", :id from dual",
            &["col:ons", "ID"],
        ),
    ];
    for (sql, expected) in cases {
        assert_eq!(&bind_names(sql), expected, "sql: {}", sql);
    }
}

#[test]
fn test_mixed_quoted_identifiers_and_binds() {
    assert_eq!(
        bind_names("select \"/*_value1\" + : \"VaLue_2\" + :\"*/3VALUE\" from dual"),
        ["VaLue_2", "*/3VALUE"]
    );
}

#[test]
fn test_q_strings_with_every_delimiter_family() {
    assert_eq!(bind_names("select q'[:a ']' || :b from dual"), ["B"]);
    assert_eq!(bind_names("select q'{:a '}' || :b from dual"), ["B"]);
    assert_eq!(bind_names("select q'<:a '>' || :b from dual"), ["B"]);
    assert_eq!(bind_names("select q'(:a ')' || :b from dual"), ["B"]);
    assert_eq!(bind_names("select q'!:a '!' || :b from dual"), ["B"]);
    assert_eq!(bind_names("select Q'#:a '#' || :b from dual"), ["B"]);
}

#[test]
fn test_plsql_assignment_colon_is_skipped() {
    assert_eq!(bind_names("begin :value := :value + 1; end;"), ["VALUE"]);
}

#[test]
fn test_positional_and_named_ordering() {
    assert_eq!(
        bind_names("insert into t (a, b, c) values (:1, :2, :3)"),
        ["1", "2", "3"]
    );
    assert_eq!(
        bind_names("select :z, :y, :z, :x from dual"),
        ["Z", "Y", "X"]
    );
}

#[test]
fn test_no_binds_at_all() {
    assert!(bind_names("select count(*) from user_tables").is_empty());
    assert!(bind_names("").is_empty());
    assert!(bind_names("-- only a comment").is_empty());
}
