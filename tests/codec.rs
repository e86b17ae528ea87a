use flatrecord::{
    ConnectionSpec, DelimitedCodec, FieldSpec, FieldType, RecordFault, Row, Schema, Value,
};
use std::sync::Arc;

fn schema(fields: Vec<FieldSpec>) -> Arc<Schema> {
    Arc::new(Schema::new(fields))
}

fn three_strings() -> Arc<Schema> {
    schema(vec![
        FieldSpec::string("a"),
        FieldSpec::string("b"),
        FieldSpec::string("c"),
    ])
}

fn quoted() -> ConnectionSpec {
    ConnectionSpec::default().with_text_qualifier('"')
}

#[test]
fn splits_plain_records() {
    let codec = DelimitedCodec::new(three_strings(), &ConnectionSpec::default());
    assert_eq!(codec.split("x,,z").unwrap(), vec!["x", "", "z"]);
}

#[test]
fn quoted_fields_keep_delimiters_and_qualifiers() {
    let codec = DelimitedCodec::new(three_strings(), &quoted());
    assert_eq!(
        codec.split(r#"1,"a, b","say ""hi""""#).unwrap(),
        vec!["1", "a, b", r#"say "hi""#]
    );
    assert_eq!(
        codec.split(r#""5" tall",plain,"""""#).unwrap(),
        vec![r#"5" tall"#, "plain", r#"""#]
    );
}

#[test]
fn field_count_mismatch_is_reported() {
    let codec = DelimitedCodec::new(three_strings(), &ConnectionSpec::default());
    assert_eq!(
        codec.split("a,b,c,d").unwrap_err(),
        RecordFault::FieldCountMismatch { expected: 3, found: 4 }
    );
    assert_eq!(
        codec.split("a,b").unwrap_err(),
        RecordFault::FieldCountMismatch { expected: 3, found: 2 }
    );
}

#[test]
fn missing_optional_trailing_fields_are_padded() {
    let s = schema(vec![
        FieldSpec::string("a"),
        FieldSpec::string("b").optional(),
        FieldSpec::string("c").optional(),
    ]);
    let codec = DelimitedCodec::new(s, &ConnectionSpec::default());
    assert_eq!(codec.split("only").unwrap(), vec!["only", "", ""]);
}

#[test]
fn unterminated_quote_names_the_column() {
    let codec = DelimitedCodec::new(three_strings(), &quoted());
    assert_eq!(
        codec.split(r#"a,b,"never closed"#).unwrap_err(),
        RecordFault::QuoteUnterminated { column: 3 }
    );
}

#[test]
fn multi_character_delimiter() {
    let conn = ConnectionSpec::default().with_delimiter("||");
    let codec = DelimitedCodec::new(three_strings(), &conn);
    assert_eq!(codec.split("a|b||c||d").unwrap(), vec!["a|b", "c", "d"]);
    assert_eq!(codec.join(&["x".into(), "y|".into(), "z".into()]).unwrap(), "x||y|||z");
}

#[test]
fn raw_mode_takes_the_whole_record() {
    let conn = ConnectionSpec::default().with_delimiter("");
    let s = schema(vec![FieldSpec::string("line"), FieldSpec::string("id").system()]);
    let codec = DelimitedCodec::new(s, &conn);
    assert!(codec.is_raw());
    assert_eq!(codec.split("a,b,\"c").unwrap(), vec!["a,b,\"c"]);
}

#[test]
fn empty_delimiter_with_several_fields_uses_comma() {
    let conn = ConnectionSpec::default().with_delimiter("");
    let codec = DelimitedCodec::new(three_strings(), &conn);
    assert!(!codec.is_raw());
    assert_eq!(codec.split("1,2,3").unwrap(), vec!["1", "2", "3"]);
}

#[test]
fn join_quotes_every_field_and_doubles_qualifiers() {
    let codec = DelimitedCodec::new(three_strings(), &quoted());
    let line = codec
        .join(&["1".into(), "a,b".into(), r#"say "hi""#.into()])
        .unwrap();
    assert_eq!(line, r#""1","a,b","say ""hi""""#);
    assert_eq!(codec.split(&line).unwrap(), vec!["1", "a,b", r#"say "hi""#]);
}

#[test]
fn per_field_quoting_can_be_turned_off() {
    let s = schema(vec![
        FieldSpec::new("id", FieldType::Int).with_quoted(false),
        FieldSpec::string("name"),
    ]);
    let codec = DelimitedCodec::new(s, &quoted());
    assert_eq!(codec.join(&["7".into(), "x".into()]).unwrap(), r#"7,"x""#);
}

#[test]
fn unquoted_values_that_would_corrupt_the_line_are_rejected() {
    let codec = DelimitedCodec::new(three_strings(), &ConnectionSpec::default());
    let err = codec
        .join(&["ok".into(), "a,b".into(), "ok".into()])
        .unwrap_err();
    assert!(matches!(err, RecordFault::Unwritable { ref field, .. } if field == "b"));

    let err = codec
        .join(&["ok".into(), "ok".into(), "two\nlines".into()])
        .unwrap_err();
    assert_eq!(err.field(), Some("c"));
}

#[test]
fn encode_row_formats_then_joins_skipping_system_fields() {
    let s = schema(vec![
        FieldSpec::new("id", FieldType::Int),
        FieldSpec::string("internal").system(),
        FieldSpec::new("ok", FieldType::Bool),
    ]);
    let row = Row::new(
        Arc::clone(&s),
        vec![Value::Int(3), "hidden".into(), Value::Bool(true)],
    );
    let codec = DelimitedCodec::new(s, &ConnectionSpec::default());
    assert_eq!(codec.encode_row(&row).unwrap(), "3,true");
}

#[test]
fn derived_header_replaces_delimiters_in_labels() {
    let s = schema(vec![
        FieldSpec::string("id").with_label("Id"),
        FieldSpec::string("name").with_label("Last, First"),
        FieldSpec::string("hash").system(),
        FieldSpec::string("note"),
    ]);
    let codec = DelimitedCodec::new(s, &ConnectionSpec::default());
    assert_eq!(codec.derived_header(), "Id,Last  First,note");
}

#[test]
fn rows_from_another_schema_are_not_shifted() {
    let s = schema(vec![
        FieldSpec::string("hash").system(),
        FieldSpec::new("id", FieldType::Int),
        FieldSpec::string("name"),
    ]);
    let codec = DelimitedCodec::new(Arc::clone(&s), &ConnectionSpec::default());

    let narrowed = Row::new(Arc::new(s.io_schema()), vec![Value::Int(1), "a".into()]);
    let err = codec.encode_row(&narrowed).unwrap_err();
    assert!(matches!(err, RecordFault::Unwritable { ref field, .. } if field == "hash"));

    // An equal schema behind a different Arc is fine.
    let same = Row::new(Arc::new((*s).clone()), vec![Value::Null, Value::Int(1), "a".into()]);
    assert_eq!(codec.encode_row(&same).unwrap(), "1,a");
}
