use ironstream::Record;

#[test]
fn test_from_line_trims_each_field() {
    let r = Record::from_line("hallo welt \thello world\r\n");
    assert_eq!(r.len(), 2);
    assert_eq!(r.get(0), Some("hallo welt"));
    assert_eq!(r.get(1), Some("hello world"));
}

#[test]
fn test_canonical_line_drops_metadata() {
    let r = Record::from_line("src\ttgt\tdoc-1\t0.93");
    assert_eq!(r.len(), 4);
    assert_eq!(r.to_line(), "src\ttgt");
    assert_eq!(r.to_line_all(), "src\ttgt\tdoc-1\t0.93");
    assert_eq!(r.to_string(), "src\ttgt");
}

#[test]
fn test_short_record_line() {
    let r = Record::from_line("only-source");
    assert_eq!(r.to_line(), "only-source");
    assert_eq!(r.get(1), None);
}

#[test]
fn test_set_pads_missing_fields() {
    let mut r = Record::from_fields(["a"]);
    r.set(3, "d");
    assert_eq!(r.fields(), ["a", "", "", "d"]);
    assert_eq!(&r[3], "d");
}

#[test]
fn test_equality_covers_all_fields() {
    let a = Record::from_line("x\ty\tmeta-1");
    let b = Record::from_line("x\ty\tmeta-2");
    assert_ne!(a, b);
    assert_eq!(a.to_line(), b.to_line());
}

#[test]
fn test_append_selected_fields() {
    let mut a = Record::from_line("a\tb\t");
    let b = Record::from_line("c\td\te");
    a.append(&b, Some(&[0, 2]), " ");
    assert_eq!(a.fields(), ["a c", "b", "e"]);
}

#[test]
fn test_append_all_fields() {
    let mut a = Record::from_line("one\tuno");
    a.append(&Record::from_line("two\tdos"), None, " ");
    assert_eq!(a.to_line(), "one two\tuno dos");
}

#[test]
fn test_join_columns() {
    let joined = Record::join(
        &[Record::from_line("a\tb"), Record::from_line("d\te\tf")],
        "|",
        2,
    );
    assert_eq!(joined.to_line_all(), "a|d\tb|e");
}

#[test]
fn test_truncate_and_push() {
    let mut r = Record::from_line("a\tb\tc");
    r.truncate(1);
    r.push("z");
    assert_eq!(r.to_line_all(), "a\tz");
}
