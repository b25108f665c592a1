use super::template::{quote, render, MissingPlaceholder, Quoting, TemplateContext, TemplateValue};

fn context() -> TemplateContext {
    TemplateContext::from([
        ("name".to_owned(), TemplateValue::Text("my rule".into())),
        ("path".to_owned(), TemplateValue::Raw("PATH='/opt/bin':$PATH".into())),
        (
            "files".to_owned(),
            TemplateValue::List(vec!["a.txt".into(), "it's.txt".into()]),
        ),
    ])
}

#[test]
pub fn quotes_everything_but_raw_values() {
    assert_eq!(
        render("{path} run {name} {files}", &context(), Quoting::All).unwrap(),
        r"PATH='/opt/bin':$PATH run 'my rule' a.txt 'it'\''s.txt'"
    );
    assert_eq!(
        render("run {name}", &context(), Quoting::None).unwrap(),
        "run my rule"
    );
}

#[test]
pub fn escaped_braces_are_literal() {
    assert_eq!(
        render("echo ${{HOME}} {name}", &context(), Quoting::None).unwrap(),
        "echo ${HOME} my rule"
    );
    assert_eq!(
        render("awk '{name} }'", &context(), Quoting::None).unwrap(),
        "awk 'my rule }'"
    );
}

#[test]
pub fn reports_missing_placeholders() {
    assert_eq!(
        render("{name} {threads}", &context(), Quoting::All),
        Err(MissingPlaceholder("threads".into()))
    );
    assert_eq!(
        render("{name", &context(), Quoting::All),
        Err(MissingPlaceholder("name".into()))
    );
}

#[test]
pub fn quote_keeps_simple_words() {
    assert_eq!(quote("sample_1.fastq"), "sample_1.fastq");
    assert_eq!(quote(""), "''");
    assert_eq!(quote("a b"), "'a b'");
}
