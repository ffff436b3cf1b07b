//! The always-imported `BuiltIn` library and the automatic variables.

use once_cell::sync::Lazy;

use crate::library::{KeywordSpec, LibrarySpec, VariableSpec};

pub const BUILTIN_LIBRARY: &str = "BuiltIn";

const KEYWORDS: &[(&str, &[&str])] = &[
    ("Call Method", &["object", "method_name", "*args", "**kwargs"]),
    ("Catenate", &["*items"]),
    ("Comment", &["*messages"]),
    ("Convert To Boolean", &["item"]),
    ("Convert To Integer", &["item", "base=None"]),
    ("Convert To Number", &["item", "precision=None"]),
    ("Convert To String", &["item"]),
    ("Create Dictionary", &["*items", "**kwargs"]),
    ("Create List", &["*items"]),
    ("Evaluate", &["expression", "modules=None", "namespace=None"]),
    ("Fail", &["msg=None", "*tags"]),
    ("Get Count", &["container", "item"]),
    ("Get Length", &["item"]),
    ("Get Time", &["format=timestamp", "time_=NOW"]),
    ("Get Variable Value", &["name", "default=None"]),
    ("Import Library", &["name", "*args"]),
    ("Import Resource", &["path"]),
    ("Import Variables", &["path", "*args"]),
    ("Keyword Should Exist", &["name", "msg=None"]),
    ("Length Should Be", &["item", "length", "msg=None"]),
    ("Log", &["message", "level=INFO", "html=False", "console=False"]),
    ("Log Many", &["*messages"]),
    ("Log To Console", &["message", "stream=STDOUT", "no_newline=False"]),
    ("Log Variables", &["level=INFO"]),
    ("No Operation", &[]),
    ("Pass Execution", &["message", "*tags"]),
    ("Remove Tags", &["*tags"]),
    ("Repeat Keyword", &["repeat", "name", "*args"]),
    ("Return From Keyword", &["*return_values"]),
    ("Run Keyword", &["name", "*args"]),
    ("Run Keyword And Expect Error", &["expected_error", "name", "*args"]),
    ("Run Keyword And Ignore Error", &["name", "*args"]),
    ("Run Keyword And Return Status", &["name", "*args"]),
    ("Run Keyword If", &["condition", "name", "*args"]),
    ("Run Keyword Unless", &["condition", "name", "*args"]),
    ("Run Keywords", &["*keywords"]),
    ("Set Global Variable", &["name", "*values"]),
    ("Set Log Level", &["level"]),
    ("Set Suite Variable", &["name", "*values"]),
    ("Set Tags", &["*tags"]),
    ("Set Test Variable", &["name", "*values"]),
    ("Set Variable", &["*values"]),
    ("Should Be Empty", &["item", "msg=None"]),
    ("Should Be Equal", &["first", "second", "msg=None", "values=True"]),
    ("Should Be True", &["condition", "msg=None"]),
    ("Should Contain", &["container", "item", "msg=None"]),
    ("Should End With", &["str1", "str2", "msg=None"]),
    ("Should Match", &["string", "pattern", "msg=None"]),
    ("Should Match Regexp", &["string", "pattern", "msg=None"]),
    ("Should Not Be Empty", &["item", "msg=None"]),
    ("Should Not Be Equal", &["first", "second", "msg=None"]),
    ("Should Not Contain", &["container", "item", "msg=None"]),
    ("Should Start With", &["str1", "str2", "msg=None"]),
    ("Sleep", &["time_", "reason=None"]),
    ("Variable Should Exist", &["name", "msg=None"]),
    ("Wait Until Keyword Succeeds", &["retry", "retry_interval", "name", "*args"]),
];

const VARIABLES: &[(&str, &str)] = &[
    ("${EMPTY}", ""),
    ("@{EMPTY}", ""),
    ("&{EMPTY}", ""),
    ("${SPACE}", " "),
    ("${True}", "True"),
    ("${False}", "False"),
    ("${None}", "None"),
    ("${null}", "None"),
    ("${\\n}", "\n"),
    ("${TEMPDIR}", ""),
    ("${EXECDIR}", ""),
    ("${CURDIR}", ""),
    ("${/}", std::path::MAIN_SEPARATOR_STR),
    ("${:}", if cfg!(windows) { ";" } else { ":" }),
    ("${TEST NAME}", ""),
    ("@{TEST TAGS}", ""),
    ("${TEST DOCUMENTATION}", ""),
    ("${TEST STATUS}", ""),
    ("${TEST MESSAGE}", ""),
    ("${PREV TEST NAME}", ""),
    ("${PREV TEST STATUS}", ""),
    ("${PREV TEST MESSAGE}", ""),
    ("${SUITE NAME}", ""),
    ("${SUITE SOURCE}", ""),
    ("${SUITE DOCUMENTATION}", ""),
    ("&{SUITE METADATA}", ""),
    ("${SUITE STATUS}", ""),
    ("${SUITE MESSAGE}", ""),
    ("${KEYWORD STATUS}", ""),
    ("${KEYWORD MESSAGE}", ""),
    ("${LOG LEVEL}", "INFO"),
    ("${OUTPUT FILE}", ""),
    ("${LOG FILE}", ""),
    ("${REPORT FILE}", ""),
    ("${DEBUG FILE}", ""),
    ("${OUTPUT DIR}", ""),
];

static BUILTIN: Lazy<LibrarySpec> = Lazy::new(|| LibrarySpec {
    name: BUILTIN_LIBRARY.to_string(),
    version: String::new(),
    doc: "Generic keywords available in every data file.".to_string(),
    keywords: KEYWORDS
        .iter()
        .map(|(name, args)| KeywordSpec {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            doc: String::new(),
        })
        .collect(),
    variables: VARIABLES
        .iter()
        .map(|(name, value)| VariableSpec {
            name: name.to_string(),
            value: vec![value.to_string()],
        })
        .collect(),
});

pub fn library() -> &'static LibrarySpec {
    &BUILTIN
}

/// Keywords whose arguments name other keywords, with the index of the first such argument.
pub fn keyword_argument_start(name: &str) -> Option<usize> {
    match super::names::normalize(name).as_str() {
        "runkeyword"
        | "runkeywordandignoreerror"
        | "runkeywordandreturnstatus"
        | "runkeywords" => Some(0),
        "runkeywordandexpecterror" | "runkeywordif" | "runkeywordunless" | "repeatkeyword" => {
            Some(1)
        }
        "waituntilkeywordsucceeds" => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_complete_enough_to_resolve_common_calls() {
        let spec = library();
        for name in ["Log", "No Operation", "Should Be Equal", "Run Keyword If"] {
            assert!(spec.keywords.iter().any(|k| k.name == name), "{name}");
        }
        assert!(spec.variables.iter().any(|v| v.name == "${EMPTY}"));
        assert_eq!(keyword_argument_start("run_keyword_if"), Some(1));
        assert_eq!(keyword_argument_start("Log"), None);
    }
}
