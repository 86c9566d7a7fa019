use std::sync::LazyLock;

use ekp_openapi::ResourceId;
use regex::Regex;
use serde_json::Value;

/// `${<resource-id>.<Attribute>}`
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?P<id>[^${}.]+)\.(?P<attr>[A-Za-z0-9:]+)\}").expect("valid token pattern")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) id: ResourceId,
    pub(crate) attribute: String,
}

/// A piece of a string split at its tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Fragment<'a> {
    Literal(&'a str),
    Token(Token),
}

pub(crate) fn scan_str(value: &str) -> impl Iterator<Item = Token> + '_ {
    TOKEN.captures_iter(value).map(|captures| Token {
        id: captures["id"].into(),
        attribute: captures["attr"].into(),
    })
}

/// Every token anywhere inside a JSON value, in document order.
pub(crate) fn scan(value: &Value) -> Vec<Token> {
    let mut tokens = Vec::default();
    visit(value, &mut |s| tokens.extend(scan_str(s)));
    tokens
}

fn visit(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|item| visit(item, f)),
        Value::Object(map) => map.values().for_each(|item| visit(item, f)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

pub(crate) fn split(value: &str) -> Vec<Fragment<'_>> {
    let mut fragments = Vec::default();
    let mut last = 0;
    for captures in TOKEN.captures_iter(value) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() > last {
            fragments.push(Fragment::Literal(&value[last..whole.start()]));
        }
        fragments.push(Fragment::Token(Token {
            id: captures["id"].into(),
            attribute: captures["attr"].into(),
        }));
        last = whole.end();
    }
    if last < value.len() {
        fragments.push(Fragment::Literal(&value[last..]));
    }
    fragments
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn finds_tokens_in_nested_values() {
        let tokens = scan(&json!({
            "ClusterName": "${EksClusterStack/Cluster/Resource.Name}",
            "Selectors": [{ "Namespace": "monitoring" }],
            "Env": ["https://aps-workspaces/${ObservabilityStack/AmpWorkspace.WorkspaceId}/api"],
        }));

        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains(&Token {
            id: "EksClusterStack/Cluster/Resource".into(),
            attribute: "Name".into(),
        }));
    }

    #[test]
    fn splits_around_tokens() {
        assert_eq!(
            split("arn:${A/B.Arn}/x"),
            [
                Fragment::Literal("arn:"),
                Fragment::Token(Token {
                    id: "A/B".into(),
                    attribute: "Arn".into(),
                }),
                Fragment::Literal("/x"),
            ],
        );
        assert_eq!(split("plain"), [Fragment::Literal("plain")]);
    }
}
