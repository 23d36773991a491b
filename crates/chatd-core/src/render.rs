//! Minimal Jinja-shaped template renderer.
//!
//! spec.md §9 treats full Jinja rendering as an external collaborator and
//! only requires "simple variable substitution + control flow". This module
//! supports `{{ dotted.path }}` substitution against a `serde_json::Value`
//! and `{% if dotted.path %}...{% endif %}` truthiness blocks (no nesting,
//! no else — the prompt templates this crate ships with don't need more).

use serde_json::Value;

/// Render `template` against `vars`, resolving `{{dotted.path}}` tokens by
/// walking `vars` as a JSON object tree, and evaluating `{% if path %}...{% endif %}`
/// blocks by the path's JSON truthiness (present, non-null, non-false,
/// non-empty-string/array/object).
///
/// Deterministic and pure, as required by the spec's `Render` contract.
/// Unknown paths render as an empty string rather than erroring, so a
/// template referencing an absent optional field degrades gracefully.
pub fn render(template: &str, vars: &Value) -> String {
    let stripped = strip_if_blocks(template, vars);
    substitute_vars(&stripped, vars)
}

fn substitute_vars(template: &str, vars: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let path = after[..end].trim();
                out.push_str(&lookup_display(vars, path));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip `{% if path %}...{% endif %}` blocks, keeping inner content only
/// when `path` looks up truthy. Blocks do not nest.
fn strip_if_blocks(template: &str, vars: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{% if ") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_tag = &rest[start..];
                let tag_end = match after_tag.find("%}") {
                    Some(i) => i,
                    None => {
                        out.push_str(after_tag);
                        break;
                    }
                };
                let cond_path = after_tag[6..tag_end].trim();
                let after_open = &after_tag[tag_end + 2..];
                let (body, remainder) = match after_open.find("{% endif %}") {
                    Some(i) => (&after_open[..i], &after_open[i + "{% endif %}".len()..]),
                    None => (after_open, ""),
                };
                if is_truthy(lookup(vars, cond_path)) {
                    out.push_str(body);
                }
                rest = remainder;
            }
        }
    }
    out
}

/// Walk a dotted path (`a.b.c`) through nested JSON objects. `None` on any
/// missing key or non-object intermediate, matching the `UserDataAccessor`
/// contract in SPEC_FULL §4.3.
pub fn lookup<'a>(vars: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut cur = vars;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur)
}

fn lookup_display(vars: &Value, path: &str) -> String {
    match lookup(vars, path) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_nested_path() {
        let vars = json!({"agent": {"name": "Nova"}});
        assert_eq!(render("hello {{agent.name}}", &vars), "hello Nova");
    }

    #[test]
    fn unknown_path_renders_empty() {
        let vars = json!({});
        assert_eq!(render("hi {{missing.path}}", &vars), "hi ");
    }

    #[test]
    fn if_block_truthy() {
        let vars = json!({"memo": "remember this"});
        let tmpl = "a{% if memo %}[{{memo}}]{% endif %}b";
        assert_eq!(render(tmpl, &vars), "a[remember this]b");
    }

    #[test]
    fn if_block_falsy_drops_body() {
        let vars = json!({"memo": ""});
        let tmpl = "a{% if memo %}[{{memo}}]{% endif %}b";
        assert_eq!(render(tmpl, &vars), "ab");
    }
}
