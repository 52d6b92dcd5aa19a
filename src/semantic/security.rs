//! Security scheme definitions and the requirements that use them.

use serde_json::{Map, Value};

use super::Checker;
use crate::pointer::{from_tokens, push_token};
use crate::types::Dialect;

fn require(c: &mut Checker<'_>, scheme: &Map<String, Value>, location: &str, kind: &str, field: &str) {
    let present = scheme
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !present {
        c.error(location, format!("{} security scheme requires `{}`", kind, field));
    }
}

pub(crate) fn check_security_schemes(c: &mut Checker<'_>) {
    let section = c.dialect.security_section();
    let Some(schemes) = c.section(section) else {
        return;
    };
    let base = from_tokens(section);

    for (name, scheme) in schemes {
        let location = push_token(&base, name);
        let Some(scheme) = c.resolve(scheme).as_object() else {
            continue;
        };
        match scheme.get("type").and_then(Value::as_str) {
            None => c.error(&location, "security scheme requires `type`"),
            Some(kind) => check_scheme(c, scheme, &location, kind),
        }
    }
}

fn check_scheme(c: &mut Checker<'_>, scheme: &Map<String, Value>, location: &str, kind: &str) {
    let swagger = c.dialect.is_swagger();
    match kind {
        "apiKey" => {
            require(c, scheme, location, kind, "name");
            require(c, scheme, location, kind, "in");
            let allowed: &[&str] = if swagger {
                &["query", "header"]
            } else {
                &["query", "header", "cookie"]
            };
            if let Some(place) = scheme.get("in").and_then(Value::as_str) {
                if !allowed.contains(&place) {
                    c.error(
                        push_token(location, "in"),
                        format!("apiKey `in` must be one of {}", allowed.join(", ")),
                    );
                }
            }
        }
        "basic" if swagger => {}
        "http" if !swagger => {
            require(c, scheme, location, kind, "scheme");
            let is_bearer = scheme
                .get("scheme")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("bearer"));
            if scheme.contains_key("bearerFormat") && !is_bearer {
                c.error(
                    push_token(location, "bearerFormat"),
                    "`bearerFormat` only applies to the bearer scheme",
                );
            }
        }
        "oauth2" if swagger => check_swagger_oauth2(c, scheme, location),
        "oauth2" => check_oauth2_flows(c, scheme, location),
        "openIdConnect" if !swagger => require(c, scheme, location, kind, "openIdConnectUrl"),
        "mutualTLS" if c.dialect == Dialect::OpenApi31 => {}
        other => c.error(
            push_token(location, "type"),
            format!("`{}` is not a valid security scheme type for {}", other, c.dialect),
        ),
    }
}

fn check_swagger_oauth2(c: &mut Checker<'_>, scheme: &Map<String, Value>, location: &str) {
    let Some(flow) = scheme.get("flow").and_then(Value::as_str) else {
        c.error(location, "oauth2 security scheme requires `flow`");
        return;
    };
    let needs: &[&str] = match flow {
        "implicit" => &["authorizationUrl"],
        "password" | "application" => &["tokenUrl"],
        "accessCode" => &["authorizationUrl", "tokenUrl"],
        other => {
            c.error(
                push_token(location, "flow"),
                format!("`{}` is not a valid oauth2 flow", other),
            );
            return;
        }
    };
    for field in needs {
        require(c, scheme, location, &format!("oauth2 {}", flow), field);
    }
    if !scheme.get("scopes").is_some_and(Value::is_object) {
        c.error(location, "oauth2 security scheme requires `scopes`");
    }
}

fn check_oauth2_flows(c: &mut Checker<'_>, scheme: &Map<String, Value>, location: &str) {
    let Some(flows) = scheme.get("flows").and_then(Value::as_object) else {
        c.error(location, "oauth2 security scheme requires `flows`");
        return;
    };
    let flows_location = push_token(location, "flows");
    for (name, flow) in flows {
        if name.starts_with("x-") {
            continue;
        }
        let flow_location = push_token(&flows_location, name);
        let needs: &[&str] = match name.as_str() {
            "implicit" => &["authorizationUrl"],
            "password" | "clientCredentials" => &["tokenUrl"],
            "authorizationCode" => &["authorizationUrl", "tokenUrl"],
            other => {
                c.error(&flow_location, format!("`{}` is not a valid oauth2 flow", other));
                continue;
            }
        };
        let Some(flow) = flow.as_object() else {
            continue;
        };
        for field in needs {
            require(c, flow, &flow_location, &format!("oauth2 {}", name), field);
        }
        if !flow.get("scopes").is_some_and(Value::is_object) {
            c.error(&flow_location, format!("oauth2 {} flow requires `scopes`", name));
        }
    }
}

/// Root and operation `security` entries must name declared schemes.
pub(crate) fn check_security_requirements(c: &mut Checker<'_>) {
    let section = c.dialect.security_section();
    let doc = c.doc;
    let declared = c.section(section);

    let mut lists: Vec<(String, &Value)> = Vec::new();
    if let Some(root) = doc.get("security") {
        lists.push(("/security".to_string(), root));
    }
    for op in c.operations() {
        if let Some(security) = op.op.get("security") {
            lists.push((push_token(&op.location, "security"), security));
        }
    }

    for (location, list) in lists {
        let Some(requirements) = list.as_array() else {
            continue;
        };
        for (i, requirement) in requirements.iter().enumerate() {
            let Some(requirement) = requirement.as_object() else {
                continue;
            };
            let entry = push_token(&location, &i.to_string());
            for (name, scopes) in requirement {
                let Some(scheme) = declared.and_then(|d| d.get(name)) else {
                    c.error(
                        push_token(&entry, name),
                        format!("security scheme `{}` is not defined", name),
                    );
                    continue;
                };
                let kind = c.resolve(scheme).get("type").and_then(Value::as_str);
                let scoped = matches!(kind, Some("oauth2") | Some("openIdConnect"));
                let has_scopes = scopes.as_array().is_some_and(|s| !s.is_empty());
                if has_scopes && !scoped && c.dialect != Dialect::OpenApi31 {
                    c.error(
                        push_token(&entry, name),
                        format!("security scheme `{}` does not take scopes", name),
                    );
                }
            }
        }
    }
}
