//! Response status codes.

use serde_json::Value;

use super::Checker;
use crate::pointer::push_token;
use crate::types::Dialect;

fn is_valid_status(code: &str, dialect: Dialect) -> bool {
    if code == "default" {
        return true;
    }
    let bytes = code.as_bytes();
    if bytes.len() != 3 || !(b'1'..=b'5').contains(&bytes[0]) {
        return false;
    }
    let digits = bytes[1..].iter().all(u8::is_ascii_digit);
    // Range codes like `4XX` are 3.x only.
    let range = !dialect.is_swagger() && &bytes[1..] == b"XX";
    digits || range
}

pub(crate) fn check_responses(c: &mut Checker<'_>) {
    for op in c.operations() {
        let Some(responses) = op.op.get("responses").and_then(Value::as_object) else {
            continue;
        };
        let location = push_token(&op.location, "responses");
        for code in responses.keys() {
            if code.starts_with("x-") {
                continue;
            }
            if !is_valid_status(code, c.dialect) {
                c.error(
                    push_token(&location, code),
                    format!("`{}` is not a valid HTTP status code", code),
                );
            }
        }
    }
}
