use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Period, TERMS};
use rusqlite::Connection;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Missing and `null` both read as `None`; any other non-string is rejected.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.trim().to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

pub fn get_term(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let term = match params.get("term") {
        Some(v) if v.is_i64() => v.as_i64(),
        Some(v) => v.as_str().and_then(|s| s.trim().parse::<i64>().ok()),
        None => return Err(HandlerErr::bad_params("missing term")),
    };
    match term {
        Some(t) if TERMS.contains(&t) => Ok(t),
        _ => Err(HandlerErr::bad_params("term must be 1, 2 or 3")),
    }
}

pub fn get_period(params: &serde_json::Value) -> Result<Period, HandlerErr> {
    let year = get_required_str(params, "year")?;
    if year.is_empty() {
        return Err(HandlerErr::bad_params("year must not be empty"));
    }
    Ok(Period::new(year, get_term(params)?))
}

pub fn not_found(what: &str) -> HandlerErr {
    HandlerErr::new("not_found", format!("{} not found", what))
}

/// Runs a handler body against the open workspace database.
pub fn with_db(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}
