use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Drafts, Request};
use serde_json::json;
use tracing::info;

fn with_drafts(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Drafts, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(drafts) = state.drafts.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(drafts, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn draft_key(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let key = get_required_str(params, "key")?;
    if key.is_empty() {
        return Err(HandlerErr::bad_params("key must not be empty"));
    }
    Ok(key)
}

fn drafts_update(drafts: &Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = draft_key(params)?;
    let Some(content) = params.get("content") else {
        return Err(HandlerErr::bad_params("missing content"));
    };
    drafts.autosaver.update(&key, content.clone());
    Ok(json!({ "ok": true, "pending": true }))
}

fn drafts_get(drafts: &Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = draft_key(params)?;
    let content = drafts
        .store
        .read(&key)
        .map_err(|e| HandlerErr::new("draft_read_failed", e.to_string()))?;
    Ok(json!({ "key": key, "content": content }))
}

/// Submitting ends the draft: any pending autosave is dropped and the
/// stored copy removed before the response goes out.
fn drafts_submit(drafts: &Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = draft_key(params)?;
    drafts
        .autosaver
        .discard(&key)
        .map_err(|e| HandlerErr::new("draft_remove_failed", e.to_string()))?;
    info!(key = %key, "draft submitted");
    Ok(json!({ "ok": true, "content": params.get("content").cloned() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "drafts.update" => Some(with_drafts(state, req, drafts_update)),
        "drafts.get" => Some(with_drafts(state, req, drafts_get)),
        "drafts.submit" => Some(with_drafts(state, req, drafts_submit)),
        _ => None,
    }
}
