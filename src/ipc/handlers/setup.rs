use crate::db;
use crate::drafts::DEFAULT_AUTOSAVE_DELAY;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::TERMS;
use crate::pipeline::{SortDirection, SortField};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    GradeSheet,
    Drafts,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::GradeSheet, SetupSection::Drafts];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "gradeSheet" => Some(Self::GradeSheet),
            "drafts" => Some(Self::Drafts),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::GradeSheet => "gradeSheet",
            Self::Drafts => "drafts",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::GradeSheet => "setup.gradeSheet",
            Self::Drafts => "setup.drafts",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::GradeSheet => json!({
            "activeYear": null,
            "activeTerm": 1,
            "defaultSortField": null,
            "defaultSortDirection": "none"
        }),
        SetupSection::Drafts => json!({
            "autosaveDelayMs": 2000
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_nullable_string_max(v: &Value, key: &str, max_len: usize) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(s.to_string()))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::GradeSheet => match k.as_str() {
                "activeYear" => {
                    obj.insert(k.clone(), parse_nullable_string_max(v, k, 16)?);
                }
                "activeTerm" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, *TERMS.start(), *TERMS.end())?),
                    );
                }
                "defaultSortField" => {
                    if !v.is_null() {
                        serde_json::from_value::<SortField>(v.clone())
                            .map_err(|_| format!("{} is not a sortable field", k))?;
                    }
                    obj.insert(k.clone(), v.clone());
                }
                "defaultSortDirection" => {
                    serde_json::from_value::<SortDirection>(v.clone())
                        .map_err(|_| format!("{} must be one of: asc, desc, none", k))?;
                    obj.insert(k.clone(), v.clone());
                }
                _ => return Err(format!("unknown gradeSheet field: {}", k)),
            },
            SetupSection::Drafts => match k.as_str() {
                "autosaveDelayMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 100, 60_000)?));
                }
                _ => return Err(format!("unknown drafts field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed stored value must not block the grade sheet.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Debounce delay for lesson-draft autosave in this workspace.
pub fn autosave_delay(conn: &rusqlite::Connection) -> anyhow::Result<Duration> {
    let drafts = load_section(conn, SetupSection::Drafts)?;
    let delay = drafts
        .get("autosaveDelayMs")
        .and_then(|v| v.as_u64())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_AUTOSAVE_DELAY);
    Ok(delay)
}

/// Workspace defaults for the grade sheet when a request leaves them out.
#[derive(Debug, Clone, Default)]
pub struct GradeSheetDefaults {
    pub active_year: Option<String>,
    pub active_term: i64,
    pub sort_field: Option<SortField>,
    pub sort_direction: SortDirection,
}

pub fn grade_sheet_defaults(conn: &rusqlite::Connection) -> anyhow::Result<GradeSheetDefaults> {
    let v = load_section(conn, SetupSection::GradeSheet)?;
    Ok(GradeSheetDefaults {
        active_year: v
            .get("activeYear")
            .and_then(|y| y.as_str())
            .map(|s| s.to_string()),
        active_term: v.get("activeTerm").and_then(|t| t.as_i64()).unwrap_or(1),
        sort_field: v
            .get("defaultSortField")
            .and_then(|f| serde_json::from_value(f.clone()).ok()),
        sort_direction: v
            .get("defaultSortDirection")
            .and_then(|d| serde_json::from_value(d.clone()).ok())
            .unwrap_or_default(),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(section = section.name(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
