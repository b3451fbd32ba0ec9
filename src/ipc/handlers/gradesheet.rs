use crate::attendance::SqliteAttendance;
use crate::calc::calculate_class;
use crate::db::{self, SqliteOrder};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::setup::{grade_sheet_defaults, GradeSheetDefaults};
use crate::ipc::helpers::{get_optional_str, get_required_str, get_term, not_found, with_db};
use crate::ipc::types::{AppState, Request};
use crate::model::Period;
use crate::pipeline::{apply_filters, GradeSheetFilters, GradeSheetView};
use crate::reorder::{DragEnd, ReorderCoordinator, ReorderFailurePolicy};
use crate::stats::{class_statistics, ClassStatistics};
use rusqlite::Connection;
use serde_json::json;
use tracing::{debug, info};

/// Parameters shared by `gradesheet.view` and `gradesheet.reorder`.
struct ViewParams {
    class_id: String,
    period: Period,
    filters: GradeSheetFilters,
}

fn parse_filters(
    params: &serde_json::Value,
    defaults: &GradeSheetDefaults,
) -> Result<GradeSheetFilters, HandlerErr> {
    let raw = match params.get("filters") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) if v.is_object() => Some(v),
        Some(_) => return Err(HandlerErr::bad_params("filters must be an object")),
    };
    let mut filters = match raw {
        Some(v) => serde_json::from_value::<GradeSheetFilters>(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid filters: {}", e)))?,
        None => GradeSheetFilters::default(),
    };

    // The workspace default sort applies only when the caller says nothing about sorting.
    let says_sort = raw
        .map(|v| v.get("sortField").is_some() || v.get("sortDirection").is_some())
        .unwrap_or(false);
    if !says_sort {
        filters.sort_field = defaults.sort_field;
        filters.sort_direction = defaults.sort_direction;
    }
    Ok(filters)
}

fn parse_view_params(conn: &Connection, params: &serde_json::Value) -> Result<ViewParams, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if !db::class_exists(conn, &class_id)? {
        return Err(not_found("class"));
    }
    let defaults = grade_sheet_defaults(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let term = if params.get("term").is_some() {
        get_term(params)?
    } else {
        defaults.active_term
    };
    let year = match get_optional_str(params, "year")?.filter(|y| !y.is_empty()) {
        Some(y) => y,
        None => defaults
            .active_year
            .clone()
            .ok_or_else(|| HandlerErr::bad_params("missing year (no active year configured)"))?,
    };

    Ok(ViewParams {
        class_id,
        period: Period::new(year, term),
        filters: parse_filters(params, &defaults)?,
    })
}

/// Loads, calculates and filters one class. Statistics cover the whole class,
/// not just the filtered rows.
fn build_view(conn: &Connection, vp: &ViewParams) -> Result<(GradeSheetView, ClassStatistics), HandlerErr> {
    let grades = db::load_student_grades(conn, &vp.class_id, vp.period.term)?;
    let attendance = SqliteAttendance::new(conn);
    let calculated = calculate_class(&grades, &attendance, &vp.period)?;
    let view = apply_filters(&calculated, &vp.filters, &attendance)?;
    let statistics = class_statistics(&calculated);
    Ok((view, statistics))
}

fn gradesheet_view(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let vp = parse_view_params(conn, params)?;
    let (view, statistics) = build_view(conn, &vp)?;
    debug!(
        class_id = %vp.class_id,
        year = %vp.period.year,
        term = vp.period.term,
        shown = view.students.len(),
        "grade sheet built"
    );
    Ok(json!({
        "classId": vp.class_id,
        "year": vp.period.year,
        "term": vp.period.term,
        "filters": vp.filters,
        "students": view.students,
        "groupSplitIndex": view.group_split_index,
        "groupSizes": [view.group_one().len(), view.group_two().len()],
        "statistics": statistics
    }))
}

fn gradesheet_reorder(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let vp = parse_view_params(conn, params)?;
    let event = DragEnd {
        active_id: get_required_str(params, "activeId")?,
        over_id: get_optional_str(params, "overId")?,
    };
    let policy = match get_optional_str(params, "failurePolicy")? {
        None => ReorderFailurePolicy::default(),
        Some(s) => ReorderFailurePolicy::parse(&s)
            .ok_or_else(|| HandlerErr::bad_params("failurePolicy must be refetch or keepOptimistic"))?,
    };

    let (view, _) = build_view(conn, &vp)?;
    let current = db::class_student_ids(conn, &vp.class_id)?;
    let mut coordinator = ReorderCoordinator::new(vp.class_id.clone(), current, policy);
    let mut backend = SqliteOrder::new(conn);
    let outcome = coordinator.on_drag_end(&view.ids(), &event, &mut backend);

    info!(class_id = %vp.class_id, active_id = %event.active_id, "grade sheet reorder");
    Ok(json!({ "outcome": outcome, "order": coordinator.order() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradesheet.view" => Some(with_db(state, req, gradesheet_view)),
        "gradesheet.reorder" => Some(with_db(state, req, gradesheet_reorder)),
        _ => None,
    }
}
