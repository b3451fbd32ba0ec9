mod common;

use common::{request_err_code, request_ok, seed_class, set_grades, spawn_sidecar, temp_dir};
use serde_json::json;

fn list_ids(result: &serde_json::Value) -> Vec<String> {
    result["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn create_update_move_and_delete_students() {
    let workspace = temp_dir("gradesheet-students");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let (class_a, ids) = seed_class(
        &mut stdin,
        &mut reader,
        "4AM1",
        &[("Benali", "Amina"), ("Cherif", "Yacine"), ("Djebbar", "Sara")],
    );
    let (class_b, _) = seed_class(&mut stdin, &mut reader, "4AM2", &[]);

    let classes = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    let counts: Vec<(String, i64)> = classes["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|c| {
            (
                c["name"].as_str().expect("name").to_string(),
                c["studentCount"].as_i64().expect("count"),
            )
        })
        .collect();
    assert_eq!(counts, vec![("4AM1".to_string(), 3), ("4AM2".to_string(), 0)]);

    let listed = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({ "classId": class_a }));
    assert_eq!(list_ids(&listed), ids);
    assert_eq!(listed["students"][0]["displayName"], json!("Benali, Amina"));
    assert_eq!(listed["students"][2]["sortOrder"], json!(2));

    // Validation.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "classId": class_a, "lastName": "  ", "firstName": "X" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "classId": "missing", "lastName": "A", "firstName": "B" }),
    );
    assert_eq!(code, "not_found");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "classId": class_a, "lastName": "A", "firstName": "B", "dateOfBirth": "31/12/2010" }),
    );
    assert_eq!(code, "bad_params");

    // Partial update leaves untouched columns alone.
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.update",
        json!({
            "studentId": ids[1],
            "patch": { "specialCase": "medical", "dateOfBirth": "2011-03-09" }
        }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({ "classId": class_a }));
    let s = &listed["students"][1];
    assert_eq!(s["lastName"], json!("Cherif"));
    assert_eq!(s["specialCase"], json!("medical"));
    assert_eq!(s["dateOfBirth"], json!("2011-03-09"));
    assert!(s["updatedAt"].as_str().is_some());

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "students.update",
        json!({ "studentId": ids[1], "patch": { "shoeSize": 42 } }),
    );
    assert_eq!(code, "bad_params");

    // Move appends to the end of the target class.
    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.move",
        json!({ "studentId": ids[0], "targetClassId": class_b }),
    );
    assert_eq!(moved["moved"], json!(true));
    let a = request_ok(&mut stdin, &mut reader, "11", "students.list", json!({ "classId": class_a }));
    assert_eq!(list_ids(&a), vec![ids[1].clone(), ids[2].clone()]);
    let b = request_ok(&mut stdin, &mut reader, "12", "students.list", json!({ "classId": class_b }));
    assert_eq!(list_ids(&b), vec![ids[0].clone()]);

    // Delete cascades grades and attendance.
    set_grades(&mut stdin, &mut reader, &ids[2], 1, &[("exam", 12.0)]);
    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.add",
        json!({
            "studentId": ids[2], "date": "2024-10-01", "time": "08:00",
            "type": "absence", "year": "2024-2025", "term": 1
        }),
    );
    request_ok(&mut stdin, &mut reader, "14", "students.delete", json!({ "studentId": ids[2] }));
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "15",
        "attendance.list",
        json!({ "studentId": ids[2], "year": "2024-2025", "term": 1 }),
    );
    assert_eq!(code, "not_found");
    let code = request_err_code(&mut stdin, &mut reader, "16", "students.delete", json!({ "studentId": ids[2] }));
    assert_eq!(code, "not_found");

    // Deleting a class removes its roster.
    request_ok(&mut stdin, &mut reader, "17", "classes.delete", json!({ "classId": class_b }));
    let code = request_err_code(&mut stdin, &mut reader, "18", "students.list", json!({ "classId": class_b }));
    assert_eq!(code, "not_found");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "19",
        "students.update",
        json!({ "studentId": ids[0], "patch": { "firstName": "Z" } }),
    );
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reorder_accepts_full_and_visible_subset_orderings() {
    let workspace = temp_dir("gradesheet-students-reorder");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (class_id, ids) = seed_class(
        &mut stdin,
        &mut reader,
        "3AS",
        &[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")],
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.reorder",
        json!({ "classId": class_id, "orderedStudentIds": [ids[3], ids[2], ids[1], ids[0]] }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({ "classId": class_id }));
    assert_eq!(
        list_ids(&listed),
        vec![ids[3].clone(), ids[2].clone(), ids[1].clone(), ids[0].clone()]
    );

    // Subset [B, D] swaps within the slots B and D hold; C and A stay put.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.reorder",
        json!({ "classId": class_id, "orderedStudentIds": [ids[1], ids[3]] }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({ "classId": class_id }));
    assert_eq!(
        list_ids(&listed),
        vec![ids[1].clone(), ids[2].clone(), ids[3].clone(), ids[0].clone()]
    );

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "students.reorder",
        json!({ "classId": class_id, "orderedStudentIds": [ids[0], ids[0]] }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "7",
        "students.reorder",
        json!({ "classId": class_id, "orderedStudentIds": ["ghost"] }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
