mod common;

use common::{Xref, assemble_pdf, minimal_objects};
use pdfjson_core::{ConvertOptions, ObjectId, PdfValue, read_document};

fn id(n: u32) -> ObjectId {
    ObjectId::new(n, 0)
}

#[test]
fn walk_terminates_on_reference_cycles() {
    let mut objects = minimal_objects(1);
    objects.push((5, b"<< /Next 6 0 R /Self 5 0 R >>".to_vec()));
    objects.push((6, b"<< /Back 5 0 R >>".to_vec()));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Loop 5 0 R", Xref::Table);
    let doc = read_document(pdf, &ConvertOptions::default()).unwrap();

    let visited: Vec<ObjectId> = doc.walk_from_trailer().map(|(id, _)| id).collect();
    assert_eq!(visited.len(), 6);
    assert_eq!(visited[0], id(1));
    let mut sorted = visited.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), visited.len());
}

#[test]
fn walk_from_an_inner_value() {
    let mut objects = minimal_objects(1);
    objects.push((5, b"<< /Next 6 0 R >>".to_vec()));
    objects.push((6, b"[5 0 R 4 0 R]".to_vec()));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Loop 5 0 R", Xref::Table);
    let doc = read_document(pdf, &ConvertOptions::default()).unwrap();

    let from_six: Vec<ObjectId> = doc
        .walk(&PdfValue::Ref(id(6)))
        .map(|(id, _)| id)
        .collect();
    assert_eq!(from_six, vec![id(6), id(5), id(4)]);
}

#[test]
fn page_tree_cycle_yields_each_page_once() {
    let objects = vec![
        (1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()),
        (2, b"<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>".to_vec()),
        (3, b"<< /Type /Page /Parent 2 0 R >>".to_vec()),
        // intermediate node that lists its own ancestor as a kid
        (4, b"<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 2 0 R] /Count 1 >>".to_vec()),
        (5, b"<< /Type /Page /Parent 4 0 R >>".to_vec()),
    ];
    let pdf = assemble_pdf(&objects, "/Root 1 0 R", Xref::Table);
    let doc = read_document(pdf, &ConvertOptions::default()).unwrap();

    let pages: Vec<ObjectId> = doc.pages().map(|p| p.id).collect();
    assert_eq!(pages, vec![id(3), id(5)]);
}

#[test]
fn dangling_reference_resolves_to_null() {
    let mut objects = minimal_objects(1);
    objects.push((5, b"<< /Missing 40 0 R >>".to_vec()));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Info 5 0 R", Xref::Table);

    let doc = read_document(pdf.clone(), &ConvertOptions::default()).unwrap();
    let info = doc.get(id(5)).unwrap().as_dict().unwrap();
    assert!(doc.resolve_key(info, "Missing").is_null());
    assert_eq!(doc.dangling_references(), vec![id(40)]);
    // the walk skips what it cannot load
    assert!(doc.walk_from_trailer().all(|(id, _)| id.number != 40));

    let strict = ConvertOptions::default().with_strict(true);
    let err = read_document(pdf, &strict).unwrap_err();
    assert_eq!(err.to_string(), "unresolved reference: 40 0 R");
}

#[test]
fn unreachable_objects_are_not_walked() {
    let mut objects = minimal_objects(2);
    objects.push((9, b"(orphan)".to_vec()));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R", Xref::Table);
    let doc = read_document(pdf, &ConvertOptions::default()).unwrap();

    let reachable = doc.reachable();
    assert_eq!(reachable.len(), 6);
    assert!(!reachable.contains(&id(9)));
    assert!(doc.contains(id(9)));
}
