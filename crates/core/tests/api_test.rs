mod common;

use common::{Xref, assemble_pdf, build_minimal_pdf_with_pages, minimal_objects, stream_body};
use pdfjson_core::codec::flate_encode;
use pdfjson_core::{
    ConvertOptions, ErrorKind, ObjectId, PdfError, json_to_pdf, pdf_to_json, pdf_to_json_batch,
    read_document,
};
use std::time::{Duration, Instant};

#[test]
fn batch_keeps_input_order_and_isolates_failures() {
    let inputs = vec![
        build_minimal_pdf_with_pages(1),
        b"definitely not a pdf".to_vec(),
        build_minimal_pdf_with_pages(3),
    ];
    let opts = ConvertOptions::default();

    for threads in [None, Some(2)] {
        let results = pdf_to_json_batch(&inputs, &opts, threads).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &pdf_to_json(&inputs[0], &opts).unwrap());
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err, PdfError::NoValidXRef));
        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
        assert_eq!(results[2].as_ref().unwrap(), &pdf_to_json(&inputs[2], &opts).unwrap());
    }
}

#[test]
fn passed_deadline_aborts_both_directions() {
    let pdf = build_minimal_pdf_with_pages(2);
    let json = pdf_to_json(&pdf, &ConvertOptions::default()).unwrap();
    let late = ConvertOptions::default().with_deadline(Instant::now() - Duration::from_millis(1));

    let err = pdf_to_json(&pdf, &late).unwrap_err();
    assert!(matches!(err, PdfError::DeadlineExceeded));
    assert_eq!(err.kind(), ErrorKind::Deadline);
    assert!(matches!(
        json_to_pdf(&json, &late),
        Err(PdfError::DeadlineExceeded)
    ));
}

#[test]
fn non_json_input_is_a_schema_violation() {
    let err = json_to_pdf(b"%PDF-1.7 not json", &ConvertOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    assert!(err.to_string().starts_with("schema violation at : invalid JSON"));
}

#[test]
fn pretty_and_compact_carry_the_same_value() {
    let pdf = build_minimal_pdf_with_pages(2);
    let pretty = pdf_to_json(&pdf, &ConvertOptions::default()).unwrap();
    let compact = pdf_to_json(&pdf, &ConvertOptions::default().with_pretty_json(false)).unwrap();

    assert!(pretty.contains(&b'\n'));
    assert!(!compact.contains(&b'\n'));
    let a: serde_json::Value = serde_json::from_slice(&pretty).unwrap();
    let b: serde_json::Value = serde_json::from_slice(&compact).unwrap();
    assert_eq!(a, b);
}

#[test]
fn encrypted_input_is_unsupported() {
    let mut objects = minimal_objects(1);
    objects.push((5, b"<< /Filter /Standard /V 2 /R 3 >>".to_vec()));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Encrypt 5 0 R", Xref::Table);

    let err = pdf_to_json(&pdf, &ConvertOptions::default()).unwrap_err();
    assert!(matches!(err, PdfError::Encrypted));
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[test]
fn options_cross_the_json_boundary() {
    let opts: ConvertOptions =
        serde_json::from_str(r#"{"jsonSchemaVersion": "V1", "prettyJson": false}"#).unwrap();
    let pdf = build_minimal_pdf_with_pages(1);
    let json = pdf_to_json(&pdf, &opts).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["version"], 1);
    // hex payload in the first schema version
    assert_eq!(
        value["objects"]["4 0 obj"]["stream"]["data"],
        hex::encode(b"BT /F1 12 Tf (Page 1) Tj ET")
    );
}

#[test]
fn deeply_nested_array_is_malformed_syntax() {
    let mut nested = vec![b'['; 200_000];
    nested.extend(std::iter::repeat_n(b']', 200_000));
    let mut objects = minimal_objects(1);
    objects.push((5, nested));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Deep 5 0 R", Xref::Table);

    let err = pdf_to_json(&pdf, &ConvertOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSyntax);
}

#[test]
fn hostile_predictor_row_stays_local_to_its_stream() {
    let payload = flate_encode(b"\x02abc").unwrap();
    let mut objects = minimal_objects(1);
    objects.push((
        5,
        stream_body(
            "/Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns 576460752303423488 >>",
            &payload,
        ),
    ));
    let pdf = assemble_pdf(&objects, "/Root 1 0 R /Thumb 5 0 R", Xref::Table);
    let opts = ConvertOptions::default();

    let json = pdf_to_json(&pdf, &opts).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    let stream = &value["objects"]["5 0 obj"]["stream"];
    assert_eq!(stream["decoded"], false);
    assert_eq!(stream["filters"][0]["name"], "/FlateDecode");

    let rebuilt = read_document(json_to_pdf(&json, &opts).unwrap(), &opts).unwrap();
    let raw = rebuilt.get(ObjectId::new(5, 0)).unwrap().as_stream().unwrap();
    assert_eq!(raw.raw(), payload.as_slice());
    assert_eq!(rebuilt.page_count(), 1);
}
