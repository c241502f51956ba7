//! Builders for small in-memory PDFs.
#![allow(dead_code)]

use pdfjson_core::codec::flate_encode;

/// How the cross-reference section is written.
#[derive(Clone, Copy, Debug)]
pub enum Xref {
    Table,
    Stream,
}

/// Lay out `objects` as `num 0 obj` blocks followed by a cross-reference
/// section indexing them. `trailer` is spliced into the trailer (or xref
/// stream) dictionary after `/Size`.
pub fn assemble_pdf(objects: &[(u32, Vec<u8>)], trailer: &str, xref: Xref) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets: Vec<(u32, usize)> = Vec::new();
    for (num, body) in objects {
        offsets.push((*num, out.len()));
        out.extend_from_slice(format!("{num} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let offset_of = |n: u32| offsets.iter().find(|(num, _)| *num == n).map(|(_, off)| *off);
    let size = offsets.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let xref_pos = out.len();

    match xref {
        Xref::Table => {
            out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
            for n in 0..size {
                let line = match offset_of(n) {
                    Some(off) => format!("{off:010} 00000 n \n"),
                    None => "0000000000 65535 f \n".to_string(),
                };
                out.extend_from_slice(line.as_bytes());
            }
            out.extend_from_slice(format!("trailer\n<< /Size {size} {trailer} >>\n").as_bytes());
        }
        Xref::Stream => {
            let stream_num = size;
            let size = size + 1;
            let mut rows = Vec::new();
            for n in 0..size {
                let (kind, offset) = if n == stream_num {
                    (1u8, xref_pos)
                } else {
                    offset_of(n).map_or((0, 0), |off| (1, off))
                };
                rows.push(kind);
                rows.extend_from_slice(&(offset as u32).to_be_bytes());
                rows.extend_from_slice(&[0, 0]);
            }
            let data = flate_encode(&rows).unwrap();
            out.extend_from_slice(
                format!(
                    "{stream_num} 0 obj\n<< /Type /XRef /Size {size} /W [1 4 2] /Filter /FlateDecode /Length {} {trailer} >>\nstream\n",
                    data.len()
                )
                .as_bytes(),
            );
            out.extend_from_slice(&data);
            out.extend_from_slice(b"\nendstream\nendobj\n");
        }
    }
    out.extend_from_slice(format!("startxref\n{xref_pos}\n%%EOF\n").as_bytes());
    out
}

/// Content stream of page `i` (zero-based).
pub fn page_content(i: usize) -> Vec<u8> {
    format!("BT /F1 12 Tf (Page {}) Tj ET", i + 1).into_bytes()
}

/// Catalog, page tree, pages and one uncompressed content stream per page.
pub fn minimal_objects(page_count: usize) -> Vec<(u32, Vec<u8>)> {
    let mut objects = vec![(1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec())];
    let kids: Vec<String> = (0..page_count).map(|i| format!("{} 0 R", 3 + i)).collect();
    objects.push((
        2,
        format!("<< /Type /Pages /Kids [{}] /Count {page_count} >>", kids.join(" ")).into_bytes(),
    ));
    for i in 0..page_count {
        let page_id = 3 + i;
        let contents_id = 3 + page_count + i;
        objects.push((
            page_id as u32,
            format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents {contents_id} 0 R >>")
                .into_bytes(),
        ));
    }
    for i in 0..page_count {
        let contents_id = 3 + page_count + i;
        let content = page_content(i);
        let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        body.extend_from_slice(&content);
        body.extend_from_slice(b"\nendstream");
        objects.push((contents_id as u32, body));
    }
    objects
}

pub fn build_minimal_pdf_with_pages(page_count: usize) -> Vec<u8> {
    assemble_pdf(&minimal_objects(page_count), "/Root 1 0 R", Xref::Table)
}

/// Stream object body with the given dictionary entries and payload.
pub fn stream_body(dict_entries: &str, payload: &[u8]) -> Vec<u8> {
    let mut body =
        format!("<< {dict_entries} /Length {} >>\nstream\n", payload.len()).into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\nendstream");
    body
}
