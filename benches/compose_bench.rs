use criterion::{black_box, criterion_group, criterion_main, Criterion};
use drksci_press::ats::normalize_text_for_ats;
use drksci_press::{compress_pdf, merge_pdfs, DocumentKind, PdfDocument};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

fn sample_pdf(pages: usize) -> PdfDocument {
    let mut doc = Document::with_version("1.5");
    let tree_id = doc.new_object_id();
    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1).repeat(40))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        kids.push(Object::Reference(doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("MediaBox", Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()])),
        ]))));
    }
    doc.objects.insert(
        tree_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(pages as i64)),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    PdfDocument::new(DocumentKind::Content, out)
}

fn bench_ats_normalize(c: &mut Criterion) {
    let text = "\u{201C}Innovation Lab\u{201D} \u{2014} 2019\u{2013}2024\u{00A0}\u{2022} it\u{2019}s\u{2026}  \n".repeat(200);
    c.bench_function("normalize_text_for_ats", |b| {
        b.iter(|| normalize_text_for_ats(black_box(&text)))
    });
}

fn bench_merge(c: &mut Criterion) {
    let cover = sample_pdf(1);
    let content = sample_pdf(12);
    c.bench_function("merge_cover_and_content", |b| {
        b.iter(|| merge_pdfs(black_box(&[Some(&cover), Some(&content)])).unwrap())
    });
}

fn bench_compress(c: &mut Criterion) {
    let content = sample_pdf(12);
    c.bench_function("compress_pdf", |b| {
        b.iter(|| compress_pdf(black_box(content.clone()), None))
    });
}

criterion_group!(benches, bench_ats_normalize, bench_merge, bench_compress);
criterion_main!(benches);
