//! PDF composition: page counting, merging and compression with `lopdf`
//!
//! Pages are copied as objects; nothing is re-rasterized.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info, warn};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::{Error, Result};

/// What a PDF buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Cover,
    Content,
    Merged,
    Compressed,
}

/// An in-memory PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    kind: DocumentKind,
    bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn new(kind: DocumentKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// Read a PDF from disk
    pub fn read_from(path: &Path, kind: DocumentKind) -> Result<Self> {
        Ok(Self::new(kind, std::fs::read(path)?))
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn page_count(&self) -> Result<usize> {
        page_count(&self.bytes)
    }
}

pub fn page_count(bytes: &[u8]) -> Result<usize> {
    let document = Document::load_mem(bytes)?;
    Ok(document.get_pages().len())
}

/// Which pages of a part go into a merge. Indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    All,
    First,
    SkipFirst,
    /// Listed pages in the listed order; repeats are dropped
    Indices(Vec<usize>),
}

impl PageSelection {
    fn pick(&self, pages: &[ObjectId]) -> Result<Vec<ObjectId>> {
        match self {
            PageSelection::All => Ok(pages.to_vec()),
            PageSelection::First => pages
                .first()
                .map(|id| vec![*id])
                .ok_or_else(|| Error::PdfError("document has no pages".into())),
            PageSelection::SkipFirst => Ok(pages.iter().skip(1).copied().collect()),
            PageSelection::Indices(indices) => {
                let mut picked: Vec<ObjectId> = Vec::with_capacity(indices.len());
                for &index in indices {
                    let id = pages.get(index).ok_or_else(|| {
                        Error::PdfError(format!("page {} out of range ({} pages)", index, pages.len()))
                    })?;
                    if !picked.contains(id) {
                        picked.push(*id);
                    }
                }
                Ok(picked)
            }
        }
    }
}

/// Merge every present part, in list order.
///
/// Absent parts are skipped; when all are absent the result is
/// [`Error::EmptyMerge`].
pub fn merge_pdfs(parts: &[Option<&PdfDocument>]) -> Result<PdfDocument> {
    let present: Vec<(&PdfDocument, PageSelection)> = parts
        .iter()
        .flatten()
        .map(|doc| (*doc, PageSelection::All))
        .collect();
    if present.is_empty() {
        return Err(Error::EmptyMerge);
    }
    merge_pdf_selections(&present)
}

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy attributes a page inherits from its page tree onto the page itself,
/// since the source tree is dropped.
fn flatten_inherited(source: &Document, page: &mut Dictionary) {
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;
        while let Some(id) = parent {
            depth += 1;
            if depth > 32 {
                break;
            }
            let Ok(node) = source.get_dictionary(id) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                page.set(key.to_vec(), value.clone());
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }
}

/// Document-level entries taken from the first part of a merge
#[derive(Default)]
struct Carried {
    /// Trailer `/Info` (title, author, producer)
    info: Option<Object>,
    /// Catalog `/Lang`
    lang: Option<Object>,
}

impl Carried {
    fn from_document(doc: &Document) -> Self {
        let lang = doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .and_then(|catalog| catalog.get(b"Lang"))
            .ok()
            .cloned();
        Self {
            info: doc.trailer.get(b"Info").ok().cloned(),
            lang,
        }
    }
}

/// Merge selected pages of each part, in list order.
///
/// The first part's `/Info` and `/Lang` carry over to the result.
pub fn merge_pdf_selections(parts: &[(&PdfDocument, PageSelection)]) -> Result<PdfDocument> {
    if parts.is_empty() {
        return Err(Error::EmptyMerge);
    }

    let mut max_id: u32 = 1;
    let mut page_order: Vec<ObjectId> = Vec::new();
    let mut pages: BTreeMap<ObjectId, Dictionary> = BTreeMap::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut carried: Option<Carried> = None;

    for (index, (part, selection)) in parts.iter().enumerate() {
        let mut doc = Document::load_mem(part.as_bytes())
            .map_err(|e| Error::PdfError(format!("Failed to load part {}: {}", index + 1, e)))?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        if carried.is_none() {
            carried = Some(Carried::from_document(&doc));
        }

        let source_pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in selection.pick(&source_pages)? {
            let mut page = doc.get_dictionary(page_id)?.clone();
            flatten_inherited(&doc, &mut page);
            page_order.push(page_id);
            pages.insert(page_id, page);
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or("") {
                "Catalog" | "Pages" | "Page" | "Outlines" | "Outline" => {}
                _ => {
                    objects.insert(object_id, object);
                }
            }
        }
    }

    if page_order.is_empty() {
        return Err(Error::PdfError("merge selected no pages".into()));
    }

    let mut document = Document::with_version("1.5");
    document.objects.extend(objects);
    document.max_id = max_id;

    let pages_id = document.new_object_id();
    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        document.objects.insert(page_id, Object::Dictionary(page));
    }

    let kids: Vec<Object> = page_order.iter().map(|&id| Object::Reference(id)).collect();
    let pages_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(page_order.len() as i64)),
    ]);
    document.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = document.new_object_id();
    let mut catalog = Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let carried = carried.unwrap_or_default();
    if let Some(lang) = carried.lang {
        catalog.set("Lang", lang);
    }
    document.objects.insert(catalog_id, Object::Dictionary(catalog));
    document.trailer.set("Root", Object::Reference(catalog_id));
    if let Some(info) = carried.info {
        document.trailer.set("Info", info);
    }

    // pages left out by a selection still dragged their content along
    let pruned = document.prune_objects();
    debug!("Pruned {} unreachable objects after merge", pruned.len());
    document.renumber_objects();

    let mut output = Vec::new();
    document
        .save_to(&mut output)
        .map_err(|e| Error::PdfError(format!("Failed to save merged PDF: {}", e)))?;

    info!("Merged {} parts into {} pages", parts.len(), page_order.len());
    Ok(PdfDocument::new(DocumentKind::Merged, output))
}

/// Cover then content.
///
/// Without a cover the content comes back untouched. When the merge itself
/// fails the content stands alone.
pub fn attach_cover(cover: Option<PdfDocument>, content: PdfDocument) -> PdfDocument {
    let Some(cover) = cover else {
        return content;
    };
    match merge_pdfs(&[Some(&cover), Some(&content)]) {
        Ok(merged) => merged,
        Err(e) => {
            warn!("Merge failed, using content only: {}", e);
            content
        }
    }
}

fn kb(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}

fn recompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut document = Document::load_mem(bytes)?;
    let pages = document.get_pages().len();

    document.prune_objects();
    document.delete_zero_length_streams();
    document.renumber_objects();
    document.compress();

    let mut output = Vec::new();
    document.save_to(&mut output)?;

    let reloaded = Document::load_mem(&output)?;
    if reloaded.get_pages().len() != pages {
        return Err(Error::PdfError(format!(
            "compressed PDF has {} pages, expected {}",
            reloaded.get_pages().len(),
            pages
        )));
    }
    Ok(output)
}

/// Losslessly shrink a PDF.
///
/// Never fails: when recompression errors, or does not make the file any
/// smaller, the original document comes back unchanged.
pub fn compress_pdf(doc: PdfDocument, target_size_hint: Option<usize>) -> PdfDocument {
    let original = doc.len();
    match recompress(doc.as_bytes()) {
        Ok(bytes) if bytes.len() < original => {
            info!("Compressed PDF: {:.2} KB -> {:.2} KB", kb(original), kb(bytes.len()));
            if let Some(target) = target_size_hint {
                if bytes.len() > target {
                    warn!(
                        "Compressed PDF is {:.2} KB, above the {:.2} KB target",
                        kb(bytes.len()),
                        kb(target)
                    );
                } else {
                    info!("Compressed PDF is within the {:.2} KB target", kb(target));
                }
            }
            PdfDocument::new(DocumentKind::Compressed, bytes)
        }
        Ok(bytes) => {
            info!(
                "Compression would not shrink the PDF ({:.2} KB -> {:.2} KB), keeping original",
                kb(original),
                kb(bytes.len())
            );
            doc
        }
        Err(e) => {
            warn!("PDF compression failed, keeping original: {}", e);
            doc
        }
    }
}
