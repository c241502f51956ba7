//! In-memory document: trailer, object table and page tree.
//!
//! Indirect objects live in one table keyed by [`ObjectId`]; references
//! between them are plain ids, so reference cycles need no shared
//! ownership. Traversals track visited ids and terminate on cycles.

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfValue};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Header version used when none is known.
pub const DEFAULT_PDF_VERSION: &str = "1.7";

static NULL: PdfValue = PdfValue::Null;

/// A parsed PDF document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    version: String,
    trailer: Dictionary,
    objects: BTreeMap<ObjectId, PdfValue>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DEFAULT_PDF_VERSION)
    }
}

impl Document {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            trailer: Dictionary::new(),
            objects: BTreeMap::new(),
        }
    }

    /// Header version, e.g. `"1.7"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Object by id; `UnresolvedReference` if absent.
    pub fn get(&self, id: ObjectId) -> Result<&PdfValue> {
        self.objects
            .get(&id)
            .ok_or(PdfError::UnresolvedReference(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut PdfValue> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn insert(&mut self, id: ObjectId, value: PdfValue) -> Option<PdfValue> {
        self.objects.insert(id, value)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<PdfValue> {
        self.objects.remove(&id)
    }

    /// Objects in ascending id order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &PdfValue)> + '_ {
        self.objects.iter().map(|(id, v)| (*id, v))
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut PdfValue)> + '_ {
        self.objects.iter_mut().map(|(id, v)| (*id, v))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().last().map_or(0, |id| id.number)
    }

    /// Follow a reference; dangling references resolve to null.
    pub fn resolve<'a>(&'a self, value: &'a PdfValue) -> &'a PdfValue {
        let mut current = value;
        let mut hops = 0;
        while let PdfValue::Ref(id) = current {
            hops += 1;
            if hops > 32 {
                return &NULL;
            }
            current = self.objects.get(id).unwrap_or(&NULL);
        }
        current
    }

    /// Resolve `key` in a dictionary.
    pub fn resolve_key<'a>(&'a self, dict: &'a Dictionary, key: &str) -> &'a PdfValue {
        dict.get(key).map_or(&NULL, |v| self.resolve(v))
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<&Dictionary> {
        match self.trailer.get("Root") {
            Some(root) => self.resolve(root).as_dict(),
            None => Err(PdfError::schema("/trailer", "missing /Root")),
        }
    }

    /// Objects reachable from `root`, each visited once.
    pub fn walk<'a>(&'a self, root: &PdfValue) -> Walk<'a> {
        let mut pending = Vec::new();
        root.for_each_ref(&mut |id| pending.push(id));
        pending.reverse();
        Walk {
            doc: self,
            pending,
            visited: FxHashSet::default(),
        }
    }

    /// Objects reachable from the trailer.
    pub fn walk_from_trailer(&self) -> Walk<'_> {
        self.walk(&PdfValue::Dict(self.trailer.clone()))
    }

    /// Ids of every object reachable from the trailer.
    pub fn reachable(&self) -> FxHashSet<ObjectId> {
        self.walk_from_trailer().map(|(id, _)| id).collect()
    }

    /// References (from the trailer or any object) whose target is absent,
    /// sorted and deduplicated.
    pub fn dangling_references(&self) -> Vec<ObjectId> {
        let mut missing = Vec::new();
        let mut check = |id: ObjectId| {
            if !self.objects.contains_key(&id) {
                missing.push(id);
            }
        };
        self.trailer.values().for_each(|v| v.for_each_ref(&mut check));
        self.objects.values().for_each(|v| v.for_each_ref(&mut check));
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Leaf pages in document order.
    pub fn pages(&self) -> Pages<'_> {
        let mut stack = Vec::new();
        if let Ok(catalog) = self.catalog()
            && let Some(PdfValue::Ref(pages)) = catalog.get("Pages")
        {
            stack.push(*pages);
        }
        Pages {
            doc: self,
            stack,
            visited: FxHashSet::default(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages().count()
    }

    /// Decoded content of a page, with multiple content streams
    /// concatenated.
    pub fn page_contents(&self, page: &Page<'_>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let contents = self.resolve_key(page.dict, "Contents");
        let parts: Vec<&PdfValue> = match contents {
            PdfValue::Array(arr) => arr.iter().map(|v| self.resolve(v)).collect(),
            PdfValue::Null => Vec::new(),
            other => vec![other],
        };
        for part in parts {
            out.extend_from_slice(&part.as_stream()?.decode()?);
        }
        Ok(out)
    }
}

/// Lazy traversal returned by [`Document::walk`].
pub struct Walk<'a> {
    doc: &'a Document,
    /// Stack of ids still to visit
    pending: Vec<ObjectId>,
    visited: FxHashSet<ObjectId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (ObjectId, &'a PdfValue);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.pending.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let Some(value) = self.doc.objects.get(&id) else {
                tracing::debug!(object = %id, "walk skips dangling reference");
                continue;
            };
            let mark = self.pending.len();
            value.for_each_ref(&mut |child| {
                if !self.visited.contains(&child) {
                    self.pending.push(child);
                }
            });
            self.pending[mark..].reverse();
            return Some((id, value));
        }
        None
    }
}

/// A leaf `/Type /Page` node.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub id: ObjectId,
    pub dict: &'a Dictionary,
}

/// Depth-first page-tree iterator returned by [`Document::pages`].
pub struct Pages<'a> {
    doc: &'a Document,
    stack: Vec<ObjectId>,
    /// Visited object IDs (to prevent cycles)
    visited: FxHashSet<ObjectId>,
}

impl<'a> Iterator for Pages<'a> {
    type Item = Page<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            let Ok(PdfValue::Dict(dict)) = self.doc.get(id) else {
                continue;
            };
            match dict.get("Type").and_then(|t| t.as_name().ok()) {
                Some("Pages") => {
                    if let PdfValue::Array(kids) = self.doc.resolve_key(dict, "Kids") {
                        // reverse so the first kid is popped first
                        for kid in kids.iter().rev() {
                            if let PdfValue::Ref(kid) = kid {
                                self.stack.push(*kid);
                            }
                        }
                    }
                }
                Some("Page") => return Some(Page { id, dict }),
                _ => {}
            }
        }
        None
    }
}
