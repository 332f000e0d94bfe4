//! Materials catalog lookup for supplier and packaging enrichment.

use std::collections::HashMap;

use devize_shared::{AggregateLine, LineKind, MaterialCatalogEntry};

/// Code → most recent purchase record.
#[derive(Debug, Default)]
pub struct CatalogIndex<'a> {
    by_code: HashMap<&'a str, &'a MaterialCatalogEntry>,
}

impl<'a> CatalogIndex<'a> {
    /// Index `entries` by trimmed code.
    ///
    /// On duplicate codes the latest `purchase_date` wins, a dated entry beats
    /// an undated one, and ties keep the entry seen first.
    pub fn build(entries: &'a [MaterialCatalogEntry]) -> Self {
        let mut by_code: HashMap<&'a str, &'a MaterialCatalogEntry> = HashMap::new();
        for entry in entries {
            let code = entry.code.trim();
            if code.is_empty() {
                continue;
            }
            let replace = by_code
                .get(code)
                .is_none_or(|current| is_newer(entry, current));
            if replace {
                by_code.insert(code, entry);
            }
        }
        Self { by_code }
    }

    pub fn lookup(&self, code: &str) -> Option<&'a MaterialCatalogEntry> {
        self.by_code.get(code.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

fn is_newer(candidate: &MaterialCatalogEntry, current: &MaterialCatalogEntry) -> bool {
    match (candidate.purchase_date, current.purchase_date) {
        (Some(c), Some(e)) => c > e,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Fill `supplier`, `pack_quantity` and `pack_unit` on material lines whose
/// code is in the catalog. Returns how many lines matched.
///
/// A miss leaves the fields unset.
pub fn enrich_lines(lines: &mut [AggregateLine], index: &CatalogIndex<'_>) -> usize {
    let mut matched = 0;
    for line in lines.iter_mut().filter(|l| l.kind == LineKind::Material) {
        let Some(entry) = line.code.as_deref().and_then(|code| index.lookup(code)) else {
            continue;
        };
        line.supplier = entry.supplier_name.clone();
        line.pack_quantity = entry.pack_quantity;
        line.pack_unit = entry.pack_unit.clone();
        matched += 1;
    }
    matched
}
