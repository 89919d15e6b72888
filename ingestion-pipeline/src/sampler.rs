use crate::types::Page;

/// How many pages of each kind a space sample keeps.
#[derive(Debug, Clone, Copy)]
pub struct SampleLimits {
    pub top_root: usize,
    pub top_recent: usize,
    pub top_frequent: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            top_root: 10,
            top_recent: 30,
            top_frequent: 30,
        }
    }
}

/// Selects a representative sample of a space's pages: root and first-level
/// pages in listing order, the most recently updated, and the most
/// frequently updated, deduplicated by page id keeping the first occurrence.
/// Bodies are fetched later and only for the pages returned here.
pub fn sample_pages(pages: &[Page], limits: SampleLimits) -> Vec<Page> {
    let root_and_first = pages
        .iter()
        .filter(|p| p.level <= 1)
        .take(limits.top_root);

    let mut most_recent: Vec<&Page> = pages.iter().collect();
    most_recent.sort_by(|a, b| b.updated.cmp(&a.updated));
    let most_recent = most_recent.into_iter().take(limits.top_recent);

    let mut most_frequent: Vec<&Page> = pages.iter().collect();
    most_frequent.sort_by(|a, b| b.update_count.cmp(&a.update_count));
    let most_frequent = most_frequent.into_iter().take(limits.top_frequent);

    let mut seen = std::collections::HashSet::new();
    let mut sampled = Vec::new();
    for page in root_and_first.chain(most_recent).chain(most_frequent) {
        if seen.insert(page.id.clone()) {
            sampled.push(page.clone());
        }
    }

    sampled
}
