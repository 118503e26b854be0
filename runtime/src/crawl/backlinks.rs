//! Inbound-link counting over a finished crawl.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// The outbound links of one discovered page.
#[derive(Debug, Clone)]
pub struct LinkSet {
    pub url: String,
    pub links: Vec<String>,
}

/// For every page in `sets`, the number of distinct *other* pages in `sets`
/// that link to it.
///
/// Each page contributes a partial count map of its own distinct targets; the
/// partials are merged afterwards. Links to URLs outside the set are ignored
/// and pages nobody links to map to 0.
pub fn calculate_backlinks(sets: &[LinkSet]) -> HashMap<String, u32> {
    let known: HashSet<&str> = sets.iter().map(|s| s.url.as_str()).collect();

    let merged = sets
        .par_iter()
        .map(|set| {
            let targets: HashSet<&str> = set
                .links
                .iter()
                .map(String::as_str)
                .filter(|t| *t != set.url && known.contains(t))
                .collect();
            targets
                .into_iter()
                .map(|t| (t, 1u32))
                .collect::<HashMap<&str, u32>>()
        })
        .reduce(HashMap::new, |mut acc, partial| {
            for (target, n) in partial {
                *acc.entry(target).or_insert(0) += n;
            }
            acc
        });

    sets.iter()
        .map(|s| {
            let count = merged.get(s.url.as_str()).copied().unwrap_or(0);
            (s.url.clone(), count)
        })
        .collect()
}
