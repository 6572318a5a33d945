use std::collections::HashMap;

use mailcast_core::normalize_address;

/// An address repeated within a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDuplicate {
    pub address: String,
    pub occurrences: usize,
}

/// Addresses occurring strictly more than `threshold` times in one upload,
/// in order of first appearance.
///
/// Unlike the history check this is `>`: with a threshold of 3, four copies
/// are flagged and three are not.
pub fn find_batch_duplicates<'a>(
    addresses: impl IntoIterator<Item = &'a str>,
    threshold: u32,
) -> Vec<BatchDuplicate> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for raw in addresses {
        let key = normalize_address(raw);
        if key.is_empty() {
            continue;
        }
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|address| {
            let occurrences = counts.get(&address).copied().unwrap_or(0);
            (occurrences > threshold as usize).then_some(BatchDuplicate { address, occurrences })
        })
        .collect()
}
