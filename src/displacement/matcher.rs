//! Brute-force Hamming matching with cross-check

use super::brief::BriefDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Index into the query (reference) descriptors
    pub query: usize,
    /// Index into the train (target) descriptors
    pub train: usize,
    pub distance: u32,
}

/// Keeps only pairs that are each other's nearest neighbour
///
/// Ties resolve to the lowest index. The result is ordered by query index.
pub fn cross_check_match(query: &[BriefDescriptor], train: &[BriefDescriptor]) -> Vec<Match> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let backward: Vec<usize> = train
        .iter()
        .map(|t| nearest(t, query).0)
        .collect();

    query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(q, train);
            (backward[ti] == qi).then_some(Match {
                query: qi,
                train: ti,
                distance,
            })
        })
        .collect()
}

fn nearest(descriptor: &BriefDescriptor, candidates: &[BriefDescriptor]) -> (usize, u32) {
    candidates
        .iter()
        .map(|c| descriptor.hamming(c))
        .enumerate()
        .min_by_key(|&(_, distance)| distance)
        .unwrap_or((0, u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(first: u64) -> BriefDescriptor {
        BriefDescriptor([first, 0, 0, 0])
    }

    fn pair(query: usize, train: usize, distance: u32) -> Match {
        Match {
            query,
            train,
            distance,
        }
    }

    #[test]
    fn test_mutual_best_pairs_only() {
        let query = [d(0b0000), d(0b1111)];
        let train = [d(0b1110), d(0b0001), d(0b0011)];

        let matches = cross_check_match(&query, &train);
        assert_eq!(matches, vec![pair(0, 1, 1), pair(1, 0, 1)]);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let query = [d(0b1)];
        let train = [d(0b11), d(0b101)];

        let matches = cross_check_match(&query, &train);
        assert_eq!(matches, vec![pair(0, 0, 1)]);
    }

    #[test]
    fn test_rejects_one_sided_match() {
        // Both queries prefer train 0; train 0 prefers query 1
        let query = [d(0b0111), d(0b0011)];
        let train = [d(0b0001)];

        let matches = cross_check_match(&query, &train);
        assert_eq!(matches, vec![pair(1, 0, 1)]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(cross_check_match(&[], &[d(1)]).is_empty());
        assert!(cross_check_match(&[d(1)], &[]).is_empty());
    }
}
