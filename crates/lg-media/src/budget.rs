//! Frame budget: caps how many frames go to the classifier.
//!
//! Uniform stride over the candidates, starting at index 0, so long videos
//! are thinned evenly instead of being truncated at either end.

/// Indices kept when reducing `len` candidates to at most `budget`.
///
/// `stride = floor(len / budget)`; indices `0, stride, 2*stride, ...`
/// truncated to `budget` items.
pub fn select_indices(len: usize, budget: usize) -> Vec<usize> {
    if budget == 0 {
        return Vec::new();
    }
    if len <= budget {
        return (0..len).collect();
    }
    let stride = len / budget;
    (0..len).step_by(stride).take(budget).collect()
}

/// Reduce `items` to at most `budget` evenly spaced elements, preserving order.
pub fn select_frames<T>(items: Vec<T>, budget: usize) -> Vec<T> {
    let len = items.len();
    if len <= budget {
        return items;
    }

    let keep = select_indices(len, budget);
    let mut wanted = keep.into_iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if wanted.peek() == Some(&i) {
                wanted.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_into_five_uses_stride_two() {
        assert_eq!(select_indices(10, 5), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_under_budget_is_unchanged() {
        assert_eq!(select_frames(vec!['a', 'b', 'c'], 5), vec!['a', 'b', 'c']);
        assert_eq!(select_frames(vec!['a', 'b'], 2), vec!['a', 'b']);
    }

    #[test]
    fn test_non_divisible_length() {
        // 23 / 10 = 2
        let idx = select_indices(23, 10);
        assert_eq!(idx, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[test]
    fn test_exact_budget_and_increasing_indices() {
        for len in 1..200 {
            for budget in 1..len {
                let idx = select_indices(len, budget);
                assert_eq!(idx.len(), budget, "len={} budget={}", len, budget);
                assert_eq!(idx[0], 0);
                assert!(idx.windows(2).all(|w| w[0] < w[1]));
                assert!(*idx.last().unwrap() < len);
            }
        }
    }

    #[test]
    fn test_select_frames_keeps_selected_items() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(select_frames(items, 5), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_empty_and_zero_budget() {
        assert!(select_frames(Vec::<u8>::new(), 5).is_empty());
        assert!(select_frames(vec![1, 2, 3], 0).is_empty());
        assert!(select_indices(0, 0).is_empty());
    }
}
