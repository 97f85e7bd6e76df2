//! Minibatch schedules.

pub use seqlab_core::corpus::shuffle;

/// Infinite series `start, start*rate, start*rate², ...` capped at `stop`.
///
/// With `start > stop` the series shrinks towards `stop` instead.
pub fn compounding(start: f64, stop: f64, rate: f64) -> impl Iterator<Item = f64> {
    let clip = move |v: f64| if start <= stop { v.min(stop) } else { v.max(stop) };
    let mut current = start;
    std::iter::repeat_with(move || {
        let value = clip(current);
        current *= rate;
        value
    })
}

/// Split `items` into consecutive batches whose sizes come from `sizes`.
///
/// Sizes are truncated to integers and never go below 1. The last batch holds
/// whatever is left.
pub fn minibatches<'a, T>(
    items: &'a [T],
    sizes: impl Iterator<Item = f64> + 'a,
) -> impl Iterator<Item = &'a [T]> + 'a {
    let mut rest = items;
    let mut sizes = sizes;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let size = (sizes.next().unwrap_or(1.0) as usize).clamp(1, rest.len());
        let (batch, tail) = rest.split_at(size);
        rest = tail;
        Some(batch)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compounding_grows_and_caps() {
        let sizes: Vec<f64> = compounding(1.0, 10.0, 2.0).take(6).collect();
        assert_eq!(sizes, vec![1.0, 2.0, 4.0, 8.0, 10.0, 10.0]);
    }

    #[test]
    fn test_compounding_decreasing() {
        let sizes: Vec<f64> = compounding(10.0, 2.0, 0.5).take(4).collect();
        assert_eq!(sizes, vec![10.0, 5.0, 2.5, 2.0]);
    }

    #[test]
    fn test_minibatches_follow_schedule() {
        let items: Vec<u32> = (0..10).collect();
        let batches: Vec<&[u32]> = minibatches(&items, compounding(2.0, 4.0, 2.0)).collect();
        assert_eq!(batches, vec![&[0, 1][..], &[2, 3, 4, 5], &[6, 7, 8, 9]]);
    }

    #[test]
    fn test_minibatches_never_empty() {
        let items = [1, 2, 3];
        let batches: Vec<&[i32]> = minibatches(&items, std::iter::repeat(0.3)).collect();
        assert_eq!(batches.len(), 3);
        let empty: [i32; 0] = [];
        assert_eq!(minibatches(&empty, std::iter::repeat(4.0)).count(), 0);
    }
}
