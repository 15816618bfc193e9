//! Adaptive palette reduction by median cut. Deterministic: the same
//! pixels always yield the same palette, so artifacts are reproducible.

/// Reduce `pixels` to at most `colors` representative entries, each the
/// mean of one box of the cut. Entries come back ordered by population,
/// largest first, ties broken by channel value.
pub fn palette(pixels: &[[u8; 3]], colors: usize) -> Vec<(u32, [u8; 3])> {
    if pixels.is_empty() || colors == 0 {
        return Vec::new();
    }
    let mut boxes: Vec<Vec<[u8; 3]>> = vec![pixels.to_vec()];
    while boxes.len() < colors {
        let Some(widest) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1)
            .max_by_key(|(_, b)| spread(b).1)
            .filter(|(_, b)| spread(b).1 > 0)
            .map(|(i, _)| i)
        else {
            break;
        };
        let mut pending = boxes.swap_remove(widest);
        let (channel, _) = spread(&pending);
        pending.sort_unstable_by_key(|p| (p[channel], *p));
        // Cut at the median channel value, not the pixel midpoint, so a
        // run of identical values stays in one box.
        let pivot = pending[pending.len() / 2][channel];
        let mut cut = pending.partition_point(|p| p[channel] < pivot);
        if cut == 0 {
            cut = pending.partition_point(|p| p[channel] <= pivot);
        }
        let upper = pending.split_off(cut);
        boxes.push(pending);
        boxes.push(upper);
    }
    let mut out: Vec<(u32, [u8; 3])> = boxes.iter().map(|b| (b.len() as u32, mean(b))).collect();
    out.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    out
}

/// Widest channel of a box and how wide it is.
fn spread(pixels: &[[u8; 3]]) -> (usize, u8) {
    let mut lo = [u8::MAX; 3];
    let mut hi = [u8::MIN; 3];
    for p in pixels {
        for c in 0..3 {
            lo[c] = lo[c].min(p[c]);
            hi[c] = hi[c].max(p[c]);
        }
    }
    (0..3)
        .map(|c| (c, hi[c] - lo[c]))
        .max_by_key(|&(_, w)| w)
        .unwrap_or((0, 0))
}

fn mean(pixels: &[[u8; 3]]) -> [u8; 3] {
    let mut sum = [0u64; 3];
    for p in pixels {
        for c in 0..3 {
            sum[c] += u64::from(p[c]);
        }
    }
    let n = pixels.len() as u64;
    [
        (sum[0] / n) as u8,
        (sum[1] / n) as u8,
        (sum[2] / n) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_empty_palette() {
        assert!(palette(&[], 8).is_empty());
        assert!(palette(&[[1, 2, 3]], 0).is_empty());
    }

    #[test]
    fn uniform_image_collapses_to_one_entry() {
        let pixels = vec![[10, 20, 30]; 100];
        let pal = palette(&pixels, 8);
        assert_eq!(pal, vec![(100, [10, 20, 30])]);
    }

    #[test]
    fn dominant_color_sorts_first() {
        let mut pixels = vec![[200, 0, 0]; 90];
        pixels.extend(vec![[0, 0, 200]; 10]);
        let pal = palette(&pixels, 2);
        assert_eq!(pal.len(), 2);
        assert_eq!(pal[0], (90, [200, 0, 0]));
        assert_eq!(pal[1], (10, [0, 0, 200]));
    }

    #[test]
    fn majority_run_does_not_bleed_into_the_minority_box() {
        let mut pixels = vec![[0, 0, 200]; 90];
        pixels.extend(vec![[200, 0, 0]; 10]);
        let pal = palette(&pixels, 2);
        assert_eq!(pal[0], (90, [0, 0, 200]));
        assert_eq!(pal[1], (10, [200, 0, 0]));
    }

    #[test]
    fn never_more_entries_than_requested() {
        let pixels: Vec<[u8; 3]> = (0u32..256)
            .map(|i| [(i % 256) as u8, (i * 7 % 256) as u8, (i * 13 % 256) as u8])
            .collect();
        for colors in [1usize, 4, 8, 16, 32] {
            let pal = palette(&pixels, colors);
            assert!(!pal.is_empty());
            assert!(pal.len() <= colors);
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let pixels: Vec<[u8; 3]> = (0u32..1000)
            .map(|i| [(i * 31 % 256) as u8, (i * 17 % 256) as u8, (i % 256) as u8])
            .collect();
        assert_eq!(palette(&pixels, 16), palette(&pixels, 16));
    }

    #[test]
    fn populations_sum_to_pixel_count() {
        let pixels: Vec<[u8; 3]> = (0u32..500)
            .map(|i| [(i % 200) as u8, 50, (i % 90) as u8])
            .collect();
        let pal = palette(&pixels, 8);
        let total: u32 = pal.iter().map(|(n, _)| n).sum();
        assert_eq!(total, 500);
    }
}
