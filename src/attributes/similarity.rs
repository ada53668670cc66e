use crate::embedding::Embedding;

/// Calculate cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude or a non-finite
/// component, and for mismatched or empty inputs, so the result is never NaN.
/// Each vector is scaled by its largest component first, which keeps the sums
/// of squares finite for any finite input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (Some(scale_a), Some(scale_b)) = (max_abs(a), max_abs(b)) else {
        return 0.0;
    };

    let dot_product: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x / scale_a) * (y / scale_b))
        .sum();
    let norm_a: f32 = a.iter().map(|x| (x / scale_a).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| (y / scale_b).powi(2)).sum::<f32>().sqrt();

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Largest absolute component, or `None` for a zero or non-finite vector.
fn max_abs(v: &[f32]) -> Option<f32> {
    let max = v.iter().try_fold(0.0f32, |max, x| x.is_finite().then(|| max.max(x.abs())))?;
    (max > 0.0).then_some(max)
}

/// Pick the entry most similar to `query`.
///
/// Only a strictly greater score replaces the current best, so the first of
/// several equal scores wins.
pub fn best_match<'a, L>(
    query: &Embedding,
    candidates: impl IntoIterator<Item = (L, &'a Embedding)>,
) -> Option<(L, f32)> {
    let mut best: Option<(L, f32)> = None;

    for (label, embedding) in candidates {
        let score = cosine_similarity(query.as_slice(), embedding.as_slice());
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((label, score));
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::from(values.to_vec())
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - (-1.0)).abs() < 0.0001);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            (vec![0.3, -1.2, 4.0], vec![2.5, 0.1, -0.7]),
            (vec![1.0, 1.0], vec![-3.0, 0.5]),
            (vec![0.0, 0.0, 0.0], vec![1.0, 2.0, 3.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        }
    }

    #[test]
    fn test_zero_vector_is_zero() {
        let zero = vec![0.0; 4];
        let other = vec![0.5, 0.5, 0.5, 0.5];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
        assert_eq!(cosine_similarity(&other, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
        assert!(!cosine_similarity(&zero, &zero).is_nan());
    }

    #[test]
    fn test_magnitude_independent() {
        let a = vec![1.0, 2.0];
        let b = vec![10.0, 20.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_extreme_magnitudes() {
        let huge = vec![3.0e38, 3.0e38];
        let also_huge = vec![1.0e38, 1.0e38];
        assert!((cosine_similarity(&huge, &also_huge) - 1.0).abs() < 0.0001);

        let tiny = vec![1.0e-30, 0.0];
        assert!((cosine_similarity(&tiny, &[5.0, 0.0]) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_non_finite_is_zero() {
        let normal = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &normal), 0.0);
        assert_eq!(cosine_similarity(&normal, &[f32::INFINITY, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NEG_INFINITY, 0.0], &[f32::NEG_INFINITY, 0.0]), 0.0);
    }

    #[test]
    fn test_best_match_skips_non_finite_candidate() {
        let image = emb(&[1.0, 0.0]);
        let broken = emb(&[f32::NAN, 1.0]);
        let good = emb(&[1.0, 0.1]);

        let (label, score) = best_match(&image, [("broken", &broken), ("good", &good)]).unwrap();
        assert_eq!(label, "good");
        assert!(score.is_finite());
    }

    #[test]
    fn test_best_match_picks_highest() {
        let image = emb(&[1.0, 0.0]);
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);

        let (label, score) = best_match(&image, [("a", &a), ("b", &b)]).unwrap();
        assert_eq!(label, "a");
        assert!((score - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_best_match_first_seen_wins_ties() {
        let image = emb(&[1.0, 1.0]);
        let x = emb(&[1.0, 0.0]);
        let y = emb(&[0.0, 1.0]);

        assert_eq!(best_match(&image, [("x", &x), ("y", &y)]).unwrap().0, "x");
        assert_eq!(best_match(&image, [("y", &y), ("x", &x)]).unwrap().0, "y");
    }

    #[test]
    fn test_best_match_negative_scores() {
        let image = emb(&[1.0, 0.0]);
        let worse = emb(&[-1.0, 0.0]);
        let less_bad = emb(&[-1.0, 1.0]);

        let (label, score) = best_match(&image, [("worse", &worse), ("less_bad", &less_bad)]).unwrap();
        assert_eq!(label, "less_bad");
        assert!(score < 0.0);
    }

    #[test]
    fn test_best_match_empty() {
        let image = emb(&[1.0]);
        assert!(best_match::<&str>(&image, []).is_none());
    }
}
