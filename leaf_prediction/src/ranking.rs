use std::cmp::Ordering;

/// Numerically stable softmax; an empty input stays empty.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn rank(a: (usize, f32), b: (usize, f32)) -> Ordering {
    // Descending by probability, NaN last, ties by ascending index.
    match (a.1.is_nan(), b.1.is_nan()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => a.0.cmp(&b.0),
        (false, false) => b
            .1
            .partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0)),
    }
}

/// The `k` highest-probability `(class index, probability)` pairs.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| rank(*a, *b));
    ranked.truncate(k);
    ranked
}

pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    top_k(probabilities, 1).into_iter().next()
}
