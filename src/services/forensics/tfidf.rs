// TF-IDF cosine similarity between a submission and reference texts

use std::collections::HashMap;

use crate::services::text_processor::term_tokens;

type Vector = HashMap<String, f64>;

/// Similarity of `submission` to each reference, in [0, 1], one value per reference.
/// IDF is computed over the corpus `[submission] + references` with smoothing
/// (`ln((1 + n) / (1 + df)) + 1`), and vectors are L2-normalized.
pub fn tfidf_similarities(submission: &str, references: &[String]) -> Vec<f64> {
    if references.is_empty() {
        return vec![];
    }

    let docs: Vec<Vec<String>> = std::iter::once(submission)
        .chain(references.iter().map(|r| r.as_str()))
        .map(term_tokens)
        .collect();

    let n = docs.len() as f64;
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let mut seen: Vec<&str> = doc.iter().map(|t| t.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    let vectors: Vec<Vector> = docs
        .iter()
        .map(|doc| {
            let mut tf: Vector = HashMap::new();
            for t in doc {
                *tf.entry(t.clone()).or_insert(0.0) += 1.0;
            }
            for (term, weight) in tf.iter_mut() {
                let df = doc_freq.get(term.as_str()).copied().unwrap_or(0) as f64;
                *weight *= ((1.0 + n) / (1.0 + df)).ln() + 1.0;
            }
            normalize(tf)
        })
        .collect();

    let submission_vec = &vectors[0];
    vectors[1..]
        .iter()
        .map(|v| cosine(submission_vec, v).clamp(0.0, 1.0))
        .collect()
}

fn normalize(mut v: Vector) -> Vector {
    let norm = v.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in v.values_mut() {
            *w /= norm;
        }
    }
    v
}

fn cosine(a: &Vector, b: &Vector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|x| w * x))
        .sum()
}
