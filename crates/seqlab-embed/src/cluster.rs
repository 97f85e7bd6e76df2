//! Agglomerative clustering of word vectors.
//!
//! A naive O(n³) merge loop over a full distance matrix, updated with the
//! Lance-Williams recurrences. Fine for the vocabulary slices one clusters
//! by hand; not for a whole vocabulary.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbedError, Result};
use crate::vectors::{KeyedVectors, dot, norm};

/// How the distance between two clusters is derived from their members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Closest pair of members.
    Single,
    /// Farthest pair of members.
    Complete,
    /// Mean over all member pairs.
    Average,
    /// Minimum increase in within-cluster variance. Euclidean only.
    Ward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::Complete => "complete",
            Self::Average => "average",
            Self::Ward => "ward",
        })
    }
}

impl FromStr for Linkage {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            "average" => Ok(Self::Average),
            "ward" => Ok(Self::Ward),
            other => Err(EmbedError::InvalidArgument(format!(
                "unknown linkage {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        })
    }
}

impl FromStr for Metric {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(EmbedError::InvalidArgument(format!(
                "unknown metric {other:?}"
            ))),
        }
    }
}

impl Linkage {
    /// The metric this linkage is used with when none is given.
    pub fn default_metric(self) -> Metric {
        match self {
            Self::Ward => Metric::Euclidean,
            _ => Metric::Cosine,
        }
    }
}

/// Cluster `vectors` into `n_clusters` groups.
///
/// Returns one label per vector. Labels are numbered in order of first
/// appearance, so the first vector is always in cluster 0.
pub fn agglomerative(
    vectors: &[&[f32]],
    n_clusters: usize,
    linkage: Linkage,
    metric: Metric,
) -> Result<Vec<usize>> {
    let n = vectors.len();
    if n_clusters == 0 || n_clusters > n {
        return Err(EmbedError::InvalidArgument(format!(
            "cannot form {n_clusters} clusters from {n} points"
        )));
    }
    if linkage == Linkage::Ward && metric != Metric::Euclidean {
        return Err(EmbedError::InvalidArgument(
            "ward linkage requires the euclidean metric".into(),
        ));
    }

    // ward works on squared distances
    let squared = linkage == Linkage::Ward;
    let mut dist = vec![0.0f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = pairwise(vectors[i], vectors[j], metric, squared);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // parent[i] is the cluster i was merged into
    let mut parent: Vec<usize> = (0..n).collect();

    for _ in 0..(n - n_clusters) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|&i| active[i]) {
            for j in ((i + 1)..n).filter(|&j| active[j]) {
                let d = dist[i * n + j];
                if best.is_none_or(|(_, _, b)| d < b) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((a, b, dab)) = best else { break };

        for k in (0..n).filter(|&k| active[k] && k != a && k != b) {
            let (na, nb, nk) = (size[a] as f64, size[b] as f64, size[k] as f64);
            let (dka, dkb) = (dist[k * n + a], dist[k * n + b]);
            let d = match linkage {
                Linkage::Single => dka.min(dkb),
                Linkage::Complete => dka.max(dkb),
                Linkage::Average => (na * dka + nb * dkb) / (na + nb),
                Linkage::Ward => ((na + nk) * dka + (nb + nk) * dkb - nk * dab) / (na + nb + nk),
            };
            dist[k * n + a] = d;
            dist[a * n + k] = d;
        }
        size[a] += size[b];
        active[b] = false;
        parent[b] = a;
    }

    let mut ids: BTreeMap<usize, usize> = BTreeMap::new();
    let labels = (0..n)
        .map(|i| {
            let root = find_root(&parent, i);
            let next = ids.len();
            *ids.entry(root).or_insert(next)
        })
        .collect();
    debug!(points = n, clusters = ids.len(), %linkage, %metric, "clustered");
    Ok(labels)
}

fn find_root(parent: &[usize], mut i: usize) -> usize {
    while parent[i] != i {
        i = parent[i];
    }
    i
}

fn pairwise(a: &[f32], b: &[f32], metric: Metric, squared: bool) -> f64 {
    match metric {
        Metric::Cosine => {
            let denom = (norm(a) * norm(b)).max(f32::MIN_POSITIVE);
            1.0 - (dot(a, b) / denom) as f64
        }
        Metric::Euclidean => {
            let s: f64 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
                .sum();
            if squared { s } else { s.sqrt() }
        }
    }
}

/// Group `words` into `n_clusters` clusters of their vectors, using the
/// linkage's default metric. Returns cluster id to member words.
pub fn cluster_words<S: AsRef<str>>(
    vectors: &KeyedVectors,
    words: &[S],
    n_clusters: usize,
    linkage: Linkage,
) -> Result<BTreeMap<usize, Vec<String>>> {
    let rows = words
        .iter()
        .map(|w| vectors.get(w.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let labels = agglomerative(&rows, n_clusters, linkage, linkage.default_metric())?;

    let mut clusters: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (word, label) in words.iter().zip(labels) {
        clusters
            .entry(label)
            .or_default()
            .push(word.as_ref().to_string());
    }
    Ok(clusters)
}

/// Write a cluster mapping as pretty JSON.
pub fn save_clusters<P: AsRef<Path>>(
    clusters: &BTreeMap<usize, Vec<String>>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_string_pretty(clusters)?)?;
    info!(path = %path.display(), clusters = clusters.len(), "clusters saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![5.0, 5.0],
            vec![0.0, 0.2],
            vec![5.1, 5.0],
            vec![9.0, 0.0],
        ]
    }

    fn run(linkage: Linkage, metric: Metric, k: usize) -> Vec<usize> {
        let pts = points();
        let rows: Vec<&[f32]> = pts.iter().map(Vec::as_slice).collect();
        agglomerative(&rows, k, linkage, metric).unwrap()
    }

    #[test]
    fn test_all_euclidean_linkages_agree_on_clear_groups() {
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            assert_eq!(
                run(linkage, Metric::Euclidean, 3),
                vec![0, 0, 1, 0, 1, 2],
                "{linkage}"
            );
        }
    }

    #[test]
    fn test_cluster_count_bounds() {
        assert_eq!(run(Linkage::Average, Metric::Euclidean, 6), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(run(Linkage::Single, Metric::Euclidean, 1), vec![0; 6]);

        let pts = points();
        let rows: Vec<&[f32]> = pts.iter().map(Vec::as_slice).collect();
        assert!(agglomerative(&rows, 0, Linkage::Single, Metric::Cosine).is_err());
        assert!(agglomerative(&rows, 7, Linkage::Single, Metric::Cosine).is_err());
    }

    #[test]
    fn test_ward_requires_euclidean() {
        let pts = points();
        let rows: Vec<&[f32]> = pts.iter().map(Vec::as_slice).collect();
        assert!(agglomerative(&rows, 2, Linkage::Ward, Metric::Cosine).is_err());
    }

    #[test]
    fn test_cosine_groups_by_direction() {
        let pts = [vec![1.0f32, 0.0], vec![10.0, 0.5], vec![0.0, 1.0], vec![0.2, 8.0]];
        let rows: Vec<&[f32]> = pts.iter().map(Vec::as_slice).collect();
        let labels = agglomerative(&rows, 2, Linkage::Complete, Metric::Cosine).unwrap();
        assert_eq!(labels, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Ward".parse::<Linkage>().unwrap(), Linkage::Ward);
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert!("median".parse::<Linkage>().is_err());
        assert_eq!(Linkage::Average.to_string(), "average");
    }

    #[test]
    fn test_cluster_words_and_save() {
        let words = vec!["cat".to_string(), "dog".into(), "car".into(), "bus".into()];
        let data = vec![1.0, 0.1, 0.9, 0.2, 0.1, 1.0, 0.2, 0.9];
        let kv = KeyedVectors::new(words.clone(), 2, data).unwrap();

        let clusters = cluster_words(&kv, &words, 2, Linkage::Average).unwrap();
        assert_eq!(clusters[&0], ["cat", "dog"]);
        assert_eq!(clusters[&1], ["car", "bus"]);

        assert!(cluster_words(&kv, &["cat", "plane"], 1, Linkage::Single).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        save_clusters(&clusters, &path).unwrap();
        let back: BTreeMap<usize, Vec<String>> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, clusters);
    }
}
