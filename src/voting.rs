use crate::genres::{genre_name, table_position, GenreTable};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 多数決の結果（1ジャンル分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreVote {
    pub genre: String,
    pub votes: usize,
    /// 得票率（votes / 全セグメント数）
    pub confidence: f64,
}

impl GenreVote {
    pub fn as_pair(&self) -> (String, f64) {
        (self.genre.clone(), self.confidence)
    }
}

/// セグメント毎の確率ベクトルから多数決でジャンルを順位付けする
///
/// 各行（セグメント）の最大確率クラスに1票を入れ、得票数の降順に並べる。
/// 同数の場合はジャンル表の定義順。返す順位は全件で、切り詰めは呼び出し側で行う。
/// NaN は最大値として選ばれず、全要素が NaN の行は投票しない（分母には含める）。
pub fn majority_voting(segment_probabilities: ArrayView2<f32>, table: &GenreTable) -> Vec<GenreVote> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    let segments = segment_probabilities.nrows();
    let mut voted = 0usize;

    for row in segment_probabilities.rows() {
        let Some(class) = argmax(row.iter().copied()) else {
            continue;
        };
        if genre_name(table, class).is_none() {
            continue;
        }
        *counts.entry(class).or_insert(0) += 1;
        voted += 1;
    }

    if voted == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(class_a, votes_a), (class_b, votes_b)| {
        votes_b
            .cmp(votes_a)
            .then_with(|| table_position(table, *class_a).cmp(&table_position(table, *class_b)))
    });

    ranked
        .into_iter()
        .filter_map(|(class, votes)| {
            genre_name(table, class).map(|name| GenreVote {
                genre: name.to_string(),
                votes,
                confidence: votes as f64 / segments as f64,
            })
        })
        .collect()
}

/// 最初に現れた最大値のインデックス
fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, value) in values.enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}
