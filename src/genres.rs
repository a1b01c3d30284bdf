/// ジャンル名とクラスインデックスの対応表
/// - 定義順がそのまま投票の同数タイブレーク順になる
pub const GENRES: &[(&str, usize)] = &[
    ("metal", 0),
    ("disco", 1),
    ("classical", 2),
    ("hiphop", 3),
    ("jazz", 4),
    ("country", 5),
    ("pop", 6),
    ("blues", 7),
    ("reggae", 8),
    ("rock", 9),
];

pub type GenreTable = [(&'static str, usize)];

/// クラスインデックスからジャンル名を取得
pub fn genre_name(table: &GenreTable, index: usize) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, class)| *class == index)
        .map(|(name, _)| *name)
}

/// タイブレーク用の順位（表の中での位置）
pub fn table_position(table: &GenreTable, index: usize) -> usize {
    table
        .iter()
        .position(|(_, class)| *class == index)
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_ten_unique_classes() {
        assert_eq!(GENRES.len(), 10);
        let mut classes: Vec<usize> = GENRES.iter().map(|(_, c)| *c).collect();
        classes.sort_unstable();
        assert_eq!(classes, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn lookup_by_class() {
        assert_eq!(genre_name(GENRES, 0), Some("metal"));
        assert_eq!(genre_name(GENRES, 9), Some("rock"));
        assert_eq!(genre_name(GENRES, 10), None);
    }
}
