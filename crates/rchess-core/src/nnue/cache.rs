//! アキュムレータの全計算キャッシュ
//!
//! 玉の位置ごとに「最後に全計算したときのアキュムレータと盤面占有」を
//! 覚えておき、次の全計算をキャッシュ内容との差分適用に置き換える
//! （いわゆる finny table）。駒位置特徴量専用で、利き特徴量は
//! ゼロからの再計算のみ。

use crate::bitboard::Bitboard;
use crate::types::{Color, PieceType, Square};

use super::aligned::Aligned;
use super::constants::PSQT_BUCKETS;

/// 玉位置×視点ごとのキャッシュエントリ
pub struct CacheEntry<const L1: usize> {
    /// バイアス込みのアキュムレータ値
    pub accumulation: Aligned<[i16; L1]>,
    pub psqt_accumulation: Aligned<[i32; PSQT_BUCKETS]>,
    /// この値を計算した時点の手番別占有
    pub by_color_bb: [Bitboard; Color::NUM],
    /// この値を計算した時点の駒種別占有
    pub by_type_bb: [Bitboard; PieceType::NUM],
}

impl<const L1: usize> CacheEntry<L1> {
    fn cleared(biases: &[i16]) -> CacheEntry<L1> {
        let mut entry = CacheEntry {
            accumulation: Aligned([0; L1]),
            psqt_accumulation: Aligned([0; PSQT_BUCKETS]),
            by_color_bb: [Bitboard::EMPTY; Color::NUM],
            by_type_bb: [Bitboard::EMPTY; PieceType::NUM],
        };
        entry.reset(biases);
        entry
    }

    /// 空盤 + バイアスの状態に戻す
    pub fn reset(&mut self, biases: &[i16]) {
        debug_assert_eq!(biases.len(), L1);
        self.accumulation.copy_from_slice(biases);
        self.psqt_accumulation.fill(0);
        self.by_color_bb = [Bitboard::EMPTY; Color::NUM];
        self.by_type_bb = [Bitboard::EMPTY; PieceType::NUM];
    }
}

/// 駒位置特徴量の全計算キャッシュ（玉64升 × 視点2）
pub struct AccumulatorCache<const L1: usize> {
    entries: Vec<CacheEntry<L1>>,
}

impl<const L1: usize> AccumulatorCache<L1> {
    /// バイアスで初期化したキャッシュを作る
    pub fn new(biases: &[i16]) -> AccumulatorCache<L1> {
        let mut entries = Vec::with_capacity(64 * Color::NUM);
        for _ in 0..64 * Color::NUM {
            entries.push(CacheEntry::cleared(biases));
        }
        AccumulatorCache { entries }
    }

    /// 全エントリを初期状態に戻す（ネットワーク差し替え後に呼ぶ）
    pub fn clear(&mut self, biases: &[i16]) {
        for entry in &mut self.entries {
            entry.reset(biases);
        }
    }

    /// 玉位置と視点のエントリ
    #[inline]
    pub fn entry_mut(&mut self, king_sq: Square, perspective: Color) -> &mut CacheEntry<L1> {
        &mut self.entries[king_sq.index() * Color::NUM + perspective.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_seeded_from_biases() {
        let biases = [3i16; 16];
        let mut cache: AccumulatorCache<16> = AccumulatorCache::new(&biases);
        let entry = cache.entry_mut(Square::E1, Color::White);
        assert!(entry.accumulation.iter().all(|&v| v == 3));
        assert!(entry.psqt_accumulation.iter().all(|&v| v == 0));
        assert!(entry.by_color_bb[0].is_empty());
    }

    #[test]
    fn test_cache_clear_resets_snapshots() {
        let biases = [1i16; 16];
        let mut cache: AccumulatorCache<16> = AccumulatorCache::new(&biases);
        {
            let entry = cache.entry_mut(Square::A1, Color::Black);
            entry.accumulation[0] = 99;
            entry.by_color_bb[0].set(Square::E1);
        }
        cache.clear(&biases);
        let entry = cache.entry_mut(Square::A1, Color::Black);
        assert_eq!(entry.accumulation[0], 1);
        assert!(entry.by_color_bb[0].is_empty());
    }
}
