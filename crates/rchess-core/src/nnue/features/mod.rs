//! 特徴量モジュール
//!
//! 盤面を第1層への入力インデックス列に変換する。
//! 駒位置の `HalfKAv2_hm` と利き対の `FullThreats` の2系統。

mod half_ka_v2_hm;
mod threats;

pub use half_ka_v2_hm::HalfKAv2Hm;
pub use threats::FullThreats;

use crate::position::{DirtyPiece, DirtyThreats, Position};
use crate::types::{Color, Square};

/// 有効インデックス列の最大長
pub const MAX_INDEX_LIST: usize = 128;

/// 固定容量のインデックス列
#[derive(Debug, Clone, Copy)]
pub struct IndexList {
    len: usize,
    values: [u32; MAX_INDEX_LIST],
}

impl IndexList {
    /// 空のリスト
    #[inline]
    pub const fn new() -> IndexList {
        IndexList { len: 0, values: [0; MAX_INDEX_LIST] }
    }

    #[inline]
    pub fn push(&mut self, v: u32) {
        debug_assert!(self.len < MAX_INDEX_LIST);
        self.values[self.len] = v;
        self.len += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// 中身のスライス
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.values[..self.len]
    }
}

impl Default for IndexList {
    fn default() -> IndexList {
        IndexList::new()
    }
}

/// 特徴量系統の共通インタフェース
pub trait FeatureSet {
    /// 特徴量空間の次元数
    const DIMENSIONS: usize;
    /// 同時に有効になる特徴量の最大数
    const MAX_ACTIVE: usize;
    /// 評価関数ファイルの整合性検査に使うハッシュ
    const HASH: u32;

    /// 局面の全有効特徴量を列挙する
    fn append_active_indices(pos: &Position, perspective: Color, out: &mut IndexList);

    /// 1手分の差分（増えた/減った特徴量）を列挙する
    ///
    /// `king_sq` は perspective 側の現在の玉位置。
    fn append_changed_indices(
        perspective: Color,
        king_sq: Square,
        dp: &DirtyPiece,
        dts: &DirtyThreats,
        added: &mut IndexList,
        removed: &mut IndexList,
    );

    /// 差分更新できず全計算が必要になる手かどうか
    fn requires_refresh(dp: &DirtyPiece, dts: &DirtyThreats, perspective: Color) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_list() {
        let mut list = IndexList::new();
        assert!(list.is_empty());
        list.push(3);
        list.push(7);
        assert_eq!(list.as_slice(), &[3, 7]);
        list.clear();
        assert_eq!(list.len(), 0);
    }
}
