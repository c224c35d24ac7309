//! 駒位置特徴量（HalfKAv2_hm）
//!
//! 「自玉の位置 × 盤上の駒 × その升」を1特徴量とする。
//! 視点が黒のときは段を反転し、自玉が e〜h 筋にいるときは
//! 左右を鏡映して、玉を常に a〜d 筋側に正規化する（_hm = half mirror）。
//! 玉は両手番で1プレーンを共有するため、駒プレーンは
//! 5駒種 × 2手番 + 玉 = 11。

use crate::position::{DirtyPiece, DirtyThreats, Position};
use crate::types::{Color, Piece, PieceType, Square};

use super::{FeatureSet, IndexList};

/// 玉バケット数（4筋 × 8段）
const KING_BUCKETS: usize = 32;

/// 駒プレーン数
const PIECE_PLANES: usize = 11;

/// 駒位置特徴量
pub struct HalfKAv2Hm;

impl HalfKAv2Hm {
    /// 特徴量インデックスを計算する
    #[inline]
    pub fn make_index(perspective: Color, sq: Square, pc: Piece, king_sq: Square) -> u32 {
        // 黒視点の段反転と、玉筋による左右鏡映を1つの XOR にまとめる
        let rank_flip = match perspective {
            Color::White => 0usize,
            Color::Black => 56,
        };
        let king_rel = king_sq.index() ^ rank_flip;
        let mirror = if king_rel & 7 >= 4 { 7usize } else { 0 };
        let orient = rank_flip ^ mirror;

        let king_or = king_sq.index() ^ orient;
        let bucket = (king_or >> 3) * 4 + (king_or & 7);
        debug_assert!(bucket < KING_BUCKETS);

        let pc_rel = pc.relative(perspective);
        let plane = if pc_rel.piece_type() == PieceType::King {
            PIECE_PLANES - 1
        } else {
            pc_rel.color().index() * 5 + pc_rel.piece_type().index()
        };

        ((sq.index() ^ orient) + 64 * plane + 64 * PIECE_PLANES * bucket) as u32
    }
}

impl FeatureSet for HalfKAv2Hm {
    const DIMENSIONS: usize = 64 * PIECE_PLANES * KING_BUCKETS;
    const MAX_ACTIVE: usize = 32;
    const HASH: u32 = 0x7F23_4CB8;

    fn append_active_indices(pos: &Position, perspective: Color, out: &mut IndexList) {
        let king_sq = pos.king_square(perspective);
        for sq in pos.occupied() {
            if let Some(pc) = pos.piece_on(sq) {
                out.push(Self::make_index(perspective, sq, pc, king_sq));
            }
        }
    }

    fn append_changed_indices(
        perspective: Color,
        king_sq: Square,
        dp: &DirtyPiece,
        _dts: &DirtyThreats,
        added: &mut IndexList,
        removed: &mut IndexList,
    ) {
        for i in 0..dp.len {
            let pc = dp.piece[i];
            if let Some(from) = dp.from[i] {
                removed.push(Self::make_index(perspective, from, pc, king_sq));
            }
            if let Some(to) = dp.to[i] {
                added.push(Self::make_index(perspective, to, pc, king_sq));
            }
        }
    }

    fn requires_refresh(dp: &DirtyPiece, _dts: &DirtyThreats, perspective: Color) -> bool {
        // 自玉が動くと全特徴量の玉バケットが変わる
        dp.len > 0
            && dp.moved_piece().piece_type() == PieceType::King
            && dp.moved_piece().color() == perspective
    }
}
