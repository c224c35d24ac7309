//! 走り駒（ビショップ・ルーク・クイーン）の利き計算
//!
//! 占有ビットボードを受け取り、遮断されるまで光線を伸ばす。
//! テーブル化（magic bitboard）はせず、単純な走査で求める。
//! 評価コアでは差分更新の境界でしか呼ばれないため、この速度で十分。

use super::Bitboard;
use crate::types::{PieceType, Square};

const BISHOP_DIRS: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const ROOK_DIRS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

fn ray_attacks(sq: Square, occupied: Bitboard, dirs: &[(i32, i32); 4]) -> Bitboard {
    let mut bb = Bitboard::EMPTY;
    for &(df, dr) in dirs {
        let mut f = (sq.index() % 8) as i32 + df;
        let mut r = (sq.index() / 8) as i32 + dr;
        while (0..8).contains(&f) && (0..8).contains(&r) {
            let target = Square::from_index((r * 8 + f) as usize);
            bb.set(target);
            if occupied.contains(target) {
                break;
            }
            f += df;
            r += dr;
        }
    }
    bb
}

/// ビショップの利き
#[inline]
pub fn bishop_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    ray_attacks(sq, occupied, &BISHOP_DIRS)
}

/// ルークの利き
#[inline]
pub fn rook_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    ray_attacks(sq, occupied, &ROOK_DIRS)
}

/// クイーンの利き
#[inline]
pub fn queen_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    bishop_attacks(sq, occupied) | rook_attacks(sq, occupied)
}

/// 駒種ごとの利き（ポーンを除く）
pub fn attacks_bb(pt: PieceType, sq: Square, occupied: Bitboard) -> Bitboard {
    match pt {
        PieceType::Knight => super::tables::knight_attacks(sq),
        PieceType::Bishop => bishop_attacks(sq, occupied),
        PieceType::Rook => rook_attacks(sq, occupied),
        PieceType::Queen => queen_attacks(sq, occupied),
        PieceType::King => super::tables::king_attacks(sq),
        PieceType::Pawn => panic!("pawn attacks require a color; use pawn_attacks"),
    }
}
