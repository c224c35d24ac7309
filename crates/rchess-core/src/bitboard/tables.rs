//! 跳び駒（ポーン・ナイト・キング）の利きテーブル
//!
//! コンパイル時に全升分を構築する。ポーンの利きは手番ごとに別テーブル。

use super::Bitboard;
use crate::types::{Color, Square};

/// ポーンの利き [手番][升]
pub static PAWN_ATTACKS: [[Bitboard; 64]; 2] = build_pawn_attacks();

/// ナイトの利き [升]
pub static KNIGHT_ATTACKS: [Bitboard; 64] = build_leaper_attacks(&KNIGHT_DELTAS);

/// キングの利き [升]
pub static KING_ATTACKS: [Bitboard; 64] = build_leaper_attacks(&KING_DELTAS);

const KNIGHT_DELTAS: [(i32, i32); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

const KING_DELTAS: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// (file, rank) の差分から移動先ビットを求める（盤外は 0）
const fn shifted_bit(sq: usize, df: i32, dr: i32) -> u64 {
    let f = (sq % 8) as i32 + df;
    let r = (sq / 8) as i32 + dr;
    if f < 0 || f > 7 || r < 0 || r > 7 {
        0
    } else {
        1u64 << (r * 8 + f)
    }
}

const fn build_leaper_attacks(deltas: &[(i32, i32); 8]) -> [Bitboard; 64] {
    let mut table = [Bitboard::EMPTY; 64];
    let mut sq = 0;
    while sq < 64 {
        let mut bb = 0u64;
        let mut i = 0;
        while i < 8 {
            bb |= shifted_bit(sq, deltas[i].0, deltas[i].1);
            i += 1;
        }
        table[sq] = Bitboard(bb);
        sq += 1;
    }
    table
}

const fn build_pawn_attacks() -> [[Bitboard; 64]; 2] {
    let mut table = [[Bitboard::EMPTY; 64]; 2];
    let mut sq = 0;
    while sq < 64 {
        table[0][sq] = Bitboard(shifted_bit(sq, -1, 1) | shifted_bit(sq, 1, 1));
        table[1][sq] = Bitboard(shifted_bit(sq, -1, -1) | shifted_bit(sq, 1, -1));
        sq += 1;
    }
    table
}

/// ポーンの利き
#[inline]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    PAWN_ATTACKS[color.index()][sq.index()]
}

/// ナイトの利き
#[inline]
pub fn knight_attacks(sq: Square) -> Bitboard {
    KNIGHT_ATTACKS[sq.index()]
}

/// キングの利き
#[inline]
pub fn king_attacks(sq: Square) -> Bitboard {
    KING_ATTACKS[sq.index()]
}
