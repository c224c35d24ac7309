//! ビットボードモジュール
//!
//! u64 による盤面表現と、駒の利き計算を提供する。
//! 跳び駒はコンパイル時テーブル、走り駒は光線走査で求める。

mod bits;
mod sliders;
mod tables;

pub use bits::{Bitboard, BitboardIter};
pub use sliders::{attacks_bb, bishop_attacks, queen_attacks, rook_attacks};
pub use tables::{king_attacks, knight_attacks, pawn_attacks};
