//! Zobrist ハッシュ
//!
//! 駒×升・キャスリング権・アンパッサン筋・手番のランダムキー。
//! 固定シードの Xoshiro256++ で生成するため、ビルド間で決定的。

use std::sync::OnceLock;

use rand::RngCore;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::types::{Color, Piece, Square};

/// Zobrist キーのテーブル
pub struct Zobrist {
    piece_square: [[u64; 64]; Piece::NUM],
    castling: [u64; 16],
    en_passant: [u64; 8],
    side: u64,
}

static ZOBRIST: OnceLock<Zobrist> = OnceLock::new();

const ZOBRIST_SEED: u64 = 0x1070_3051_7F38_E6C2;

impl Zobrist {
    /// 共有テーブルを取得（初回呼び出しで生成）
    pub fn instance() -> &'static Zobrist {
        ZOBRIST.get_or_init(|| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);
            let mut piece_square = [[0u64; 64]; Piece::NUM];
            for row in piece_square.iter_mut() {
                for v in row.iter_mut() {
                    *v = rng.next_u64();
                }
            }
            let mut castling = [0u64; 16];
            for v in castling.iter_mut() {
                *v = rng.next_u64();
            }
            let mut en_passant = [0u64; 8];
            for v in en_passant.iter_mut() {
                *v = rng.next_u64();
            }
            let side = rng.next_u64();
            Zobrist { piece_square, castling, en_passant, side }
        })
    }

    /// 駒×升のキー
    #[inline]
    pub fn piece_square(&self, pc: Piece, sq: Square) -> u64 {
        self.piece_square[pc.index()][sq.index()]
    }

    /// キャスリング権のキー
    #[inline]
    pub fn castling(&self, rights: u8) -> u64 {
        self.castling[rights as usize]
    }

    /// アンパッサン筋のキー
    #[inline]
    pub fn en_passant(&self, sq: Square) -> u64 {
        self.en_passant[sq.index() % 8]
    }

    /// 黒番のキー
    #[inline]
    pub fn side_to_move(&self, c: Color) -> u64 {
        match c {
            Color::White => 0,
            Color::Black => self.side,
        }
    }
}
