//! 指し手（Move）
//!
//! 16bit に詰めた指し手表現。
//!
//! - bit 0-5:   移動元
//! - bit 6-11:  移動先
//! - bit 12-13: 成る駒（ナイト=0 〜 クイーン=3、成りの場合のみ有効）
//! - bit 14-15: 種別（通常 / 成り / アンパッサン / キャスリング）
//!
//! キャスリングは「玉の移動元 → 玉の移動先」で表す（g1/c1 方式）。

use super::{PieceType, Square};

/// 指し手の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MoveType {
    Normal = 0,
    Promotion = 1,
    EnPassant = 2,
    Castling = 3,
}

/// 指し手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    /// 通常の指し手を生成
    #[inline]
    pub const fn new(from: Square, to: Square) -> Move {
        Move((from.index() | (to.index() << 6)) as u16)
    }

    /// 成りの指し手を生成
    #[inline]
    pub const fn promotion(from: Square, to: Square, promo: PieceType) -> Move {
        debug_assert!(
            promo.index() >= PieceType::Knight.index() && promo.index() <= PieceType::Queen.index()
        );
        Move(
            (from.index()
                | (to.index() << 6)
                | ((promo.index() - PieceType::Knight.index()) << 12)
                | ((MoveType::Promotion as usize) << 14)) as u16,
        )
    }

    /// アンパッサンの指し手を生成
    #[inline]
    pub const fn en_passant(from: Square, to: Square) -> Move {
        Move((from.index() | (to.index() << 6) | ((MoveType::EnPassant as usize) << 14)) as u16)
    }

    /// キャスリングの指し手を生成（玉の移動元→移動先）
    #[inline]
    pub const fn castling(from: Square, to: Square) -> Move {
        Move((from.index() | (to.index() << 6) | ((MoveType::Castling as usize) << 14)) as u16)
    }

    /// 移動元
    #[inline]
    pub const fn from_sq(self) -> Square {
        Square::from_index((self.0 & 0x3F) as usize)
    }

    /// 移動先
    #[inline]
    pub const fn to_sq(self) -> Square {
        Square::from_index(((self.0 >> 6) & 0x3F) as usize)
    }

    /// 種別
    #[inline]
    pub const fn move_type(self) -> MoveType {
        match self.0 >> 14 {
            0 => MoveType::Normal,
            1 => MoveType::Promotion,
            2 => MoveType::EnPassant,
            _ => MoveType::Castling,
        }
    }

    /// 成る駒（成りの場合のみ意味を持つ）
    #[inline]
    pub const fn promotion_type(self) -> PieceType {
        PieceType::from_index(((self.0 >> 12) & 0x3) as usize + PieceType::Knight.index())
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from_sq(), self.to_sq())?;
        if self.move_type() == MoveType::Promotion {
            write!(f, "{}", self.promotion_type().to_char())?;
        }
        Ok(())
    }
}
