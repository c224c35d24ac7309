//! 駒（Piece）・駒種（PieceType）
//!
//! `Piece` は手番と駒種の組で、`color * 6 + type` の 0..12 に詰めて数える。
//! NNUE の特徴量テーブルはこのインデックスをそのまま添字に使う。

use super::Color;

/// 駒種
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PieceType {
    Pawn = 0,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceType {
    /// 駒種の数
    pub const NUM: usize = 6;

    /// 全駒種（歩→玉の順）
    pub const ALL: [PieceType; 6] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];

    /// インデックスから生成（0-5以外は panic）
    #[inline]
    pub const fn from_index(i: usize) -> PieceType {
        debug_assert!(i < 6);
        // SAFETY: repr(u8) の連続 enum で 0..=5 を網羅している
        unsafe { std::mem::transmute(i as u8) }
    }

    /// インデックスとして使用
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// FEN 文字（小文字）
    pub const fn to_char(self) -> char {
        match self {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        }
    }

    /// FEN 文字からの解析（大文字小文字は区別しない）
    pub const fn from_char(c: char) -> Option<PieceType> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceType::Pawn),
            'n' => Some(PieceType::Knight),
            'b' => Some(PieceType::Bishop),
            'r' => Some(PieceType::Rook),
            'q' => Some(PieceType::Queen),
            'k' => Some(PieceType::King),
            _ => None,
        }
    }
}

/// 駒（手番付き）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Piece(u8);

impl Piece {
    /// 駒の数（6駒種 × 2手番）
    pub const NUM: usize = 12;

    /// 生成
    #[inline]
    pub const fn new(color: Color, piece_type: PieceType) -> Piece {
        Piece((color.index() * 6 + piece_type.index()) as u8)
    }

    /// 手番
    #[inline]
    pub const fn color(self) -> Color {
        if self.0 < 6 { Color::White } else { Color::Black }
    }

    /// 駒種
    #[inline]
    pub const fn piece_type(self) -> PieceType {
        PieceType::from_index((self.0 % 6) as usize)
    }

    /// インデックスとして使用（0..12）
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// インデックスから生成
    #[inline]
    pub const fn from_index(i: usize) -> Piece {
        debug_assert!(i < 12);
        Piece(i as u8)
    }

    /// 視点から見た相対駒（黒番視点では手番を入れ替える）
    #[inline]
    pub const fn relative(self, perspective: Color) -> Piece {
        match perspective {
            Color::White => self,
            Color::Black => Piece((self.0 + 6) % 12),
        }
    }

    /// FEN 文字（白は大文字、黒は小文字）
    pub const fn to_char(self) -> char {
        let c = self.piece_type().to_char();
        match self.color() {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// FEN 文字からの解析
    pub const fn from_char(c: char) -> Option<Piece> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        match PieceType::from_char(c) {
            Some(pt) => Some(Piece::new(color, pt)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_roundtrip() {
        for c in [Color::White, Color::Black] {
            for pt in PieceType::ALL {
                let pc = Piece::new(c, pt);
                assert_eq!(pc.color(), c);
                assert_eq!(pc.piece_type(), pt);
                assert_eq!(Piece::from_index(pc.index()), pc);
            }
        }
    }

    #[test]
    fn test_piece_relative() {
        let wp = Piece::new(Color::White, PieceType::Pawn);
        let bp = Piece::new(Color::Black, PieceType::Pawn);
        assert_eq!(wp.relative(Color::White), wp);
        assert_eq!(wp.relative(Color::Black), bp);
        assert_eq!(bp.relative(Color::Black), wp);
    }

    #[test]
    fn test_piece_fen_char() {
        assert_eq!(Piece::from_char('K'), Some(Piece::new(Color::White, PieceType::King)));
        assert_eq!(Piece::from_char('q'), Some(Piece::new(Color::Black, PieceType::Queen)));
        assert_eq!(Piece::from_char('x'), None);
        let pc = Piece::new(Color::Black, PieceType::Knight);
        assert_eq!(pc.to_char(), 'n');
        assert_eq!(Piece::from_char(pc.to_char()), Some(pc));
    }
}
