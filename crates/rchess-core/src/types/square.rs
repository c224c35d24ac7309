//! 升（Square）・筋（File）・段（Rank）
//!
//! 升は a1 = 0, b1 = 1, ..., h8 = 63 の昇順（段優先）で数える。
//! 黒番視点への変換は段の反転（`flip_rank` = `^ 56`）、
//! 左右鏡映は筋の反転（`flip_file` = `^ 7`）で行う。

use super::Color;

/// 筋（a〜h）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum File {
    A = 0,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl File {
    /// 筋の数
    pub const NUM: usize = 8;

    /// インデックスから生成（0-7以外は panic）
    #[inline]
    pub const fn from_index(i: usize) -> File {
        debug_assert!(i < 8);
        // SAFETY: repr(u8) の連続 enum で 0..=7 を網羅している
        unsafe { std::mem::transmute(i as u8) }
    }

    /// インデックスとして使用
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// 段（1〜8）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Rank {
    R1 = 0,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
}

impl Rank {
    /// 段の数
    pub const NUM: usize = 8;

    /// インデックスから生成（0-7以外は panic）
    #[inline]
    pub const fn from_index(i: usize) -> Rank {
        debug_assert!(i < 8);
        // SAFETY: repr(u8) の連続 enum で 0..=7 を網羅している
        unsafe { std::mem::transmute(i as u8) }
    }

    /// インデックスとして使用
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 手番から見た相対段（黒番は反転）
    #[inline]
    pub const fn relative(self, c: Color) -> Rank {
        match c {
            Color::White => self,
            Color::Black => Rank::from_index(7 - self.index()),
        }
    }
}

/// 升（0 = a1, 63 = h8）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Square(u8);

impl Square {
    /// 升の数
    pub const NUM: usize = 64;

    pub const A1: Square = Square(0);
    pub const B1: Square = Square(1);
    pub const C1: Square = Square(2);
    pub const D1: Square = Square(3);
    pub const E1: Square = Square(4);
    pub const F1: Square = Square(5);
    pub const G1: Square = Square(6);
    pub const H1: Square = Square(7);
    pub const A8: Square = Square(56);
    pub const E8: Square = Square(60);
    pub const H8: Square = Square(63);

    /// インデックスから生成
    #[inline]
    pub const fn from_index(i: usize) -> Square {
        debug_assert!(i < 64);
        Square(i as u8)
    }

    /// 筋と段から生成
    #[inline]
    pub const fn new(file: File, rank: Rank) -> Square {
        Square((rank.index() * 8 + file.index()) as u8)
    }

    /// インデックスとして使用
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 筋
    #[inline]
    pub const fn file(self) -> File {
        File::from_index((self.0 & 7) as usize)
    }

    /// 段
    #[inline]
    pub const fn rank(self) -> Rank {
        Rank::from_index((self.0 >> 3) as usize)
    }

    /// 段の反転（白黒視点の変換）
    #[inline]
    pub const fn flip_rank(self) -> Square {
        Square(self.0 ^ 56)
    }

    /// 筋の反転（左右鏡映）
    #[inline]
    pub const fn flip_file(self) -> Square {
        Square(self.0 ^ 7)
    }

    /// 手番から見た相対升（黒番は段を反転）
    #[inline]
    pub const fn relative(self, c: Color) -> Square {
        match c {
            Color::White => self,
            Color::Black => self.flip_rank(),
        }
    }

    /// 代数表記（"e4" 等）からの解析
    pub fn from_str_coord(s: &str) -> Option<Square> {
        let b = s.as_bytes();
        if b.len() != 2 {
            return None;
        }
        let file = b[0].checked_sub(b'a')?;
        let rank = b[1].checked_sub(b'1')?;
        if file < 8 && rank < 8 {
            Some(Square(rank * 8 + file))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + (self.0 & 7)) as char,
            (b'1' + (self.0 >> 3)) as char
        )
    }
}
