//! FEN 文字列の解析と生成
//!
//! テストと呼び出し側の局面設定に使う。厳密な合法性検査
//! （王手の数など）は行わず、構文と基本的な整合性のみを見る。

use crate::types::{Color, Piece, PieceType, Square};

use super::pos::{castling, Position};

/// 初期局面の FEN
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// FEN 解析エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// フィールドが不足している
    MissingField(&'static str),
    /// 盤面部の構文が不正
    InvalidBoard(String),
    /// 手番が 'w'/'b' でない
    InvalidSideToMove(String),
    /// キャスリング権の文字が不正
    InvalidCastling(String),
    /// アンパッサン升が不正
    InvalidEnPassant(String),
    /// 手数カウンタが不正
    InvalidClock(String),
    /// 玉が両手番に1枚ずつ存在しない
    MissingKing,
}

impl std::fmt::Display for FenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FenError::MissingField(name) => write!(f, "missing FEN field: {name}"),
            FenError::InvalidBoard(s) => write!(f, "invalid board field: {s}"),
            FenError::InvalidSideToMove(s) => write!(f, "invalid side to move: {s}"),
            FenError::InvalidCastling(s) => write!(f, "invalid castling field: {s}"),
            FenError::InvalidEnPassant(s) => write!(f, "invalid en passant square: {s}"),
            FenError::InvalidClock(s) => write!(f, "invalid move counter: {s}"),
            FenError::MissingKing => write!(f, "each side must have exactly one king"),
        }
    }
}

impl std::error::Error for FenError {}

impl Position {
    /// 初期局面
    pub fn startpos() -> Position {
        // 初期局面の FEN は常に解析に成功する
        match Position::from_fen(STARTPOS_FEN) {
            Ok(pos) => pos,
            Err(_) => unreachable!(),
        }
    }

    /// FEN 文字列から局面を構築する
    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let mut fields = fen.split_whitespace();
        let board = fields.next().ok_or(FenError::MissingField("board"))?;
        let stm = fields.next().ok_or(FenError::MissingField("side to move"))?;
        let castling_str = fields.next().ok_or(FenError::MissingField("castling"))?;
        let ep = fields.next().ok_or(FenError::MissingField("en passant"))?;
        let halfmove = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");

        let mut pos = Position::empty();

        // 盤面部: 第8段から第1段へ、'/' 区切り
        let mut rank = 7i32;
        let mut file = 0i32;
        for c in board.chars() {
            match c {
                '/' => {
                    if file != 8 {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                    rank -= 1;
                    file = 0;
                    if rank < 0 {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                }
                '1'..='8' => {
                    file += c as i32 - '0' as i32;
                    if file > 8 {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                }
                _ => {
                    let pc = Piece::from_char(c)
                        .ok_or_else(|| FenError::InvalidBoard(board.to_string()))?;
                    if file >= 8 {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                    let sq = Square::from_index((rank * 8 + file) as usize);
                    if pos.piece_on(sq).is_some() {
                        return Err(FenError::InvalidBoard(board.to_string()));
                    }
                    pos.set_piece(pc, sq);
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::InvalidBoard(board.to_string()));
        }
        for c in [Color::White, Color::Black] {
            if pos.pieces(c, PieceType::King).count() != 1 {
                return Err(FenError::MissingKing);
            }
        }

        match stm {
            "w" => pos.set_side_to_move(Color::White),
            "b" => pos.set_side_to_move(Color::Black),
            _ => return Err(FenError::InvalidSideToMove(stm.to_string())),
        }

        let mut rights = 0u8;
        if castling_str != "-" {
            for c in castling_str.chars() {
                rights |= match c {
                    'K' => castling::WHITE_OO,
                    'Q' => castling::WHITE_OOO,
                    'k' => castling::BLACK_OO,
                    'q' => castling::BLACK_OOO,
                    _ => return Err(FenError::InvalidCastling(castling_str.to_string())),
                };
            }
        }
        pos.set_castling_rights(rights);

        if ep != "-" {
            let sq = Square::from_str_coord(ep)
                .ok_or_else(|| FenError::InvalidEnPassant(ep.to_string()))?;
            pos.set_ep_square(Some(sq));
        }

        let halfmove: u32 = halfmove
            .parse()
            .map_err(|_| FenError::InvalidClock(halfmove.to_string()))?;
        let fullmove: u32 = fullmove
            .parse()
            .map_err(|_| FenError::InvalidClock(fullmove.to_string()))?;
        pos.set_clocks(halfmove, fullmove.max(1));

        pos.recompute_key();
        Ok(pos)
    }

    /// 局面を FEN 文字列に変換する
    pub fn to_fen(&self) -> String {
        let mut out = String::with_capacity(80);
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let sq = Square::from_index(rank * 8 + file);
                match self.piece_on(sq) {
                    Some(pc) => {
                        if empty > 0 {
                            out.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        out.push(pc.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push((b'0' + empty) as char);
            }
            if rank > 0 {
                out.push('/');
            }
        }
        out.push(' ');
        out.push(match self.side_to_move() {
            Color::White => 'w',
            Color::Black => 'b',
        });
        out.push(' ');
        let rights = self.castling_rights();
        if rights == 0 {
            out.push('-');
        } else {
            if rights & castling::WHITE_OO != 0 {
                out.push('K');
            }
            if rights & castling::WHITE_OOO != 0 {
                out.push('Q');
            }
            if rights & castling::BLACK_OO != 0 {
                out.push('k');
            }
            if rights & castling::BLACK_OOO != 0 {
                out.push('q');
            }
        }
        out.push(' ');
        match self.ep_square() {
            Some(sq) => out.push_str(&sq.to_string()),
            None => out.push('-'),
        }
        out.push_str(&format!(" {} {}", self.halfmove_clock(), self.fullmove_number()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_fen_roundtrip() {
        let pos = Position::startpos();
        assert_eq!(pos.to_fen(), STARTPOS_FEN);
    }

    #[test]
    fn test_fen_roundtrip_misc() {
        for fen in [
            "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1",
            "8/7k/8/8/8/3Q4/8/K7 b - - 12 42",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert_eq!(pos.to_fen(), fen);
        }
    }

    #[test]
    fn test_fen_errors() {
        assert!(matches!(
            Position::from_fen(""),
            Err(FenError::MissingField(_))
        ));
        assert!(matches!(
            Position::from_fen("9/8/8/8/8/8/8/8 w - - 0 1"),
            Err(FenError::InvalidBoard(_))
        ));
        assert!(matches!(
            Position::from_fen("8/8/8/8/8/8/8/8 w - - 0 1"),
            Err(FenError::MissingKing)
        ));
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(FenError::InvalidSideToMove(_))
        ));
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w XQkq - 0 1"),
            Err(FenError::InvalidCastling(_))
        ));
        assert!(matches!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq z9 0 1"),
            Err(FenError::InvalidEnPassant(_))
        ));
    }
}
