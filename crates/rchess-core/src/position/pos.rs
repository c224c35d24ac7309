//! 局面（Position）
//!
//! 評価コアが必要とする範囲の盤面表現。占有ビットボード・玉位置・
//! do_move / undo_move と、NNUE 差分更新のための DirtyPiece /
//! DirtyThreats の生成を担当する。合法手生成や王手判定は持たない
//! （指し手の合法性は呼び出し側の責務）。

use crate::bitboard::{attacks_bb, pawn_attacks, Bitboard};
use crate::types::{Color, Move, MoveType, Piece, PieceType, Rank, Square};

use super::state::{DirtyPiece, DirtyThreat, DirtyThreats, StateInfo};
use super::zobrist::Zobrist;

/// キャスリング権ビット
pub mod castling {
    pub const WHITE_OO: u8 = 1;
    pub const WHITE_OOO: u8 = 2;
    pub const BLACK_OO: u8 = 4;
    pub const BLACK_OOO: u8 = 8;
}

/// 駒種ごとの簡易評価値（ポーン基準の内部スケール）
const PIECE_VALUES: [i32; PieceType::NUM] = [208, 781, 825, 1276, 2538, 0];

/// 升ごとのキャスリング権マスク（from/to がこの升なら該当権を失う）
const CASTLING_MASK: [u8; 64] = build_castling_mask();

const fn build_castling_mask() -> [u8; 64] {
    let mut mask = [0xFFu8; 64];
    mask[Square::A1.index()] &= !castling::WHITE_OOO;
    mask[Square::E1.index()] &= !(castling::WHITE_OO | castling::WHITE_OOO);
    mask[Square::H1.index()] &= !castling::WHITE_OO;
    mask[Square::A8.index()] &= !castling::BLACK_OOO;
    mask[Square::E8.index()] &= !(castling::BLACK_OO | castling::BLACK_OOO);
    mask[Square::H8.index()] &= !castling::BLACK_OO;
    mask
}

/// 局面
#[derive(Debug, Clone)]
pub struct Position {
    board: [Option<Piece>; 64],
    by_color: [Bitboard; Color::NUM],
    by_type: [Bitboard; PieceType::NUM],
    king_sq: [Square; Color::NUM],
    side_to_move: Color,
    castling_rights: u8,
    ep_square: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
    key: u64,
    history: Vec<StateInfo>,
}

impl Position {
    /// 空の盤面
    pub(super) fn empty() -> Position {
        Position {
            board: [None; 64],
            by_color: [Bitboard::EMPTY; Color::NUM],
            by_type: [Bitboard::EMPTY; PieceType::NUM],
            king_sq: [Square::E1, Square::E8],
            side_to_move: Color::White,
            castling_rights: 0,
            ep_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            key: 0,
            history: Vec::new(),
        }
    }

    /// 升上の駒
    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board[sq.index()]
    }

    /// 手番
    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// 手番側から見た玉の位置
    #[inline]
    pub fn king_square(&self, c: Color) -> Square {
        self.king_sq[c.index()]
    }

    /// 全駒の占有ビットボード
    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    /// 手番別の占有ビットボード
    #[inline]
    pub fn pieces_of_color(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    /// 駒種別の占有ビットボード（両手番）
    #[inline]
    pub fn pieces_of_type(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    /// 手番×駒種の占有ビットボード
    #[inline]
    pub fn pieces(&self, c: Color, pt: PieceType) -> Bitboard {
        self.by_color[c.index()] & self.by_type[pt.index()]
    }

    /// 盤上の駒数
    #[inline]
    pub fn piece_count(&self) -> u32 {
        self.occupied().count()
    }

    /// マテリアルバケット（レイヤースタック選択用、0..8）
    #[inline]
    pub fn material_bucket(&self) -> usize {
        ((self.piece_count() as usize).max(1) - 1) / 4
    }

    /// Zobrist ハッシュ
    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// キャスリング権
    #[inline]
    pub fn castling_rights(&self) -> u8 {
        self.castling_rights
    }

    /// アンパッサン升
    #[inline]
    pub fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    /// 50手ルールカウンタ
    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// 手数
    #[inline]
    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// 手番側から見た駒割りの簡易評価
    ///
    /// ネットワーク選択（大小どちらを使うか）の材料にする。
    pub fn simple_eval(&self) -> i32 {
        let mut v = 0i32;
        for pt in PieceType::ALL {
            let diff = self.pieces(Color::White, pt).count() as i32
                - self.pieces(Color::Black, pt).count() as i32;
            v += PIECE_VALUES[pt.index()] * diff;
        }
        match self.side_to_move {
            Color::White => v,
            Color::Black => -v,
        }
    }

    /// 駒の利き（ポーンは手番依存）
    #[inline]
    pub fn attacks_from(pc: Piece, sq: Square, occupied: Bitboard) -> Bitboard {
        match pc.piece_type() {
            PieceType::Pawn => pawn_attacks(pc.color(), sq),
            pt => attacks_bb(pt, sq, occupied),
        }
    }

    fn put_piece(&mut self, pc: Piece, sq: Square) {
        debug_assert!(self.board[sq.index()].is_none());
        self.board[sq.index()] = Some(pc);
        self.by_color[pc.color().index()].set(sq);
        self.by_type[pc.piece_type().index()].set(sq);
        if pc.piece_type() == PieceType::King {
            self.king_sq[pc.color().index()] = sq;
        }
    }

    fn remove_piece(&mut self, sq: Square) -> Option<Piece> {
        let pc = self.board[sq.index()].take()?;
        self.by_color[pc.color().index()].clear(sq);
        self.by_type[pc.piece_type().index()].clear(sq);
        Some(pc)
    }

    pub(super) fn set_piece(&mut self, pc: Piece, sq: Square) {
        self.put_piece(pc, sq);
    }

    pub(super) fn set_side_to_move(&mut self, c: Color) {
        self.side_to_move = c;
    }

    pub(super) fn set_castling_rights(&mut self, rights: u8) {
        self.castling_rights = rights;
    }

    pub(super) fn set_ep_square(&mut self, sq: Option<Square>) {
        self.ep_square = sq;
    }

    pub(super) fn set_clocks(&mut self, halfmove: u32, fullmove: u32) {
        self.halfmove_clock = halfmove;
        self.fullmove_number = fullmove;
    }

    /// Zobrist ハッシュを盤面から計算し直す（FEN 読み込み後に呼ぶ）
    pub(super) fn recompute_key(&mut self) {
        let z = Zobrist::instance();
        let mut key = 0u64;
        for sq in self.occupied() {
            if let Some(pc) = self.board[sq.index()] {
                key ^= z.piece_square(pc, sq);
            }
        }
        key ^= z.castling(self.castling_rights);
        if let Some(ep) = self.ep_square {
            key ^= z.en_passant(ep);
        }
        key ^= z.side_to_move(self.side_to_move);
        self.key = key;
    }

    /// 盤上の全利き対を昇順ソートしたキー列として収集する
    ///
    /// キーは `attacker_sq | victim_sq << 6 | attacker << 12 | victim << 16`。
    fn collect_threats(&self, out: &mut Vec<u32>) {
        out.clear();
        let occ = self.occupied();
        for sq in occ {
            if let Some(pc) = self.board[sq.index()] {
                let targets = Self::attacks_from(pc, sq, occ) & occ;
                for t in targets {
                    if let Some(tp) = self.board[t.index()] {
                        out.push(
                            sq.index() as u32
                                | (t.index() as u32) << 6
                                | (pc.index() as u32) << 12
                                | (tp.index() as u32) << 16,
                        );
                    }
                }
            }
        }
        out.sort_unstable();
    }

    fn unpack_threat(key: u32, add: bool) -> DirtyThreat {
        DirtyThreat {
            sq: Square::from_index((key & 0x3F) as usize),
            threatened_sq: Square::from_index(((key >> 6) & 0x3F) as usize),
            piece: Piece::from_index(((key >> 12) & 0xF) as usize),
            threatened_piece: Piece::from_index(((key >> 16) & 0xF) as usize),
            add,
        }
    }

    /// ソート済みの前後利き集合をマージ走査して増減を列挙する
    fn diff_threats(before: &[u32], after: &[u32], dts: &mut DirtyThreats) {
        let (mut i, mut j) = (0usize, 0usize);
        while i < before.len() && j < after.len() {
            match before[i].cmp(&after[j]) {
                std::cmp::Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => {
                    dts.push(Self::unpack_threat(before[i], false));
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    dts.push(Self::unpack_threat(after[j], true));
                    j += 1;
                }
            }
        }
        while i < before.len() {
            dts.push(Self::unpack_threat(before[i], false));
            i += 1;
        }
        while j < after.len() {
            dts.push(Self::unpack_threat(after[j], true));
            j += 1;
        }
    }

    /// キャスリングのルークの移動元と移動先（from/to は玉の移動）
    fn castling_rook_squares(from: Square, to: Square) -> (Square, Square) {
        use crate::types::File;
        if to.file() == File::G {
            (Square::new(File::H, from.rank()), Square::new(File::F, from.rank()))
        } else {
            (Square::new(File::A, from.rank()), Square::new(File::D, from.rank()))
        }
    }

    /// 指し手を進める
    ///
    /// 盤面・ハッシュ・各種カウンタを更新し、NNUE 差分更新用の
    /// DirtyPiece / DirtyThreats を返す。指し手は合法であること。
    pub fn do_move(&mut self, m: Move) -> (DirtyPiece, DirtyThreats) {
        let z = Zobrist::instance();
        let us = self.side_to_move;
        let from = m.from_sq();
        let to = m.to_sq();
        let Some(pc) = self.board[from.index()] else {
            unreachable_no_piece(from);
        };
        debug_assert_eq!(pc.color(), us);

        let mut before = Vec::with_capacity(192);
        self.collect_threats(&mut before);
        let pre_king = self.king_sq[us.index()];

        self.history.push(StateInfo {
            last_move: m,
            captured: None,
            castling_rights: self.castling_rights,
            ep_square: self.ep_square,
            halfmove_clock: self.halfmove_clock,
            key: self.key,
        });

        let mut dp = DirtyPiece::empty();
        let mut captured: Option<Piece> = None;

        self.key ^= z.castling(self.castling_rights);
        if let Some(ep) = self.ep_square {
            self.key ^= z.en_passant(ep);
        }
        self.ep_square = None;
        self.halfmove_clock += 1;

        match m.move_type() {
            MoveType::Castling => {
                // 玉とルークを同時に動かす（from/to は玉の移動）
                let (rook_from, rook_to) = Self::castling_rook_squares(from, to);
                let Some(rook) = self.remove_piece(rook_from) else {
                    unreachable_no_piece(rook_from);
                };
                self.remove_piece(from);
                self.put_piece(pc, to);
                self.put_piece(rook, rook_to);
                dp.push(pc, Some(from), Some(to));
                dp.push(rook, Some(rook_from), Some(rook_to));
                self.key ^= z.piece_square(pc, from) ^ z.piece_square(pc, to);
                self.key ^= z.piece_square(rook, rook_from) ^ z.piece_square(rook, rook_to);
            }
            MoveType::EnPassant => {
                let cap_sq = Square::new(to.file(), from.rank());
                let Some(cap) = self.remove_piece(cap_sq) else {
                    unreachable_no_piece(cap_sq);
                };
                captured = Some(cap);
                self.remove_piece(from);
                self.put_piece(pc, to);
                dp.push(pc, Some(from), Some(to));
                dp.push(cap, Some(cap_sq), None);
                self.key ^= z.piece_square(pc, from) ^ z.piece_square(pc, to);
                self.key ^= z.piece_square(cap, cap_sq);
                self.halfmove_clock = 0;
            }
            MoveType::Promotion => {
                let promoted = Piece::new(us, m.promotion_type());
                if let Some(cap) = self.remove_piece(to) {
                    captured = Some(cap);
                    self.key ^= z.piece_square(cap, to);
                }
                self.remove_piece(from);
                self.put_piece(promoted, to);
                dp.push(pc, Some(from), None);
                dp.push(promoted, None, Some(to));
                if let Some(cap) = captured {
                    dp.push(cap, Some(to), None);
                }
                self.key ^= z.piece_square(pc, from) ^ z.piece_square(promoted, to);
                self.halfmove_clock = 0;
            }
            MoveType::Normal => {
                if let Some(cap) = self.remove_piece(to) {
                    captured = Some(cap);
                    self.key ^= z.piece_square(cap, to);
                    self.halfmove_clock = 0;
                }
                self.remove_piece(from);
                self.put_piece(pc, to);
                dp.push(pc, Some(from), Some(to));
                if let Some(cap) = captured {
                    dp.push(cap, Some(to), None);
                }
                self.key ^= z.piece_square(pc, from) ^ z.piece_square(pc, to);
                if pc.piece_type() == PieceType::Pawn {
                    self.halfmove_clock = 0;
                    // 2升前進でアンパッサン升を設定
                    let from_r = from.rank().index() as i32;
                    let to_r = to.rank().index() as i32;
                    if (from_r - to_r).abs() == 2 {
                        let mid = Square::new(from.file(), Rank::from_index(((from_r + to_r) / 2) as usize));
                        self.ep_square = Some(mid);
                    }
                }
            }
        }

        if let Some(last) = self.history.last_mut() {
            last.captured = captured;
        }

        self.castling_rights &= CASTLING_MASK[from.index()] & CASTLING_MASK[to.index()];
        self.key ^= z.castling(self.castling_rights);
        if let Some(ep) = self.ep_square {
            self.key ^= z.en_passant(ep);
        }
        self.side_to_move = us.opponent();
        self.key ^= z.side_to_move(Color::Black);
        if us == Color::Black {
            self.fullmove_number += 1;
        }

        let mut after = Vec::with_capacity(192);
        self.collect_threats(&mut after);
        let mut dts = DirtyThreats::empty();
        dts.ac = us;
        dts.king_sq = self.king_sq[us.index()];
        dts.pre_king_sq = pre_king;
        Self::diff_threats(&before, &after, &mut dts);

        (dp, dts)
    }

    /// 直前の指し手を巻き戻す
    pub fn undo_move(&mut self) {
        let Some(st) = self.history.pop() else {
            unreachable_empty_history();
        };
        let m = st.last_move;
        let us = self.side_to_move.opponent();
        let from = m.from_sq();
        let to = m.to_sq();

        match m.move_type() {
            MoveType::Castling => {
                let (rook_from, rook_to) = Self::castling_rook_squares(from, to);
                if let (Some(king), Some(rook)) = (self.remove_piece(to), self.remove_piece(rook_to)) {
                    self.put_piece(king, from);
                    self.put_piece(rook, rook_from);
                }
            }
            MoveType::EnPassant => {
                if let Some(pawn) = self.remove_piece(to) {
                    self.put_piece(pawn, from);
                }
                if let Some(cap) = st.captured {
                    self.put_piece(cap, Square::new(to.file(), from.rank()));
                }
            }
            MoveType::Promotion => {
                self.remove_piece(to);
                self.put_piece(Piece::new(us, PieceType::Pawn), from);
                if let Some(cap) = st.captured {
                    self.put_piece(cap, to);
                }
            }
            MoveType::Normal => {
                if let Some(pc) = self.remove_piece(to) {
                    self.put_piece(pc, from);
                }
                if let Some(cap) = st.captured {
                    self.put_piece(cap, to);
                }
            }
        }

        self.side_to_move = us;
        self.castling_rights = st.castling_rights;
        self.ep_square = st.ep_square;
        self.halfmove_clock = st.halfmove_clock;
        self.key = st.key;
        if us == Color::Black {
            self.fullmove_number -= 1;
        }
    }
}

#[cold]
#[inline(never)]
fn unreachable_no_piece(sq: Square) -> ! {
    panic!("no piece on square {sq}");
}

#[cold]
#[inline(never)]
fn unreachable_empty_history() -> ! {
    panic!("undo_move called with empty history");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::from_str_coord(s).unwrap()
    }

    #[test]
    fn test_startpos_counts() {
        let pos = Position::startpos();
        assert_eq!(pos.piece_count(), 32);
        assert_eq!(pos.material_bucket(), 7);
        assert_eq!(pos.king_square(Color::White), Square::E1);
        assert_eq!(pos.king_square(Color::Black), Square::E8);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.simple_eval(), 0);
    }

    #[test]
    fn test_do_undo_roundtrip() {
        let mut pos = Position::startpos();
        let key0 = pos.key();
        let (dp, dts) = pos.do_move(Move::new(sq("e2"), sq("e4")));
        assert_eq!(dp.len, 1);
        assert_eq!(dts.ac, Color::White);
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.ep_square(), Some(sq("e3")));
        assert_ne!(pos.key(), key0);
        pos.undo_move();
        assert_eq!(pos.key(), key0);
        assert_eq!(pos.piece_on(sq("e2")), Some(Piece::new(Color::White, PieceType::Pawn)));
        assert_eq!(pos.piece_on(sq("e4")), None);
    }

    #[test]
    fn test_capture_dirty_shape() {
        let mut pos = Position::startpos();
        pos.do_move(Move::new(sq("e2"), sq("e4")));
        pos.do_move(Move::new(sq("d7"), sq("d5")));
        let (dp, _) = pos.do_move(Move::new(sq("e4"), sq("d5")));
        // 取り: 動いた駒 + 取られた駒の2件
        assert_eq!(dp.len, 2);
        assert_eq!(dp.piece[1], Piece::new(Color::Black, PieceType::Pawn));
        assert_eq!(dp.to[1], None);
        assert_eq!(pos.piece_count(), 31);
        pos.undo_move();
        assert_eq!(pos.piece_count(), 32);
    }

    #[test]
    fn test_en_passant() {
        let mut pos = Position::startpos();
        pos.do_move(Move::new(sq("e2"), sq("e4")));
        pos.do_move(Move::new(sq("a7"), sq("a6")));
        pos.do_move(Move::new(sq("e4"), sq("e5")));
        pos.do_move(Move::new(sq("d7"), sq("d5")));
        assert_eq!(pos.ep_square(), Some(sq("d6")));
        let key_before = pos.key();
        let (dp, _) = pos.do_move(Move::en_passant(sq("e5"), sq("d6")));
        assert_eq!(dp.len, 2);
        assert_eq!(dp.from[1], Some(sq("d5")));
        assert_eq!(pos.piece_on(sq("d5")), None);
        assert_eq!(pos.piece_on(sq("d6")), Some(Piece::new(Color::White, PieceType::Pawn)));
        pos.undo_move();
        assert_eq!(pos.key(), key_before);
        assert_eq!(pos.piece_on(sq("d5")), Some(Piece::new(Color::Black, PieceType::Pawn)));
    }

    #[test]
    fn test_promotion() {
        let mut pos = Position::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let (dp, _) = pos.do_move(Move::promotion(sq("a7"), sq("a8"), PieceType::Queen));
        assert_eq!(dp.len, 2);
        assert_eq!(dp.to[0], None);
        assert_eq!(dp.piece[1], Piece::new(Color::White, PieceType::Queen));
        assert_eq!(pos.piece_on(sq("a8")), Some(Piece::new(Color::White, PieceType::Queen)));
        pos.undo_move();
        assert_eq!(pos.piece_on(sq("a7")), Some(Piece::new(Color::White, PieceType::Pawn)));
        assert_eq!(pos.piece_on(sq("a8")), None);
    }

    #[test]
    fn test_castling() {
        let mut pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let (dp, dts) = pos.do_move(Move::castling(Square::E1, Square::G1));
        assert_eq!(dp.len, 2);
        assert_eq!(pos.king_square(Color::White), Square::G1);
        assert_eq!(pos.piece_on(sq("f1")), Some(Piece::new(Color::White, PieceType::Rook)));
        assert_eq!(pos.castling_rights() & (castling::WHITE_OO | castling::WHITE_OOO), 0);
        assert_eq!(dts.pre_king_sq, Square::E1);
        assert_eq!(dts.king_sq, Square::G1);
        pos.undo_move();
        assert_eq!(pos.king_square(Color::White), Square::E1);
        assert_eq!(pos.piece_on(sq("h1")), Some(Piece::new(Color::White, PieceType::Rook)));
        assert_ne!(pos.castling_rights() & castling::WHITE_OO, 0);
    }

    #[test]
    fn test_threat_diff_simple() {
        // Nf3 でナイトの利き対が増える
        let mut pos = Position::startpos();
        let (_, dts) = pos.do_move(Move::new(sq("g1"), sq("f3")));
        // g1 のナイトの旧利き対が消え、f3 からの対が増える
        assert!(dts.len > 0);
        assert!(dts.entries().iter().any(|dt| dt.add && dt.sq == sq("f3")));
        // g1 が空いたことで h1 ルーク → f1 ビショップの発見利きも加わる
        assert!(dts
            .entries()
            .iter()
            .any(|dt| dt.add && dt.sq == sq("h1") && dt.threatened_sq == sq("f1")));
    }

    #[test]
    fn test_threat_diff_reversible() {
        let mut pos = Position::startpos();
        let mut before = Vec::new();
        pos.collect_threats(&mut before);
        let (_, dts_fwd) = pos.do_move(Move::new(sq("e2"), sq("e4")));
        pos.undo_move();
        let mut after = Vec::new();
        pos.collect_threats(&mut after);
        assert_eq!(before, after);
        // 追加分と削除分が対応して非空
        assert!(dts_fwd.len > 0);
    }

    #[test]
    fn test_material_bucket_small() {
        let pos = Position::from_fen("8/7k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        assert_eq!(pos.piece_count(), 2);
        assert_eq!(pos.material_bucket(), 0);
    }
}
