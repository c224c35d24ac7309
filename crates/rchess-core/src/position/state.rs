//! 局面の差分情報（DirtyPiece / DirtyThreats）と巻き戻し用状態
//!
//! `Position::do_move` は盤面を進めると同時に、NNUE の差分更新に
//! 必要な「どの駒がどこからどこへ動いたか」「どの利き対が増減したか」
//! を記録して返す。

use crate::types::{Color, Move, Piece, Square};

/// 1手で盤上配置が変わった駒の記録
///
/// 最大3駒まで変化する（キャスリング = 玉 + ルーク、
/// 成り + 駒取り = ポーン消滅 + 成駒出現 + 被取り駒消滅）。
/// `from == None` は盤外からの出現（成駒）、`to == None` は盤上からの
/// 消滅（被取り駒・成る前のポーン）を表す。要素0は常に指した駒。
#[derive(Debug, Clone, Copy)]
pub struct DirtyPiece {
    pub len: usize,
    pub piece: [Piece; 3],
    pub from: [Option<Square>; 3],
    pub to: [Option<Square>; 3],
}

impl DirtyPiece {
    /// 変化なしの空の記録（ルート局面用）
    pub const fn empty() -> DirtyPiece {
        DirtyPiece {
            len: 0,
            piece: [Piece::from_index(0); 3],
            from: [None; 3],
            to: [None; 3],
        }
    }

    /// 駒の移動・消滅・出現を1件追加
    #[inline]
    pub fn push(&mut self, piece: Piece, from: Option<Square>, to: Option<Square>) {
        debug_assert!(self.len < 3);
        self.piece[self.len] = piece;
        self.from[self.len] = from;
        self.to[self.len] = to;
        self.len += 1;
    }

    /// 指した駒（要素0）
    #[inline]
    pub fn moved_piece(&self) -> Piece {
        debug_assert!(self.len > 0);
        self.piece[0]
    }
}

/// 1手で増減した利き対の最大数
pub const MAX_DIRTY_THREATS: usize = 128;

/// 利き対1件の増減記録
#[derive(Debug, Clone, Copy)]
pub struct DirtyThreat {
    /// 利きを出す駒の升
    pub sq: Square,
    /// 利きを受ける駒の升
    pub threatened_sq: Square,
    /// 利きを出す駒
    pub piece: Piece,
    /// 利きを受ける駒
    pub threatened_piece: Piece,
    /// true なら追加、false なら削除
    pub add: bool,
}

/// 1手で増減した利き対の一覧
#[derive(Debug, Clone, Copy)]
pub struct DirtyThreats {
    /// 指した側
    pub ac: Color,
    /// 指した側の玉の位置（指した後）
    pub king_sq: Square,
    /// 指した側の玉の位置（指す前）
    pub pre_king_sq: Square,
    pub len: usize,
    pub list: [DirtyThreat; MAX_DIRTY_THREATS],
}

impl DirtyThreats {
    /// 変化なしの空の記録（ルート局面用）
    pub const fn empty() -> DirtyThreats {
        const NONE: DirtyThreat = DirtyThreat {
            sq: Square::A1,
            threatened_sq: Square::A1,
            piece: Piece::from_index(0),
            threatened_piece: Piece::from_index(0),
            add: false,
        };
        DirtyThreats {
            ac: Color::White,
            king_sq: Square::E1,
            pre_king_sq: Square::E1,
            len: 0,
            list: [NONE; MAX_DIRTY_THREATS],
        }
    }

    #[inline]
    pub fn push(&mut self, dt: DirtyThreat) {
        debug_assert!(self.len < MAX_DIRTY_THREATS);
        self.list[self.len] = dt;
        self.len += 1;
    }

    /// 記録された増減のスライス
    #[inline]
    pub fn entries(&self) -> &[DirtyThreat] {
        &self.list[..self.len]
    }
}

/// undo_move 用に保存する局面状態
#[derive(Debug, Clone, Copy)]
pub struct StateInfo {
    /// この状態に至った指し手
    pub last_move: Move,
    /// 取られた駒（アンパッサンではポーン）
    pub captured: Option<Piece>,
    /// キャスリング権（変更前）
    pub castling_rights: u8,
    /// アンパッサン升（変更前）
    pub ep_square: Option<Square>,
    /// 50手ルールカウンタ（変更前）
    pub halfmove_clock: u32,
    /// Zobrist ハッシュ（変更前）
    pub key: u64,
}
