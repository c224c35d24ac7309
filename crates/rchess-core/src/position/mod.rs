//! 局面モジュール
//!
//! 評価コアが扱う局面表現と、指し手による差分情報の生成を提供する。

mod fen;
mod pos;
mod state;
mod zobrist;

pub use fen::{FenError, STARTPOS_FEN};
pub use pos::{castling, Position};
pub use state::{DirtyPiece, DirtyThreat, DirtyThreats, StateInfo, MAX_DIRTY_THREATS};
pub use zobrist::Zobrist;
