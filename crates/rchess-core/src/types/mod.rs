//! 基本型モジュール
//!
//! 盤面・駒・指し手・評価値の基本型を提供する。
//!
//! - `Color`: 手番（白/黒）
//! - `Square` / `File` / `Rank`: 升と座標
//! - `Piece` / `PieceType`: 駒と駒種
//! - `Move` / `MoveType`: 16bit 指し手表現
//! - `Value`: 内部スケールの評価値

mod chess_move;
mod color;
mod piece;
mod square;
mod value;

pub use chess_move::{Move, MoveType};
pub use color::Color;
pub use piece::{Piece, PieceType};
pub use square::{File, Rank, Square};
pub use value::Value;
