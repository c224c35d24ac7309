//! # rchess-core
//!
//! NNUE評価を核にしたチェスエンジンコアライブラリ。
//!
//! ## モジュール構成
//!
//! - `types`: 基本型（Color, Square, Piece, Move, Value, etc.）
//! - `bitboard`: ビットボード演算
//! - `position`: 局面表現とdo_move/undo_move（差分情報の生成を含む）
//! - `nnue`: NNUE評価関数（特徴量・アキュムレータ・ネットワーク）
//! - `eval`: 大小ネットワークの選択とブレンド

pub mod bitboard;
pub mod eval;
pub mod nnue;
pub mod position;
pub mod types;

pub use eval::evaluate;
pub use nnue::{AccumulatorCaches, AccumulatorStack, Networks};
pub use position::Position;
pub use types::{Color, Move, Piece, PieceType, Square, Value};
