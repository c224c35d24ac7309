//! NNUE評価関数モジュール
//!
//! Efficiently Updatable Neural Network による局面評価。
//!
//! - 評価関数ファイル（LEB128圧縮）の読み書き
//! - 特徴量計算（駒位置 HalfKAv2_hm と利き対 FullThreats）
//! - アキュムレータスタック（差分更新・全計算キャッシュ）
//! - 後段レイヤースタックの順伝播

pub mod accumulator;
pub mod aligned;
pub mod cache;
pub mod constants;
pub mod feature_transformer;
pub mod features;
pub mod layers;
pub mod leb128;
pub mod network;
#[cfg(feature = "nnue-stats")]
pub mod stats;

pub use accumulator::{Accumulator, AccumulatorStack};
pub use aligned::{Aligned, AlignedBox};
pub use cache::AccumulatorCache;
pub use constants::*;
pub use feature_transformer::FeatureTransformer;
pub use features::{FeatureSet, FullThreats, HalfKAv2Hm};
pub use network::{
    AccumulatorCaches, BigNetwork, NetworkArch, NetworkOutput, Networks, SmallNetwork,
};
