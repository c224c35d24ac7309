//! NNUE の定数
//!
//! ネットワーク構造の次元・量子化スケール・ファイル形式のバージョン。
//! 評価関数ファイルとの互換性に直結するため、変更は形式の改定を伴う。

/// 評価関数ファイルのバージョン
pub const VERSION: u32 = 0x7AF3_2F16;

/// 第1層重みの量子化シフト量
pub const WEIGHT_SCALE_BITS: u32 = 6;

/// 出力スケール（内部値 = ネット出力 × 16）
pub const OUTPUT_SCALE: i32 = 16;

/// PSQT バケット数
pub const PSQT_BUCKETS: usize = 8;

/// レイヤースタック数（マテリアルバケットごとに1つ）
pub const LAYER_STACKS: usize = 8;

/// 大ネットワークの第1層次元（利き特徴量あり）
pub const BIG_L1: usize = 512;

/// 小ネットワークの第1層次元（駒位置特徴量のみ）
pub const SMALL_L1: usize = 128;

/// fc_0 の出力次元（15出力 + スキップ項1）
pub const FC_0_OUTPUTS: usize = 15;

/// fc_1 の出力次元
pub const FC_1_OUTPUTS: usize = 32;

/// 差分更新のコスト推定: 初期値は駒数 - この値
pub const GAIN_BASE: u32 = 2;

/// 読み込みバッファの既定サイズ
pub const BULK_IO_CHUNK: usize = 1 << 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_relations() {
        assert_eq!(PSQT_BUCKETS, LAYER_STACKS);
        assert_eq!(BIG_L1 % 256, 0);
        assert_eq!(SMALL_L1 % 128, 0);
        // fc_0 の実出力は 16（15 + スキップ項）でパディング境界に収まる
        assert!(FC_0_OUTPUTS + 1 <= 32);
    }
}
