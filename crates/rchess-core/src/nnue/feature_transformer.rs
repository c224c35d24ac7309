//! 第1層（特徴量変換器）
//!
//! 特徴量ごとの重みベクトルとPSQT重みを保持し、アキュムレータの
//! 両視点の値から後段への u8 入力と PSQT 評価値を作る。
//! 出力は同一視点内のペア積 `(sum0 * sum1) / 512` で、後段入力の
//! 疎性を高めつつ 0-127 に収まる。
//!
//! `THREATS = true` の系統は駒位置特徴量に加えて利き特徴量の
//! 重みを持ち、シリアライズでは利きブロックを先頭に結合した
//! 1本のテンソルとして読み書きする。

use std::io::{self, Read, Write};

use crate::position::Position;

use super::accumulator::{Accumulator, FtSlices};
use super::aligned::AlignedBox;
use super::constants::PSQT_BUCKETS;
use super::features::{FeatureSet, FullThreats, HalfKAv2Hm};
use super::leb128::{read_leb128, write_leb128};

/// 特徴量変換器
///
/// 重みは特徴量インデックス優先（`weights[index * L1 + j]`）で、
/// `THREATS = true` なら利きブロックが先頭、駒位置ブロックが後続。
pub struct FeatureTransformer<const L1: usize, const THREATS: bool> {
    /// バイアス（駒位置系統のみ。利き系統はゼロから累積する）
    pub biases: AlignedBox<i16>,
    /// 特徴量 × L1 の重み
    pub weights: AlignedBox<i16>,
    /// 特徴量 × PSQT_BUCKETS の重み
    pub psqt_weights: AlignedBox<i32>,
}

impl<const L1: usize, const THREATS: bool> FeatureTransformer<L1, THREATS> {
    const PSQ_DIMENSIONS: usize = HalfKAv2Hm::DIMENSIONS;
    const THREAT_DIMENSIONS: usize = if THREATS { FullThreats::DIMENSIONS } else { 0 };
    const TOTAL_DIMENSIONS: usize = Self::THREAT_DIMENSIONS + Self::PSQ_DIMENSIONS;

    /// ゼロ初期化した変換器
    pub fn zeroed() -> Self {
        FeatureTransformer {
            biases: AlignedBox::new_zeroed(L1),
            weights: AlignedBox::new_zeroed(Self::TOTAL_DIMENSIONS * L1),
            psqt_weights: AlignedBox::new_zeroed(Self::TOTAL_DIMENSIONS * PSQT_BUCKETS),
        }
    }

    /// この層のハッシュ
    pub const fn hash() -> u32 {
        let feature_hash = if THREATS {
            HalfKAv2Hm::HASH ^ FullThreats::HASH
        } else {
            HalfKAv2Hm::HASH
        };
        feature_hash ^ (L1 as u32 * 2)
    }

    /// 駒位置系統の第1層パラメータ
    pub fn psq_slices(&self) -> FtSlices<'_> {
        FtSlices {
            biases: Some(&self.biases),
            weights: &self.weights[Self::THREAT_DIMENSIONS * L1..],
            psqt_weights: &self.psqt_weights[Self::THREAT_DIMENSIONS * PSQT_BUCKETS..],
        }
    }

    /// 利き系統の第1層パラメータ（`THREATS = true` のときのみ）
    pub fn threat_slices(&self) -> FtSlices<'_> {
        debug_assert!(THREATS);
        FtSlices {
            biases: None,
            weights: &self.weights[..Self::THREAT_DIMENSIONS * L1],
            psqt_weights: &self.psqt_weights[..Self::THREAT_DIMENSIONS * PSQT_BUCKETS],
        }
    }

    /// LEB128圧縮形式から読み込み
    ///
    /// 駒位置専用の系統は重みとバイアスを読み込み時に2倍して持つ
    /// （`transform` のクランプ幅 0-254 と対応）。
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        read_leb128(reader, &mut self.biases)?;
        read_leb128(reader, &mut self.weights)?;
        read_leb128(reader, &mut self.psqt_weights)?;

        if !THREATS {
            for b in self.biases.iter_mut() {
                *b *= 2;
            }
            for w in self.weights.iter_mut() {
                *w *= 2;
            }
        }
        Ok(())
    }

    /// LEB128圧縮形式で書き出し（読み込みの逆変換）
    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if !THREATS {
            let mut biases = vec![0i16; L1];
            for (out, &b) in biases.iter_mut().zip(self.biases.iter()) {
                *out = b / 2;
            }
            let mut weights = vec![0i16; self.weights.len()];
            for (out, &w) in weights.iter_mut().zip(self.weights.iter()) {
                *out = w / 2;
            }
            write_leb128(writer, &biases)?;
            write_leb128(writer, &weights)?;
        } else {
            write_leb128(writer, &self.biases)?;
            write_leb128(writer, &self.weights)?;
        }
        write_leb128(writer, &self.psqt_weights)
    }

    /// アキュムレータから後段入力と PSQT 評価値を作る
    ///
    /// `output` は L1 バイト（手番視点が前半、相手視点が後半）。
    /// 戻り値は手番から見た PSQT 評価値。
    pub fn transform(
        &self,
        pos: &Position,
        psq_acc: &Accumulator<L1>,
        threat_acc: Option<&Accumulator<L1>>,
        bucket: usize,
        output: &mut [u8],
    ) -> i32 {
        debug_assert!(output.len() >= L1);
        debug_assert_eq!(THREATS, threat_acc.is_some());
        debug_assert!(psq_acc.computed[0] && psq_acc.computed[1]);

        let perspectives = [pos.side_to_move(), !pos.side_to_move()];
        let half = L1 / 2;

        let mut psqt = psq_acc.psqt_accumulation[perspectives[0].index()][bucket]
            - psq_acc.psqt_accumulation[perspectives[1].index()][bucket];
        if let Some(threat_acc) = threat_acc {
            psqt += threat_acc.psqt_accumulation[perspectives[0].index()][bucket]
                - threat_acc.psqt_accumulation[perspectives[1].index()][bucket];
        }
        psqt /= 2;

        for (p, perspective) in perspectives.into_iter().enumerate() {
            let acc = &psq_acc.accumulation[perspective.index()];
            let offset = half * p;

            match threat_acc {
                Some(threat_acc) => {
                    let tacc = &threat_acc.accumulation[perspective.index()];
                    for j in 0..half {
                        let sum0 = (acc[j] as i32 + tacc[j] as i32).clamp(0, 255);
                        let sum1 = (acc[j + half] as i32 + tacc[j + half] as i32).clamp(0, 255);
                        output[offset + j] = (sum0 * sum1 / 512) as u8;
                    }
                }
                None => {
                    // 重みが2倍で入っているためクランプ幅は 0-254
                    for j in 0..half {
                        let sum0 = (acc[j] as i32).clamp(0, 254);
                        let sum1 = (acc[j + half] as i32).clamp(0, 254);
                        output[offset + j] = (sum0 * sum1 / 512) as u8;
                    }
                }
            }
        }

        psqt
    }
}
