//! ネットワーク本体（レイヤースタックとファイル入出力）
//!
//! 第1層（特徴量変換器）の後段に、マテリアルバケットごとの
//! 小さな全結合スタック `fc_0 → ac_0 → fc_1 → ac_1 → fc_2` を持つ。
//! 大小2つのネットワークを束ねた [`Networks`] が探索側の入口になる。
//!
//! ファイル形式はヘッダ（バージョン・全体ハッシュ・説明文）の後に
//! セクションごとの整合性ハッシュとLEB128圧縮パラメータが並ぶ。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context;
use log::info;

use crate::position::Position;
use crate::types::Value;

use super::accumulator::{AccumulatorStack, BigPsqView, SmallPsqView, ThreatView};
use super::aligned::Aligned;
use super::cache::AccumulatorCache;
use super::constants::{
    BIG_L1, FC_0_OUTPUTS, FC_1_OUTPUTS, LAYER_STACKS, OUTPUT_SCALE, SMALL_L1, VERSION,
    WEIGHT_SCALE_BITS,
};
use super::feature_transformer::FeatureTransformer;
use super::layers::{
    affine_hash, relu_hash, AffineTransform, AffineTransformSparseInput, ClippedReLU,
    SqrClippedReLU,
};
use super::leb128::{read_u32, write_u32};

/// ネットワーク出力（PSQT項と位置項）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOutput {
    pub psqt: Value,
    pub positional: Value,
}

/// マテリアルバケット1つ分の後段スタック
pub struct LayerStack<const L1: usize> {
    pub fc_0: AffineTransformSparseInput<L1, { FC_0_OUTPUTS + 1 }>,
    pub fc_1: AffineTransform<{ FC_0_OUTPUTS * 2 }, FC_1_OUTPUTS>,
    pub fc_2: AffineTransform<FC_1_OUTPUTS, 1>,
}

impl<const L1: usize> LayerStack<L1> {
    pub fn zeroed() -> Self {
        LayerStack {
            fc_0: AffineTransformSparseInput::zeroed(),
            fc_1: AffineTransform::zeroed(),
            fc_2: AffineTransform::zeroed(),
        }
    }

    /// 後段スタックのハッシュ（層の連鎖で計算する）
    pub const fn arch_hash() -> u32 {
        let mut h = 0xEC42_E90Du32 ^ (L1 as u32 * 2);
        h = affine_hash(h, FC_0_OUTPUTS + 1);
        h = relu_hash(h);
        h = affine_hash(h, FC_1_OUTPUTS);
        h = relu_hash(h);
        h = affine_hash(h, 1);
        h
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        self.fc_0.read_parameters(reader)?;
        self.fc_1.read_parameters(reader)?;
        self.fc_2.read_parameters(reader)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.fc_0.write_parameters(writer)?;
        self.fc_1.write_parameters(writer)?;
        self.fc_2.write_parameters(writer)
    }

    /// 変換済み特徴量（L1バイト）から位置項を計算する
    ///
    /// fc_0 の余剰出力（16個目）はスキップ接続として最終出力に加算する。
    pub fn propagate(&self, transformed: &[u8]) -> i32 {
        let mut fc_0_out = [0i32; FC_0_OUTPUTS + 1];
        self.fc_0.propagate(transformed, &mut fc_0_out);

        // 二乗側を前半、線形側を後半に並べて fc_1 の入力にする
        let mut ac_0_out = Aligned([0u8; 32]);
        SqrClippedReLU::<FC_0_OUTPUTS>::propagate(
            &fc_0_out[..FC_0_OUTPUTS],
            &mut ac_0_out[..FC_0_OUTPUTS],
        );
        ClippedReLU::<FC_0_OUTPUTS>::propagate(
            &fc_0_out[..FC_0_OUTPUTS],
            &mut ac_0_out[FC_0_OUTPUTS..FC_0_OUTPUTS * 2],
        );

        let mut fc_1_out = [0i32; FC_1_OUTPUTS];
        self.fc_1.propagate(&ac_0_out[..], &mut fc_1_out);

        let mut ac_1_out = Aligned([0u8; FC_1_OUTPUTS]);
        ClippedReLU::<FC_1_OUTPUTS>::propagate(&fc_1_out, &mut ac_1_out[..]);

        let mut fc_2_out = [0i32; 1];
        self.fc_2.propagate(&ac_1_out[..], &mut fc_2_out);

        let fwd_out = (i64::from(fc_0_out[FC_0_OUTPUTS]) * i64::from(600 * OUTPUT_SCALE)
            / (127 * (1i64 << WEIGHT_SCALE_BITS))) as i32;
        fc_2_out[0] + fwd_out
    }
}

#[cold]
#[inline(never)]
fn bad_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// 1ネットワーク分の構造（特徴量変換器 + レイヤースタック群）
pub struct NetworkArch<const L1: usize, const THREATS: bool> {
    pub feature_transformer: FeatureTransformer<L1, THREATS>,
    pub stacks: [LayerStack<L1>; LAYER_STACKS],
    /// ファイルヘッダに書かれた説明文
    pub description: String,
}

impl<const L1: usize, const THREATS: bool> NetworkArch<L1, THREATS> {
    pub fn zeroed() -> Self {
        NetworkArch {
            feature_transformer: FeatureTransformer::zeroed(),
            stacks: std::array::from_fn(|_| LayerStack::zeroed()),
            description: String::new(),
        }
    }

    /// ネットワーク全体のハッシュ
    pub const fn hash() -> u32 {
        FeatureTransformer::<L1, THREATS>::hash() ^ LayerStack::<L1>::arch_hash()
    }

    /// 評価関数ファイルを読み込む
    ///
    /// ヘッダとセクションハッシュを検査し、不一致なら `InvalidData` を返す。
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(bad_data(format!(
                "unsupported network file version {version:#010x} (expected {VERSION:#010x})"
            )));
        }
        let hash = read_u32(reader)?;
        if hash != Self::hash() {
            return Err(bad_data(format!(
                "network hash mismatch: file {hash:#010x}, expected {:#010x}",
                Self::hash()
            )));
        }

        let desc_len = read_u32(reader)? as usize;
        let mut desc = vec![0u8; desc_len];
        reader.read_exact(&mut desc)?;
        self.description = String::from_utf8(desc)
            .map_err(|e| bad_data(format!("network description is not valid UTF-8: {e}")))?;

        let ft_hash = read_u32(reader)?;
        if ft_hash != FeatureTransformer::<L1, THREATS>::hash() {
            return Err(bad_data(format!(
                "feature transformer hash mismatch: {ft_hash:#010x}"
            )));
        }
        self.feature_transformer.read_parameters(reader)?;

        for stack in self.stacks.iter_mut() {
            let stack_hash = read_u32(reader)?;
            if stack_hash != LayerStack::<L1>::arch_hash() {
                return Err(bad_data(format!("layer stack hash mismatch: {stack_hash:#010x}")));
            }
            stack.read_parameters(reader)?;
        }
        Ok(())
    }

    /// 評価関数ファイルを書き出す（読み込みの逆変換）
    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u32(writer, VERSION)?;
        write_u32(writer, Self::hash())?;
        write_u32(writer, self.description.len() as u32)?;
        writer.write_all(self.description.as_bytes())?;

        write_u32(writer, FeatureTransformer::<L1, THREATS>::hash())?;
        self.feature_transformer.write_parameters(writer)?;

        for stack in &self.stacks {
            write_u32(writer, LayerStack::<L1>::arch_hash())?;
            stack.write_parameters(writer)?;
        }
        Ok(())
    }
}

/// 大ネットワーク（利き特徴量あり）
pub type BigNetwork = NetworkArch<BIG_L1, true>;
/// 小ネットワーク（駒位置特徴量のみ）
pub type SmallNetwork = NetworkArch<SMALL_L1, false>;

impl BigNetwork {
    /// 現局面を評価する
    pub fn evaluate(
        &self,
        pos: &Position,
        stack: &mut AccumulatorStack,
        cache: &mut AccumulatorCache<BIG_L1>,
    ) -> NetworkOutput {
        stack.evaluate_view::<BigPsqView, BIG_L1>(
            pos,
            &self.feature_transformer.psq_slices(),
            Some(cache),
        );
        stack.evaluate_view::<ThreatView, BIG_L1>(
            pos,
            &self.feature_transformer.threat_slices(),
            None,
        );

        let bucket = pos.material_bucket();
        let mut transformed = Aligned([0u8; BIG_L1]);
        let state = stack.top();
        let psqt = self.feature_transformer.transform(
            pos,
            &state.big,
            Some(&state.threats),
            bucket,
            &mut transformed[..],
        );
        let positional = self.stacks[bucket].propagate(&transformed[..]);

        NetworkOutput {
            psqt: Value::new(psqt / OUTPUT_SCALE),
            positional: Value::new(positional / OUTPUT_SCALE),
        }
    }
}

impl SmallNetwork {
    /// 現局面を評価する
    pub fn evaluate(
        &self,
        pos: &Position,
        stack: &mut AccumulatorStack,
        cache: &mut AccumulatorCache<SMALL_L1>,
    ) -> NetworkOutput {
        stack.evaluate_view::<SmallPsqView, SMALL_L1>(
            pos,
            &self.feature_transformer.psq_slices(),
            Some(cache),
        );

        let bucket = pos.material_bucket();
        let mut transformed = Aligned([0u8; SMALL_L1]);
        let state = stack.top();
        let psqt = self.feature_transformer.transform(
            pos,
            &state.small,
            None,
            bucket,
            &mut transformed[..],
        );
        let positional = self.stacks[bucket].propagate(&transformed[..]);

        NetworkOutput {
            psqt: Value::new(psqt / OUTPUT_SCALE),
            positional: Value::new(positional / OUTPUT_SCALE),
        }
    }
}

/// 大小ネットワークの組
pub struct Networks {
    pub big: BigNetwork,
    pub small: SmallNetwork,
}

impl Networks {
    /// ゼロ初期化した組（テスト・学習初期値用）
    pub fn zeroed() -> Networks {
        Networks { big: BigNetwork::zeroed(), small: SmallNetwork::zeroed() }
    }

    /// 2つの評価関数ファイルを読み込む
    pub fn load(big_path: &Path, small_path: &Path) -> anyhow::Result<Networks> {
        let mut networks = Networks::zeroed();

        let file = File::open(big_path)
            .with_context(|| format!("failed to open network file {}", big_path.display()))?;
        networks
            .big
            .read_parameters(&mut BufReader::new(file))
            .with_context(|| format!("failed to read network file {}", big_path.display()))?;
        info!("loaded big network: {}", networks.big.description);

        let file = File::open(small_path)
            .with_context(|| format!("failed to open network file {}", small_path.display()))?;
        networks
            .small
            .read_parameters(&mut BufReader::new(file))
            .with_context(|| format!("failed to read network file {}", small_path.display()))?;
        info!("loaded small network: {}", networks.small.description);

        Ok(networks)
    }

    /// 2つの評価関数ファイルを書き出す
    pub fn save(&self, big_path: &Path, small_path: &Path) -> anyhow::Result<()> {
        let file = File::create(big_path)
            .with_context(|| format!("failed to create network file {}", big_path.display()))?;
        let mut writer = BufWriter::new(file);
        self.big
            .write_parameters(&mut writer)
            .with_context(|| format!("failed to write network file {}", big_path.display()))?;

        let file = File::create(small_path)
            .with_context(|| format!("failed to create network file {}", small_path.display()))?;
        let mut writer = BufWriter::new(file);
        self.small
            .write_parameters(&mut writer)
            .with_context(|| format!("failed to write network file {}", small_path.display()))?;
        Ok(())
    }

    /// 現局面のアキュムレータを先に計算しておく
    ///
    /// 静止探索や枝刈りの前に呼ぶと、後続の evaluate が差分更新で済む。
    pub fn hint_common_access(
        &self,
        pos: &Position,
        stack: &mut AccumulatorStack,
        caches: &mut AccumulatorCaches,
    ) {
        stack.evaluate_view::<BigPsqView, BIG_L1>(
            pos,
            &self.big.feature_transformer.psq_slices(),
            Some(&mut caches.big),
        );
        stack.evaluate_view::<ThreatView, BIG_L1>(
            pos,
            &self.big.feature_transformer.threat_slices(),
            None,
        );
        stack.evaluate_view::<SmallPsqView, SMALL_L1>(
            pos,
            &self.small.feature_transformer.psq_slices(),
            Some(&mut caches.small),
        );
    }
}

/// 大小ネットワーク用の全計算キャッシュの組
pub struct AccumulatorCaches {
    pub big: AccumulatorCache<BIG_L1>,
    pub small: AccumulatorCache<SMALL_L1>,
}

impl AccumulatorCaches {
    /// ネットワークのバイアスで初期化したキャッシュを作る
    pub fn new(networks: &Networks) -> AccumulatorCaches {
        AccumulatorCaches {
            big: AccumulatorCache::new(&networks.big.feature_transformer.biases),
            small: AccumulatorCache::new(&networks.small.feature_transformer.biases),
        }
    }

    /// ネットワーク差し替え後に全エントリを初期化し直す
    pub fn clear(&mut self, networks: &Networks) {
        self.big.clear(&networks.big.feature_transformer.biases);
        self.small.clear(&networks.small.feature_transformer.biases);
    }
}
