//! ネットワーク後段層の実装
//!
//! - `AffineTransform`: 全結合アフィン変換層（u8入力 × i8重み + i32バイアス）
//! - `AffineTransformSparseInput`: 疎入力前提のアフィン変換層（非ゼロチャンクのみ処理）
//! - `ClippedReLU`: 整数スケーリング付きのクリップ付き ReLU 層
//! - `SqrClippedReLU`: 二乗クリップ付き ReLU 層
//!
//! 各層はパラメータを LEB128 圧縮形式で読み書きし、
//! 層構成の整合性検査用ハッシュを前段から連鎖させる。

use std::io::{self, Read, Write};

use super::aligned::AlignedBox;
use super::constants::WEIGHT_SCALE_BITS;
use super::leb128::{read_leb128, write_leb128};

/// パディング済み入力次元（SIMDアライメント用）
pub const fn padded_input(input_dim: usize) -> usize {
    input_dim.div_ceil(32) * 32
}

/// AVX2での水平加算（i32×8 → i32）
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[inline]
unsafe fn hsum_i32_avx2(v: std::arch::x86_64::__m256i) -> i32 {
    use std::arch::x86_64::*;

    let hi = _mm256_extracti128_si256(v, 1);
    let lo = _mm256_castsi256_si128(v);
    let sum128 = _mm_add_epi32(lo, hi);

    let hi64 = _mm_unpackhi_epi64(sum128, sum128);
    let sum64 = _mm_add_epi32(sum128, hi64);

    let hi32 = _mm_shuffle_epi32(sum64, 1);
    let sum32 = _mm_add_epi32(sum64, hi32);

    _mm_cvtsi128_si32(sum32)
}

/// AVX2用 DPBUSD エミュレーション（u8×i8→i32積和演算）
///
/// `maddubs` + `madd` の2命令で積和演算を実行。
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[inline]
unsafe fn m256_add_dpbusd_epi32(
    acc: &mut std::arch::x86_64::__m256i,
    a: std::arch::x86_64::__m256i,
    b: std::arch::x86_64::__m256i,
) {
    use std::arch::x86_64::*;
    let product = _mm256_maddubs_epi16(a, b);
    let product32 = _mm256_madd_epi16(product, _mm256_set1_epi16(1));
    *acc = _mm256_add_epi32(*acc, product32);
}

/// アフィン変換層のハッシュ（前段のハッシュと連鎖）
pub const fn affine_hash(prev: u32, output_dim: usize) -> u32 {
    let mut h = 0xCC03_DAE4u32.wrapping_add(output_dim as u32);
    h ^= prev >> 1;
    h ^= prev << 31;
    h
}

/// ClippedReLU / SqrClippedReLU 層のハッシュ（前段のハッシュと連鎖）
pub const fn relu_hash(prev: u32) -> u32 {
    0x538D_24C7u32.wrapping_add(prev)
}

/// アフィン変換層
pub struct AffineTransform<const INPUT_DIM: usize, const OUTPUT_DIM: usize> {
    /// バイアス
    pub biases: [i32; OUTPUT_DIM],
    /// 重み（64バイトアライン、SIMD時はスクランブル形式）
    pub weights: AlignedBox<i8>,
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> AffineTransform<INPUT_DIM, OUTPUT_DIM> {
    pub const PADDED_INPUT: usize = padded_input(INPUT_DIM);

    /// チャンクサイズ（u8×4 = i32として読む単位）
    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    const CHUNK_SIZE: usize = 4;

    /// 入力チャンク数（ループ逆転最適化用）
    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    const NUM_INPUT_CHUNKS: usize = Self::PADDED_INPUT / Self::CHUNK_SIZE;

    /// スクランブル形式のウェイトを使用するかどうか
    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    const fn should_use_scrambled_weights() -> bool {
        OUTPUT_DIM.is_multiple_of(8) && OUTPUT_DIM > 0
    }

    /// 重みインデックスのスクランブル変換
    /// 行優先（output→input）から列優先（input_chunk→output）に変換
    ///
    /// 元のレイアウト: weights[output][input]
    /// 変換後: weights[input_chunk][output][4]
    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    #[inline]
    const fn get_weight_index_scrambled(i: usize) -> usize {
        (i / Self::CHUNK_SIZE) % (Self::PADDED_INPUT / Self::CHUNK_SIZE)
            * OUTPUT_DIM
            * Self::CHUNK_SIZE
            + i / Self::PADDED_INPUT * Self::CHUNK_SIZE
            + i % Self::CHUNK_SIZE
    }

    /// 行優先インデックス i の実格納位置
    #[inline]
    fn storage_index(i: usize) -> usize {
        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        if Self::should_use_scrambled_weights() {
            return Self::get_weight_index_scrambled(i);
        }
        i
    }

    /// ゼロ初期化した層
    pub fn zeroed() -> Self {
        AffineTransform {
            biases: [0; OUTPUT_DIM],
            weights: AlignedBox::new_zeroed(OUTPUT_DIM * Self::PADDED_INPUT),
        }
    }

    /// weights[output][input] を格納形式を意識せずに設定する
    pub fn set_weight(&mut self, output: usize, input: usize, value: i8) {
        self.weights[Self::storage_index(output * Self::PADDED_INPUT + input)] = value;
    }

    /// この層までのハッシュ
    pub const fn hash(prev: u32) -> u32 {
        affine_hash(prev, OUTPUT_DIM)
    }

    /// LEB128圧縮形式から読み込み
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        read_leb128(reader, &mut self.biases)?;

        let weight_size = OUTPUT_DIM * Self::PADDED_INPUT;
        let mut row_major = vec![0i8; weight_size];
        read_leb128(reader, &mut row_major)?;
        for (i, &w) in row_major.iter().enumerate() {
            self.weights[Self::storage_index(i)] = w;
        }
        Ok(())
    }

    /// LEB128圧縮形式で書き出し（読み込みの逆変換）
    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_leb128(writer, &self.biases)?;

        let weight_size = OUTPUT_DIM * Self::PADDED_INPUT;
        let mut row_major = vec![0i8; weight_size];
        for (i, w) in row_major.iter_mut().enumerate() {
            *w = self.weights[Self::storage_index(i)];
        }
        write_leb128(writer, &row_major)
    }

    /// 順伝播
    ///
    /// 入力スライスは `PADDED_INPUT` バイト以上、かつ
    /// [`Aligned`](super::aligned::Aligned) / [`AlignedBox`] による
    /// 64バイトアラインが必要（AVX2経路が `_mm256_load_si256` を使うため）。
    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUTPUT_DIM]) {
        debug_assert!(
            input.len() >= Self::PADDED_INPUT,
            "input length {} is less than PADDED_INPUT {}",
            input.len(),
            Self::PADDED_INPUT
        );

        // AVX2: 256bit = 32 x u8/i8
        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            // SAFETY:
            // - input.len() >= PADDED_INPUT (debug_assert で検証済み)
            // - weights.len() == OUTPUT_DIM * PADDED_INPUT (構造上保証)
            // - input / weights は64バイトアライン
            // - PADDED_INPUT は32の倍数なのでオフセットは常に32バイト境界
            // - biases/output はアライン未保証だが、unaligned load/store を使用
            unsafe {
                use std::arch::x86_64::*;

                // OUTPUT_DIM % 8 == 0 の場合: ループ逆転最適化版
                // 入力をブロードキャストして全出力に同時適用
                #[allow(clippy::needless_range_loop)]
                if Self::should_use_scrambled_weights() {
                    const MAX_REGS: usize = 128; // 最大1024出力まで対応
                    let num_regs = OUTPUT_DIM / 8;
                    debug_assert!(num_regs <= MAX_REGS);

                    let mut acc = [_mm256_setzero_si256(); MAX_REGS];
                    let bias_ptr = self.biases.as_ptr() as *const __m256i;
                    for k in 0..num_regs {
                        acc[k] = _mm256_loadu_si256(bias_ptr.add(k));
                    }

                    let input32 = input.as_ptr() as *const i32;
                    let weights_ptr = self.weights.as_ptr();

                    for i in 0..Self::NUM_INPUT_CHUNKS {
                        let in_val = _mm256_set1_epi32(*input32.add(i));
                        let col =
                            weights_ptr.add(i * OUTPUT_DIM * Self::CHUNK_SIZE) as *const __m256i;
                        for k in 0..num_regs {
                            m256_add_dpbusd_epi32(
                                &mut acc[k],
                                in_val,
                                _mm256_load_si256(col.add(k)),
                            );
                        }
                    }

                    let out_ptr = output.as_mut_ptr() as *mut __m256i;
                    for k in 0..num_regs {
                        _mm256_storeu_si256(out_ptr.add(k), acc[k]);
                    }
                    return;
                }

                // OUTPUT_DIM % 8 != 0 の場合: 出力ごとに処理
                let num_chunks = Self::PADDED_INPUT / 32;
                let one = _mm256_set1_epi16(1);
                let input_ptr = input.as_ptr();
                let weights_ptr = self.weights.as_ptr();

                for (j, (out, &bias)) in output.iter_mut().zip(&self.biases).enumerate() {
                    let mut acc = _mm256_setzero_si256();
                    let weight_row_offset = j * Self::PADDED_INPUT;

                    for k in 0..num_chunks {
                        let offset = k * 32;
                        let in_vec = _mm256_load_si256(input_ptr.add(offset) as *const __m256i);
                        let w_vec = _mm256_load_si256(
                            weights_ptr.add(weight_row_offset + offset) as *const __m256i
                        );
                        let prod16 = _mm256_maddubs_epi16(in_vec, w_vec);
                        let prod32 = _mm256_madd_epi16(prod16, one);
                        acc = _mm256_add_epi32(acc, prod32);
                    }

                    *out = bias + hsum_i32_avx2(acc);
                }
            }
            return;
        }

        // スカラーフォールバック
        #[allow(unreachable_code)]
        {
            output.copy_from_slice(&self.biases);

            for (i, &in_byte) in input.iter().enumerate().take(INPUT_DIM) {
                if in_byte == 0 {
                    continue;
                }
                let in_val = in_byte as i32;
                for (j, out) in output.iter_mut().enumerate() {
                    let weight_idx = j * Self::PADDED_INPUT + i;
                    *out += self.weights[weight_idx] as i32 * in_val;
                }
            }
        }
    }
}

/// 非ゼロチャンク列挙用の補助テーブル（8bitマスク → セットビット位置と個数）
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
struct NnzLookup {
    indices: [[u16; 8]; 256],
    counts: [u8; 256],
}

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
static NNZ_LOOKUP: NnzLookup = {
    let mut indices = [[0u16; 8]; 256];
    let mut counts = [0u8; 256];
    let mut mask = 0usize;
    while mask < 256 {
        let mut bit = 0u16;
        let mut n = 0usize;
        while bit < 8 {
            if mask & (1 << bit) != 0 {
                indices[mask][n] = bit;
                n += 1;
            }
            bit += 1;
        }
        counts[mask] = n as u8;
        mask += 1;
    }
    NnzLookup { indices, counts }
};

/// 非ゼロチャンクバッファの容量（最大1024入力まで対応）
const MAX_NNZ_CHUNKS: usize = 256;

/// 疎入力前提のアフィン変換層
///
/// 入力をi32チャンク（u8×4）単位で見て、非ゼロのチャンクだけ
/// 積和演算を行う。第1層出力（活性率が低い）からの変換に使う。
/// 格納形式とシリアライズは [`AffineTransform`] と同一。
pub struct AffineTransformSparseInput<const INPUT_DIM: usize, const OUTPUT_DIM: usize> {
    pub dense: AffineTransform<INPUT_DIM, OUTPUT_DIM>,
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize>
    AffineTransformSparseInput<INPUT_DIM, OUTPUT_DIM>
{
    /// 入力チャンク数（u8×4単位）
    const NUM_CHUNKS: usize = padded_input(INPUT_DIM) / 4;

    pub fn zeroed() -> Self {
        AffineTransformSparseInput { dense: AffineTransform::zeroed() }
    }

    /// この層までのハッシュ（密版と共通）
    pub const fn hash(prev: u32) -> u32 {
        affine_hash(prev, OUTPUT_DIM)
    }

    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> io::Result<()> {
        self.dense.read_parameters(reader)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.dense.write_parameters(writer)
    }

    /// 非ゼロチャンクのインデックスを列挙する
    ///
    /// 戻り値は昇順。`input` は `PADDED_INPUT` バイト（パディング部はゼロ）。
    #[inline]
    fn find_nnz(input: &[u8], out: &mut [u16]) -> usize {
        debug_assert!(Self::NUM_CHUNKS <= MAX_NNZ_CHUNKS);
        debug_assert!(out.len() >= Self::NUM_CHUNKS);

        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            // SAFETY:
            // - input は64バイトアラインで PADDED_INPUT バイト以上
            // - 8チャンク = 32バイト単位で読むため常に境界内
            unsafe {
                use std::arch::x86_64::*;

                let mut count = 0usize;
                let input_ptr = input.as_ptr() as *const __m256i;
                let zero = _mm256_setzero_si256();

                for block in 0..Self::NUM_CHUNKS / 8 {
                    let chunk = _mm256_load_si256(input_ptr.add(block));
                    // 各u8は非負なのでi32比較で非ゼロ判定できる
                    let nonzero = _mm256_cmpgt_epi32(chunk, zero);
                    let mask = _mm256_movemask_ps(_mm256_castsi256_ps(nonzero)) as usize;

                    let base = (block * 8) as u16;
                    let entry = &NNZ_LOOKUP.indices[mask];
                    for (slot, &offset) in entry.iter().enumerate() {
                        *out.get_unchecked_mut(count + slot) = base + offset;
                    }
                    count += NNZ_LOOKUP.counts[mask] as usize;
                }
                count
            }
        }

        #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
        {
            let mut count = 0usize;
            for i in 0..Self::NUM_CHUNKS {
                let chunk = &input[i * 4..i * 4 + 4];
                if chunk.iter().any(|&b| b != 0) {
                    out[count] = i as u16;
                    count += 1;
                }
            }
            count
        }
    }

    /// 順伝播（非ゼロチャンクのみ処理）
    ///
    /// アライメント要件は [`AffineTransform::propagate`] と同じ。
    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUTPUT_DIM]) {
        debug_assert!(input.len() >= padded_input(INPUT_DIM));

        let mut nnz = [0u16; MAX_NNZ_CHUNKS];
        let count = Self::find_nnz(input, &mut nnz);

        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            // スクランブル形式でない出力次元は密版に任せる
            if !AffineTransform::<INPUT_DIM, OUTPUT_DIM>::should_use_scrambled_weights() {
                self.dense.propagate(input, output);
                return;
            }

            // SAFETY: AffineTransform::propagate のループ逆転版と同じ前提。
            // 走査する入力チャンクを非ゼロのものに限っただけ。
            unsafe {
                use std::arch::x86_64::*;

                const MAX_REGS: usize = 128;
                let num_regs = OUTPUT_DIM / 8;
                debug_assert!(num_regs <= MAX_REGS);

                let mut acc = [_mm256_setzero_si256(); MAX_REGS];
                let bias_ptr = self.dense.biases.as_ptr() as *const __m256i;
                for k in 0..num_regs {
                    acc[k] = _mm256_loadu_si256(bias_ptr.add(k));
                }

                let input32 = input.as_ptr() as *const i32;
                let weights_ptr = self.dense.weights.as_ptr();

                for &chunk in &nnz[..count] {
                    let i = chunk as usize;
                    let in_val = _mm256_set1_epi32(*input32.add(i));
                    let col = weights_ptr.add(i * OUTPUT_DIM * 4) as *const __m256i;
                    for k in 0..num_regs {
                        m256_add_dpbusd_epi32(&mut acc[k], in_val, _mm256_load_si256(col.add(k)));
                    }
                }

                let out_ptr = output.as_mut_ptr() as *mut __m256i;
                for k in 0..num_regs {
                    _mm256_storeu_si256(out_ptr.add(k), acc[k]);
                }
            }
            return;
        }

        // スカラーフォールバック（行優先格納のまま非ゼロチャンクを走査）
        #[allow(unreachable_code)]
        {
            output.copy_from_slice(&self.dense.biases);

            let padded = padded_input(INPUT_DIM);
            for &chunk in &nnz[..count] {
                let base = chunk as usize * 4;
                for b in 0..4 {
                    let in_val = input[base + b] as i32;
                    if in_val == 0 {
                        continue;
                    }
                    for (j, out) in output.iter_mut().enumerate() {
                        *out += self.dense.weights[j * padded + base + b] as i32 * in_val;
                    }
                }
            }
        }
    }
}

/// ClippedReLU層
///
/// 入力: i32、出力: u8。`WEIGHT_SCALE_BITS` で右シフトして 0-127 にクランプ。
pub struct ClippedReLU<const DIM: usize>;

impl<const DIM: usize> ClippedReLU<DIM> {
    /// この層までのハッシュ
    pub const fn hash(prev: u32) -> u32 {
        relu_hash(prev)
    }

    /// 順伝播
    ///
    /// AVX2で32要素ずつ処理し、残りをスカラーで処理する。
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        debug_assert_eq!(input.len(), DIM);
        debug_assert_eq!(output.len(), DIM);

        let processed: usize;

        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            let num_chunks = DIM / 32;
            // SAFETY:
            // - 32要素 = 128バイト単位で num_chunks 回だけ読み書きする
            // - loadu/storeu を使用するためアライメント不要
            unsafe {
                use std::arch::x86_64::*;

                let zero = _mm256_setzero_si256();
                let offsets = _mm256_set_epi32(7, 3, 6, 2, 5, 1, 4, 0);

                let in_ptr = input.as_ptr() as *const __m256i;
                let out_ptr = output.as_mut_ptr() as *mut __m256i;

                for i in 0..num_chunks {
                    let in0 = _mm256_loadu_si256(in_ptr.add(i * 4));
                    let in1 = _mm256_loadu_si256(in_ptr.add(i * 4 + 1));
                    let in2 = _mm256_loadu_si256(in_ptr.add(i * 4 + 2));
                    let in3 = _mm256_loadu_si256(in_ptr.add(i * 4 + 3));

                    let words0 = _mm256_srai_epi16(
                        _mm256_packs_epi32(in0, in1),
                        WEIGHT_SCALE_BITS as i32,
                    );
                    let words1 = _mm256_srai_epi16(
                        _mm256_packs_epi32(in2, in3),
                        WEIGHT_SCALE_BITS as i32,
                    );

                    let bytes = _mm256_max_epi8(_mm256_packs_epi16(words0, words1), zero);
                    let result = _mm256_permutevar8x32_epi32(bytes, offsets);

                    _mm256_storeu_si256(out_ptr.add(i), result);
                }
            }
            processed = num_chunks * 32;
        }

        #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
        {
            processed = 0;
        }

        for i in processed..DIM {
            let shifted = input[i] >> WEIGHT_SCALE_BITS;
            output[i] = shifted.clamp(0, 127) as u8;
        }
    }
}

/// SqrClippedReLU層
///
/// 入力: i32、出力: u8。入力の二乗を `127 * 2^(2*WEIGHT_SCALE_BITS)`
/// でスケールし、0-127 にクランプする。小さい活性を押しつぶすことで
/// 第2層入力の疎性を高める。
pub struct SqrClippedReLU<const DIM: usize>;

impl<const DIM: usize> SqrClippedReLU<DIM> {
    /// この層までのハッシュ
    pub const fn hash(prev: u32) -> u32 {
        relu_hash(prev)
    }

    /// 順伝播
    ///
    /// 二乗が i32 を超えうるので i64 で計算する。次元が小さいためスカラーのみ。
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        debug_assert_eq!(input.len(), DIM);
        debug_assert_eq!(output.len(), DIM);

        for (out, &x) in output.iter_mut().zip(input) {
            let sq = (x as i64 * x as i64) >> (2 * WEIGHT_SCALE_BITS + 7);
            *out = sq.min(127) as u8;
        }
    }
}
