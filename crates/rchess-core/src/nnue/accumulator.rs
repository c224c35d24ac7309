//! アキュムレータスタックと差分更新エンジン
//!
//! 探索木の各ノードに第1層の累積値（アキュムレータ）を持ち、
//! 1手ごとの特徴量の増減だけを適用して評価を進める。
//! 計算済みの祖先が見つからない・更新コストが見合わないときは
//! キャッシュ経由の全計算に切り替え、途中のノードへは逆向きの
//! 差分適用で埋め戻す。

use crate::position::{DirtyPiece, DirtyThreats, Position};
use crate::types::{Color, Piece, PieceType, Square};

use super::aligned::Aligned;
use super::cache::AccumulatorCache;
use super::constants::{BIG_L1, GAIN_BASE, PSQT_BUCKETS, SMALL_L1};
use super::features::{FeatureSet, FullThreats, HalfKAv2Hm, IndexList};

/// 第1層の累積値（両視点分）
#[derive(Clone)]
pub struct Accumulator<const L1: usize> {
    pub accumulation: Aligned<[[i16; L1]; 2]>,
    pub psqt_accumulation: Aligned<[[i32; PSQT_BUCKETS]; 2]>,
    pub computed: [bool; 2],
}

impl<const L1: usize> Accumulator<L1> {
    pub fn new() -> Accumulator<L1> {
        Accumulator {
            accumulation: Aligned([[0; L1]; 2]),
            psqt_accumulation: Aligned([[0; PSQT_BUCKETS]; 2]),
            computed: [false; 2],
        }
    }
}

impl<const L1: usize> Default for Accumulator<L1> {
    fn default() -> Accumulator<L1> {
        Accumulator::new()
    }
}

/// 1ノード分のアキュムレータ一式と差分情報
#[derive(Clone)]
pub struct AccumulatorState {
    pub big: Accumulator<BIG_L1>,
    pub small: Accumulator<SMALL_L1>,
    pub threats: Accumulator<BIG_L1>,
    pub dirty_piece: DirtyPiece,
    pub dirty_threats: DirtyThreats,
}

impl AccumulatorState {
    fn new() -> AccumulatorState {
        AccumulatorState {
            big: Accumulator::new(),
            small: Accumulator::new(),
            threats: Accumulator::new(),
            dirty_piece: DirtyPiece::empty(),
            dirty_threats: DirtyThreats::empty(),
        }
    }

    fn reset(&mut self, dp: DirtyPiece, dts: DirtyThreats) {
        self.dirty_piece = dp;
        self.dirty_threats = dts;
        self.big.computed = [false; 2];
        self.small.computed = [false; 2];
        self.threats.computed = [false; 2];
    }
}

/// 第1層パラメータへの参照
///
/// `biases` が `None` の系統（利き特徴量）はゼロから累積する。
pub struct FtSlices<'a> {
    pub biases: Option<&'a [i16]>,
    /// 特徴量 × L1 の列優先重み
    pub weights: &'a [i16],
    /// 特徴量 × PSQT_BUCKETS の重み
    pub psqt_weights: &'a [i32],
}

/// AccumulatorState から1系統分のアキュムレータを選ぶ射影
pub trait AccView<const L1: usize> {
    /// この系統の特徴量
    type Set: FeatureSet;

    /// 差分更新1段のコスト見積もり
    fn cost(state: &AccumulatorState) -> i32;
    fn acc(state: &AccumulatorState) -> &Accumulator<L1>;
    fn acc_mut(state: &mut AccumulatorState) -> &mut Accumulator<L1>;
}

/// 大ネットワークの駒位置系統
pub struct BigPsqView;

impl AccView<BIG_L1> for BigPsqView {
    type Set = HalfKAv2Hm;

    #[inline]
    fn cost(state: &AccumulatorState) -> i32 {
        state.dirty_piece.len as i32 + 1
    }

    #[inline]
    fn acc(state: &AccumulatorState) -> &Accumulator<BIG_L1> {
        &state.big
    }

    #[inline]
    fn acc_mut(state: &mut AccumulatorState) -> &mut Accumulator<BIG_L1> {
        &mut state.big
    }
}

/// 小ネットワークの駒位置系統
pub struct SmallPsqView;

impl AccView<SMALL_L1> for SmallPsqView {
    type Set = HalfKAv2Hm;

    #[inline]
    fn cost(state: &AccumulatorState) -> i32 {
        state.dirty_piece.len as i32 + 1
    }

    #[inline]
    fn acc(state: &AccumulatorState) -> &Accumulator<SMALL_L1> {
        &state.small
    }

    #[inline]
    fn acc_mut(state: &mut AccumulatorState) -> &mut Accumulator<SMALL_L1> {
        &mut state.small
    }
}

/// 大ネットワークの利き系統
pub struct ThreatView;

impl AccView<BIG_L1> for ThreatView {
    type Set = FullThreats;

    #[inline]
    fn cost(state: &AccumulatorState) -> i32 {
        state.dirty_threats.len as i32 + 1
    }

    #[inline]
    fn acc(state: &AccumulatorState) -> &Accumulator<BIG_L1> {
        &state.threats
    }

    #[inline]
    fn acc_mut(state: &mut AccumulatorState) -> &mut Accumulator<BIG_L1> {
        &mut state.threats
    }
}

#[inline]
fn weight_column<const L1: usize>(weights: &[i16], index: u32) -> &[i16] {
    &weights[index as usize * L1..][..L1]
}

#[inline]
fn psqt_column(psqt_weights: &[i32], index: u32) -> &[i32] {
    &psqt_weights[index as usize * PSQT_BUCKETS..][..PSQT_BUCKETS]
}

/// src に added/removed の列を適用して dst を作る
///
/// 1手分の増減（高々2件ずつ）は1パスで処理し、それ以上
/// （利き系統の差分）はコピーしてから逐次適用する。
fn apply_delta<const L1: usize>(
    ft: &FtSlices<'_>,
    src_acc: &[i16; L1],
    src_psqt: &[i32; PSQT_BUCKETS],
    dst_acc: &mut [i16; L1],
    dst_psqt: &mut [i32; PSQT_BUCKETS],
    added: &[u32],
    removed: &[u32],
) {
    match (removed, added) {
        ([], []) => {
            dst_acc.copy_from_slice(src_acc);
            dst_psqt.copy_from_slice(src_psqt);
        }
        (&[r0], &[a0]) => {
            let cr0 = weight_column::<L1>(ft.weights, r0);
            let ca0 = weight_column::<L1>(ft.weights, a0);
            for i in 0..L1 {
                dst_acc[i] = src_acc[i] - cr0[i] + ca0[i];
            }
            let pr0 = psqt_column(ft.psqt_weights, r0);
            let pa0 = psqt_column(ft.psqt_weights, a0);
            for i in 0..PSQT_BUCKETS {
                dst_psqt[i] = src_psqt[i] - pr0[i] + pa0[i];
            }
        }
        (&[r0, r1], &[a0]) => {
            let cr0 = weight_column::<L1>(ft.weights, r0);
            let cr1 = weight_column::<L1>(ft.weights, r1);
            let ca0 = weight_column::<L1>(ft.weights, a0);
            for i in 0..L1 {
                dst_acc[i] = src_acc[i] + ca0[i] - (cr0[i] + cr1[i]);
            }
            let pr0 = psqt_column(ft.psqt_weights, r0);
            let pr1 = psqt_column(ft.psqt_weights, r1);
            let pa0 = psqt_column(ft.psqt_weights, a0);
            for i in 0..PSQT_BUCKETS {
                dst_psqt[i] = src_psqt[i] + pa0[i] - (pr0[i] + pr1[i]);
            }
        }
        (&[r0], &[a0, a1]) => {
            let cr0 = weight_column::<L1>(ft.weights, r0);
            let ca0 = weight_column::<L1>(ft.weights, a0);
            let ca1 = weight_column::<L1>(ft.weights, a1);
            for i in 0..L1 {
                dst_acc[i] = src_acc[i] + ca0[i] + (ca1[i] - cr0[i]);
            }
            let pr0 = psqt_column(ft.psqt_weights, r0);
            let pa0 = psqt_column(ft.psqt_weights, a0);
            let pa1 = psqt_column(ft.psqt_weights, a1);
            for i in 0..PSQT_BUCKETS {
                dst_psqt[i] = src_psqt[i] + pa0[i] + (pa1[i] - pr0[i]);
            }
        }
        (&[r0, r1], &[a0, a1]) => {
            let cr0 = weight_column::<L1>(ft.weights, r0);
            let cr1 = weight_column::<L1>(ft.weights, r1);
            let ca0 = weight_column::<L1>(ft.weights, a0);
            let ca1 = weight_column::<L1>(ft.weights, a1);
            for i in 0..L1 {
                dst_acc[i] = src_acc[i] + (ca0[i] + ca1[i]) - (cr0[i] + cr1[i]);
            }
            let pr0 = psqt_column(ft.psqt_weights, r0);
            let pr1 = psqt_column(ft.psqt_weights, r1);
            let pa0 = psqt_column(ft.psqt_weights, a0);
            let pa1 = psqt_column(ft.psqt_weights, a1);
            for i in 0..PSQT_BUCKETS {
                dst_psqt[i] = src_psqt[i] + (pa0[i] + pa1[i]) - (pr0[i] + pr1[i]);
            }
        }
        _ => {
            dst_acc.copy_from_slice(src_acc);
            dst_psqt.copy_from_slice(src_psqt);
            for &r in removed {
                let col = weight_column::<L1>(ft.weights, r);
                for i in 0..L1 {
                    dst_acc[i] -= col[i];
                }
                let pcol = psqt_column(ft.psqt_weights, r);
                for i in 0..PSQT_BUCKETS {
                    dst_psqt[i] -= pcol[i];
                }
            }
            for &a in added {
                let col = weight_column::<L1>(ft.weights, a);
                for i in 0..L1 {
                    dst_acc[i] += col[i];
                }
                let pcol = psqt_column(ft.psqt_weights, a);
                for i in 0..PSQT_BUCKETS {
                    dst_psqt[i] += pcol[i];
                }
            }
        }
    }
}

/// 計算済み状態から1手分の差分で隣の状態を計算する
fn update_incremental<V: AccView<L1>, const L1: usize>(
    ft: &FtSlices<'_>,
    king_sq: Square,
    perspective: Color,
    forward: bool,
    computed_state: &AccumulatorState,
    target_state: &mut AccumulatorState,
) {
    let p = perspective.index();
    debug_assert!(V::acc(computed_state).computed[p]);
    debug_assert!(!V::acc(target_state).computed[p]);

    let mut added = IndexList::new();
    let mut removed = IndexList::new();
    {
        // 前進時は移動先の差分、後退時は計算済み側の差分を逆向きに使う
        let dirty_state: &AccumulatorState = if forward { target_state } else { computed_state };
        let (add_list, rem_list) = if forward {
            (&mut added, &mut removed)
        } else {
            (&mut removed, &mut added)
        };
        V::Set::append_changed_indices(
            perspective,
            king_sq,
            &dirty_state.dirty_piece,
            &dirty_state.dirty_threats,
            add_list,
            rem_list,
        );
    }

    let src = V::acc(computed_state);
    let src_acc = &src.accumulation[p];
    let src_psqt = &src.psqt_accumulation[p];
    let dst = V::acc_mut(target_state);
    apply_delta::<L1>(
        ft,
        src_acc,
        src_psqt,
        &mut dst.accumulation[p],
        &mut dst.psqt_accumulation[p],
        added.as_slice(),
        removed.as_slice(),
    );
    dst.computed[p] = true;
}

/// アキュムレータスタック
///
/// 要素0がルート局面で、`push` / `pop` が `do_move` / `undo_move` に
/// 対応する。確保済み要素は再利用する。
pub struct AccumulatorStack {
    states: Vec<AccumulatorState>,
    size: usize,
}

impl AccumulatorStack {
    pub fn new() -> AccumulatorStack {
        AccumulatorStack { states: vec![AccumulatorState::new()], size: 1 }
    }

    /// ルートだけ残して全て未計算に戻す
    pub fn reset(&mut self) {
        self.size = 1;
        self.states[0].reset(DirtyPiece::empty(), DirtyThreats::empty());
    }

    /// 1手分の差分を積む
    pub fn push(&mut self, dp: DirtyPiece, dts: DirtyThreats) {
        if self.size == self.states.len() {
            self.states.push(AccumulatorState::new());
        }
        self.states[self.size].reset(dp, dts);
        self.size += 1;
    }

    /// 1手分戻す
    pub fn pop(&mut self) {
        debug_assert!(self.size > 1);
        self.size -= 1;
    }

    /// 現在のノード
    #[inline]
    pub fn top(&self) -> &AccumulatorState {
        &self.states[self.size - 1]
    }

    /// 積まれているノード数（ルート込みで常に1以上）
    #[inline]
    pub fn depth(&self) -> usize {
        self.size
    }

    /// 1系統のアキュムレータを両視点とも現在ノードまで計算する
    pub fn evaluate_view<V: AccView<L1>, const L1: usize>(
        &mut self,
        pos: &Position,
        ft: &FtSlices<'_>,
        mut cache: Option<&mut AccumulatorCache<L1>>,
    ) {
        self.evaluate_side::<V, L1>(pos, Color::White, ft, cache.as_deref_mut());
        self.evaluate_side::<V, L1>(pos, Color::Black, ft, cache);
    }

    fn evaluate_side<V: AccView<L1>, const L1: usize>(
        &mut self,
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
        cache: Option<&mut AccumulatorCache<L1>>,
    ) {
        let last_usable = self.find_last_usable::<V, L1>(pos, perspective);
        if V::acc(&self.states[last_usable]).computed[perspective.index()] {
            self.forward_update::<V, L1>(pos, perspective, ft, last_usable);
        } else {
            self.refresh_top::<V, L1>(pos, perspective, ft, cache);
            self.backward_update::<V, L1>(pos, perspective, ft, last_usable);
        }
        debug_assert!(V::acc(self.top()).computed[perspective.index()]);
    }

    /// 差分更新の起点にできる最も近い祖先を探す
    ///
    /// 計算済みノード・全計算が必要な手・コスト見積もりの打ち切りの
    /// いずれかで止まる。
    fn find_last_usable<V: AccView<L1>, const L1: usize>(
        &self,
        pos: &Position,
        perspective: Color,
    ) -> usize {
        let mut gain = pos.piece_count() as i32 - GAIN_BASE as i32;
        let mut idx = self.size - 1;
        while idx > 0 {
            let state = &self.states[idx];
            if V::acc(state).computed[perspective.index()] {
                return idx;
            }
            if V::Set::requires_refresh(&state.dirty_piece, &state.dirty_threats, perspective) {
                return idx;
            }
            gain -= V::cost(state);
            if gain < 0 {
                return idx;
            }
            idx -= 1;
        }
        0
    }

    fn forward_update<V: AccView<L1>, const L1: usize>(
        &mut self,
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
        begin: usize,
    ) {
        let king_sq = pos.king_square(perspective);
        for idx in begin + 1..self.size {
            let (lo, hi) = self.states.split_at_mut(idx);
            update_incremental::<V, L1>(ft, king_sq, perspective, true, &lo[idx - 1], &mut hi[0]);
            #[cfg(feature = "nnue-stats")]
            super::stats::record_forward_update();
        }
    }

    fn backward_update<V: AccView<L1>, const L1: usize>(
        &mut self,
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
        end: usize,
    ) {
        let king_sq = pos.king_square(perspective);
        for idx in (end..self.size.saturating_sub(1)).rev() {
            let (lo, hi) = self.states.split_at_mut(idx + 1);
            update_incremental::<V, L1>(ft, king_sq, perspective, false, &hi[0], &mut lo[idx]);
            #[cfg(feature = "nnue-stats")]
            super::stats::record_backward_update();
        }
    }

    /// 現在ノードを全計算する
    ///
    /// 駒位置系統はキャッシュ経由の差分適用、利き系統（cache = None）は
    /// ゼロからの累積。
    fn refresh_top<V: AccView<L1>, const L1: usize>(
        &mut self,
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
        cache: Option<&mut AccumulatorCache<L1>>,
    ) {
        #[cfg(feature = "nnue-stats")]
        super::stats::record_refresh();

        let p = perspective.index();
        let acc = V::acc_mut(&mut self.states[self.size - 1]);
        match cache {
            Some(cache) => refresh_with_cache::<L1>(pos, perspective, ft, acc, cache),
            None => {
                let (dst_acc, dst_psqt) =
                    (&mut acc.accumulation[p], &mut acc.psqt_accumulation[p]);
                match ft.biases {
                    Some(biases) => dst_acc.copy_from_slice(biases),
                    None => dst_acc.fill(0),
                }
                dst_psqt.fill(0);
                let mut active = IndexList::new();
                V::Set::append_active_indices(pos, perspective, &mut active);
                for &index in active.as_slice() {
                    let col = weight_column::<L1>(ft.weights, index);
                    for i in 0..L1 {
                        dst_acc[i] += col[i];
                    }
                    let pcol = psqt_column(ft.psqt_weights, index);
                    for i in 0..PSQT_BUCKETS {
                        dst_psqt[i] += pcol[i];
                    }
                }
                acc.computed[p] = true;
            }
        }
    }
}

impl Default for AccumulatorStack {
    fn default() -> AccumulatorStack {
        AccumulatorStack::new()
    }
}

/// キャッシュエントリとの占有差分で現在ノードを全計算する
fn refresh_with_cache<const L1: usize>(
    pos: &Position,
    perspective: Color,
    ft: &FtSlices<'_>,
    acc: &mut Accumulator<L1>,
    cache: &mut AccumulatorCache<L1>,
) {
    let p = perspective.index();
    let king_sq = pos.king_square(perspective);
    let entry = cache.entry_mut(king_sq, perspective);

    let mut added = IndexList::new();
    let mut removed = IndexList::new();
    for c in [Color::White, Color::Black] {
        for pt in PieceType::ALL {
            let pc = Piece::new(c, pt);
            let old_bb = entry.by_color_bb[c.index()] & entry.by_type_bb[pt.index()];
            let new_bb = pos.pieces(c, pt);
            for s in old_bb & !new_bb {
                removed.push(HalfKAv2Hm::make_index(perspective, s, pc, king_sq));
            }
            for s in new_bb & !old_bb {
                added.push(HalfKAv2Hm::make_index(perspective, s, pc, king_sq));
            }
        }
    }

    for &r in removed.as_slice() {
        let col = weight_column::<L1>(ft.weights, r);
        for i in 0..L1 {
            entry.accumulation[i] -= col[i];
        }
        let pcol = psqt_column(ft.psqt_weights, r);
        for i in 0..PSQT_BUCKETS {
            entry.psqt_accumulation[i] -= pcol[i];
        }
    }
    for &a in added.as_slice() {
        let col = weight_column::<L1>(ft.weights, a);
        for i in 0..L1 {
            entry.accumulation[i] += col[i];
        }
        let pcol = psqt_column(ft.psqt_weights, a);
        for i in 0..PSQT_BUCKETS {
            entry.psqt_accumulation[i] += pcol[i];
        }
    }

    acc.accumulation[p].copy_from_slice(&entry.accumulation.0);
    acc.psqt_accumulation[p].copy_from_slice(&entry.psqt_accumulation.0);
    acc.computed[p] = true;

    for c in [Color::White, Color::Black] {
        entry.by_color_bb[c.index()] = pos.pieces_of_color(c);
    }
    for pt in PieceType::ALL {
        entry.by_type_bb[pt.index()] = pos.pieces_of_type(pt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Move;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    const TEST_L1: usize = SMALL_L1;

    struct TestFt {
        biases: Vec<i16>,
        weights: Vec<i16>,
        psqt_weights: Vec<i32>,
    }

    impl TestFt {
        fn random(dims: usize, seed: u64) -> TestFt {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            TestFt {
                biases: (0..TEST_L1).map(|_| rng.random_range(-64..64)).collect(),
                weights: (0..dims * TEST_L1).map(|_| rng.random_range(-64..64)).collect(),
                psqt_weights: (0..dims * PSQT_BUCKETS)
                    .map(|_| rng.random_range(-1000..1000))
                    .collect(),
            }
        }

        fn slices(&self) -> FtSlices<'_> {
            FtSlices {
                biases: Some(&self.biases),
                weights: &self.weights,
                psqt_weights: &self.psqt_weights,
            }
        }
    }

    /// 全計算の期待値をその場で求める
    fn expected_accumulator(
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
    ) -> (Vec<i16>, Vec<i32>) {
        let mut acc: Vec<i16> = match ft.biases {
            Some(b) => b.to_vec(),
            None => vec![0; TEST_L1],
        };
        let mut psqt = vec![0i32; PSQT_BUCKETS];
        let mut active = IndexList::new();
        HalfKAv2Hm::append_active_indices(pos, perspective, &mut active);
        for &index in active.as_slice() {
            for i in 0..TEST_L1 {
                acc[i] += ft.weights[index as usize * TEST_L1 + i];
            }
            for i in 0..PSQT_BUCKETS {
                psqt[i] += ft.psqt_weights[index as usize * PSQT_BUCKETS + i];
            }
        }
        (acc, psqt)
    }

    fn check_top_matches(
        stack: &AccumulatorStack,
        pos: &Position,
        ft: &FtSlices<'_>,
    ) {
        for persp in [Color::White, Color::Black] {
            let p = persp.index();
            let acc = &stack.top().small;
            assert!(acc.computed[p]);
            let (exp_acc, exp_psqt) = expected_accumulator(pos, persp, ft);
            assert_eq!(&acc.accumulation[p][..], &exp_acc[..]);
            assert_eq!(&acc.psqt_accumulation[p][..], &exp_psqt[..]);
        }
    }

    #[test]
    fn test_refresh_matches_full_recompute() {
        let ft = TestFt::random(HalfKAv2Hm::DIMENSIONS, 0xACC0);
        let slices = ft.slices();
        let pos = Position::startpos();
        let mut stack = AccumulatorStack::new();
        let mut cache: AccumulatorCache<TEST_L1> = AccumulatorCache::new(&ft.biases);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
        check_top_matches(&stack, &pos, &slices);
    }

    #[test]
    fn test_incremental_matches_refresh_over_moves() {
        let ft = TestFt::random(HalfKAv2Hm::DIMENSIONS, 0xACC1);
        let slices = ft.slices();
        let mut pos = Position::startpos();
        let mut stack = AccumulatorStack::new();
        let mut cache: AccumulatorCache<TEST_L1> = AccumulatorCache::new(&ft.biases);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));

        let sq = |s: &str| Square::from_str_coord(s).unwrap();
        let moves = [
            Move::new(sq("e2"), sq("e4")),
            Move::new(sq("e7"), sq("e5")),
            Move::new(sq("g1"), sq("f3")),
            Move::new(sq("b8"), sq("c6")),
            Move::new(sq("f1"), sq("b5")),
            Move::new(sq("g8"), sq("f6")),
            Move::castling(Square::E1, Square::G1),
            Move::new(sq("f6"), sq("e4")),
        ];
        for m in moves {
            let (dp, dts) = pos.do_move(m);
            stack.push(dp, dts);
            stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
            check_top_matches(&stack, &pos, &slices);
        }
        // 巻き戻しでも祖先は計算済みのまま一致する
        for _ in 0..moves.len() {
            pos.undo_move();
            stack.pop();
            stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
            check_top_matches(&stack, &pos, &slices);
        }
    }

    #[test]
    fn test_push_without_evaluate_then_deep_catchup() {
        // 数手まとめて進めてから評価しても、前進更新で追いつける
        let ft = TestFt::random(HalfKAv2Hm::DIMENSIONS, 0xACC2);
        let slices = ft.slices();
        let mut pos = Position::startpos();
        let mut stack = AccumulatorStack::new();
        let mut cache: AccumulatorCache<TEST_L1> = AccumulatorCache::new(&ft.biases);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));

        let sq = |s: &str| Square::from_str_coord(s).unwrap();
        for m in [
            Move::new(sq("d2"), sq("d4")),
            Move::new(sq("d7"), sq("d5")),
            Move::new(sq("c2"), sq("c4")),
            Move::new(sq("d5"), sq("c4")),
        ] {
            let (dp, dts) = pos.do_move(m);
            stack.push(dp, dts);
        }
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
        check_top_matches(&stack, &pos, &slices);
    }

    #[test]
    fn test_king_move_triggers_refresh_path() {
        let ft = TestFt::random(HalfKAv2Hm::DIMENSIONS, 0xACC3);
        let slices = ft.slices();
        let mut pos = Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1")
            .unwrap();
        let mut stack = AccumulatorStack::new();
        let mut cache: AccumulatorCache<TEST_L1> = AccumulatorCache::new(&ft.biases);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));

        let (dp, dts) = pos.do_move(Move::castling(Square::E1, Square::G1));
        stack.push(dp, dts);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
        check_top_matches(&stack, &pos, &slices);

        let sq = |s: &str| Square::from_str_coord(s).unwrap();
        let (dp, dts) = pos.do_move(Move::new(sq("e7"), sq("e5")));
        stack.push(dp, dts);
        stack.evaluate_view::<SmallPsqView, TEST_L1>(&pos, &slices, Some(&mut cache));
        check_top_matches(&stack, &pos, &slices);
    }

    struct ThreatTestFt {
        weights: Vec<i16>,
        psqt_weights: Vec<i32>,
    }

    impl ThreatTestFt {
        fn random(seed: u64) -> ThreatTestFt {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            ThreatTestFt {
                weights: (0..FullThreats::DIMENSIONS * BIG_L1)
                    .map(|_| rng.random_range(-8..8))
                    .collect(),
                psqt_weights: (0..FullThreats::DIMENSIONS * PSQT_BUCKETS)
                    .map(|_| rng.random_range(-500..500))
                    .collect(),
            }
        }

        fn slices(&self) -> FtSlices<'_> {
            FtSlices { biases: None, weights: &self.weights, psqt_weights: &self.psqt_weights }
        }
    }

    /// 利き系統の全計算の期待値をその場で求める
    fn expected_threat_accumulator(
        pos: &Position,
        perspective: Color,
        ft: &FtSlices<'_>,
    ) -> (Vec<i16>, Vec<i32>) {
        let mut acc = vec![0i16; BIG_L1];
        let mut psqt = vec![0i32; PSQT_BUCKETS];
        let mut active = IndexList::new();
        FullThreats::append_active_indices(pos, perspective, &mut active);
        for &index in active.as_slice() {
            for i in 0..BIG_L1 {
                acc[i] += ft.weights[index as usize * BIG_L1 + i];
            }
            for i in 0..PSQT_BUCKETS {
                psqt[i] += ft.psqt_weights[index as usize * PSQT_BUCKETS + i];
            }
        }
        (acc, psqt)
    }

    fn check_threat_top_matches(
        stack: &AccumulatorStack,
        pos: &Position,
        ft: &FtSlices<'_>,
    ) {
        for persp in [Color::White, Color::Black] {
            let p = persp.index();
            let acc = &stack.top().threats;
            assert!(acc.computed[p]);
            let (exp_acc, exp_psqt) = expected_threat_accumulator(pos, persp, ft);
            assert_eq!(&acc.accumulation[p][..], &exp_acc[..]);
            assert_eq!(&acc.psqt_accumulation[p][..], &exp_psqt[..]);
        }
    }

    #[test]
    fn test_threat_incremental_matches_recompute() {
        let ft = ThreatTestFt::random(0xACC4);
        let slices = ft.slices();
        let mut pos =
            Position::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();
        let mut stack = AccumulatorStack::new();
        stack.evaluate_view::<ThreatView, BIG_L1>(&pos, &slices, None);
        check_threat_top_matches(&stack, &pos, &slices);

        // e2-d3 / e7-d6 で両玉が筋半面をまたぎ、全計算経路に入る
        let sq = |s: &str| Square::from_str_coord(s).unwrap();
        let moves = [
            Move::new(sq("e2"), sq("e4")),
            Move::new(sq("e7"), sq("e5")),
            Move::new(sq("e1"), sq("e2")),
            Move::new(sq("e8"), sq("e7")),
            Move::new(sq("e2"), sq("d3")),
            Move::new(sq("e7"), sq("d6")),
        ];
        for m in moves {
            let (dp, dts) = pos.do_move(m);
            stack.push(dp, dts);
            stack.evaluate_view::<ThreatView, BIG_L1>(&pos, &slices, None);
            check_threat_top_matches(&stack, &pos, &slices);
        }

        // 巻き戻しでも一致する
        for _ in 0..moves.len() {
            pos.undo_move();
            stack.pop();
            stack.evaluate_view::<ThreatView, BIG_L1>(&pos, &slices, None);
            check_threat_top_matches(&stack, &pos, &slices);
        }

        // 数手まとめて進めてから評価すると、筋半面またぎの全計算と
        // そこからの埋め戻しを経由して追いつく
        for m in moves {
            let (dp, dts) = pos.do_move(m);
            stack.push(dp, dts);
        }
        stack.evaluate_view::<ThreatView, BIG_L1>(&pos, &slices, None);
        check_threat_top_matches(&stack, &pos, &slices);
    }

    #[test]
    fn test_stack_push_pop_size() {
        let mut stack = AccumulatorStack::new();
        assert_eq!(stack.depth(), 1);
        stack.push(DirtyPiece::empty(), DirtyThreats::empty());
        assert_eq!(stack.depth(), 2);
        stack.pop();
        assert_eq!(stack.depth(), 1);
        stack.reset();
        assert_eq!(stack.depth(), 1);
        assert!(!stack.top().small.computed[0]);
    }
}
