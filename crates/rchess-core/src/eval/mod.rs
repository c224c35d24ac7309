//! 評価関数の入口
//!
//! 駒割りの簡易評価で大小どちらのネットワークを使うか選び、
//! PSQT項と位置項をブレンドして最終評価値を作る。

use crate::nnue::{AccumulatorCaches, AccumulatorStack, NetworkOutput, Networks};
use crate::position::Position;
use crate::types::Value;

/// 簡易評価の絶対値がこれを超える局面は小ネットワークで済ませる
const SMALL_NET_THRESHOLD: i32 = 962;

/// 小ネットワークの出力がこの範囲に入ったら大ネットワークで再評価する
const RE_EVAL_THRESHOLD: i32 = 277;

#[inline]
fn use_small_net(pos: &Position) -> bool {
    pos.simple_eval().abs() > SMALL_NET_THRESHOLD
}

/// PSQT項と位置項のブレンド
#[inline]
fn blend(out: NetworkOutput) -> i32 {
    (125 * out.psqt.raw() + 131 * out.positional.raw()) / 128
}

/// 手番側から見た評価値を計算する
///
/// 駒割りの差が大きい局面はまず小ネットワークで評価し、
/// 出力が拮抗していたときだけ大ネットワークで評価し直す。
/// 戻り値は詰みスコアと重ならない範囲にクランプされる。
pub fn evaluate(
    pos: &Position,
    networks: &Networks,
    stack: &mut AccumulatorStack,
    caches: &mut AccumulatorCaches,
) -> Value {
    let small_net = use_small_net(pos);

    let mut nnue = if small_net {
        blend(networks.small.evaluate(pos, stack, &mut caches.small))
    } else {
        blend(networks.big.evaluate(pos, stack, &mut caches.big))
    };

    // 小ネットワークの判定が拮抗しているときは大ネットワークに差し戻す
    if small_net && nnue.abs() < RE_EVAL_THRESHOLD {
        nnue = blend(networks.big.evaluate(pos, stack, &mut caches.big));
    }

    Value::new(nnue).clamp_eval()
}
