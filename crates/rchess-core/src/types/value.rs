//! 評価値（Value）
//!
//! NNUE の内部スケールをそのまま持つ整数評価値。
//! `Value::MATE` 付近は詰みスコアとして予約し、通常の評価値は
//! [-MATE_IN_MAX_PLY, MATE_IN_MAX_PLY] の範囲で用いる。

/// 評価値
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Value(i32);

impl Value {
    /// ゼロ
    pub const ZERO: Value = Value(0);
    /// 引き分け
    pub const DRAW: Value = Value(0);
    /// 詰み（勝ち側の最大スコア）
    pub const MATE: Value = Value(32000);
    /// 無限大
    pub const INFINITE: Value = Value(32001);
    /// 無効値
    pub const NONE: Value = Value(32002);

    /// 最大探索深度内での詰みスコア
    pub const MATE_IN_MAX_PLY: Value = Value(Self::MATE.0 - 128);
    /// 最大探索深度内での詰まされスコア
    pub const MATED_IN_MAX_PLY: Value = Value(-Self::MATE_IN_MAX_PLY.0);

    /// 歩の内部評価値
    ///
    /// UCI `score cp` 出力時に `100 * value / PAWN_VALUE` で正規化するために使用。
    pub const PAWN_VALUE: i32 = 208;

    /// 値から生成
    #[inline]
    pub const fn new(v: i32) -> Value {
        Value(v)
    }

    /// ply手で詰ますスコア
    #[inline]
    pub const fn mate_in(ply: i32) -> Value {
        Value(Self::MATE.0 - ply)
    }

    /// ply手で詰まされるスコア
    #[inline]
    pub const fn mated_in(ply: i32) -> Value {
        Value(-Self::MATE.0 + ply)
    }

    /// 勝ちスコアかどうか
    #[inline]
    pub const fn is_win(self) -> bool {
        self.0 >= Self::MATE_IN_MAX_PLY.0
    }

    /// 負けスコアかどうか
    #[inline]
    pub const fn is_loss(self) -> bool {
        self.0 <= Self::MATED_IN_MAX_PLY.0
    }

    /// 詰みスコア（勝ちまたは負け）かどうか
    #[inline]
    pub const fn is_mate_score(self) -> bool {
        self.is_win() || self.is_loss()
    }

    /// 生の値を取得
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// 通常評価値の範囲にクランプ
    #[inline]
    pub fn clamp_eval(self) -> Value {
        Value(self.0.clamp(
            Self::MATED_IN_MAX_PLY.0 + 1,
            Self::MATE_IN_MAX_PLY.0 - 1,
        ))
    }

    /// 内部値を UCI centipawn 値に変換
    #[inline]
    pub const fn to_cp(self) -> i32 {
        if self.0.abs() >= Self::MATE_IN_MAX_PLY.0 {
            self.0
        } else {
            100 * self.0 / Self::PAWN_VALUE
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::ZERO
    }
}

impl std::ops::Neg for Value {
    type Output = Value;

    #[inline]
    fn neg(self) -> Value {
        Value(-self.0)
    }
}

impl std::ops::Add for Value {
    type Output = Value;

    #[inline]
    fn add(self, rhs: Value) -> Value {
        Value(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Value {
    type Output = Value;

    #[inline]
    fn sub(self, rhs: Value) -> Value {
        Value(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Value {
    #[inline]
    fn add_assign(&mut self, rhs: Value) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Value {
    #[inline]
    fn sub_assign(&mut self, rhs: Value) {
        self.0 -= rhs.0;
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value(v)
    }
}

impl From<Value> for i32 {
    fn from(v: Value) -> i32 {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_constants() {
        assert_eq!(Value::ZERO.raw(), 0);
        assert_eq!(Value::MATE.raw(), 32000);
    }

    #[test]
    fn test_value_mate() {
        let v = Value::mate_in(5);
        assert!(v.is_win());
        assert!(v.is_mate_score());
        let v = Value::mated_in(3);
        assert!(v.is_loss());
        assert!(!Value::ZERO.is_mate_score());
    }

    #[test]
    fn test_value_clamp_eval() {
        assert_eq!(Value::new(100).clamp_eval(), Value::new(100));
        assert!(Value::MATE.clamp_eval() < Value::MATE_IN_MAX_PLY);
        assert!(Value::mated_in(0).clamp_eval() > Value::MATED_IN_MAX_PLY);
    }

    #[test]
    fn test_value_ops() {
        let a = Value::new(100);
        let b = Value::new(50);
        assert_eq!(a + b, Value::new(150));
        assert_eq!(a - b, Value::new(50));
        assert_eq!(-a, Value::new(-100));
    }
}
