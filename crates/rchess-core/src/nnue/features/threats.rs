//! 利き特徴量（FullThreats）
//!
//! 「ある駒が、ある升の駒に利きを当てている」という対を1特徴量とする。
//! インデックス空間は駒（12）ごとに、空盤での利き先の通し番号
//! （square_offsets + 利き先集合内の順位）を基底として、
//! 利きを受ける側の（相対手番 × 駒種マップ）でスロット分けする。
//! 視点の正規化は、黒視点の段反転と自玉の筋半面（a〜d / e〜h）による
//! 左右鏡映の XOR 合成で行う。
//!
//! 駒種対の一部は特徴量として持たない（除外対）。同駒種同士の対は
//! 向きの重複を避けるため、正規化後の「利き元 < 利き先」のときだけ採用する。

use std::sync::OnceLock;

use crate::bitboard::{attacks_bb, pawn_attacks, Bitboard};
use crate::position::{DirtyPiece, DirtyThreats, Position};
use crate::types::{Color, Piece, PieceType, Square};

use super::{FeatureSet, IndexList};

/// 利きを受ける側の駒種あたりのスロット数（手番2 × 有効マップ数）
const MAX_TARGETS: [u32; PieceType::NUM] = [6, 12, 10, 10, 12, 8];

/// (利き元駒種, 利き先駒種) → スロット番号。-1 は除外対
const MAP: [[i32; PieceType::NUM]; PieceType::NUM] = [
    [0, 1, -1, 2, -1, -1], // pawn
    [0, 1, 2, 3, 4, 5],    // knight
    [0, 1, 2, 3, -1, 4],   // bishop
    [0, 1, 2, 3, -1, 4],   // rook
    [0, 1, 2, 3, 4, 5],    // queen
    [0, 1, 2, 3, -1, -1],  // king
];

/// 駒ごとの静的テーブル
struct ThreatTables {
    /// 駒ごとの特徴量空間の開始オフセット
    base_offset: [u32; Piece::NUM],
    /// 駒ごとの空盤利き先の総数
    threat_count: [u32; Piece::NUM],
    /// 空盤での利き元ごとの通し番号の先頭
    square_offsets: [[u32; 64]; Piece::NUM],
    /// 空盤での利き集合（ポーンは段2〜7のみ）
    attacks: [[u64; 64]; Piece::NUM],
}

static TABLES: OnceLock<ThreatTables> = OnceLock::new();

fn empty_board_attacks(pc: Piece, sq: Square) -> Bitboard {
    match pc.piece_type() {
        PieceType::Pawn => {
            let r = sq.rank().index();
            if (1..=6).contains(&r) {
                pawn_attacks(pc.color(), sq)
            } else {
                Bitboard::EMPTY
            }
        }
        pt => attacks_bb(pt, sq, Bitboard::EMPTY),
    }
}

impl ThreatTables {
    fn instance() -> &'static ThreatTables {
        TABLES.get_or_init(|| {
            let mut t = ThreatTables {
                base_offset: [0; Piece::NUM],
                threat_count: [0; Piece::NUM],
                square_offsets: [[0; 64]; Piece::NUM],
                attacks: [[0; 64]; Piece::NUM],
            };
            let mut base = 0u32;
            for pc_idx in 0..Piece::NUM {
                let pc = Piece::from_index(pc_idx);
                t.base_offset[pc_idx] = base;
                let mut count = 0u32;
                for s in 0..64 {
                    t.square_offsets[pc_idx][s] = count;
                    let bb = empty_board_attacks(pc, Square::from_index(s));
                    t.attacks[pc_idx][s] = bb.0;
                    count += bb.count();
                }
                t.threat_count[pc_idx] = count;
                base += MAX_TARGETS[pc.piece_type().index()] * count;
            }
            debug_assert_eq!(base as usize, FullThreats::DIMENSIONS);
            t
        })
    }
}

/// 視点と玉位置から升の XOR 正規化値を求める（0 / 7 / 56 / 63）
#[inline]
fn orient_xor(perspective: Color, king_sq: Square) -> usize {
    let rank_flip = match perspective {
        Color::White => 0usize,
        Color::Black => 56,
    };
    let king_rel = king_sq.index() ^ rank_flip;
    let mirror = if king_rel & 7 >= 4 { 7usize } else { 0 };
    rank_flip ^ mirror
}

/// 玉の筋半面（a〜d = 0, e〜h = 1）
#[inline]
fn file_half(sq: Square) -> usize {
    (sq.index() & 7) >> 2
}

/// 利き特徴量
pub struct FullThreats;

impl FullThreats {
    /// 利き対1件の特徴量インデックスを計算する
    ///
    /// 除外対と、同駒種対の採用されない向きには `DIMENSIONS` を返す。
    /// 呼び出し側は `DIMENSIONS` 未満の値だけを使う。
    pub fn make_index(
        perspective: Color,
        attacker_sq: Square,
        attacked_sq: Square,
        attacker: Piece,
        attacked: Piece,
        king_sq: Square,
    ) -> u32 {
        let t = ThreatTables::instance();
        let xor = orient_xor(perspective, king_sq);
        let org = attacker_sq.index() ^ xor;
        let dst = attacked_sq.index() ^ xor;
        let atk = attacker.relative(perspective);
        let vic = attacked.relative(perspective);
        let apt = atk.piece_type();
        let vpt = vic.piece_type();

        let map = MAP[apt.index()][vpt.index()];
        if map < 0 {
            return Self::DIMENSIONS as u32;
        }
        // 同駒種対は正規化後の org < dst の向きだけ採用する
        // （同色ポーン同士は両向きとも有効なので除外しない）
        let semi = apt == vpt && (atk.color() != vic.color() || apt != PieceType::Pawn);
        if semi && org >= dst {
            return Self::DIMENSIONS as u32;
        }

        let ai = atk.index();
        let slot = vic.color().index() as u32 * (MAX_TARGETS[apt.index()] / 2) + map as u32;
        let within = t.square_offsets[ai][org]
            + (((1u64 << dst) - 1) & t.attacks[ai][org]).count_ones();
        t.base_offset[ai] + slot * t.threat_count[ai] + within
    }
}

impl FeatureSet for FullThreats {
    const DIMENSIONS: usize = 79856;
    const MAX_ACTIVE: usize = 128;
    const HASH: u32 = 0x8F23_4CB8;

    fn append_active_indices(pos: &Position, perspective: Color, out: &mut IndexList) {
        let king_sq = pos.king_square(perspective);
        let occ = pos.occupied();
        for sq in occ {
            if let Some(pc) = pos.piece_on(sq) {
                let targets = Position::attacks_from(pc, sq, occ) & occ;
                for t in targets {
                    if let Some(tp) = pos.piece_on(t) {
                        let idx = Self::make_index(perspective, sq, t, pc, tp, king_sq);
                        if (idx as usize) < Self::DIMENSIONS {
                            out.push(idx);
                        }
                    }
                }
            }
        }
    }

    fn append_changed_indices(
        perspective: Color,
        king_sq: Square,
        _dp: &DirtyPiece,
        dts: &DirtyThreats,
        added: &mut IndexList,
        removed: &mut IndexList,
    ) {
        for dt in dts.entries() {
            let idx = Self::make_index(
                perspective,
                dt.sq,
                dt.threatened_sq,
                dt.piece,
                dt.threatened_piece,
                king_sq,
            );
            if (idx as usize) < Self::DIMENSIONS {
                if dt.add {
                    added.push(idx);
                } else {
                    removed.push(idx);
                }
            }
        }
    }

    fn requires_refresh(_dp: &DirtyPiece, dts: &DirtyThreats, perspective: Color) -> bool {
        // 利き対のインデックスは玉の筋半面にしか依存しない
        dts.ac == perspective && file_half(dts.king_sq) != file_half(dts.pre_king_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Move;

    fn sq(s: &str) -> Square {
        Square::from_str_coord(s).unwrap()
    }

    #[test]
    fn test_total_dimensions() {
        let t = ThreatTables::instance();
        let total: u32 = (0..Piece::NUM)
            .map(|i| MAX_TARGETS[Piece::from_index(i).piece_type().index()] * t.threat_count[i])
            .sum();
        assert_eq!(total as usize, FullThreats::DIMENSIONS);
    }

    #[test]
    fn test_per_piece_counts() {
        let t = ThreatTables::instance();
        // 空盤での利き先総数（白側、黒側も同数）
        let expect = [84u32, 336, 560, 896, 1456, 420];
        for (pt_idx, &e) in expect.iter().enumerate() {
            let white = Piece::new(Color::White, PieceType::from_index(pt_idx));
            let black = Piece::new(Color::Black, PieceType::from_index(pt_idx));
            assert_eq!(t.threat_count[white.index()], e);
            assert_eq!(t.threat_count[black.index()], e);
        }
    }

    #[test]
    fn test_excluded_pairs() {
        // ポーン → ビショップ / クイーン / キングは除外対
        let wp = Piece::new(Color::White, PieceType::Pawn);
        for vic_pt in [PieceType::Bishop, PieceType::Queen, PieceType::King] {
            let vic = Piece::new(Color::Black, vic_pt);
            let idx = FullThreats::make_index(
                Color::White,
                sq("e4"),
                sq("d5"),
                wp,
                vic,
                Square::A1,
            );
            assert_eq!(idx as usize, FullThreats::DIMENSIONS);
        }
        // ポーン → ポーン / ナイト / ルークは有効
        for vic_pt in [PieceType::Knight, PieceType::Rook] {
            let vic = Piece::new(Color::Black, vic_pt);
            let idx = FullThreats::make_index(
                Color::White,
                sq("e4"),
                sq("d5"),
                wp,
                vic,
                Square::A1,
            );
            assert!((idx as usize) < FullThreats::DIMENSIONS);
        }
    }

    #[test]
    fn test_same_type_orientation() {
        // 敵ルーク同士の対は正規化後の一方向だけ採用される
        let wr = Piece::new(Color::White, PieceType::Rook);
        let br = Piece::new(Color::Black, PieceType::Rook);
        let a = FullThreats::make_index(Color::White, sq("a1"), sq("a8"), wr, br, Square::B1);
        let b = FullThreats::make_index(Color::White, sq("a8"), sq("a1"), br, wr, Square::B1);
        let kept = ((a as usize) < FullThreats::DIMENSIONS) as usize
            + ((b as usize) < FullThreats::DIMENSIONS) as usize;
        assert_eq!(kept, 1);
    }

    #[test]
    fn test_same_color_pawn_pair_kept_both_ways() {
        // 同色ポーンの相互防御は両向きとも有効
        let wp = Piece::new(Color::White, PieceType::Pawn);
        let a = FullThreats::make_index(Color::White, sq("e4"), sq("d5"), wp, wp, Square::B1);
        let c = FullThreats::make_index(Color::White, sq("d5"), sq("c6"), wp, wp, Square::B1);
        assert!((a as usize) < FullThreats::DIMENSIONS);
        assert!((c as usize) < FullThreats::DIMENSIONS);
    }

    #[test]
    fn test_index_bounds_random_pairs() {
        let t = ThreatTables::instance();
        for persp in [Color::White, Color::Black] {
            for ai in 0..Piece::NUM {
                let atk = Piece::from_index(ai);
                for org in 0..64 {
                    let targets = Bitboard(t.attacks[ai][org]);
                    for dst in targets {
                        for vi in 0..Piece::NUM {
                            let vic = Piece::from_index(vi);
                            let idx = FullThreats::make_index(
                                persp,
                                Square::from_index(org),
                                dst,
                                atk,
                                vic,
                                Square::E1,
                            );
                            assert!(idx as usize <= FullThreats::DIMENSIONS);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_startpos_active() {
        // 初期局面の利き対: 走り駒は全て塞がっており、ナイト・ポーン・
        // 玉・ルークの隣接対のみ
        let pos = Position::startpos();
        let mut w = IndexList::new();
        FullThreats::append_active_indices(&pos, Color::White, &mut w);
        assert!(w.len() > 0);
        assert!(w.len() <= FullThreats::MAX_ACTIVE);
        // 対称局面なので両視点の集合は一致する
        let mut b = IndexList::new();
        FullThreats::append_active_indices(&pos, Color::Black, &mut b);
        let mut ws: Vec<u32> = w.as_slice().to_vec();
        let mut bs: Vec<u32> = b.as_slice().to_vec();
        ws.sort_unstable();
        bs.sort_unstable();
        assert_eq!(ws, bs);
    }

    #[test]
    fn test_changed_matches_active_diff() {
        let mut pos = Position::startpos();
        let moves = [
            Move::new(sq("e2"), sq("e4")),
            Move::new(sq("d7"), sq("d5")),
            Move::new(sq("e4"), sq("d5")),
            Move::new(sq("g8"), sq("f6")),
        ];
        for m in moves {
            for persp in [Color::White, Color::Black] {
                let mut before = IndexList::new();
                FullThreats::append_active_indices(&pos, persp, &mut before);
                let (dp, dts) = pos.do_move(m);
                assert!(!FullThreats::requires_refresh(&dp, &dts, persp));
                let mut after = IndexList::new();
                FullThreats::append_active_indices(&pos, persp, &mut after);

                let mut added = IndexList::new();
                let mut removed = IndexList::new();
                FullThreats::append_changed_indices(
                    persp,
                    pos.king_square(persp),
                    &dp,
                    &dts,
                    &mut added,
                    &mut removed,
                );

                let mut expect: Vec<u32> = before.as_slice().to_vec();
                for &r in removed.as_slice() {
                    let p = expect.iter().position(|&x| x == r).unwrap();
                    expect.swap_remove(p);
                }
                expect.extend_from_slice(added.as_slice());
                expect.sort_unstable();
                let mut got: Vec<u32> = after.as_slice().to_vec();
                got.sort_unstable();
                assert_eq!(expect, got);
                pos.undo_move();
            }
            pos.do_move(m);
        }
    }

    #[test]
    fn test_requires_refresh_on_half_crossing() {
        // e1 → d1 は筋半面をまたぐ（e〜h → a〜d）
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let (dp, dts) = pos.do_move(Move::new(Square::E1, Square::D1));
        assert!(FullThreats::requires_refresh(&dp, &dts, Color::White));
        assert!(!FullThreats::requires_refresh(&dp, &dts, Color::Black));
        pos.undo_move();
        // e1 → f1 は同じ半面に留まる
        let (dp, dts) = pos.do_move(Move::new(Square::E1, Square::F1));
        assert!(!FullThreats::requires_refresh(&dp, &dts, Color::White));
    }
}
