//! Hand-crafted static evaluation: tapered material plus piece-square
//! tables, scored from the side to move's perspective.
//!
//! The search treats this as a black box; it is pure with respect to
//! the position and keeps no caches.

use chess::{Color, Piece, ALL_PIECES};

use crate::position::Position;

pub const MATERIAL: [i32; 6] = [100, 320, 330, 500, 900, 0];

const TEMPO: i32 = 10;

/// Total phase weight of a full board; 0 means a bare endgame.
const PHASE_LIMIT: i32 = 24;
const PHASE_WEIGHT: [i32; 6] = [0, 1, 1, 2, 4, 0];

// Tables are from white's perspective, rank 1 first (a1 = index 0);
// black squares are mirrored vertically.

#[rustfmt::skip]
const PAWN_MG: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5, 10, 10,-20,-20, 10, 10,  5,
     5, -5,-10,  0,  0,-10, -5,  5,
     0,  0,  0, 20, 20,  0,  0,  0,
     5,  5, 10, 25, 25, 10,  5,  5,
    10, 10, 20, 30, 30, 20, 10, 10,
    50, 50, 50, 50, 50, 50, 50, 50,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const PAWN_EG: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5,  5,  5,  5,  5,  5,  5,  5,
     5,  5,  5,  5,  5,  5,  5,  5,
    10, 10, 10, 10, 10, 10, 10, 10,
    20, 20, 20, 20, 20, 20, 20, 20,
    40, 40, 40, 40, 40, 40, 40, 40,
    80, 80, 80, 80, 80, 80, 80, 80,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const KNIGHT: [i32; 64] = [
    -50,-40,-30,-30,-30,-30,-40,-50,
    -40,-20,  0,  5,  5,  0,-20,-40,
    -30,  0, 10, 15, 15, 10,  0,-30,
    -30,  5, 15, 20, 20, 15,  5,-30,
    -30,  0, 15, 20, 20, 15,  0,-30,
    -30,  5, 10, 15, 15, 10,  5,-30,
    -40,-20,  0,  0,  0,  0,-20,-40,
    -50,-40,-30,-30,-30,-30,-40,-50,
];

#[rustfmt::skip]
const BISHOP: [i32; 64] = [
    -20,-10,-10,-10,-10,-10,-10,-20,
    -10,  5,  0,  0,  0,  0,  5,-10,
    -10, 10, 10, 10, 10, 10, 10,-10,
    -10,  0, 10, 10, 10, 10,  0,-10,
    -10,  5,  5, 10, 10,  5,  5,-10,
    -10,  0,  5, 10, 10,  5,  0,-10,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -20,-10,-10,-10,-10,-10,-10,-20,
];

#[rustfmt::skip]
const ROOK: [i32; 64] = [
     0,  0,  0,  5,  5,  0,  0,  0,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
     5, 10, 10, 10, 10, 10, 10,  5,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const QUEEN: [i32; 64] = [
    -20,-10,-10, -5, -5,-10,-10,-20,
    -10,  0,  5,  0,  0,  0,  0,-10,
    -10,  5,  5,  5,  5,  5,  0,-10,
      0,  0,  5,  5,  5,  5,  0, -5,
     -5,  0,  5,  5,  5,  5,  0, -5,
    -10,  0,  5,  5,  5,  5,  0,-10,
    -10,  0,  0,  0,  0,  0,  0,-10,
    -20,-10,-10, -5, -5,-10,-10,-20,
];

#[rustfmt::skip]
const KING_MG: [i32; 64] = [
     20, 30, 10,  0,  0, 10, 30, 20,
     20, 20,  0,  0,  0,  0, 20, 20,
    -10,-20,-20,-20,-20,-20,-20,-10,
    -20,-30,-30,-40,-40,-30,-30,-20,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
    -30,-40,-40,-50,-50,-40,-40,-30,
];

#[rustfmt::skip]
const KING_EG: [i32; 64] = [
    -50,-40,-30,-20,-20,-30,-40,-50,
    -30,-20,-10,  0,  0,-10,-20,-30,
    -30,-10, 20, 30, 30, 20,-10,-30,
    -30,-10, 30, 40, 40, 30,-10,-30,
    -30,-10, 30, 40, 40, 30,-10,-30,
    -30,-10, 20, 30, 30, 20,-10,-30,
    -30,-30,  0,  0,  0,  0,-30,-30,
    -50,-30,-30,-30,-30,-30,-30,-50,
];

fn table(piece: Piece, endgame: bool) -> &'static [i32; 64] {
    match (piece, endgame) {
        (Piece::Pawn, false) => &PAWN_MG,
        (Piece::Pawn, true) => &PAWN_EG,
        (Piece::Knight, _) => &KNIGHT,
        (Piece::Bishop, _) => &BISHOP,
        (Piece::Rook, _) => &ROOK,
        (Piece::Queen, _) => &QUEEN,
        (Piece::King, false) => &KING_MG,
        (Piece::King, true) => &KING_EG,
    }
}

/// Static score of the position, in centipawns, from the perspective of
/// the side to move.
pub fn evaluate(pos: &Position) -> i32 {
    let board = pos.board();
    let mut mg = 0;
    let mut eg = 0;
    let mut phase = 0;

    for piece in ALL_PIECES {
        let bb = *board.pieces(piece);
        let material = MATERIAL[piece.to_index()];
        let mg_table = table(piece, false);
        let eg_table = table(piece, true);
        for sq in bb & *board.color_combined(Color::White) {
            let idx = sq.to_index();
            mg += material + mg_table[idx];
            eg += material + eg_table[idx];
            phase += PHASE_WEIGHT[piece.to_index()];
        }
        for sq in bb & *board.color_combined(Color::Black) {
            let idx = sq.to_index() ^ 56;
            mg -= material + mg_table[idx];
            eg -= material + eg_table[idx];
            phase += PHASE_WEIGHT[piece.to_index()];
        }
    }

    let phase = phase.min(PHASE_LIMIT);
    let white_score = (mg * phase + eg * (PHASE_LIMIT - phase)) / PHASE_LIMIT;
    let score = match board.side_to_move() {
        Color::White => white_score,
        Color::Black => -white_score,
    };
    score + TEMPO
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Board;
    use std::str::FromStr;

    #[test]
    fn startpos_is_balanced() {
        let pos = Position::startpos();
        assert_eq!(evaluate(&pos), TEMPO);
    }

    #[test]
    fn evaluation_is_symmetric_in_colour() {
        let white = Position::new(
            Board::from_str("4k3/8/8/8/8/8/8/QR2K3 w - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        let black = Position::new(
            Board::from_str("qr2k3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        assert_eq!(evaluate(&white), evaluate(&black));
    }

    #[test]
    fn material_advantage_dominates() {
        let pos = Position::new(
            Board::from_str("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        assert!(evaluate(&pos) > 800);
        let flipped = Position::new(
            Board::from_str("4k3/8/8/8/8/8/8/3QK3 b - - 0 1").unwrap(),
            Vec::new(),
            0,
        );
        assert!(evaluate(&flipped) < -800);
    }
}
