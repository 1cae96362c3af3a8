use std::fmt::Display;

use arrayvec::ArrayVec;

use chess::ChessMove;

use crate::util::MAX_PLY;

/// A principal variation: the engine's best line from some node,
/// rebuilt bottom-up as the search returns.
#[derive(Clone, Debug, Default)]
pub struct PVariation {
    pub moves: ArrayVec<ChessMove, MAX_PLY>,
}

impl PVariation {
    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    pub fn first(&self) -> Option<ChessMove> {
        self.moves.first().copied()
    }

    pub fn second(&self) -> Option<ChessMove> {
        self.moves.get(1).copied()
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    /// Set this line to `mv` followed by the child's line.
    pub fn load_from(&mut self, mv: ChessMove, rest: &Self) {
        self.moves.clear();
        self.moves.push(mv);
        let room = self.moves.capacity() - 1;
        self.moves
            .try_extend_from_slice(&rest.moves[..rest.moves.len().min(room)])
            .expect("pv line exceeds MAX_PLY");
    }
}

impl Display for PVariation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        for mv in self.moves() {
            write!(f, "{sep}{mv}")?;
            sep = " ";
        }
        Ok(())
    }
}
