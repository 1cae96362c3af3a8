use chess::{BitBoard, Board, ChessMove, Color, Piece, Square, EMPTY};

use crate::util::MAX_PLY;

/// One searched ply: a board snapshot plus the bookkeeping the search
/// needs and `chess::Board` does not carry.
#[derive(Clone, Copy)]
struct Frame {
    board: Board,
    key: u64,
    fifty: u16,
    last_move: Option<ChessMove>,
}

/// The engine's view of a chess position.
///
/// Move laws (generation, legality, Zobrist hashing) come from the
/// `chess` crate; this wrapper adds the per-ply snapshot stack, the
/// halfmove clock, repetition detection across the searched line and
/// the pre-root game history, and null moves. Making a move pushes a
/// snapshot, unmaking pops it, so an unwinding search restores the
/// root by simply truncating the stack.
#[derive(Clone)]
pub struct Position {
    stack: Vec<Frame>,
    /// Zobrist keys of the positions that preceded the root, newest last.
    prior_keys: Vec<u64>,
}

impl Position {
    pub fn new(board: Board, prior_keys: Vec<u64>, fifty: u16) -> Self {
        let mut stack = Vec::with_capacity(MAX_PLY + 2);
        stack.push(Frame { board, key: board.get_hash(), fifty, last_move: None });
        Self { stack, prior_keys }
    }

    pub fn startpos() -> Self {
        Self::new(Board::default(), Vec::new(), 0)
    }

    fn top(&self) -> &Frame {
        self.stack.last().expect("position stack is never empty")
    }

    pub fn board(&self) -> &Board {
        &self.top().board
    }

    /// The board one ply up; only meaningful after a make.
    pub fn parent_board(&self) -> &Board {
        &self.stack[self.stack.len() - 2].board
    }

    pub fn key(&self) -> u64 {
        self.top().key
    }

    /// Current search ply: 0 at the root.
    pub fn sply(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn fifty(&self) -> u16 {
        self.top().fifty
    }

    /// The move that produced this position, if any. `None` at the root
    /// and after a null move.
    pub fn last_move(&self) -> Option<ChessMove> {
        self.top().last_move
    }

    pub fn side_to_move(&self) -> Color {
        self.board().side_to_move()
    }

    pub fn in_check(&self) -> bool {
        *self.board().checkers() != EMPTY
    }

    pub fn piece_count(&self) -> u32 {
        self.board().combined().popcnt()
    }

    /// Does the side to move have any piece besides pawns and the king?
    pub fn has_non_pawn(&self) -> bool {
        let board = self.board();
        let minors_and_majors = *board.combined()
            & !*board.pieces(Piece::Pawn)
            & !*board.pieces(Piece::King);
        minors_and_majors & *board.color_combined(board.side_to_move()) != EMPTY
    }

    pub fn is_capture(&self, mv: ChessMove) -> bool {
        self.board().piece_on(mv.get_dest()).is_some() || self.is_en_passant(mv)
    }

    /// A pawn moving diagonally onto an empty square is necessarily an
    /// en-passant capture.
    pub fn is_en_passant(&self, mv: ChessMove) -> bool {
        self.board().piece_on(mv.get_source()) == Some(Piece::Pawn)
            && mv.get_source().get_file() != mv.get_dest().get_file()
            && self.board().piece_on(mv.get_dest()).is_none()
    }

    pub fn is_tactical(&self, mv: ChessMove) -> bool {
        self.is_capture(mv) || mv.get_promotion().is_some()
    }

    /// A pawn advancing to the sixth rank or beyond (relative to its
    /// own side); such moves are exempt from late-move pruning.
    pub fn is_pawn_push(&self, mv: ChessMove) -> bool {
        if self.board().piece_on(mv.get_source()) != Some(Piece::Pawn) {
            return false;
        }
        let rank = mv.get_dest().get_rank().to_index();
        match self.board().color_on(mv.get_source()) {
            Some(Color::White) => rank >= 5,
            Some(Color::Black) => rank <= 2,
            None => false,
        }
    }

    /// Make a legal move, pushing a new snapshot.
    pub fn make_move(&mut self, mv: ChessMove) {
        let top = *self.top();
        let resets_clock =
            top.board.piece_on(mv.get_source()) == Some(Piece::Pawn) || self.is_capture(mv);
        let board = top.board.make_move_new(mv);
        self.stack.push(Frame {
            board,
            key: board.get_hash(),
            fifty: if resets_clock { 0 } else { top.fifty + 1 },
            last_move: Some(mv),
        });
    }

    pub fn unmake_move(&mut self) {
        debug_assert!(self.stack.len() > 1, "unmake below the root");
        self.stack.pop();
    }

    /// Pass the move to the opponent. Fails if the side to move is in
    /// check, in which case nothing is pushed.
    pub fn make_null_move(&mut self) -> bool {
        let top = *self.top();
        let Some(board) = top.board.null_move() else {
            return false;
        };
        self.stack.push(Frame {
            board,
            key: board.get_hash(),
            fifty: top.fifty + 1,
            last_move: None,
        });
        true
    }

    pub fn unmake_null_move(&mut self) {
        self.unmake_move();
    }

    /// Restore the root position, dropping every searched ply.
    pub fn rewind_to_root(&mut self) {
        self.stack.truncate(1);
    }

    /// Has the current position occurred before in the line or in the
    /// game history? A single prior occurrence counts: settling for the
    /// draw score at the first repetition avoids playing into a draw
    /// hidden just beyond the horizon.
    pub fn is_repetition(&self) -> bool {
        let current = self.key();
        let window = self.top().fifty as usize;
        self.stack[..self.stack.len() - 1]
            .iter()
            .rev()
            .map(|frame| frame.key)
            .chain(self.prior_keys.iter().rev().copied())
            .take(window)
            .skip(1)
            .step_by(2)
            .any(|key| key == current)
    }

    pub fn is_fifty_draw(&self) -> bool {
        self.top().fifty >= 100
    }

    pub fn is_draw(&self) -> bool {
        self.is_repetition() || self.is_fifty_draw()
    }

    /// Destination mask for capture generation: enemy occupancy plus
    /// the en-passant target square if one exists.
    pub fn capture_targets(&self) -> BitBoard {
        let board = self.board();
        let mut targets = *board.color_combined(!board.side_to_move());
        if let Some(ep_pawn) = board.en_passant() {
            // `chess` stores the square of the capturable pawn; the
            // capture lands one rank beyond it.
            if let Some(dest) = ep_pawn.forward(board.side_to_move()) {
                targets |= BitBoard::from_square(dest);
            }
        }
        targets
    }

    /// Squares not occupied by the enemy; quiet moves land here.
    pub fn quiet_targets(&self) -> BitBoard {
        !*self.board().color_combined(!self.board().side_to_move())
    }

    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board().piece_on(sq)
    }
}
