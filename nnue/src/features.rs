use cozy_chess::{Board, Color, Piece, Square};

// Feature Layout (41600 total):
//
// Piece-square bucket (640 features), from the perspective's own side:
//   [Own P][Opp P][Own N][Opp N][Own B][Opp B][Own R][Opp R][Own Q][Opp Q]
//   └ 64 ─┘└ 64 ─┘└ 64 ─┘ ...                                  └ 64 ─┘
//
// Real features [0-40959]:
//   [King on Sq0][King on Sq1]...[King on Sq63]   (oriented king square)
//   └── 640 ───┘ └── 640 ───┘    └── 640 ────┘
//
// Virtual features [40960-41599]:
//   One king-independent bucket. Training only, folded into every real
//   bucket before the network is written out.
//
// Kings select the bucket and are never features themselves.

/// Width of one piece-square bucket: 5 piece types x own/opponent x 64 squares.
pub const PS_END: usize = 10 * Square::NUM;

/// Number of real (deployed) feature indices.
pub const FT_IN_DIMS: usize = Square::NUM * PS_END;

/// Number of virtual feature indices appended after the real ones.
pub const VIRTUAL_DIMS: usize = PS_END;

pub const NUM_FEATURES: usize = FT_IN_DIMS + VIRTUAL_DIMS;

/// Upper bound on features per perspective: 30 non-king pieces.
pub const MAX_ACTIVE_FEATURES: usize = 30;

const ORIENT_MASK: usize = 0x38;

/// Flips the square vertically for black so both perspectives see the
/// board from their own side.
#[inline(always)]
pub fn orient(perspective: Color, square: Square) -> Square {
    match perspective {
        Color::White => square,
        Color::Black => Square::index(square as usize ^ ORIENT_MASK),
    }
}

/// Base offset of the 64-wide band holding `piece` of `color` as seen from
/// `perspective`. Kings have no band.
#[inline(always)]
pub fn piece_to_index(perspective: Color, piece: Piece, color: Color) -> Option<usize> {
    let band = match piece {
        Piece::Pawn => 0,
        Piece::Knight => 1,
        Piece::Bishop => 2,
        Piece::Rook => 3,
        Piece::Queen => 4,
        Piece::King => return None,
    };
    let side = if color == perspective { 0 } else { 1 };

    Some((2 * band + side) * Square::NUM)
}

/// Index within a piece-square bucket, in `[0, PS_END)`.
#[inline(always)]
pub fn make_index(perspective: Color, square: Square, piece: Piece, color: Color) -> Option<usize> {
    piece_to_index(perspective, piece, color).map(|base| orient(perspective, square) as usize + base)
}

/// Real feature index used by the engine, bucketed by the perspective's king.
#[inline(always)]
pub fn make_index_bucketed(
    perspective: Color,
    king_square: Square,
    square: Square,
    piece: Piece,
    color: Color,
) -> Option<usize> {
    let bucket = orient(perspective, king_square) as usize * PS_END;
    make_index(perspective, square, piece, color).map(|idx| bucket + idx)
}

/// Virtual feature index. Only the training-time feature generator emits these.
#[inline(always)]
pub fn make_index_virtual(
    perspective: Color,
    square: Square,
    piece: Piece,
    color: Color,
) -> Option<usize> {
    make_index(perspective, square, piece, color).map(|idx| FT_IN_DIMS + idx)
}

/// Real feature indices active on `board` from `perspective`.
pub fn active_features(board: &Board, perspective: Color) -> Vec<usize> {
    let king_square = board.king(perspective);
    let mut features = Vec::with_capacity(MAX_ACTIVE_FEATURES);

    for_each_piece(board, |square, piece, color| {
        if let Some(idx) = make_index_bucketed(perspective, king_square, square, piece, color) {
            features.push(idx);
        }
    });

    features
}

/// Virtual feature indices active on `board` from `perspective`.
pub fn active_virtual_features(board: &Board, perspective: Color) -> Vec<usize> {
    let mut features = Vec::with_capacity(MAX_ACTIVE_FEATURES);

    for_each_piece(board, |square, piece, color| {
        if let Some(idx) = make_index_virtual(perspective, square, piece, color) {
            features.push(idx);
        }
    });

    features
}

fn for_each_piece(board: &Board, mut f: impl FnMut(Square, Piece, Color)) {
    for color in Color::ALL {
        for piece in Piece::ALL {
            for square in board.colored_pieces(color, piece) {
                f(square, piece, color);
            }
        }
    }
}
