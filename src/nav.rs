//! Focus movement between the secret fields and the buttons.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    None,
    PrimarySecret,
    ConfirmSecret,
    Ok,
    NotOk,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// What Enter does at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    NoOp,
    Accept,
    NotOk,
    Cancel,
}

/// Which positions exist in this dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLayout {
    pub secret: bool,
    pub confirm: bool,
    pub not_ok: bool,
    pub cancel: bool,
}

impl NavLayout {
    pub fn initial(&self) -> Position {
        if self.secret {
            Position::PrimarySecret
        } else {
            Position::Ok
        }
    }

    fn ring(&self) -> Vec<Position> {
        let mut ring = Vec::with_capacity(5);
        if self.secret {
            ring.push(Position::PrimarySecret);
            if self.confirm {
                ring.push(Position::ConfirmSecret);
            }
        }
        ring.push(Position::Ok);
        if self.not_ok {
            ring.push(Position::NotOk);
        }
        if self.cancel {
            ring.push(Position::Cancel);
        }
        ring
    }

    fn neighbour(ring: &[Position], from: Position, dir: Direction) -> Position {
        let Some(idx) = ring.iter().position(|p| *p == from) else {
            return ring[0];
        };
        let n = ring.len();
        match dir {
            Direction::Forward => ring[(idx + 1) % n],
            Direction::Backward => ring[(idx + n - 1) % n],
        }
    }

    /// Next focus position. `matches` is the current result of comparing
    /// the two secret entries. Leaving the confirmation field forward on a
    /// mismatch goes straight to Cancel, and backing onto Ok from Cancel
    /// never lands on Ok while they differ.
    pub fn step(&self, from: Position, dir: Direction, matches: bool) -> Position {
        let ring = self.ring();
        if from == Position::None {
            return self.initial();
        }
        match (from, dir) {
            (Position::ConfirmSecret, Direction::Forward) if !matches => {
                if self.cancel {
                    Position::Cancel
                } else {
                    Self::neighbour(&ring, Position::Ok, Direction::Forward)
                }
            }
            (Position::Cancel, Direction::Backward) if !self.not_ok && !matches && self.confirm => {
                Position::ConfirmSecret
            }
            _ => Self::neighbour(&ring, from, dir),
        }
    }

    pub fn accept(&self, at: Position, matches: bool) -> Activation {
        match at {
            Position::PrimarySecret | Position::ConfirmSecret | Position::Ok if matches => {
                Activation::Accept
            }
            Position::NotOk => Activation::NotOk,
            Position::Cancel => Activation::Cancel,
            _ => Activation::NoOp,
        }
    }
}
